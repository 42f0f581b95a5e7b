//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Brokkr - read vault secrets and render them into configuration files
#[derive(Parser, Debug)]
#[command(name = "brokkr")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to brokkr.yaml config file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Vault account (overrides config and BROKKR_ACCOUNT)
    #[arg(short, long, global = true)]
    pub account: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options every broker-backed command needs
#[derive(Debug, Clone, Default)]
pub struct GlobalOpts {
    pub config: Option<Utf8PathBuf>,
    pub account: Option<String>,
}

impl Cli {
    pub fn global(&self) -> GlobalOpts {
        GlobalOpts {
            config: self.config.clone(),
            account: self.account.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print one secret field
    Get(GetArgs),

    /// Print the content of a document item
    Document(DocumentArgs),

    /// Sign in to the vault account
    Signin(SigninArgs),

    /// Add an account to the vault CLI
    Register(RegisterArgs),

    /// Render a template file
    Render(RenderArgs),

    /// Show backend and session state
    Status(StatusArgs),

    /// Liveness probes
    #[command(subcommand)]
    Check(CheckCommands),
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Secret reference: op://vault/item/field
    pub reference: String,

    /// Do not print a trailing newline
    #[arg(short = 'n', long)]
    pub no_newline: bool,
}

#[derive(Args, Debug)]
pub struct DocumentArgs {
    /// Vault name or identifier
    pub vault: String,

    /// Item title or identifier
    pub item: String,

    /// File to read when the item holds several
    #[arg(long)]
    pub file_name: Option<String>,
}

#[derive(Args, Debug)]
pub struct SigninArgs {
    /// Print an `export OP_SESSION_...` line for `eval`
    #[arg(long)]
    pub export: bool,
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Email address of the account
    pub email: String,

    /// Sign-in address (e.g. my.1password.com)
    #[arg(long)]
    pub address: Option<String>,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Template file
    pub template: PathBuf,

    /// Output file; stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Template variable (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum CheckCommands {
    /// Check that a TCP endpoint accepts connections
    Tcp(CheckTcpArgs),

    /// Check that a command exits successfully
    Cmd(CheckCmdArgs),
}

#[derive(Args, Debug)]
pub struct CheckTcpArgs {
    /// host:port
    pub address: String,

    /// Connect timeout in seconds
    #[arg(long, default_value = "3")]
    pub timeout: u64,
}

#[derive(Args, Debug)]
pub struct CheckCmdArgs {
    /// Program to run
    pub program: String,

    /// Arguments passed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}
