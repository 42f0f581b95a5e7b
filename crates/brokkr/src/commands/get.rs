//! Get command

use anyhow::{Context, Result};
use brokkr_secrets::SecretReference;
use std::io::Write;

use super::open_broker;
use crate::cli::{GetArgs, GlobalOpts};

pub async fn run(args: GetArgs, global: &GlobalOpts) -> Result<()> {
    let reference: SecretReference = args
        .reference
        .parse()
        .with_context(|| format!("Invalid secret reference '{}'", args.reference))?;

    let broker = open_broker(global)?;
    let value = broker.get(&reference).await?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(value.as_bytes())?;
    if !args.no_newline {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
