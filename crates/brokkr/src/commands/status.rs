//! Status command

use anyhow::Result;
use serde::Serialize;

use super::open_broker;
use crate::cli::{GlobalOpts, StatusArgs};
use crate::output;

#[derive(Debug, Serialize)]
struct StatusReport {
    backend: &'static str,
    account: String,
    config_path: Option<String>,
    signed_in: bool,
    session_var: Option<String>,
    token_file: Option<String>,
    session_ttl_secs: u64,
    keepalive_interval_secs: Option<u64>,
    cache_ttl_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn run(args: StatusArgs, global: &GlobalOpts) -> Result<()> {
    let broker = open_broker(global)?;
    let config = broker.config();

    let spinner = (!args.json).then(|| output::spinner("Checking session..."));
    let check = broker.is_authenticated().await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let (signed_in, error) = match check {
        Ok(signed_in) => (signed_in, None),
        Err(e) => (false, Some(e.to_string())),
    };

    let report = StatusReport {
        backend: broker.backend().name(),
        account: config.account.clone(),
        config_path: config.config_path.as_ref().map(|p| p.to_string()),
        signed_in,
        session_var: broker
            .backend()
            .requires_session()
            .then(|| broker.session("").session_var()),
        token_file: config.token_file.as_ref().map(|p| p.display().to_string()),
        session_ttl_secs: config.session_ttl.as_secs(),
        keepalive_interval_secs: config.keepalive_interval.map(|d| d.as_secs()),
        cache_ttl_secs: config.cache_ttl.map(|d| d.as_secs()),
        error,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    output::header("Brokkr status");
    output::kv("Backend", report.backend);
    output::kv(
        "Account",
        if report.account.is_empty() {
            "(default)"
        } else {
            report.account.as_str()
        },
    );
    output::kv("Config", report.config_path.as_deref().unwrap_or("none"));
    output::kv("Signed in", if report.signed_in { "yes" } else { "no" });
    if let Some(var) = &report.session_var {
        output::kv("Session variable", var);
    }
    output::kv("Token file", report.token_file.as_deref().unwrap_or("none"));
    output::kv("Session TTL", &format!("{}s", report.session_ttl_secs));
    output::kv(
        "Keep-alive",
        &report
            .keepalive_interval_secs
            .map_or_else(|| "disabled".to_string(), |s| format!("every {}s", s)),
    );

    if let Some(error) = &report.error {
        println!();
        output::warning(&format!("Session check failed: {}", error));
    } else if !report.signed_in {
        println!();
        output::info("Run 'brokkr signin' to start a session");
    }
    Ok(())
}
