//! Liveness probe commands

use anyhow::{bail, Result};
use brokkr_core::probes::{CommandProbe, TcpProbe};
use brokkr_core::SystemRunner;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::CheckCommands;
use crate::output;

pub async fn run(cmd: CheckCommands) -> Result<()> {
    match cmd {
        CheckCommands::Tcp(args) => {
            let probe = TcpProbe::new(&args.address, Duration::ZERO)
                .with_connect_timeout(Duration::from_secs(args.timeout));
            if !probe.is_alive().await {
                bail!("{} is not accepting connections", probe.address());
            }
            output::success(&format!("{} is reachable", probe.address()));
        }
        CheckCommands::Cmd(args) => {
            let label = std::iter::once(args.program.as_str())
                .chain(args.args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" ");
            let probe = CommandProbe::new(
                Arc::new(SystemRunner::new()),
                args.program,
                args.args,
                Duration::ZERO,
            );
            if !probe.is_alive().await? {
                bail!("'{}' did not exit successfully", label);
            }
            output::success(&format!("'{}' succeeded", label));
        }
    }
    Ok(())
}
