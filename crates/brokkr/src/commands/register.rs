//! Register command

use anyhow::{Context, Result};

use super::open_broker;
use crate::cli::{GlobalOpts, RegisterArgs};
use crate::output;

pub async fn run(args: RegisterArgs, global: &GlobalOpts) -> Result<()> {
    let broker = open_broker(global)?;
    broker
        .register(&args.email, args.address.as_deref())
        .await
        .with_context(|| format!("Failed to register {}", args.email))?;

    output::success(&format!("Registered {}", args.email));
    output::info("Run 'brokkr signin' to start a session");
    Ok(())
}
