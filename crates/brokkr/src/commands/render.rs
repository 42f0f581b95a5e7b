//! Render command

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use super::open_broker;
use crate::cli::{GlobalOpts, RenderArgs};
use crate::output;

pub async fn run(args: RenderArgs, global: &GlobalOpts) -> Result<()> {
    let broker = open_broker(global)?;
    let vars: HashMap<String, String> = args.vars.into_iter().collect();

    // Ctrl-C aborts outstanding lookups instead of leaving a partial file
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = match &args.output {
        Some(destination) => broker
            .render_file_to_with(&args.template, destination, &vars, &cancel)
            .await
            .map(|()| None),
        None => broker
            .render_file_with(&args.template, &vars, &cancel)
            .await
            .map(Some),
    };
    interrupt.abort();

    let rendered =
        result.with_context(|| format!("Failed to render {}", args.template.display()))?;
    match (rendered, &args.output) {
        (Some(bytes), _) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
        (None, Some(destination)) => output::success(&format!(
            "Rendered {} to {}",
            args.template.display(),
            destination.display()
        )),
        (None, None) => {}
    }
    Ok(())
}
