//! Document command

use anyhow::Result;
use brokkr_secrets::DocumentReference;
use std::io::Write;

use super::open_broker;
use crate::cli::{DocumentArgs, GlobalOpts};

pub async fn run(args: DocumentArgs, global: &GlobalOpts) -> Result<()> {
    let mut reference = DocumentReference::new(args.vault, args.item);
    if let Some(name) = args.file_name {
        reference = reference.with_field(name);
    }

    let broker = open_broker(global)?;
    let content = broker.get_document(&reference).await?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(content.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
