//! Raw metadata document command implementation

use super::resources;
use anyhow::{bail, Context, Result};
use folio_core::{CodecContext, HandlerRegistry, MetadataWriter};
use std::io::Write;

/// Print the raw metadata document, or replace it with the file at `store`
pub fn plain(ctx: &CodecContext, input: &str, store: Option<&str>) -> Result<()> {
    let resources = resources(&[input.to_string()])?;
    let registry = HandlerRegistry::new(ctx.clone());

    if let Some(path) = store {
        let data =
            std::fs::read(path).with_context(|| format!("Failed to read input file: {}", path))?;
        let Some(mut writer) = registry.writer(&resources) else {
            bail!("{} is read-only", input);
        };
        writer
            .store_plain_metadata(&data)
            .with_context(|| format!("Failed to store metadata into {}", input))?;
        tracing::info!("Stored {} bytes of metadata into {}", data.len(), input);
        return Ok(());
    }

    let reader = registry.reader(&resources);
    let mut reader = reader.borrow_mut();
    let data = reader
        .plain_metadata()
        .with_context(|| format!("{} has no plain metadata document", input))?;
    tracing::debug!(mime = reader.plain_metadata_mime(), "plain metadata");

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data)?;
    if !data.ends_with(b"\n") {
        stdout.write_all(b"\n")?;
    }
    Ok(())
}
