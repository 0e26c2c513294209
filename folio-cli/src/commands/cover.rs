//! Cover extraction command implementation

use super::resources;
use anyhow::{Context, Result};
use folio_core::{CodecContext, HandlerRegistry};

/// Write the cover image of `input` to `output`
pub fn cover(ctx: &CodecContext, input: &str, output: &str) -> Result<()> {
    let resources = resources(&[input.to_string()])?;
    let registry = HandlerRegistry::new(ctx.clone());

    let data = registry
        .reader(&resources)
        .borrow_mut()
        .read_cover()
        .with_context(|| format!("{} has no cover image", input))?;

    std::fs::write(output, &data)
        .with_context(|| format!("Failed to write output file: {}", output))?;

    println!("Wrote {} bytes to {}", data.len(), output);
    Ok(())
}
