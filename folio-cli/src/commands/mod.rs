//! CLI command implementations

mod batch;
mod cover;
mod info;
mod plain;
mod set;

pub use batch::batch;
pub use cover::cover;
pub use info::info;
pub use plain::plain;
pub use set::set;

use anyhow::{bail, Result};
use folio_core::{FileResource, ResourceRef};
use std::path::Path;

/// Resolve command-line paths into resources, failing on missing files
fn resources(files: &[String]) -> Result<Vec<ResourceRef>> {
    files
        .iter()
        .map(|file| {
            let path = Path::new(file);
            if !path.is_file() {
                bail!("No such file: {}", file);
            }
            Ok(FileResource::shared(path))
        })
        .collect()
}
