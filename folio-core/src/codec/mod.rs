//! Per-format metadata codecs
//!
//! Every codec reads a container into a [`FieldSet`] and, except for HTML,
//! writes an edited set back. Writes are staged into a temporary resource
//! and moved over the original only once the new bytes exist.

pub mod comic;
pub mod epub;
pub mod html;
pub mod mobi;
pub mod pdf;

pub use comic::{ComicArchive, ComicBookCodec, ZipComicArchive};
pub use epub::EpubCodec;
pub use html::HtmlCodec;
pub use mobi::MobiCodec;
pub use pdf::PdfCodec;

use crate::config::{CodecContext, RefreshPause};
use crate::error::{MetadataError, Result, WriteError};
use crate::resource::{Resource, ResourceRef};
use crate::types::{CatalogRecord, Field, FieldCategory, FieldSet};
use std::io::Write;

/// Read capability of a codec
pub trait MetadataReader {
    /// Name of the resource (or resources) this reader is bound to
    fn resource_name(&self) -> String;

    /// Parse the container into fields
    ///
    /// A malformed container is logged and reported as an empty set.
    fn read_metadata(&mut self) -> FieldSet;

    /// Field names of this format that belong to `category`; the first one
    /// is used when a field has to be synthesized
    fn category_names(&self, category: FieldCategory) -> &'static [&'static str];

    /// An empty field of `category`, ready to be filled and written
    fn synthesize(&self, category: FieldCategory) -> Field {
        let name = self
            .category_names(category)
            .first()
            .copied()
            .unwrap_or_else(|| category.name());
        Field::empty(name).with_type(category.value_type())
    }

    /// The field of `fields` matching `category`, optionally synthesizing one
    fn category_field<'a>(
        &self,
        create: bool,
        fields: &'a mut FieldSet,
        category: FieldCategory,
    ) -> Option<&'a mut Field> {
        let names = self.category_names(category);
        let position = fields
            .iter()
            .position(|f| names.iter().any(|n| f.is_named(n)));
        match position {
            Some(idx) => fields.get_mut(idx),
            None if create && !names.is_empty() => {
                fields.push(self.synthesize(category));
                let last = fields.len() - 1;
                fields.get_mut(last)
            }
            None => None,
        }
    }

    /// Project fields into catalog attributes through this format's name table
    fn fill_record(&self, fields: &FieldSet, record: &mut CatalogRecord) {
        for field in fields {
            if let Some(category) = FieldCategory::ALL
                .into_iter()
                .find(|c| self.category_names(*c).iter().any(|n| field.is_named(n)))
            {
                category.project(field, record);
            }
        }
    }

    /// Cover image bytes, if the container has one
    fn read_cover(&mut self) -> Option<Vec<u8>> {
        let fields = self.read_metadata();
        let names = self.category_names(FieldCategory::Cover);
        fields
            .iter()
            .filter(|f| names.iter().any(|n| f.is_named(n)))
            .find_map(|f| crate::cover::cover_bytes(f).map(<[u8]>::to_vec))
    }

    /// The raw metadata document (OPF, XMP packet, ComicInfo.xml)
    fn plain_metadata(&mut self) -> Option<Vec<u8>> {
        None
    }

    fn plain_metadata_mime(&self) -> Option<&'static str> {
        None
    }
}

/// Write capability of a codec
pub trait MetadataWriter {
    /// Serialize `fields` back into the resource
    fn write_metadata(&mut self, fields: &FieldSet) -> Result<()>;

    /// Replace the raw metadata document verbatim
    fn store_plain_metadata(&mut self, _data: &[u8]) -> Result<()> {
        Err(MetadataError::Unsupported(
            "storing plain metadata is not supported for this format".to_string(),
        ))
    }
}

/// A codec with both capabilities
pub trait MetadataCodec: MetadataReader + MetadataWriter {}

impl<T: MetadataReader + MetadataWriter> MetadataCodec for T {}

/// Read-only codec for containers nobody understands
#[derive(Debug)]
pub struct NullCodec {
    name: String,
}

impl NullCodec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl MetadataReader for NullCodec {
    fn resource_name(&self) -> String {
        self.name.clone()
    }

    fn read_metadata(&mut self) -> FieldSet {
        FieldSet::new()
    }

    fn category_names(&self, _category: FieldCategory) -> &'static [&'static str] {
        &[]
    }
}

/// Stage `data` into a temporary sibling of `resource` and move it over the original
///
/// The original is only replaced when the temporary resource holds at least
/// one byte; any failure deletes the temporary and leaves the original alone.
pub(crate) fn stage_write(resource: &ResourceRef, ctx: &CodecContext, data: &[u8]) -> Result<()> {
    let _pause = RefreshPause::new(ctx.refresh.clone());
    let temp = resource.create_temporary()?;

    let written = (|| -> std::io::Result<u64> {
        let mut out = temp.open_write()?;
        out.write_all(data)?;
        out.flush()?;
        drop(out);
        temp.size()
    })();

    match written {
        Ok(0) => {
            discard(temp.as_ref());
            tracing::error!("Writer produced no bytes for {}", resource.name());
            Err(WriteError::EmptyOutput(resource.name().to_string()).into())
        }
        Ok(_) => {
            if let Err(e) = temp.atomic_move_to(resource.as_ref(), true) {
                discard(temp.as_ref());
                tracing::error!("Failed to replace {}: {}", resource.name(), e);
                return Err(e.into());
            }
            tracing::debug!("Rewrote {} ({} bytes)", resource.name(), data.len());
            Ok(())
        }
        Err(e) => {
            discard(temp.as_ref());
            tracing::error!("Failed to stage {}: {}", resource.name(), e);
            Err(e.into())
        }
    }
}

fn discard(temp: &dyn Resource) {
    if let Err(e) = temp.delete() {
        tracing::warn!("Could not delete temporary {}: {}", temp.name(), e);
    }
}

/// Log a read failure and degrade to "no metadata"
pub(crate) fn degrade(resource: &dyn Resource, err: MetadataError) -> FieldSet {
    tracing::warn!("Could not read metadata from {}: {}", resource.name(), err);
    FieldSet::new()
}
