//! MOBI / AZW codec
//!
//! Metadata lives in record 0 of the PalmDB container: the MOBI full name
//! and the EXTH block. A write regenerates the EXTH list from the field
//! set, rebuilds record 0 and shifts every following record.

pub mod exth;
mod palmdb;

use crate::codec::{degrade, stage_write, MetadataReader, MetadataWriter};
use crate::config::CodecContext;
use crate::cover::{cover_field, CoverFormat};
use crate::error::{ParseError, Result};
use crate::resource::ResourceRef;
use crate::types::{ExthRecord, Field, FieldCategory, FieldOrigin, FieldSet};
use exth::TextEncoding;
use palmdb::{MobiHeader, PalmDb};

pub struct MobiCodec {
    resource: ResourceRef,
    ctx: CodecContext,
}

impl MobiCodec {
    pub fn new(resource: ResourceRef, ctx: CodecContext) -> Self {
        Self { resource, ctx }
    }

    fn load(&self) -> Result<(PalmDb, MobiHeader)> {
        let data = self.resource.read_all()?;
        let db = PalmDb::parse(&data)?;
        if !db.is_book() {
            return Err(ParseError::InvalidMobi(format!(
                "not a MOBI book (type/creator {})",
                String::from_utf8_lossy(db.type_creator())
            ))
            .into());
        }
        let record0 = db
            .records
            .first()
            .ok_or_else(|| ParseError::InvalidMobi("no records".to_string()))?;
        let header = MobiHeader::parse(record0)?;
        Ok((db, header))
    }

    fn read_fields(&self) -> Result<FieldSet> {
        let (db, header) = self.load()?;
        let mut fields = FieldSet::new();

        let title = if header.full_name.trim().is_empty() {
            db.name()
        } else {
            header.full_name.clone()
        };
        fields.push(
            Field::new("title", title)
                .with_origin(FieldOrigin::MobiTitle)
                .undeletable(),
        );

        for record in &header.exth {
            fields.push(exth::record_to_field(record, header.encoding));
        }

        if let Some(data) = header
            .cover_record()
            .and_then(|idx| db.records.get(idx))
            .filter(|data| CoverFormat::sniff(data).is_some())
        {
            fields.push(cover_field("cover", data.clone(), FieldOrigin::MobiCover).read_only());
        }

        tracing::debug!("Read {} fields from {}", fields.len(), self.resource.name());
        Ok(fields)
    }

    fn write_fields(&self, fields: &FieldSet) -> Result<()> {
        let (mut db, header) = self.load()?;
        let mut title = header.full_name.clone();
        let mut records = Vec::new();

        for field in fields {
            match &field.origin {
                FieldOrigin::MobiTitle => {
                    if !field.is_empty() {
                        title = field.value();
                    }
                }
                FieldOrigin::MobiCover => {}
                FieldOrigin::Exth(original) => {
                    collect_records(field, original, header.encoding, &mut records)
                }
                _ if field.is_named("title") => {
                    if !field.is_empty() {
                        title = field.value();
                    }
                }
                _ => tracing::warn!(
                    "Rejecting {} for {}: not an EXTH record",
                    field.name,
                    self.resource.name()
                ),
            }
        }

        let record0 = header.rebuild(&db.records[0], &records, &title)?;
        db.records[0] = record0;
        db.set_name(&title);
        stage_write(&self.resource, &self.ctx, &db.to_bytes())
    }
}

/// Append the records a field stands for
///
/// Unchanged values keep their original bytes; records outside the
/// editable set are always written back as read.
fn collect_records(
    field: &Field,
    original: &ExthRecord,
    encoding: TextEncoding,
    out: &mut Vec<ExthRecord>,
) {
    let record_type = original.record_type;
    if !exth::is_editable(record_type) {
        out.push(original.clone());
        return;
    }
    if field.is_empty() {
        tracing::debug!("Dropping EXTH {} ({})", record_type, field.name);
        return;
    }

    let unchanged = exth::record_to_field(original, encoding);
    for value in field.values.iter().filter(|v| !v.is_empty()) {
        if !original.data.is_empty() && unchanged.first() == Some(value) {
            out.push(original.clone());
            continue;
        }
        match exth::field_to_record(record_type, value, encoding) {
            Ok(record) => out.push(record),
            Err(reason) => {
                tracing::warn!("Rejecting {}: {}", field.name, reason);
                if !original.data.is_empty() {
                    out.push(original.clone());
                }
            }
        }
    }
}

impl MetadataReader for MobiCodec {
    fn resource_name(&self) -> String {
        self.resource.name().to_string()
    }

    fn read_metadata(&mut self) -> FieldSet {
        self.read_fields()
            .unwrap_or_else(|e| degrade(self.resource.as_ref(), e))
    }

    fn category_names(&self, category: FieldCategory) -> &'static [&'static str] {
        match category {
            FieldCategory::Title => &["title"],
            FieldCategory::Author => &["author"],
            FieldCategory::Description => &["description"],
            FieldCategory::Isbn => &["isbn"],
            FieldCategory::Genre => &["subject"],
            FieldCategory::Language => &["language"],
            FieldCategory::CreationDate => &["publishing_date"],
            FieldCategory::Cover => &["cover"],
            FieldCategory::Keywords
            | FieldCategory::AgeSuggestion
            | FieldCategory::Rating
            | FieldCategory::SeriesIndex
            | FieldCategory::SeriesName => &[],
        }
    }

    /// Synthesized fields carry an empty record of the matching type so
    /// the writer knows where to put them
    fn synthesize(&self, category: FieldCategory) -> Field {
        let name = self.category_names(category).first().copied().unwrap_or("");
        let field = Field::empty(name).with_type(category.value_type());
        match category {
            FieldCategory::Title => field.with_origin(FieldOrigin::MobiTitle),
            FieldCategory::Cover => field.read_only(),
            _ => match exth::code_of(name) {
                Some(code) => field.with_origin(FieldOrigin::Exth(ExthRecord::new(code, Vec::new()))),
                None => field,
            },
        }
    }
}

impl MetadataWriter for MobiCodec {
    fn write_metadata(&mut self, fields: &FieldSet) -> Result<()> {
        self.write_fields(fields)
    }
}
