//! PDF codec
//!
//! Two stores are merged on read: the XMP packet referenced from the
//! catalog's `Metadata` entry and the trailer `Info` dictionary. A write
//! regenerates both from the field set and saves the document with lopdf.

pub mod date;
mod info;
mod xmp;

use crate::codec::{degrade, stage_write, MetadataReader, MetadataWriter};
use crate::config::CodecContext;
use crate::cover::{cover_bytes, to_jpeg};
use crate::error::{ParseError, Result, WriteError};
use crate::resource::ResourceRef;
use crate::types::{FieldCategory, FieldOrigin, FieldSet, XmpOrigin};
use crate::xml::check_well_formed;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use xmp::XmpBuilder;

pub struct PdfCodec {
    resource: ResourceRef,
    ctx: CodecContext,
}

impl PdfCodec {
    pub fn new(resource: ResourceRef, ctx: CodecContext) -> Self {
        Self { resource, ctx }
    }

    fn load(&self) -> Result<Document> {
        let data = self.resource.read_all()?;
        Document::load_mem(&data).map_err(|e| ParseError::InvalidPdf(e.to_string()).into())
    }

    fn save(&self, doc: &mut Document) -> Result<()> {
        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| WriteError::EncodingFailed(format!("PDF save failed: {}", e)))?;
        stage_write(&self.resource, &self.ctx, &out)
    }

    fn read_fields(&self) -> Result<FieldSet> {
        let doc = self.load()?;
        let mut fields = FieldSet::new();

        if let Some(packet) = read_xmp(&doc) {
            let text = String::from_utf8_lossy(&packet);
            match xmp::parse_packet(&text) {
                Ok(parsed) => {
                    for field in parsed.fields {
                        fields.push_non_empty(field);
                    }
                    if let Some(cover) = parsed.cover {
                        fields.push(cover);
                    }
                }
                Err(e) => tracing::warn!("Ignoring XMP packet of {}: {}", self.resource.name(), e),
            }
        }

        for field in info::read_info(&doc) {
            fields.push_non_empty(field);
        }

        tracing::debug!("Read {} fields from {}", fields.len(), self.resource.name());
        Ok(fields)
    }

    fn write_fields(&self, fields: &FieldSet) -> Result<()> {
        let mut doc = self.load()?;
        let mut info_map: BTreeMap<String, String> = BTreeMap::new();
        let mut builder = XmpBuilder::new();

        for field in fields {
            if field.is_named("cover") {
                if let Some(data) = cover_bytes(field) {
                    let thumbnail = to_jpeg(data, self.ctx.options.thumbnail_jpeg_quality)?;
                    let prefix = match &field.origin {
                        FieldOrigin::Xmp(origin) => origin.prefix.as_str(),
                        _ => "xmp",
                    };
                    builder.add_thumbnail(prefix, &thumbnail);
                }
                continue;
            }
            if field.is_empty() {
                continue;
            }
            if let Err(reason) = field.validate() {
                tracing::warn!("Skipping field: {}", reason);
                continue;
            }

            match &field.origin {
                FieldOrigin::PdfInfo => info::accumulate(&mut info_map, field),
                FieldOrigin::Xmp(origin) => builder.add_field(field, origin),
                _ => match field.name.split_once(':') {
                    Some((prefix, _)) => match xmp::namespace_uri(prefix) {
                        Some(uri) => builder.add_field(field, &XmpOrigin::new(prefix, uri)),
                        None => tracing::warn!(
                            "Rejecting {}: no XMP schema for prefix '{}'",
                            field.name,
                            prefix
                        ),
                    },
                    None => info::accumulate(&mut info_map, field),
                },
            }
        }

        info::store_info(&mut doc, &info_map);
        if builder.is_empty() && read_xmp(&doc).is_none() {
            tracing::debug!("No XMP to write for {}", self.resource.name());
        } else {
            store_xmp(&mut doc, builder.to_packet()?.into_bytes())?;
        }
        self.save(&mut doc)
    }
}

fn catalog_id(doc: &Document) -> Result<ObjectId> {
    doc.trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|e| ParseError::InvalidPdf(format!("missing catalog: {}", e)).into())
}

/// The raw XMP packet referenced from the catalog
fn read_xmp(doc: &Document) -> Option<Vec<u8>> {
    let id = catalog_id(doc).ok()?;
    let catalog = doc.get_object(id).ok()?.as_dict().ok()?;
    let metadata = catalog.get(b"Metadata").ok()?.as_reference().ok()?;
    match doc.get_object(metadata).ok()? {
        Object::Stream(stream) => Some(
            stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone()),
        ),
        _ => None,
    }
}

/// Replace (or create) the catalog's Metadata stream
fn store_xmp(doc: &mut Document, packet: Vec<u8>) -> Result<()> {
    let stream = Stream::new(
        dictionary! {
            "Type" => "Metadata",
            "Subtype" => "XML",
        },
        packet,
    );

    let catalog = catalog_id(doc)?;
    let existing = doc
        .get_object(catalog)
        .ok()
        .and_then(|o| o.as_dict().ok())
        .and_then(|d| d.get(b"Metadata").ok())
        .and_then(|o| o.as_reference().ok());

    let metadata_id = match existing {
        Some(id) => {
            doc.objects.insert(id, Object::Stream(stream));
            id
        }
        None => doc.add_object(Object::Stream(stream)),
    };

    match doc.objects.get_mut(&catalog) {
        Some(Object::Dictionary(dict)) => {
            dict.set("Metadata", Object::Reference(metadata_id));
            Ok(())
        }
        _ => Err(ParseError::InvalidPdf("catalog is not a dictionary".to_string()).into()),
    }
}

impl MetadataReader for PdfCodec {
    fn resource_name(&self) -> String {
        self.resource.name().to_string()
    }

    fn read_metadata(&mut self) -> FieldSet {
        self.read_fields()
            .unwrap_or_else(|e| degrade(self.resource.as_ref(), e))
    }

    fn category_names(&self, category: FieldCategory) -> &'static [&'static str] {
        match category {
            FieldCategory::Title => &["dc:title", "Title"],
            FieldCategory::Author => &["dc:creator", "Author"],
            FieldCategory::Keywords => &["pdf:Keywords", "Keywords"],
            FieldCategory::Description => &["dc:description", "Subject"],
            FieldCategory::CreationDate => &["xmp:CreateDate", "xap:CreateDate", "CreationDate"],
            FieldCategory::Genre => &["dc:subject"],
            FieldCategory::Rating => &["xmp:Rating", "xap:Rating"],
            FieldCategory::Language => &["dc:language"],
            FieldCategory::Cover => &["cover"],
            FieldCategory::AgeSuggestion
            | FieldCategory::SeriesIndex
            | FieldCategory::SeriesName
            | FieldCategory::Isbn => &[],
        }
    }

    fn plain_metadata(&mut self) -> Option<Vec<u8>> {
        match self.load() {
            Ok(doc) => read_xmp(&doc),
            Err(e) => {
                tracing::warn!("Could not read XMP from {}: {}", self.resource.name(), e);
                None
            }
        }
    }

    fn plain_metadata_mime(&self) -> Option<&'static str> {
        Some("application/rdf+xml")
    }
}

impl MetadataWriter for PdfCodec {
    fn write_metadata(&mut self, fields: &FieldSet) -> Result<()> {
        self.write_fields(fields)
    }

    /// Replace the XMP packet verbatim after a well-formedness check
    fn store_plain_metadata(&mut self, data: &[u8]) -> Result<()> {
        check_well_formed(data)?;
        let mut doc = self.load()?;
        store_xmp(&mut doc, data.to_vec())?;
        self.save(&mut doc)
    }
}
