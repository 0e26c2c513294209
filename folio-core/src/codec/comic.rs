//! Comic book archives (CBZ, CBR) and their `ComicInfo.xml`

use crate::codec::{degrade, stage_write, MetadataReader, MetadataWriter};
use crate::config::CodecContext;
use crate::cover::{cover_field, is_image_name};
use crate::error::{MetadataError, ParseError, Result};
use crate::resource::{Resource, ResourceRef};
use crate::types::{hint, Field, FieldCategory, FieldOrigin, FieldSet, FieldValue, ValueType};
use crate::xml::{check_well_formed, XmlElement, XmlNode};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const COMIC_INFO: &str = "ComicInfo.xml";

const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

const YES_NO: &[&str] = &["Unknown", "No", "Yes"];

/// One element of the `ComicInfo.xml` schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComicField {
    pub name: &'static str,
    pub kind: ValueType,
}

const fn text(name: &'static str) -> ComicField {
    ComicField {
        name,
        kind: ValueType::Text,
    }
}

const fn typed(name: &'static str, kind: ValueType) -> ComicField {
    ComicField { name, kind }
}

pub const SCHEMA: &[ComicField] = &[
    text("Title"),
    text("Series"),
    text("Number"),
    typed("Count", ValueType::Integer),
    typed("Volume", ValueType::Integer),
    text("AlternateSeries"),
    text("AlternateNumber"),
    typed("AlternateCount", ValueType::Integer),
    typed("Summary", ValueType::MultilineText),
    typed("Notes", ValueType::MultilineText),
    typed("Year", ValueType::Integer),
    typed("Month", ValueType::Integer),
    typed("Day", ValueType::Integer),
    text("Writer"),
    text("Penciller"),
    text("Inker"),
    text("Colorist"),
    text("Letterer"),
    text("CoverArtist"),
    text("Editor"),
    text("Publisher"),
    text("Imprint"),
    text("Genre"),
    text("Tags"),
    text("Web"),
    typed("PageCount", ValueType::Integer),
    text("LanguageISO"),
    text("Format"),
    typed("BlackAndWhite", ValueType::TriState),
    typed("Manga", ValueType::TriState),
    text("Characters"),
    text("Teams"),
    text("Locations"),
    text("StoryArc"),
    text("SeriesGroup"),
    text("AgeRating"),
    typed("CommunityRating", ValueType::Rating),
    typed("Rating", ValueType::Rating),
    text("AgeSuggestion"),
    text("ISBN"),
    typed("ScanInformation", ValueType::MultilineText),
];

/// Schema entry for an element name (case-insensitive)
pub fn schema_field(name: &str) -> Option<ComicField> {
    SCHEMA
        .iter()
        .find(|f| f.name.eq_ignore_ascii_case(name))
        .copied()
}

/// Entry-level access to a comic archive
///
/// Zip archives are handled by [`ZipComicArchive`]; other containers (rar)
/// need a backend supplied by the caller.
pub trait ComicArchive {
    /// Entry names in archive order
    fn entry_names(&mut self) -> Result<Vec<String>>;

    fn read_entry(&mut self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Serialize the archive with `name` set to `data`, adding it when missing
    fn rewrite(&mut self, name: &str, data: &[u8]) -> Result<Vec<u8>>;
}

/// [`ComicArchive`] over a zip resource
#[derive(Debug)]
pub struct ZipComicArchive {
    resource: ResourceRef,
}

impl ZipComicArchive {
    pub fn new(resource: ResourceRef) -> Self {
        Self { resource }
    }

    fn open(&self) -> Result<ZipArchive<Box<dyn crate::resource::ReadSeek>>> {
        ZipArchive::new(self.resource.open_read()?)
            .map_err(|e| ParseError::InvalidComicBook(e.to_string()).into())
    }
}

impl ComicArchive for ZipComicArchive {
    fn entry_names(&mut self) -> Result<Vec<String>> {
        let mut archive = self.open()?;
        let mut names = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let file = archive.by_index_raw(i)?;
            if !file.is_dir() {
                names.push(file.name().to_string());
            }
        }
        Ok(names)
    }

    fn read_entry(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut archive = self.open()?;
        let mut file = match archive.by_name(name) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        Ok(Some(data))
    }

    fn rewrite(&mut self, name: &str, data: &[u8]) -> Result<Vec<u8>> {
        let mut archive = self.open()?;
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut replaced = false;
        for i in 0..archive.len() {
            let file = archive.by_index_raw(i)?;
            if file.name() == name {
                writer.start_file(name, deflated)?;
                writer.write_all(data)?;
                replaced = true;
            } else {
                writer.raw_copy_file(file)?;
            }
        }
        if !replaced {
            writer.start_file(name, deflated)?;
            writer.write_all(data)?;
        }

        Ok(writer.finish()?.into_inner())
    }
}

pub struct ComicBookCodec {
    resource: ResourceRef,
    ctx: CodecContext,
    archive: Option<Box<dyn ComicArchive>>,
}

impl ComicBookCodec {
    /// Codec with the built-in zip backend; rar archives get no backend
    pub fn new(resource: ResourceRef, ctx: CodecContext) -> Self {
        let archive: Option<Box<dyn ComicArchive>> = if is_rar(resource.as_ref()) {
            tracing::debug!("No rar backend for {}", resource.name());
            None
        } else {
            Some(Box::new(ZipComicArchive::new(resource.clone())))
        };
        Self {
            resource,
            ctx,
            archive,
        }
    }

    /// Codec with a caller-supplied archive backend
    pub fn with_archive(resource: ResourceRef, ctx: CodecContext, archive: Box<dyn ComicArchive>) -> Self {
        Self {
            resource,
            ctx,
            archive: Some(archive),
        }
    }

    fn archive(&mut self) -> Result<&mut Box<dyn ComicArchive>> {
        let name = self.resource.name().to_string();
        self.archive.as_mut().ok_or_else(|| {
            MetadataError::Unsupported(format!("no archive backend for {}", name))
        })
    }

    /// Name of the `ComicInfo.xml` entry, wherever it sits
    fn info_entry(names: &[String]) -> Option<&String> {
        names.iter().find(|n| {
            n.rsplit('/')
                .next()
                .map(|f| f.eq_ignore_ascii_case(COMIC_INFO))
                .unwrap_or(false)
        })
    }

    fn read_info(&mut self) -> Result<Option<(String, Vec<u8>)>> {
        let archive = self.archive()?;
        let names = archive.entry_names()?;
        let Some(name) = Self::info_entry(&names).cloned() else {
            return Ok(None);
        };
        Ok(archive.read_entry(&name)?.map(|data| (name, data)))
    }

    fn read_fields(&mut self) -> Result<FieldSet> {
        let archive = self.archive()?;
        let names = archive.entry_names()?;
        let mut fields = FieldSet::new();

        if let Some(info_name) = Self::info_entry(&names) {
            if let Some(data) = archive.read_entry(info_name)? {
                let root = XmlElement::parse(&String::from_utf8_lossy(&data))?;
                for element in root.elements() {
                    if let Some(field) = element_to_field(element) {
                        fields.push_non_empty(field);
                    }
                }
            }
        }

        if let Some(first_image) = names.iter().find(|n| is_image_name(n)) {
            if let Some(data) = archive.read_entry(first_image)?.filter(|d| !d.is_empty()) {
                fields.push(
                    cover_field("cover", data, FieldOrigin::None)
                        .with_hint(hint::FROM_EBOOK_RESOURCE, first_image.as_str())
                        .read_only(),
                );
            }
        }

        tracing::debug!("Read {} fields from {}", fields.len(), self.resource.name());
        Ok(fields)
    }

    fn write_fields(&mut self, fields: &FieldSet) -> Result<()> {
        let (name, existing) = match self.read_info()? {
            Some((name, data)) => (name, XmlElement::parse(&String::from_utf8_lossy(&data)).ok()),
            None => (COMIC_INFO.to_string(), None),
        };

        let mut root = XmlElement::new("ComicInfo");
        match existing {
            Some(old) => root.attributes = old.attributes,
            None => {
                root.set_attribute("xmlns:xsi", XSI_NS);
                root.set_attribute("xmlns:xsd", XSD_NS);
            }
        }

        for field in fields {
            if field.is_named("cover") || field.is_empty() {
                continue;
            }
            if let Err(reason) = field.validate() {
                tracing::warn!("Skipping field: {}", reason);
                continue;
            }
            if !is_element_name(&field.name) {
                tracing::warn!("Rejecting {}: not a ComicInfo element name", field.name);
                continue;
            }
            root.push_child(field_to_element(field));
        }

        let xml = root.to_xml(true, true)?.into_bytes();
        let data = self.archive()?.rewrite(&name, &xml)?;
        stage_write(&self.resource, &self.ctx, &data)
    }
}

fn is_rar(resource: &dyn Resource) -> bool {
    if resource.extension().as_deref() == Some("cbr") {
        return true;
    }
    resource
        .read_prefix(4)
        .map(|head| head == b"Rar!")
        .unwrap_or(false)
}

fn is_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

fn tri_state(text: &str) -> Option<FieldValue> {
    YES_NO
        .iter()
        .position(|v| v.eq_ignore_ascii_case(text))
        .map(|idx| FieldValue::Flag([None, Some(false), Some(true)][idx]))
}

fn element_to_field(element: &XmlElement) -> Option<Field> {
    let name = element.name.clone();

    // Structured elements such as <Pages> are carried verbatim
    if element.elements().next().is_some() {
        let raw = element.inner_xml().ok()?;
        return Some(
            Field::new(name, FieldValue::Text(raw))
                .with_origin(FieldOrigin::ComicInfo { raw_xml: true })
                .read_only(),
        );
    }

    let value = element.text();
    let origin = FieldOrigin::ComicInfo { raw_xml: false };
    let Some(schema) = schema_field(&name) else {
        return Some(Field::new(name, value).with_origin(origin));
    };

    let field = match schema.kind {
        ValueType::Integer => match value.parse::<i64>() {
            Ok(n) => Field::new(name, FieldValue::Integer(n)),
            Err(_) => Field::new(name, value),
        },
        ValueType::TriState => {
            let parsed = tri_state(&value).unwrap_or(FieldValue::Text(value));
            Field::new(name, parsed)
                .with_valid_values(YES_NO)
                .with_hint(hint::EDITOR, "tristate")
        }
        ValueType::MultilineText => Field::new(name, value).with_hint(hint::EDITOR, "multiline"),
        ValueType::Rating => Field::new(name, value).with_hint(hint::EDITOR, "rating"),
        _ => Field::new(name, value),
    };
    Some(field.with_type(schema.kind).with_origin(origin))
}

fn field_to_element(field: &Field) -> XmlElement {
    let mut element = XmlElement::new(field.name.as_str());
    let value = field.value();
    match field.origin {
        FieldOrigin::ComicInfo { raw_xml: true } => element.children.push(XmlNode::Raw(value)),
        _ => element.children.push(XmlNode::Text(value)),
    }
    element
}

impl MetadataReader for ComicBookCodec {
    fn resource_name(&self) -> String {
        self.resource.name().to_string()
    }

    fn read_metadata(&mut self) -> FieldSet {
        self.read_fields()
            .unwrap_or_else(|e| degrade(self.resource.as_ref(), e))
    }

    fn category_names(&self, category: FieldCategory) -> &'static [&'static str] {
        match category {
            FieldCategory::Title => &["Title"],
            FieldCategory::Author => &["Writer"],
            FieldCategory::Keywords => &["Tags"],
            FieldCategory::Description => &["Summary"],
            FieldCategory::CreationDate => &["Year"],
            FieldCategory::Genre => &["Genre"],
            FieldCategory::AgeSuggestion => &["AgeSuggestion", "AgeRating"],
            FieldCategory::Rating => &["CommunityRating", "Rating"],
            FieldCategory::SeriesIndex => &["Number"],
            FieldCategory::SeriesName => &["Series"],
            FieldCategory::Isbn => &["ISBN"],
            FieldCategory::Language => &["LanguageISO"],
            FieldCategory::Cover => &["cover"],
        }
    }

    fn synthesize(&self, category: FieldCategory) -> Field {
        let name = self.category_names(category).first().copied().unwrap_or("");
        let kind = schema_field(name).map(|f| f.kind).unwrap_or(ValueType::Text);
        let field = Field::empty(name)
            .with_type(kind)
            .with_origin(FieldOrigin::ComicInfo { raw_xml: false });
        if category == FieldCategory::Cover {
            field.read_only()
        } else {
            field
        }
    }

    fn plain_metadata(&mut self) -> Option<Vec<u8>> {
        match self.read_info() {
            Ok(info) => info.map(|(_, data)| data),
            Err(e) => {
                tracing::warn!("Could not read {} from {}: {}", COMIC_INFO, self.resource.name(), e);
                None
            }
        }
    }

    fn plain_metadata_mime(&self) -> Option<&'static str> {
        Some("application/xml")
    }
}

impl MetadataWriter for ComicBookCodec {
    fn write_metadata(&mut self, fields: &FieldSet) -> Result<()> {
        self.write_fields(fields)
    }

    /// Replace `ComicInfo.xml` verbatim after a well-formedness check
    fn store_plain_metadata(&mut self, data: &[u8]) -> Result<()> {
        check_well_formed(data)?;
        let name = self
            .read_info()?
            .map(|(name, _)| name)
            .unwrap_or_else(|| COMIC_INFO.to_string());
        let rewritten = self.archive()?.rewrite(&name, data)?;
        stage_write(&self.resource, &self.ctx, &rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::FileResource;
    use std::collections::BTreeMap;

    const INFO: &str = r#"<?xml version="1.0"?>
<ComicInfo xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <Title>The Long Night</Title>
  <Series>Nightwatch</Series>
  <Number>3</Number>
  <Year>1999</Year>
  <Manga>No</Manga>
  <Summary>Things happen.</Summary>
  <Pages><Page Image="0" Type="FrontCover"/><Page Image="1"/></Pages>
</ComicInfo>"#;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn build_cbz(path: &std::path::Path, info: Option<&str>) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        zip.start_file("notes.txt", options).unwrap();
        zip.write_all(b"scan notes").unwrap();
        zip.start_file("page01.png", options).unwrap();
        zip.write_all(PNG).unwrap();
        zip.start_file("page02.jpg", options).unwrap();
        zip.write_all(&[0xFF, 0xD8, 0xFF]).unwrap();
        if let Some(info) = info {
            zip.start_file(COMIC_INFO, options).unwrap();
            zip.write_all(info.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn codec(dir: &tempfile::TempDir, info: Option<&str>) -> ComicBookCodec {
        let path = dir.path().join("issue.cbz");
        build_cbz(&path, info);
        ComicBookCodec::new(FileResource::shared(&path), CodecContext::default())
    }

    #[test]
    fn test_read_schema_fields_and_cover() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = codec(&dir, Some(INFO));
        let fields = codec.read_metadata();

        assert_eq!(fields.values_of("Title"), vec!["The Long Night"]);
        assert_eq!(fields.find("Year").unwrap().first(), Some(&FieldValue::Integer(1999)));
        let manga = fields.find("Manga").unwrap();
        assert_eq!(manga.first(), Some(&FieldValue::Flag(Some(false))));
        assert_eq!(manga.value_type, ValueType::TriState);
        assert!(!fields.find("Pages").unwrap().flags.editable);

        let cover = fields.find("cover").unwrap();
        assert_eq!(cover.hint(hint::FROM_EBOOK_RESOURCE), Some("page01.png"));
        assert_eq!(codec.read_cover(), Some(PNG.to_vec()));
    }

    #[test]
    fn test_write_replaces_info_and_keeps_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = codec(&dir, Some(INFO));
        let mut fields = codec.read_metadata();
        fields.find_mut("Title").unwrap().set_value("The Longer Night", 0);
        fields.remove("Summary");
        fields.push(Field::new("Manga", "Maybe").with_valid_values(YES_NO));
        codec.write_metadata(&fields).unwrap();

        let fields = codec.read_metadata();
        assert_eq!(fields.values_of("Title"), vec!["The Longer Night"]);
        assert!(fields.find("Summary").is_none());
        assert_eq!(fields.values_of("Manga"), vec!["No"]);
        assert_eq!(
            fields.values_of("Pages"),
            vec![r#"<Page Image="0" Type="FrontCover"/><Page Image="1"/>"#]
        );

        // Images are raw-copied
        let mut archive = ZipComicArchive::new(codec.resource.clone());
        assert_eq!(archive.read_entry("page01.png").unwrap(), Some(PNG.to_vec()));
        let xml = codec.plain_metadata().unwrap();
        assert!(String::from_utf8(xml).unwrap().contains("xmlns:xsi"));
    }

    #[test]
    fn test_write_adds_missing_comic_info() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = codec(&dir, None);
        assert_eq!(codec.plain_metadata(), None);

        let mut fields = codec.read_metadata();
        codec
            .category_field(true, &mut fields, FieldCategory::SeriesName)
            .unwrap()
            .set_value("Fresh Series", 0);
        codec.write_metadata(&fields).unwrap();

        let names = ZipComicArchive::new(codec.resource.clone()).entry_names().unwrap();
        assert_eq!(names.last().map(String::as_str), Some(COMIC_INFO));
        assert_eq!(codec.read_metadata().values_of("Series"), vec!["Fresh Series"]);
    }

    /// In-memory backend standing in for an external rar implementation
    #[derive(Default)]
    struct MemoryArchive(BTreeMap<String, Vec<u8>>);

    impl ComicArchive for MemoryArchive {
        fn entry_names(&mut self) -> Result<Vec<String>> {
            Ok(self.0.keys().cloned().collect())
        }
        fn read_entry(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.0.get(name).cloned())
        }
        fn rewrite(&mut self, name: &str, data: &[u8]) -> Result<Vec<u8>> {
            self.0.insert(name.to_string(), data.to_vec());
            Ok(data.to_vec())
        }
    }

    #[test]
    fn test_rar_without_backend_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issue.cbr");
        std::fs::write(&path, b"Rar!\x1a\x07\x00").unwrap();
        let resource = FileResource::shared(&path);

        let mut codec = ComicBookCodec::new(resource.clone(), CodecContext::default());
        assert!(codec.read_metadata().is_empty());
        assert!(matches!(
            codec.write_metadata(&FieldSet::new()),
            Err(MetadataError::Unsupported(_))
        ));

        let mut backend = MemoryArchive::default();
        backend.0.insert(COMIC_INFO.to_string(), INFO.as_bytes().to_vec());
        let mut codec = ComicBookCodec::with_archive(resource, CodecContext::default(), Box::new(backend));
        assert_eq!(codec.read_metadata().values_of("Series"), vec!["Nightwatch"]);
    }

    #[test]
    fn test_store_plain_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = codec(&dir, Some(INFO));
        assert!(codec.store_plain_metadata(b"<ComicInfo>").is_err());

        let replacement = b"<ComicInfo><Title>Swapped</Title></ComicInfo>";
        codec.store_plain_metadata(replacement).unwrap();
        assert_eq!(codec.plain_metadata().unwrap(), replacement);
    }
}
