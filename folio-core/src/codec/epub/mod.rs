//! EPUB codec
//!
//! Fields come from the `<metadata>` block of the OPF package document. A
//! write regenerates that block from the field set, splices it into the
//! original OPF text (everything outside `<metadata>` stays byte-identical)
//! and rebuilds the archive, raw-copying every entry it did not touch.

mod container;
mod opf;

use crate::codec::{degrade, stage_write, MetadataReader, MetadataWriter};
use crate::config::{CodecContext, CoverDecision};
use crate::cover::{cover_bytes, cover_field, is_cover_candidate, same_image, unique_name, CoverFormat};
use crate::error::{ParseError, Result};
use crate::resource::{Resource, ResourceRef};
use crate::types::{hint, EpubOrigin, Field, FieldCategory, FieldOrigin, FieldSet};
use crate::xml::{check_well_formed, XmlElement, XmlNode};
use container::EpubContainer;
use opf::{field_to_elements, locate_sections, splice, Package, DC_NS, OPF_NS};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::time::SystemTime;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub use opf::{AGE_SUGGESTION, KEYWORDS, RATING, SERIES, SERIES_INDEX};

/// Parsed state of the archive, valid while the resource is unmodified
#[derive(Debug, Clone)]
struct Loaded {
    modified: Option<SystemTime>,
    container: EpubContainer,
    package: Package,
}

/// Cover changes gathered before the OPF is regenerated
#[derive(Debug, Default)]
struct CoverPlan {
    meta_id: Option<String>,
    new_items: Vec<XmlElement>,
    replace: HashMap<String, Vec<u8>>,
    add: Vec<(String, Vec<u8>)>,
}

pub struct EpubCodec {
    resource: ResourceRef,
    ctx: CodecContext,
    cache: Option<Loaded>,
}

impl EpubCodec {
    pub fn new(resource: ResourceRef, ctx: CodecContext) -> Self {
        Self {
            resource,
            ctx,
            cache: None,
        }
    }

    /// Parsed archive, reloaded when the resource changed on disk
    fn load(&mut self) -> Result<&Loaded> {
        let modified = self.resource.modified_at().ok();
        let fresh = self
            .cache
            .as_ref()
            .map(|c| c.modified.is_some() && c.modified == modified)
            .unwrap_or(false);

        if !fresh {
            self.cache = None;
            let resource = self.resource.as_ref();
            let container =
                EpubContainer::open(resource, self.ctx.options.lazy_entry_threshold)?;
            let path = container.package_path(resource)?;
            let raw = container
                .entry_bytes(resource, &path)?
                .ok_or_else(|| ParseError::MissingField(path.clone()))?;
            let raw = String::from_utf8_lossy(&raw)
                .trim_start_matches('\u{feff}')
                .to_string();
            let package = Package::parse(&path, raw)?;
            self.cache = Some(Loaded {
                modified,
                container,
                package,
            });
        }

        self.cache
            .as_ref()
            .ok_or_else(|| ParseError::InvalidEpub(self.resource.name().to_string()).into())
    }

    /// The cover entry: declared in the package first, the file name heuristic second
    fn find_cover(resource: &dyn Resource, loaded: &Loaded) -> Result<Option<(String, Vec<u8>)>> {
        let declared = loaded
            .package
            .declared_cover()
            .filter(|path| loaded.container.contains(path));
        let candidates = declared.into_iter().chain(
            loaded
                .container
                .names()
                .filter(|name| is_cover_candidate(name))
                .map(str::to_string)
                .collect::<Vec<_>>(),
        );

        for path in candidates {
            if let Some(data) = loaded.container.entry_bytes(resource, &path)? {
                if !data.is_empty() {
                    return Ok(Some((path, data)));
                }
            }
        }
        Ok(None)
    }

    fn read_fields(&mut self) -> Result<FieldSet> {
        let resource = self.resource.clone();
        let loaded = self.load()?;

        let mut fields = FieldSet::new();
        for field in loaded.package.fields() {
            fields.push_non_empty(field);
        }

        if let Some((path, data)) = Self::find_cover(resource.as_ref(), loaded)? {
            let origin = FieldOrigin::Epub(EpubOrigin::new("meta").with_attribute("name", "cover"));
            fields.push(cover_field("cover", data, origin).with_hint(hint::FROM_EBOOK_RESOURCE, path));
        }

        tracing::debug!("Read {} fields from {}", fields.len(), resource.name());
        Ok(fields)
    }

    fn plan_cover(&self, loaded: &Loaded, field: &Field, plan: &mut CoverPlan) -> Result<()> {
        let resource = self.resource.as_ref();
        let package = &loaded.package;

        // The reader's hint names the entry the value came from
        let hinted = match field.hint(hint::FROM_EBOOK_RESOURCE) {
            Some(path) if loaded.container.contains(path) => loaded
                .container
                .entry_bytes(resource, path)?
                .map(|data| (path.to_string(), data)),
            _ => None,
        };
        let existing = match hinted {
            Some(found) => Some(found),
            None => Self::find_cover(resource, loaded)?,
        };

        match (existing, cover_bytes(field)) {
            (None, None) => {}
            (Some((path, _)), None) => {
                plan.meta_id = Some(manifest_id_for(package, &path, plan));
            }
            (Some((path, old)), Some(new)) if same_image(&old, new) => {
                plan.meta_id = Some(manifest_id_for(package, &path, plan));
            }
            (Some((path, _)), Some(new)) => {
                match self.ctx.cover_conflicts.resolve(resource.name(), &path) {
                    CoverDecision::Overwrite => {
                        tracing::debug!("Overwriting cover {} in {}", path, resource.name());
                        plan.replace.insert(path.clone(), new.to_vec());
                        plan.meta_id = Some(manifest_id_for(package, &path, plan));
                    }
                    CoverDecision::AddNew => self.attach_cover(loaded, new, plan),
                    CoverDecision::Cancel => {
                        tracing::warn!("Cover change for {} cancelled", resource.name());
                        plan.meta_id = Some(manifest_id_for(package, &path, plan));
                    }
                }
            }
            (None, Some(new)) => self.attach_cover(loaded, new, plan),
        }
        Ok(())
    }

    fn attach_cover(&self, loaded: &Loaded, data: &[u8], plan: &mut CoverPlan) {
        let format = CoverFormat::sniff(data).unwrap_or(CoverFormat::Jpeg);
        let name = unique_name(
            loaded.package.base_dir(),
            &self.ctx.options.cover_file_stem,
            format.extension(),
            |candidate| {
                loaded.container.contains(candidate) || plan.add.iter().any(|(n, _)| n == candidate)
            },
        );
        tracing::debug!("Attaching new cover {} to {}", name, self.resource.name());
        plan.add.push((name.clone(), data.to_vec()));
        plan.meta_id = Some(manifest_id_for(&loaded.package, &name, plan));
    }

    fn write_fields(&mut self, fields: &FieldSet) -> Result<()> {
        let loaded = self.load()?.clone();
        let package = &loaded.package;

        let mut plan = CoverPlan::default();
        if let Some(cover) = fields.iter().find(|f| f.is_named("cover")) {
            self.plan_cover(&loaded, cover, &mut plan)?;
        }

        let metadata = build_metadata(package, fields, plan.meta_id.as_deref());
        let metadata_xml = metadata.to_xml(false, false)?;
        let sections = locate_sections(&package.raw)?;
        let opf = splice(&package.raw, sections, &metadata_xml, &plan.new_items)?;

        let mut replacements = plan.replace;
        replacements.insert(package.path.clone(), opf.into_bytes());
        let data = rebuild_archive(self.resource.as_ref(), &replacements, &plan.add)?;

        self.cache = None;
        stage_write(&self.resource, &self.ctx, &data)
    }
}

/// Manifest id of an archive entry, declaring a new item when it has none
fn manifest_id_for(package: &Package, path: &str, plan: &mut CoverPlan) -> String {
    if let Some(item) = package.item_by_path(path) {
        return item.id.clone();
    }
    let href = package.relative_href(path);
    if let Some(existing) = plan
        .new_items
        .iter()
        .find(|i| i.attribute("href") == Some(href.as_str()))
    {
        return existing.attribute("id").unwrap_or_default().to_string();
    }

    let taken = |id: &str| {
        package.item_by_id(id).is_some()
            || plan.new_items.iter().any(|i| i.attribute("id") == Some(id))
    };
    let mut id = "cover-image".to_string();
    let mut n = 1;
    while taken(&id) {
        id = format!("cover-image-{}", n);
        n += 1;
    }

    let media_type = CoverFormat::from_name(path)
        .map(CoverFormat::mime_type)
        .unwrap_or("image/jpeg");
    plan.new_items.push(
        XmlElement::new("item")
            .with_attribute("id", id.clone())
            .with_attribute("href", href)
            .with_attribute("media-type", media_type),
    );
    id
}

/// Regenerate the `<metadata>` element from a field set
fn build_metadata(package: &Package, fields: &FieldSet, cover_id: Option<&str>) -> XmlElement {
    let mut metadata = XmlElement {
        name: package.metadata.name.clone(),
        attributes: package.metadata.attributes.clone(),
        children: Vec::new(),
    };
    for (prefix, uri) in [("dc", DC_NS), ("opf", OPF_NS)] {
        let attr = format!("xmlns:{}", prefix);
        if metadata.attribute(&attr).is_none() && !package.raw.contains(&attr) {
            metadata.set_attribute(&attr, uri);
        }
    }

    let mut elements: Vec<XmlElement> = Vec::new();
    for field in fields {
        if field.is_named("cover") {
            continue;
        }
        if let Err(reason) = field.validate() {
            tracing::warn!("Skipping field: {}", reason);
            continue;
        }
        elements.extend(field_to_elements(field));
    }

    // Identifiers the package cannot lose survive even if the caller dropped them
    for original in package.metadata_elements() {
        if original.local_name() != "identifier" {
            continue;
        }
        let id = original.attribute("id");
        let is_unique = id.is_some() && id == package.unique_identifier.as_deref();
        let is_uuid = opf::identifier_kind(original.attribute_local("scheme"), &original.text()) == "uuid";
        let present = elements.iter().any(|e| {
            e.local_name() == "identifier"
                && match id {
                    Some(id) => e.attribute("id") == Some(id),
                    None => e.text() == original.text(),
                }
        });
        if (is_unique || is_uuid) && !present {
            tracing::debug!("Keeping identifier {}", original.text());
            elements.push(original.clone());
        }
    }

    if let Some(id) = cover_id {
        elements.push(
            XmlElement::new("meta")
                .with_attribute("name", "cover")
                .with_attribute("content", id),
        );
    }

    for element in elements {
        metadata.children.push(XmlNode::Text("\n    ".to_string()));
        metadata.children.push(XmlNode::Element(element));
    }
    metadata.children.push(XmlNode::Text("\n  ".to_string()));
    metadata
}

/// Copy the archive, replacing and appending entries
///
/// `mimetype` is written first and stored uncompressed; untouched entries
/// are raw-copied without recompression.
fn rebuild_archive(
    resource: &dyn Resource,
    replacements: &HashMap<String, Vec<u8>>,
    additions: &[(String, Vec<u8>)],
) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(resource.open_read()?)
        .map_err(|e| ParseError::InvalidEpub(e.to_string()))?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut order: Vec<usize> = (0..archive.len()).collect();
    let mut mimetype = None;
    for i in 0..archive.len() {
        if archive.by_index_raw(i)?.name() == "mimetype" {
            mimetype = Some(i);
            break;
        }
    }
    if let Some(idx) = mimetype {
        order.retain(|i| *i != idx);
        order.insert(0, idx);
    }

    for idx in order {
        let file = archive.by_index_raw(idx)?;
        let name = file.name().to_string();
        match replacements.get(&name) {
            Some(data) => {
                let options = if name == "mimetype" { stored } else { deflated };
                writer.start_file(name.as_str(), options)?;
                writer.write_all(data)?;
            }
            None => writer.raw_copy_file(file)?,
        }
    }

    for (name, data) in additions {
        writer.start_file(name.as_str(), stored)?;
        writer.write_all(data)?;
    }

    Ok(writer.finish()?.into_inner())
}

impl MetadataReader for EpubCodec {
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
            FieldCategory::Keywords => &[KEYWORDS],
            FieldCategory::Description => &["description"],
            FieldCategory::CreationDate => &["date"],
            FieldCategory::Genre => &["subject"],
            FieldCategory::AgeSuggestion => &[AGE_SUGGESTION],
            FieldCategory::Rating => &[RATING],
            FieldCategory::SeriesIndex => &[SERIES_INDEX],
            FieldCategory::SeriesName => &[SERIES],
            FieldCategory::Isbn => &["isbn"],
            FieldCategory::Language => &["language"],
            FieldCategory::Cover => &["cover"],
        }
    }

    fn read_cover(&mut self) -> Option<Vec<u8>> {
        let resource = self.resource.clone();
        let found = self
            .load()
            .and_then(|loaded| Self::find_cover(resource.as_ref(), loaded));
        match found {
            Ok(cover) => cover.map(|(_, data)| data),
            Err(e) => {
                tracing::warn!("Could not read cover from {}: {}", resource.name(), e);
                None
            }
        }
    }

    fn plain_metadata(&mut self) -> Option<Vec<u8>> {
        match self.load() {
            Ok(loaded) => Some(loaded.package.raw.clone().into_bytes()),
            Err(e) => {
                tracing::warn!("Could not read OPF from {}: {}", self.resource.name(), e);
                None
            }
        }
    }

    fn plain_metadata_mime(&self) -> Option<&'static str> {
        Some("application/oebps-package+xml")
    }
}

impl MetadataWriter for EpubCodec {
    fn write_metadata(&mut self, fields: &FieldSet) -> Result<()> {
        self.write_fields(fields)
    }

    /// Replace the OPF document verbatim after a well-formedness check
    fn store_plain_metadata(&mut self, data: &[u8]) -> Result<()> {
        check_well_formed(data)?;
        let path = self.load()?.package.path.clone();
        let mut replacements = HashMap::new();
        replacements.insert(path, data.to_vec());
        let archive = rebuild_archive(self.resource.as_ref(), &replacements, &[])?;
        self.cache = None;
        stage_write(&self.resource, &self.ctx, &archive)
    }
}
