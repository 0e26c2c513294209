//! EPUB zip access with a size-gated lazy entry policy

use crate::cover::is_cover_candidate;
use crate::error::{ParseError, Result};
use crate::resource::Resource;
use crate::xml::XmlElement;
use std::io::Read;
use zip::ZipArchive;

pub(crate) const CONTAINER_XML: &str = "META-INF/container.xml";

/// Bytes of one archive entry, either extracted or left in the archive
#[derive(Debug, Clone)]
enum EntryData {
    Loaded(Vec<u8>),
    Deferred,
}

#[derive(Debug, Clone)]
struct ArchiveEntry {
    name: String,
    data: EntryData,
}

/// The entries of an EPUB archive in archive order
///
/// Archives above the configured threshold only extract what the metadata
/// model needs (container.xml, OPF, NCX and cover candidates); every other
/// entry is read from the resource if and when it is asked for.
#[derive(Debug, Clone)]
pub(crate) struct EpubContainer {
    entries: Vec<ArchiveEntry>,
}

impl EpubContainer {
    pub(crate) fn open(resource: &dyn Resource, lazy_threshold: u64) -> Result<Self> {
        let lazy = resource.size()? > lazy_threshold;
        let mut archive = ZipArchive::new(resource.open_read()?)
            .map_err(|e| ParseError::InvalidEpub(e.to_string()))?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let data = if !lazy || Self::is_eager(&name) {
                let mut buf = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut buf)?;
                EntryData::Loaded(buf)
            } else {
                EntryData::Deferred
            };
            entries.push(ArchiveEntry { name, data });
        }

        tracing::debug!(
            "Opened {} with {} entries (lazy: {})",
            resource.name(),
            entries.len(),
            lazy
        );
        Ok(Self { entries })
    }

    fn is_eager(name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        name == CONTAINER_XML
            || lower.ends_with(".opf")
            || lower.ends_with(".ncx")
            || is_cover_candidate(name)
    }

    /// Entry names in archive order
    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Bytes of an entry, reading deferred entries from the resource
    pub(crate) fn entry_bytes(&self, resource: &dyn Resource, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(entry) = self.entries.iter().find(|e| e.name == name) else {
            return Ok(None);
        };
        match &entry.data {
            EntryData::Loaded(data) => Ok(Some(data.clone())),
            EntryData::Deferred => {
                let mut archive = ZipArchive::new(resource.open_read()?)
                    .map_err(|e| ParseError::InvalidEpub(e.to_string()))?;
                let mut file = archive.by_name(name)?;
                let mut buf = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut buf)?;
                Ok(Some(buf))
            }
        }
    }

    /// Location of the package document, from `META-INF/container.xml`
    pub(crate) fn package_path(&self, resource: &dyn Resource) -> Result<String> {
        let data = self
            .entry_bytes(resource, CONTAINER_XML)?
            .ok_or_else(|| ParseError::MissingField(CONTAINER_XML.to_string()))?;
        let text = String::from_utf8_lossy(&data);
        let root = XmlElement::parse(&text)?;

        let mut rootfiles = Vec::new();
        root.descendants("rootfile", &mut rootfiles);
        let rootfile = rootfiles
            .iter()
            .find(|r| r.attribute("media-type") == Some("application/oebps-package+xml"))
            .or_else(|| rootfiles.first())
            .ok_or_else(|| ParseError::MissingField("rootfile".to_string()))?;

        rootfile
            .attribute("full-path")
            .map(str::to_string)
            .ok_or_else(|| ParseError::MissingField("full-path".to_string()).into())
    }
}
