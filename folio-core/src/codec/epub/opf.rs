//! OPF package document: parsing, element dispatch and splicing

use crate::error::{ParseError, Result, WriteError};
use crate::types::{EpubOrigin, Field, FieldOrigin, FieldValue, ValueType};
use crate::xml::{XmlElement, XmlNode};
use quick_xml::events::Event;
use quick_xml::Reader;

pub(crate) const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
pub(crate) const OPF_NS: &str = "http://www.idpf.org/2007/opf";

/// Custom `<meta name=...>` entries with a dedicated meaning
pub const SERIES: &str = "calibre:series";
pub const SERIES_INDEX: &str = "calibre:series_index";
pub const RATING: &str = "calibre:rating";
pub const AGE_SUGGESTION: &str = "jeboorker:age_suggestion";
pub const KEYWORDS: &str = "jeboorker:keywords";

/// Dublin Core elements mapped one-to-one onto fields of the same name
const PLAIN_DC: &[&str] = &[
    "title",
    "subject",
    "description",
    "publisher",
    "language",
    "rights",
    "type",
    "format",
    "source",
    "relation",
    "coverage",
    "date",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

/// The parsed package document
#[derive(Debug, Clone)]
pub(crate) struct Package {
    pub path: String,
    pub raw: String,
    pub unique_identifier: Option<String>,
    pub metadata: XmlElement,
    pub manifest: Vec<ManifestItem>,
    pub guide_cover: Option<String>,
}

impl Package {
    pub(crate) fn parse(path: &str, raw: String) -> Result<Self> {
        let root = XmlElement::parse(&raw)?;
        if root.local_name() != "package" {
            return Err(ParseError::InvalidEpub(format!(
                "{} has root <{}>, expected <package>",
                path, root.name
            ))
            .into());
        }

        let metadata = root
            .find("metadata")
            .cloned()
            .ok_or_else(|| ParseError::MissingField("metadata".to_string()))?;

        let manifest = root
            .find("manifest")
            .map(|m| {
                m.elements()
                    .filter(|e| e.local_name() == "item")
                    .filter_map(|e| {
                        Some(ManifestItem {
                            id: e.attribute("id")?.to_string(),
                            href: e.attribute("href")?.to_string(),
                            media_type: e.attribute("media-type").unwrap_or_default().to_string(),
                            properties: e.attribute("properties").map(str::to_string),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let guide_cover = root.find("guide").and_then(|g| {
            g.elements()
                .filter(|e| e.local_name() == "reference")
                .find(|e| {
                    e.attribute("type")
                        .map(|t| t.eq_ignore_ascii_case("cover"))
                        .unwrap_or(false)
                })
                .and_then(|e| e.attribute("href"))
                .map(str::to_string)
        });

        Ok(Self {
            path: path.to_string(),
            unique_identifier: root.attribute("unique-identifier").map(str::to_string),
            raw,
            metadata,
            manifest,
            guide_cover,
        })
    }

    /// Directory of the package document inside the archive, with trailing slash
    pub(crate) fn base_dir(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[..=idx],
            None => "",
        }
    }

    /// Archive path of a manifest href
    pub(crate) fn resolve(&self, href: &str) -> String {
        resolve_href(self.base_dir(), href)
    }

    /// Manifest href for an archive path under the package directory
    pub(crate) fn relative_href(&self, path: &str) -> String {
        path.strip_prefix(self.base_dir()).unwrap_or(path).to_string()
    }

    pub(crate) fn item_by_id(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|i| i.id == id)
    }

    pub(crate) fn item_by_path(&self, path: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|i| self.resolve(&i.href) == path)
    }

    /// Metadata elements, flattening the OPF 1.x `dc-metadata`/`x-metadata` wrappers
    pub(crate) fn metadata_elements(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        for element in self.metadata.elements() {
            match element.local_name() {
                "dc-metadata" | "x-metadata" => out.extend(element.elements()),
                _ => out.push(element),
            }
        }
        out
    }

    /// Archive path of the declared cover image, if any
    pub(crate) fn declared_cover(&self) -> Option<String> {
        let is_image = |item: &ManifestItem| {
            item.media_type.starts_with("image/") || crate::cover::is_image_name(&item.href)
        };

        let from_meta = self
            .metadata_elements()
            .into_iter()
            .find(|e| e.local_name() == "meta" && e.attribute("name") == Some("cover"))
            .and_then(|e| e.attribute("content"))
            .and_then(|content| {
                self.item_by_id(content)
                    .or_else(|| self.manifest.iter().find(|i| i.href == content))
            })
            .filter(|item| is_image(item));

        let from_properties = || {
            self.manifest.iter().find(|i| {
                i.properties
                    .as_deref()
                    .map(|p| p.split_whitespace().any(|p| p == "cover-image"))
                    .unwrap_or(false)
            })
        };

        let from_guide = || {
            self.guide_cover
                .as_deref()
                .filter(|href| crate::cover::is_image_name(href))
                .map(|href| self.resolve(href))
        };

        from_meta
            .or_else(from_properties)
            .map(|item| self.resolve(&item.href))
            .or_else(from_guide)
    }

    /// Fields of every metadata element, in document order
    pub(crate) fn fields(&self) -> Vec<Field> {
        self.metadata_elements()
            .into_iter()
            .filter_map(|e| self.element_to_field(e))
            .collect()
    }

    fn element_to_field(&self, element: &XmlElement) -> Option<Field> {
        let origin = FieldOrigin::Epub(EpubOrigin {
            element: element.name.clone(),
            attributes: element.attributes.clone(),
        });
        let local = element.local_name();
        let is_dc = element.prefix() == Some("dc") || element.name.starts_with("dc:");

        let field = match local {
            "meta" => {
                if let Some(name) = element.attribute("name") {
                    if name == "cover" {
                        return None;
                    }
                    let content = element.attribute("content").unwrap_or_default();
                    let field = Field::new(name, content);
                    match name {
                        RATING => field.with_type(ValueType::Rating),
                        SERIES_INDEX => field.with_type(ValueType::Text),
                        _ => field,
                    }
                } else if let Some(property) = element.attribute("property") {
                    Field::new(property, element.text())
                } else {
                    return None;
                }
            }
            "creator" if is_dc => {
                let role = element.attribute_local("role");
                let name = match role {
                    None | Some("aut") => "author",
                    Some(_) => "creator",
                };
                Field::new(name, element.text())
            }
            "contributor" if is_dc => Field::new("contributor", element.text()),
            "identifier" if is_dc => {
                let value = element.text();
                let name = identifier_kind(element.attribute_local("scheme"), &value);
                let mut field = Field::new(name, value);
                let is_unique = self.unique_identifier.is_some()
                    && element.attribute("id") == self.unique_identifier.as_deref();
                if name == "uuid" || is_unique {
                    field = field.undeletable();
                }
                field
            }
            "description" if is_dc => {
                Field::new("description", element.text()).with_type(ValueType::MultilineText)
            }
            "date" if is_dc => Field::new("date", element.text()).with_type(ValueType::Date),
            _ if is_dc && PLAIN_DC.contains(&local) => Field::new(local, element.text()),
            _ => Field::new(element.name.clone(), element.text()),
        };

        Some(field.with_origin(origin))
    }
}

/// `uuid`, `isbn` or the generic `identifier`
pub(crate) fn identifier_kind(scheme: Option<&str>, value: &str) -> &'static str {
    let scheme = scheme.map(str::to_ascii_lowercase);
    let lower = value.to_ascii_lowercase();
    if scheme.as_deref() == Some("uuid") || lower.starts_with("urn:uuid:") {
        "uuid"
    } else if scheme.as_deref() == Some("isbn") || lower.starts_with("urn:isbn:") {
        "isbn"
    } else {
        "identifier"
    }
}

/// Rebuild the OPF element for a field
///
/// Fields read from the document keep their original element and
/// attributes; new fields are dispatched by name.
pub(crate) fn field_to_elements(field: &Field) -> Vec<XmlElement> {
    let template = match &field.origin {
        FieldOrigin::Epub(origin) => XmlElement {
            name: origin.element.clone(),
            attributes: origin.attributes.clone(),
            children: Vec::new(),
        },
        _ => element_for_name(&field.name),
    };

    let content_attribute =
        template.local_name() == "meta" && template.attribute("name").is_some();

    field
        .values
        .iter()
        .filter(|v| !v.is_empty())
        .map(|value| {
            let text = value_text(value);
            let mut element = template.clone();
            if content_attribute {
                element.set_attribute("content", text);
            } else {
                element.children.push(XmlNode::Text(text));
            }
            element
        })
        .collect()
}

fn value_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Date(d) => d.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
        other => other.to_string(),
    }
}

fn element_for_name(name: &str) -> XmlElement {
    let bare = name.strip_prefix("dc:").unwrap_or(name);
    match bare {
        "author" => XmlElement::new("dc:creator").with_attribute("opf:role", "aut"),
        "creator" => XmlElement::new("dc:creator"),
        "contributor" => XmlElement::new("dc:contributor"),
        "uuid" => XmlElement::new("dc:identifier").with_attribute("opf:scheme", "uuid"),
        "isbn" => XmlElement::new("dc:identifier").with_attribute("opf:scheme", "ISBN"),
        "identifier" => XmlElement::new("dc:identifier"),
        _ if PLAIN_DC.contains(&bare) => XmlElement::new(format!("dc:{}", bare)),
        _ => XmlElement::new("meta").with_attribute("name", name),
    }
}

/// Join an href onto a base directory, resolving `.`/`..` and `%XX` escapes
pub(crate) fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let decoded = percent_decode(href);
    let joined = if decoded.starts_with('/') {
        decoded.trim_start_matches('/').to_string()
    } else {
        format!("{}{}", base_dir, decoded)
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = |b: u8| (b as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Byte offsets of the regions a rewrite replaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Sections {
    pub metadata_start: usize,
    pub metadata_end: usize,
    pub manifest_close: Option<usize>,
}

pub(crate) fn locate_sections(opf: &str) -> Result<Sections> {
    let mut reader = Reader::from_str(opf);
    let mut metadata_start = None;
    let mut metadata_end = None;
    let mut manifest_close = None;
    let mut depth_in_metadata = 0usize;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(ParseError::from)?;
        let after = reader.buffer_position() as usize;
        match event {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"metadata" && metadata_start.is_none() {
                    metadata_start = Some(before);
                    depth_in_metadata = 1;
                } else if depth_in_metadata > 0 {
                    depth_in_metadata += 1;
                }
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"metadata" && metadata_start.is_none() {
                    metadata_start = Some(before);
                    metadata_end = Some(after);
                }
            }
            Event::End(e) => {
                if depth_in_metadata > 0 {
                    depth_in_metadata -= 1;
                    if depth_in_metadata == 0 && e.local_name().as_ref() == b"metadata" {
                        metadata_end = Some(after);
                    }
                } else if e.local_name().as_ref() == b"manifest" {
                    manifest_close = Some(before);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match (metadata_start, metadata_end) {
        (Some(metadata_start), Some(metadata_end)) => Ok(Sections {
            metadata_start,
            metadata_end,
            manifest_close,
        }),
        _ => Err(ParseError::MissingField("metadata".to_string()).into()),
    }
}

/// Replace the metadata block and append manifest items
pub(crate) fn splice(
    opf: &str,
    sections: Sections,
    metadata_xml: &str,
    new_items: &[XmlElement],
) -> Result<String> {
    let mut out = String::with_capacity(opf.len() + metadata_xml.len());
    out.push_str(&opf[..sections.metadata_start]);
    out.push_str(metadata_xml);

    if new_items.is_empty() {
        out.push_str(&opf[sections.metadata_end..]);
        return Ok(out);
    }

    let close = sections
        .manifest_close
        .filter(|c| *c >= sections.metadata_end)
        .ok_or_else(|| WriteError::EncodingFailed("package has no manifest".to_string()))?;
    out.push_str(&opf[sections.metadata_end..close]);
    for item in new_items {
        out.push_str("  ");
        out.push_str(&item.to_xml(false, false)?);
        out.push_str("\n  ");
    }
    out.push_str(&opf[close..]);
    Ok(out)
}
