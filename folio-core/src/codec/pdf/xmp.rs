//! XMP packet: RDF properties to fields and back

use super::date::{format_w3c_date, parse_w3c_date};
use crate::cover::{cover_field, JpegThumbnail};
use crate::error::{ParseError, WriteError};
use crate::types::{hint, Field, FieldOrigin, FieldValue, ValueType, XmpContainer, XmpOrigin};
use crate::xml::XmlElement;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::{BTreeMap, HashMap};

pub(crate) const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub(crate) const XMP_NS: &str = "http://ns.adobe.com/xap/1.0/";
pub(crate) const GIMG_NS: &str = "http://ns.adobe.com/xap/1.0/g/img/";

const PACKET_ID: &str = "W5M0MpCehiHzreSzNTczkc9d";

/// Schemas a field without origin can be routed into by its prefix
const NAMESPACES: &[(&str, &str)] = &[
    ("dc", "http://purl.org/dc/elements/1.1/"),
    ("xmp", XMP_NS),
    ("xap", XMP_NS),
    ("pdf", "http://ns.adobe.com/pdf/1.3/"),
    ("pdfx", "http://ns.adobe.com/pdfx/1.3/"),
    ("xmpMM", "http://ns.adobe.com/xap/1.0/mm/"),
    ("xapMM", "http://ns.adobe.com/xap/1.0/mm/"),
    ("photoshop", "http://ns.adobe.com/photoshop/1.0/"),
    ("xmpGImg", GIMG_NS),
    ("xapGImg", GIMG_NS),
];

pub(crate) fn namespace_uri(prefix: &str) -> Option<&'static str> {
    NAMESPACES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, uri)| *uri)
}

/// List container used by the Dublin Core properties that are lists
pub(crate) fn default_container(name: &str) -> Option<XmpContainer> {
    match name {
        "dc:creator" | "dc:date" => Some(XmpContainer::Seq),
        "dc:title" | "dc:description" | "dc:rights" => Some(XmpContainer::Alt),
        "dc:subject" | "dc:publisher" | "dc:contributor" | "dc:language" | "dc:type"
        | "dc:relation" => Some(XmpContainer::Bag),
        _ => None,
    }
}

fn is_date_property(name: &str) -> bool {
    matches!(
        name.rsplit(':').next(),
        Some("CreateDate" | "ModifyDate" | "MetadataDate")
    ) || name == "dc:date"
}

fn scalar(name: &str, text: String) -> Field {
    if is_date_property(name) {
        if let Some(date) = parse_w3c_date(&text) {
            return Field::new(name, FieldValue::Date(date)).with_type(ValueType::Date);
        }
    }
    Field::new(name, text)
}

fn declare_namespaces(element: &XmlElement, namespaces: &mut HashMap<String, String>) {
    for (key, value) in &element.attributes {
        if let Some(prefix) = key.strip_prefix("xmlns:") {
            namespaces.insert(prefix.to_string(), value.clone());
        }
    }
}

/// Origin of a property, `None` when its prefix resolves to no namespace
fn origin_for(prefix: &str, namespaces: &HashMap<String, String>) -> Option<XmpOrigin> {
    let uri = namespaces
        .get(prefix)
        .filter(|uri| !uri.is_empty())
        .cloned()
        .or_else(|| namespace_uri(prefix).map(str::to_string))?;
    Some(XmpOrigin::new(prefix, uri))
}

/// Fields and the thumbnail cover parsed from a packet
#[derive(Debug, Default)]
pub(crate) struct ParsedPacket {
    pub fields: Vec<Field>,
    pub cover: Option<Field>,
}

pub(crate) fn parse_packet(packet: &str) -> Result<ParsedPacket, ParseError> {
    let root = XmlElement::parse(packet.trim_start_matches('\u{feff}'))?;
    let rdf = if root.local_name() == "RDF" {
        &root
    } else {
        root.find_descendant("RDF")
            .ok_or_else(|| ParseError::MissingField("rdf:RDF".to_string()))?
    };

    let mut namespaces = HashMap::new();
    declare_namespaces(&root, &mut namespaces);
    declare_namespaces(rdf, &mut namespaces);

    let mut parsed = ParsedPacket::default();
    for description in rdf.elements().filter(|e| e.local_name() == "Description") {
        let mut scope = namespaces.clone();
        declare_namespaces(description, &mut scope);

        // Attribute-form properties
        for (key, value) in &description.attributes {
            let Some((prefix, _)) = key.split_once(':') else {
                continue;
            };
            if prefix == "xmlns" || prefix == "rdf" || value.trim().is_empty() {
                continue;
            }
            let Some(origin) = origin_for(prefix, &scope) else {
                tracing::warn!("Skipping XMP attribute {}: undeclared prefix", key);
                continue;
            };
            parsed
                .fields
                .push(scalar(key, value.clone()).with_origin(FieldOrigin::Xmp(origin)));
        }

        for property in description.elements() {
            let prefix = property.prefix().unwrap_or_default();
            let Some(origin) = origin_for(prefix, &scope) else {
                tracing::warn!("Skipping XMP property {}: undeclared prefix", property.name);
                continue;
            };

            if property.local_name() == "Thumbnails" {
                if let Some(cover) = parse_thumbnail(property, origin) {
                    parsed.cover.get_or_insert(cover);
                }
                continue;
            }

            let list = property
                .elements()
                .find_map(|e| XmpContainer::from_element(&e.name).map(|c| (c, e)));
            if let Some((container, list)) = list {
                let member_origin = origin.clone().in_container(container);
                let members: Vec<Field> = list
                    .elements()
                    .filter(|li| li.local_name() == "li" && li.elements().next().is_none())
                    .filter_map(|li| {
                        let text = li.text();
                        if text.is_empty() {
                            return None;
                        }
                        let mut member = if property.name == "dc:date" {
                            scalar("dc:date", text)
                        } else {
                            Field::new("rdf:li", text)
                        };
                        member.name = "rdf:li".to_string();
                        if let Some(lang) = li.attribute("xml:lang") {
                            member = member.with_hint(hint::XML_LANG, lang);
                        }
                        Some(member.with_origin(FieldOrigin::Xmp(member_origin.clone())))
                    })
                    .collect();
                if !members.is_empty() {
                    parsed.fields.push(
                        Field::new(property.name.clone(), FieldValue::Fields(members))
                            .with_origin(FieldOrigin::Xmp(member_origin)),
                    );
                }
                continue;
            }

            if property.elements().next().is_some() {
                tracing::debug!("Skipping structured XMP property {}", property.name);
                continue;
            }

            let text = match property.attribute("rdf:resource") {
                Some(resource) => resource.to_string(),
                None => property.text(),
            };
            if !text.is_empty() {
                parsed
                    .fields
                    .push(scalar(&property.name, text).with_origin(FieldOrigin::Xmp(origin)));
            }
        }
    }

    Ok(parsed)
}

fn parse_thumbnail(property: &XmlElement, origin: XmpOrigin) -> Option<Field> {
    let encoded: String = property
        .find_descendant("image")?
        .text()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let data = STANDARD.decode(encoded).ok().filter(|d| !d.is_empty())?;

    let mut field = cover_field("cover", data, FieldOrigin::Xmp(origin));
    for (key, local) in [(hint::IMAGE_WIDTH, "width"), (hint::IMAGE_HEIGHT, "height")] {
        if let Some(value) = property.find_descendant(local) {
            field = field.with_hint(key, value.text());
        }
    }
    Some(field)
}

#[derive(Debug, Default)]
struct Schema {
    uri: String,
    extra_namespaces: Vec<(String, String)>,
    properties: Vec<XmlElement>,
}

/// Builds a fresh packet with one `rdf:Description` per prefix
#[derive(Debug, Default)]
pub(crate) struct XmpBuilder {
    schemas: BTreeMap<String, Schema>,
}

fn value_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Date(date) => format_w3c_date(date),
        other => other.to_string(),
    }
}

impl XmpBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    fn schema(&mut self, prefix: &str, uri: &str) -> &mut Schema {
        let schema = self.schemas.entry(prefix.to_string()).or_default();
        if schema.uri.is_empty() {
            schema.uri = uri.to_string();
        }
        schema
    }

    /// Replay a field into the schema of its prefix
    pub(crate) fn add_field(&mut self, field: &Field, origin: &XmpOrigin) {
        if origin.prefix.is_empty() || origin.uri.is_empty() {
            tracing::warn!("Rejecting {}: no namespace for prefix '{}'", field.name, origin.prefix);
            return;
        }
        let container = origin.container.or_else(|| default_container(&field.name));

        let element = match container {
            Some(container) => {
                let mut items: Vec<(String, Option<String>)> = Vec::new();
                for value in field.values.iter().filter(|v| !v.is_empty()) {
                    match value {
                        FieldValue::Fields(members) => {
                            for member in members.iter().filter(|m| !m.is_empty()) {
                                let text = member.first().map(value_text).unwrap_or_default();
                                items.push((text, member.hint(hint::XML_LANG).map(str::to_string)));
                            }
                        }
                        other => items.push((value_text(other), None)),
                    }
                }
                if items.is_empty() {
                    return;
                }

                let mut list = XmlElement::new(container.element_name());
                for (text, lang) in items {
                    let mut li = XmlElement::new("rdf:li");
                    match lang {
                        Some(lang) => li.set_attribute("xml:lang", lang),
                        None if container == XmpContainer::Alt => {
                            li.set_attribute("xml:lang", "x-default")
                        }
                        None => {}
                    }
                    list.push_child(li.with_text(text));
                }
                XmlElement::new(field.name.clone()).with_child(list)
            }
            None => {
                let Some(value) = field.values.iter().find(|v| !v.is_empty()) else {
                    return;
                };
                XmlElement::new(field.name.clone()).with_text(value_text(value))
            }
        };

        self.schema(&origin.prefix, &origin.uri).properties.push(element);
    }

    /// Store a cover as the `Thumbnails` property of the basic schema
    pub(crate) fn add_thumbnail(&mut self, prefix: &str, thumbnail: &JpegThumbnail) {
        let image_prefix = if prefix == "xap" { "xapGImg" } else { "xmpGImg" };
        let item = XmlElement::new("rdf:li")
            .with_attribute("rdf:parseType", "Resource")
            .with_child(
                XmlElement::new(format!("{}:width", image_prefix))
                    .with_text(thumbnail.width.to_string()),
            )
            .with_child(
                XmlElement::new(format!("{}:height", image_prefix))
                    .with_text(thumbnail.height.to_string()),
            )
            .with_child(XmlElement::new(format!("{}:format", image_prefix)).with_text("JPEG"))
            .with_child(
                XmlElement::new(format!("{}:image", image_prefix))
                    .with_text(STANDARD.encode(&thumbnail.data)),
            );
        let element = XmlElement::new(format!("{}:Thumbnails", prefix))
            .with_child(XmlElement::new("rdf:Alt").with_child(item));

        let schema = self.schema(prefix, XMP_NS);
        schema
            .extra_namespaces
            .push((image_prefix.to_string(), GIMG_NS.to_string()));
        schema.properties.push(element);
    }

    pub(crate) fn to_packet(&self) -> Result<String, WriteError> {
        let mut rdf = XmlElement::new("rdf:RDF").with_attribute("xmlns:rdf", RDF_NS);
        for (prefix, schema) in &self.schemas {
            let mut description = XmlElement::new("rdf:Description")
                .with_attribute("rdf:about", "")
                .with_attribute(format!("xmlns:{}", prefix), schema.uri.clone());
            for (extra, uri) in &schema.extra_namespaces {
                let key = format!("xmlns:{}", extra);
                if description.attribute(&key).is_none() {
                    description.set_attribute(&key, uri.clone());
                }
            }
            for property in &schema.properties {
                description.push_child(property.clone());
            }
            rdf.push_child(description);
        }

        let meta = XmlElement::new("x:xmpmeta")
            .with_attribute("xmlns:x", "adobe:ns:meta/")
            .with_child(rdf);
        Ok(format!(
            "<?xpacket begin=\"\u{feff}\" id=\"{}\"?>\n{}\n<?xpacket end=\"w\"?>",
            PACKET_ID,
            meta.to_xml(false, true)?
        ))
    }
}
