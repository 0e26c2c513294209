//! The trailer Info dictionary

use super::date::{format_pdf_date, parse_pdf_date, w3c_to_pdf};
use crate::types::{Field, FieldOrigin, FieldValue, ValueType};
use encoding_rs::UTF_16BE;
use lopdf::{Dictionary, Document, Object, StringFormat};
use std::collections::BTreeMap;

const DATE_KEYS: &[&str] = &["CreationDate", "ModDate"];

/// PDFDocEncoding 0x18..=0x1F, spacing diacritics
const PDF_DOC_ACCENTS: [char; 8] = [
    '\u{02D8}', '\u{02C7}', '\u{02C6}', '\u{02D9}', '\u{02DD}', '\u{02DB}', '\u{02DA}', '\u{02DC}',
];

/// PDFDocEncoding 0x80..=0xA0; 0x9F is undefined
const PDF_DOC_HIGH: [char; 33] = [
    '\u{2022}', '\u{2020}', '\u{2021}', '\u{2026}', '\u{2014}', '\u{2013}', '\u{0192}', '\u{2044}',
    '\u{2039}', '\u{203A}', '\u{2212}', '\u{2030}', '\u{201E}', '\u{201C}', '\u{201D}', '\u{2018}',
    '\u{2019}', '\u{201A}', '\u{2122}', '\u{FB01}', '\u{FB02}', '\u{0141}', '\u{0152}', '\u{0160}',
    '\u{0178}', '\u{017D}', '\u{0131}', '\u{0142}', '\u{0153}', '\u{0161}', '\u{017E}', '\u{FFFD}',
    '\u{20AC}',
];

fn pdf_doc_char(byte: u8) -> char {
    match byte {
        0x18..=0x1F => PDF_DOC_ACCENTS[(byte - 0x18) as usize],
        0x7F | 0xAD => '\u{FFFD}',
        0x80..=0xA0 => PDF_DOC_HIGH[(byte - 0x80) as usize],
        // Everything else matches Latin-1
        _ => char::from(byte),
    }
}

/// Decode a PDF text string (UTF-16BE with BOM, UTF-8 with BOM, else PDFDocEncoding)
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        UTF_16BE.decode_without_bom_handling(rest).0.into_owned()
    } else if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(rest).into_owned()
    } else {
        bytes.iter().copied().map(pdf_doc_char).collect()
    }
}

/// Encode a text string, falling back to UTF-16BE for anything beyond ASCII
pub(crate) fn encode_text(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn object_text(doc: &Document, object: &Object, depth: u8) -> Option<String> {
    match object {
        Object::String(bytes, _) => Some(decode_text(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        Object::Integer(n) => Some(n.to_string()),
        Object::Real(r) => Some(r.to_string()),
        Object::Boolean(b) => Some(b.to_string()),
        Object::Reference(id) if depth < 4 => doc
            .get_object(*id)
            .ok()
            .and_then(|target| object_text(doc, target, depth + 1)),
        _ => None,
    }
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Every Info entry as a field; dates are parsed, empty values dropped
pub(crate) fn read_info(doc: &Document) -> Vec<Field> {
    let Some(dict) = info_dictionary(doc) else {
        return Vec::new();
    };

    dict.iter()
        .filter_map(|(key, object)| {
            let name = String::from_utf8_lossy(key).into_owned();
            let text = object_text(doc, object, 0)?;
            if text.trim().is_empty() {
                return None;
            }
            let field = match parse_pdf_date(&text).filter(|_| DATE_KEYS.contains(&name.as_str())) {
                Some(date) => Field::new(name, FieldValue::Date(date)).with_type(ValueType::Date),
                None => Field::new(name, text),
            };
            Some(field.with_origin(FieldOrigin::PdfInfo))
        })
        .collect()
}

/// Add a field to the flat Info map, joining repeated keys with ", "
pub(crate) fn accumulate(map: &mut BTreeMap<String, String>, field: &Field) {
    let parts: Vec<String> = field
        .values
        .iter()
        .filter(|v| !v.is_empty())
        .map(|v| match v {
            FieldValue::Date(date) => format_pdf_date(date),
            other => other.to_string(),
        })
        .collect();
    if parts.is_empty() {
        return;
    }
    let text = parts.join(", ");

    map.entry(field.name.clone())
        .and_modify(|existing| {
            existing.push_str(", ");
            existing.push_str(&text);
        })
        .or_insert(text);
}

/// Replace the trailer Info dictionary with the given map
pub(crate) fn store_info(doc: &mut Document, map: &BTreeMap<String, String>) {
    let mut dict = Dictionary::new();
    for (key, value) in map {
        let object = if DATE_KEYS.contains(&key.as_str()) {
            Object::string_literal(w3c_to_pdf(value))
        } else {
            encode_text(value)
        };
        dict.set(key.as_str(), object);
    }

    let existing = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|o| o.as_reference().ok());
    match existing {
        Some(id) => {
            doc.objects.insert(id, Object::Dictionary(dict));
        }
        None => {
            let id = doc.add_object(Object::Dictionary(dict));
            doc.trailer.set("Info", Object::Reference(id));
        }
    }
}
