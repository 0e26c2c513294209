//! EXTH records: the binary key/value block behind the MOBI header

use crate::error::{ParseError, WriteError};
use crate::types::{ExthRecord, Field, FieldOrigin, FieldValue, ValueType};
use encoding_rs::WINDOWS_1252;

/// How the payload of a record is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExthKind {
    Text,
    Date,
    Integer,
    Hash,
    Unknown,
}

/// Text encoding declared by the MOBI header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Cp1252,
}

impl TextEncoding {
    pub fn from_code(code: u32) -> Self {
        if code == 65001 {
            TextEncoding::Utf8
        } else {
            TextEncoding::Cp1252
        }
    }

    pub fn decode(self, data: &[u8]) -> String {
        let text = match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(data).into_owned(),
            TextEncoding::Cp1252 => WINDOWS_1252.decode_without_bom_handling(data).0.into_owned(),
        };
        text.trim_end_matches('\0').to_string()
    }

    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Cp1252 => WINDOWS_1252.encode(text).0.into_owned(),
        }
    }
}

const TABLE: &[(u32, &str, ExthKind)] = &[
    (100, "author", ExthKind::Text),
    (101, "publisher", ExthKind::Text),
    (102, "imprint", ExthKind::Text),
    (103, "description", ExthKind::Text),
    (104, "isbn", ExthKind::Text),
    (105, "subject", ExthKind::Text),
    (106, "publishing_date", ExthKind::Date),
    (107, "review", ExthKind::Text),
    (108, "contributor", ExthKind::Text),
    (109, "rights", ExthKind::Text),
    (110, "subject_code", ExthKind::Text),
    (111, "type", ExthKind::Text),
    (112, "source", ExthKind::Text),
    (113, "asin", ExthKind::Text),
    (115, "sample", ExthKind::Integer),
    (116, "start_reading", ExthKind::Integer),
    (118, "price", ExthKind::Text),
    (119, "currency", ExthKind::Text),
    (121, "kf8_boundary_offset", ExthKind::Integer),
    (125, "resource_count", ExthKind::Integer),
    (129, "kf8_cover_uri", ExthKind::Text),
    (200, "dictionary_short_name", ExthKind::Text),
    (201, "cover_offset", ExthKind::Integer),
    (202, "thumb_offset", ExthKind::Integer),
    (203, "has_fake_cover", ExthKind::Integer),
    (204, "creator_software", ExthKind::Integer),
    (205, "creator_major_version", ExthKind::Integer),
    (206, "creator_minor_version", ExthKind::Integer),
    (207, "creator_build_number", ExthKind::Integer),
    (300, "font_signature", ExthKind::Hash),
    (401, "clipping_limit", ExthKind::Integer),
    (404, "tts_flag", ExthKind::Integer),
    (501, "cde_type", ExthKind::Text),
    (502, "last_update_time", ExthKind::Date),
    (503, "updated_title", ExthKind::Text),
    (504, "cde_asin", ExthKind::Text),
    (524, "language", ExthKind::Text),
    (525, "alignment", ExthKind::Text),
    (535, "build_tag", ExthKind::Text),
];

/// Record types a caller may change; every other record is written back as read
pub const EDITABLE: &[u32] = &[
    100, 101, 103, 104, 105, 106, 107, 108, 109, 112, 113, 501, 503, 504, 524,
];

pub const COVER_OFFSET: u32 = 201;

pub fn kind_of(code: u32) -> ExthKind {
    TABLE
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, _, kind)| *kind)
        .unwrap_or(ExthKind::Unknown)
}

/// Field name of a record type; unknown types are named `exth_<code>`
pub fn name_of(code: u32) -> String {
    TABLE
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, name, _)| name.to_string())
        .unwrap_or_else(|| format!("exth_{}", code))
}

pub fn code_of(name: &str) -> Option<u32> {
    TABLE
        .iter()
        .find(|(_, n, _)| n.eq_ignore_ascii_case(name))
        .map(|(c, _, _)| *c)
        .or_else(|| name.strip_prefix("exth_")?.parse().ok())
}

pub fn is_editable(code: u32) -> bool {
    EDITABLE.contains(&code)
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Parse an EXTH block (starting at its `EXTH` magic)
pub fn parse_exth(data: &[u8]) -> Result<Vec<ExthRecord>, ParseError> {
    if !data.starts_with(b"EXTH") {
        return Err(ParseError::InvalidMobi("EXTH magic not found".to_string()));
    }
    let count = read_u32(data, 8)
        .ok_or_else(|| ParseError::InvalidMobi("truncated EXTH header".to_string()))?;

    let mut records = Vec::with_capacity(count.min(1024) as usize);
    let mut pos = 12;
    for _ in 0..count {
        let (record_type, length) = match (read_u32(data, pos), read_u32(data, pos + 4)) {
            (Some(t), Some(l)) => (t, l as usize),
            _ => return Err(ParseError::InvalidMobi("truncated EXTH record".to_string())),
        };
        if length < 8 || pos + length > data.len() {
            return Err(ParseError::InvalidMobi(format!(
                "EXTH record {} has invalid length {}",
                record_type, length
            )));
        }
        records.push(ExthRecord::new(record_type, data[pos + 8..pos + length].to_vec()));
        pos += length;
    }
    Ok(records)
}

/// Serialize records into an EXTH block, zero-padded to a multiple of four
pub fn encode_exth(records: &[ExthRecord]) -> Vec<u8> {
    let length: usize = 12 + records.iter().map(ExthRecord::encoded_len).sum::<usize>();
    let mut out = Vec::with_capacity(length + 3);
    out.extend_from_slice(b"EXTH");
    out.extend_from_slice(&(length as u32).to_be_bytes());
    out.extend_from_slice(&(records.len() as u32).to_be_bytes());
    for record in records {
        out.extend_from_slice(&record.record_type.to_be_bytes());
        out.extend_from_slice(&(record.encoded_len() as u32).to_be_bytes());
        out.extend_from_slice(&record.data);
    }
    while out.len() % 4 != 0 {
        out.push(0);
    }
    out
}

fn integer_value(data: &[u8]) -> Option<i64> {
    if data.is_empty() || data.len() > 8 {
        return None;
    }
    Some(data.iter().fold(0i64, |acc, b| (acc << 8) | i64::from(*b)))
}

/// Decode a record into a field carrying the raw record as its origin
pub fn record_to_field(record: &ExthRecord, encoding: TextEncoding) -> Field {
    let name = name_of(record.record_type);
    let data = &record.data;

    let field = match kind_of(record.record_type) {
        ExthKind::Text => Field::new(name, encoding.decode(data)),
        ExthKind::Date => Field::new(name, encoding.decode(data)).with_type(ValueType::Date),
        ExthKind::Integer => match integer_value(data) {
            Some(n) => Field::new(name, FieldValue::Integer(n)).with_type(ValueType::Integer),
            None => Field::new(name, hex::encode(data)),
        },
        ExthKind::Hash | ExthKind::Unknown => Field::new(name, hex::encode(data)),
    };

    let field = field.with_origin(FieldOrigin::Exth(record.clone()));
    if is_editable(record.record_type) {
        field
    } else {
        field.read_only()
    }
}

/// Encode an edited field back into a record of the given type
///
/// Integer records are 32-bit unsigned; values outside that range are rejected.
pub fn field_to_record(
    record_type: u32,
    value: &FieldValue,
    encoding: TextEncoding,
) -> Result<ExthRecord, WriteError> {
    let data = match (kind_of(record_type), value) {
        (ExthKind::Integer, FieldValue::Integer(n)) => u32::try_from(*n)
            .map_err(|_| {
                WriteError::RejectedField(format!(
                    "EXTH {} value {} does not fit in 32 bits",
                    record_type, n
                ))
            })?
            .to_be_bytes()
            .to_vec(),
        (ExthKind::Integer, other) => {
            let n: u32 = other.to_string().trim().parse().map_err(|_| {
                WriteError::RejectedField(format!(
                    "EXTH {} expects an integer, got '{}'",
                    record_type, other
                ))
            })?;
            n.to_be_bytes().to_vec()
        }
        (ExthKind::Hash | ExthKind::Unknown, other) => hex::decode(other.to_string().trim())
            .map_err(|e| {
                WriteError::RejectedField(format!("EXTH {} expects hex: {}", record_type, e))
            })?,
        (ExthKind::Text | ExthKind::Date, other) => encoding.encode(&other.to_string()),
    };
    Ok(ExthRecord::new(record_type, data))
}
