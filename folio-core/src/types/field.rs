//! The canonical field model shared by every codec

use super::origin::FieldOrigin;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known hint keys passed from readers to writers
pub mod hint {
    /// The cover value is an existing resource of the container (value: its href)
    pub const FROM_EBOOK_RESOURCE: &str = "from-ebook-resource";

    /// Preferred editor for the field (e.g. "multiline", "rating", "tristate")
    pub const EDITOR: &str = "editor";

    /// Preferred renderer for the field
    pub const RENDERER: &str = "renderer";

    /// Language of an XMP alternative
    pub const XML_LANG: &str = "xml:lang";

    /// Pixel dimensions of an image value
    pub const IMAGE_WIDTH: &str = "image-width";
    pub const IMAGE_HEIGHT: &str = "image-height";
}

/// Declared semantic class of a field, used for format-specific serialization
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    Text,
    MultilineText,
    Integer,
    Date,
    Rating,
    TriState,
    CoverImage,
}

/// One value of a field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Date(DateTime<FixedOffset>),
    /// Tri-state boolean: `None` is "Unknown"
    Flag(Option<bool>),
    Bytes(#[serde(with = "base64_serde")] Vec<u8>),
    /// Members of a list value (XMP `rdf:Seq`/`rdf:Alt`/`rdf:Bag`)
    Fields(Vec<Field>),
    /// Marker used by the aggregate codec for "leave every resource as it is"
    NoChange,
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(data) => Some(data),
            _ => None,
        }
    }

    /// Whether the value carries no content at all
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Bytes(b) => b.is_empty(),
            FieldValue::Fields(f) => f.iter().all(Field::is_empty),
            FieldValue::NoChange => true,
            FieldValue::Integer(_) | FieldValue::Date(_) | FieldValue::Flag(_) => false,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Integer(n) => write!(f, "{}", n),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%dT%H:%M:%S%:z")),
            FieldValue::Flag(None) => f.write_str("Unknown"),
            FieldValue::Flag(Some(true)) => f.write_str("Yes"),
            FieldValue::Flag(Some(false)) => f.write_str("No"),
            FieldValue::Bytes(b) => write!(f, "[{} bytes]", b.len()),
            FieldValue::Fields(children) => {
                let joined: Vec<String> = children.iter().map(Field::value).collect();
                f.write_str(&joined.join(", "))
            }
            FieldValue::NoChange => Ok(()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(value)
    }
}

/// Capability flags of a field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldFlags {
    pub editable: bool,
    pub deletable: bool,
    pub single_valued: bool,
}

impl Default for FieldFlags {
    fn default() -> Self {
        Self {
            editable: true,
            deletable: true,
            single_valued: true,
        }
    }
}

/// One named, possibly multi-valued metadata entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    /// Canonical name, possibly namespaced (`dc:title`, `calibre:series`)
    pub name: String,

    /// Ordered values
    pub values: Vec<FieldValue>,

    /// Declared semantic class
    pub value_type: ValueType,

    /// Capability flags
    pub flags: FieldFlags,

    /// Closed set of allowed textual values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_values: Option<Vec<String>>,

    /// Reader-to-writer side channel
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hints: BTreeMap<String, String>,

    /// Format-specific state needed to reconstruct the source record
    #[serde(skip)]
    pub origin: FieldOrigin,
}

impl Field {
    /// Create a field holding a single value
    pub fn new(name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            name: name.into(),
            values: vec![value.into()],
            value_type: ValueType::Text,
            flags: FieldFlags::default(),
            valid_values: None,
            hints: BTreeMap::new(),
            origin: FieldOrigin::None,
        }
    }

    /// Create a field without values
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            values: Vec::new(),
            ..Self::new(name, FieldValue::NoChange)
        }
    }

    pub fn with_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_origin(mut self, origin: FieldOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_hint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hints.insert(key.into(), value.into());
        self
    }

    pub fn with_valid_values(mut self, values: &[&str]) -> Self {
        self.valid_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.flags.editable = false;
        self.flags.deletable = false;
        self
    }

    pub fn undeletable(mut self) -> Self {
        self.flags.deletable = false;
        self
    }

    pub fn multi_valued(mut self) -> Self {
        self.flags.single_valued = false;
        self
    }

    /// First value, stringified; empty when the field has no value
    pub fn value(&self) -> String {
        self.values.first().map(ToString::to_string).unwrap_or_default()
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn first(&self) -> Option<&FieldValue> {
        self.values.first()
    }

    /// Replace the value at `idx`, or append when `idx` is one past the end
    pub fn set_value(&mut self, value: impl Into<FieldValue>, idx: usize) {
        let value = value.into();
        if idx < self.values.len() {
            self.values[idx] = value;
        } else {
            self.values.push(value);
        }
    }

    /// Drop every value
    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn hint(&self, key: &str) -> Option<&str> {
        self.hints.get(key).map(String::as_str)
    }

    /// Whether no value carries content
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(FieldValue::is_empty)
    }

    /// Case-insensitive name comparison
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Check the field against its declared constraints
    ///
    /// The field itself never enforces these; writers call this before
    /// serializing and skip fields that fail.
    pub fn validate(&self) -> Result<(), String> {
        if self.flags.single_valued && self.values.len() > 1 {
            return Err(format!(
                "{} is single-valued but holds {} values",
                self.name,
                self.values.len()
            ));
        }
        if let Some(valid) = &self.valid_values {
            for value in &self.values {
                let text = value.to_string();
                if !valid.iter().any(|v| v.eq_ignore_ascii_case(&text)) {
                    return Err(format!("{} does not accept '{}'", self.name, text));
                }
            }
        }
        if self.value_type == ValueType::Integer {
            for value in &self.values {
                if let FieldValue::Text(s) = value {
                    if !s.trim().is_empty() && s.trim().parse::<i64>().is_err() {
                        return Err(format!("{} expects an integer, got '{}'", self.name, s));
                    }
                }
            }
        }
        Ok(())
    }
}

/// The ordered fields produced by one read
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct FieldSet {
    fields: Vec<Field>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Push the field unless it carries no content
    pub fn push_non_empty(&mut self, field: Field) {
        if !field.is_empty() {
            self.fields.push(field);
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.fields.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Field> {
        self.fields.iter_mut()
    }

    /// First field with the given name (case-insensitive)
    pub fn find(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.is_named(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.is_named(name))
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.is_named(name))
    }

    /// Stringified first values of every field with the given name
    pub fn values_of(&self, name: &str) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.is_named(name))
            .map(Field::value)
            .collect()
    }

    /// Remove every field with the given name, returning how many were removed
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.fields.len();
        self.fields.retain(|f| !f.is_named(name));
        before - self.fields.len()
    }

    pub fn get(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Field> {
        self.fields.get_mut(idx)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Vec<Field>> for FieldSet {
    fn from(fields: Vec<Field>) -> Self {
        Self { fields }
    }
}

impl FromIterator<Field> for FieldSet {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FieldSet {
    type Item = Field;
    type IntoIter = std::vec::IntoIter<Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a FieldSet {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Base64 serialization for binary values
mod base64_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
