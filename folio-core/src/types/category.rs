//! Canonical field categories and the catalog record they project into

use super::field::{Field, FieldValue, ValueType};
use serde::{Deserialize, Serialize};

/// Canonical categories shared by every format
///
/// Each codec maps a category to its own field names; the category itself
/// knows how to project a field into a [`CatalogRecord`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    Title,
    Author,
    Keywords,
    Description,
    CreationDate,
    Genre,
    AgeSuggestion,
    Rating,
    SeriesIndex,
    SeriesName,
    Isbn,
    Language,
    Cover,
}

impl FieldCategory {
    /// Every category, in display order
    pub const ALL: [FieldCategory; 13] = [
        FieldCategory::Author,
        FieldCategory::Title,
        FieldCategory::SeriesName,
        FieldCategory::SeriesIndex,
        FieldCategory::Genre,
        FieldCategory::Rating,
        FieldCategory::Keywords,
        FieldCategory::AgeSuggestion,
        FieldCategory::Description,
        FieldCategory::Language,
        FieldCategory::Isbn,
        FieldCategory::CreationDate,
        FieldCategory::Cover,
    ];

    /// Canonical (record attribute) name
    pub fn name(self) -> &'static str {
        match self {
            FieldCategory::Title => "title",
            FieldCategory::Author => "author",
            FieldCategory::Keywords => "keywords",
            FieldCategory::Description => "description",
            FieldCategory::CreationDate => "creationdate",
            FieldCategory::Genre => "genre",
            FieldCategory::AgeSuggestion => "agesuggestion",
            FieldCategory::Rating => "rating",
            FieldCategory::SeriesIndex => "seriesindex",
            FieldCategory::SeriesName => "seriesname",
            FieldCategory::Isbn => "isbn",
            FieldCategory::Language => "language",
            FieldCategory::Cover => "cover",
        }
    }

    /// Parse a canonical name (case-insensitive); `subject` is an alias of genre
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower == "subject" {
            return Some(FieldCategory::Genre);
        }
        Self::ALL.into_iter().find(|c| c.name() == lower)
    }

    /// Value type a synthesized field of this category gets
    pub fn value_type(self) -> ValueType {
        match self {
            FieldCategory::Description => ValueType::MultilineText,
            FieldCategory::CreationDate => ValueType::Date,
            FieldCategory::Rating => ValueType::Rating,
            FieldCategory::Cover => ValueType::CoverImage,
            _ => ValueType::Text,
        }
    }

    /// Copy the field's value into the matching record attribute
    pub fn project(self, field: &Field, record: &mut CatalogRecord) {
        if self == FieldCategory::Cover {
            if let Some(data) = field.values.iter().find_map(FieldValue::as_bytes) {
                if !data.is_empty() {
                    record.cover = Some(data.to_vec());
                }
            }
            return;
        }
        if self == FieldCategory::Author {
            project_authors(field, record);
            return;
        }

        let value = field.value().trim().to_string();
        if value.is_empty() {
            return;
        }

        match self {
            FieldCategory::Title => record.title = Some(value),
            FieldCategory::Keywords => append_joined(&mut record.keywords, value),
            FieldCategory::Genre => append_joined(&mut record.genre, value),
            FieldCategory::Description => record.description = Some(value),
            FieldCategory::CreationDate => record.creation_date = Some(value),
            FieldCategory::AgeSuggestion => record.age_suggestion = Some(value),
            FieldCategory::Rating => record.rating = parse_rating(&value),
            FieldCategory::SeriesIndex => record.series_index = Some(value),
            FieldCategory::SeriesName => record.series_name = Some(value),
            FieldCategory::Isbn => record.isbn = Some(value),
            FieldCategory::Language => record.language = Some(value),
            FieldCategory::Author | FieldCategory::Cover => {}
        }
    }
}

/// Every value of an author field is a separate author, including the
/// members of a list value such as an XMP `dc:creator` sequence
fn project_authors(field: &Field, record: &mut CatalogRecord) {
    let names = field.values.iter().flat_map(|value| match value {
        FieldValue::Fields(members) => members.iter().map(Field::value).collect(),
        other => vec![other.to_string()],
    });
    for name in names {
        let name = name.trim();
        if !name.is_empty() && !record.authors.iter().any(|a| a == name) {
            record.authors.push(name.to_string());
        }
    }
}

fn append_joined(slot: &mut Option<String>, value: String) {
    match slot {
        Some(existing) if !existing.split(", ").any(|v| v == value) => {
            existing.push_str(", ");
            existing.push_str(&value);
        }
        Some(_) => {}
        None => *slot = Some(value),
    }
}

fn parse_rating(value: &str) -> Option<u8> {
    value
        .parse::<f64>()
        .ok()
        .filter(|r| r.is_finite() && *r >= 0.0)
        .map(|r| r.round().min(f64::from(u8::MAX)) as u8)
}

/// The catalog attributes a codec projects its fields into
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogRecord {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub keywords: Option<String>,
    pub description: Option<String>,
    pub creation_date: Option<String>,
    pub genre: Option<String>,
    pub age_suggestion: Option<String>,
    pub rating: Option<u8>,
    pub series_index: Option<String>,
    pub series_name: Option<String>,
    pub isbn: Option<String>,
    pub language: Option<String>,

    /// Cover image bytes
    #[serde(skip)]
    pub cover: Option<Vec<u8>>,
}

impl CatalogRecord {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_accepts_subject_alias() {
        assert_eq!(FieldCategory::from_name("Subject"), Some(FieldCategory::Genre));
        assert_eq!(FieldCategory::from_name("SERIESNAME"), Some(FieldCategory::SeriesName));
        assert_eq!(FieldCategory::from_name("publisher"), None);
    }

    #[test]
    fn test_project_accumulates_authors_and_genres() {
        let mut record = CatalogRecord::new();
        FieldCategory::Author.project(&Field::new("author", "Jane"), &mut record);
        FieldCategory::Author.project(&Field::new("author", "Jane"), &mut record);
        FieldCategory::Author.project(&Field::new("author", "John"), &mut record);
        FieldCategory::Genre.project(&Field::new("subject", "Fantasy"), &mut record);
        FieldCategory::Genre.project(&Field::new("subject", "Humor"), &mut record);

        assert_eq!(record.authors, vec!["Jane", "John"]);
        assert_eq!(record.genre.as_deref(), Some("Fantasy, Humor"));
    }

    #[test]
    fn test_project_splits_author_lists() {
        let members = ["Ann", "Bob", "Ann"]
            .iter()
            .map(|name| Field::new("rdf:li", *name))
            .collect();
        let creators = Field::new("dc:creator", FieldValue::Fields(members));

        let mut record = CatalogRecord::new();
        FieldCategory::Author.project(&creators, &mut record);
        assert_eq!(record.authors, vec!["Ann", "Bob"]);

        let mut several = Field::new("author", "Cy");
        several.set_value("Dee", 1);
        FieldCategory::Author.project(&several, &mut record);
        assert_eq!(record.authors, vec!["Ann", "Bob", "Cy", "Dee"]);
    }

    #[test]
    fn test_project_rating_rounds() {
        let mut record = CatalogRecord::new();
        FieldCategory::Rating.project(&Field::new("rating", "7.6"), &mut record);
        assert_eq!(record.rating, Some(8));
        FieldCategory::Rating.project(&Field::new("rating", "abc"), &mut record);
        assert_eq!(record.rating, None);
    }

    #[test]
    fn test_project_cover_keeps_bytes() {
        let mut record = CatalogRecord::new();
        FieldCategory::Cover.project(&Field::new("cover", vec![1u8, 2, 3]), &mut record);
        assert_eq!(record.cover, Some(vec![1, 2, 3]));
    }
}
