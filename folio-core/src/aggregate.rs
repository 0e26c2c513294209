//! A common view over several resources
//!
//! Every category becomes one multi-field whose first value is the
//! [`FieldValue::NoChange`] marker, followed by the value each member had
//! when it was read. Replacing the marker edits the category; only members
//! that still agree with the first member's value are updated.

use crate::codec::{MetadataReader, MetadataWriter};
use crate::config::CodecContext;
use crate::cover::same_image;
use crate::error::{MetadataError, Result};
use crate::registry::Codec;
use crate::resource::ResourceRef;
use crate::types::{CatalogRecord, Field, FieldCategory, FieldSet, FieldValue};

pub struct AggregateCodec {
    members: Vec<Codec>,
}

impl AggregateCodec {
    pub fn open(resources: &[ResourceRef], ctx: &CodecContext) -> Self {
        Self::new(
            resources
                .iter()
                .map(|r| Codec::open(r.clone(), ctx))
                .collect(),
        )
    }

    pub fn new(members: Vec<Codec>) -> Self {
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The value a member currently has for a category; absent reads as empty text
fn current_value(member: &Codec, fields: &mut FieldSet, category: FieldCategory) -> FieldValue {
    member
        .category_field(false, fields, category)
        .and_then(|f| f.values.first().cloned())
        .unwrap_or_else(|| FieldValue::text(""))
}

pub(crate) fn same_value(a: &FieldValue, b: &FieldValue) -> bool {
    match (a.as_bytes(), b.as_bytes()) {
        (Some(x), Some(y)) => same_image(x, y),
        (None, None) => a.to_string().trim() == b.to_string().trim(),
        _ => a.is_empty() && b.is_empty(),
    }
}

fn category_names(category: FieldCategory) -> &'static [&'static str] {
    match category {
        FieldCategory::Title => &["title"],
        FieldCategory::Author => &["author"],
        FieldCategory::Keywords => &["keywords"],
        FieldCategory::Description => &["description"],
        FieldCategory::CreationDate => &["creationdate"],
        FieldCategory::Genre => &["genre"],
        FieldCategory::AgeSuggestion => &["agesuggestion"],
        FieldCategory::Rating => &["rating"],
        FieldCategory::SeriesIndex => &["seriesindex"],
        FieldCategory::SeriesName => &["seriesname"],
        FieldCategory::Isbn => &["isbn"],
        FieldCategory::Language => &["language"],
        FieldCategory::Cover => &["cover"],
    }
}

impl MetadataReader for AggregateCodec {
    fn resource_name(&self) -> String {
        self.members
            .iter()
            .map(Codec::resource_name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn read_metadata(&mut self) -> FieldSet {
        let mut member_fields: Vec<FieldSet> =
            self.members.iter_mut().map(|m| m.read_metadata()).collect();
        let writable = self.members.iter().any(Codec::is_writable);

        let mut out = FieldSet::new();
        for category in FieldCategory::ALL {
            if self
                .members
                .iter()
                .all(|m| m.category_names(category).is_empty())
            {
                continue;
            }

            let mut values = vec![FieldValue::NoChange];
            for (member, fields) in self.members.iter().zip(member_fields.iter_mut()) {
                values.push(current_value(member, fields, category));
            }

            let mut field = Field::empty(category.name())
                .with_type(category.value_type())
                .multi_valued();
            field.values = values;
            out.push(if writable { field } else { field.read_only() });
        }
        out
    }

    fn category_names(&self, category: FieldCategory) -> &'static [&'static str] {
        category_names(category)
    }

    /// Project the first member value that carries content
    fn fill_record(&self, fields: &FieldSet, record: &mut CatalogRecord) {
        for field in fields {
            let Some(category) = FieldCategory::from_name(&field.name) else {
                continue;
            };
            if let Some(value) = field.values.iter().skip(1).find(|v| !v.is_empty()) {
                let mut single = field.clone();
                single.values = vec![value.clone()];
                category.project(&single, record);
            }
        }
    }
}

impl MetadataWriter for AggregateCodec {
    /// Apply every edited category to the members that still hold the
    /// reference value, then write each touched member through its own codec
    fn write_metadata(&mut self, fields: &FieldSet) -> Result<()> {
        let edits: Vec<(FieldCategory, FieldValue, FieldValue)> = fields
            .iter()
            .filter_map(|field| {
                let category = FieldCategory::from_name(&field.name)?;
                let new_value = field.values.first()?;
                if *new_value == FieldValue::NoChange {
                    return None;
                }
                let reference = field
                    .values
                    .get(1)
                    .cloned()
                    .unwrap_or_else(|| FieldValue::text(""));
                Some((category, new_value.clone(), reference))
            })
            .collect();
        if edits.is_empty() {
            tracing::debug!("No aggregate field changed");
            return Ok(());
        }

        let mut first_error: Option<MetadataError> = None;
        for member in &mut self.members {
            let mut current = member.read_metadata();
            let mut touched = false;

            for (category, new_value, reference) in &edits {
                let value = current_value(member, &mut current, *category);
                if !same_value(&value, reference) {
                    tracing::debug!(
                        "{} diverges on {}; leaving it alone",
                        member.resource_name(),
                        category.name()
                    );
                    continue;
                }
                let Some(target) = member.category_field(true, &mut current, *category) else {
                    continue;
                };
                if !target.flags.editable {
                    tracing::warn!(
                        "{} cannot change {} of {}",
                        target.name,
                        category.name(),
                        member.resource_name()
                    );
                    continue;
                }
                if new_value.is_empty() {
                    target.clear();
                } else {
                    target.values = vec![new_value.clone()];
                }
                touched = true;
            }

            if !touched {
                continue;
            }
            let name = member.resource_name();
            match member.writer() {
                Some(writer) => {
                    if let Err(e) = writer.write_metadata(&current) {
                        tracing::error!("Aggregate write failed for {}: {}", name, e);
                        first_error.get_or_insert(e);
                    }
                }
                None => tracing::warn!("{} is read-only; skipped", name),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
