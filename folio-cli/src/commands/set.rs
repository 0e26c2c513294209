//! Set command implementation

use super::resources;
use anyhow::{bail, Context, Result};
use folio_core::{
    CodecContext, Field, FieldCategory, FieldSet, FieldValue, HandlerRegistry, MetadataReader,
    MetadataWriter, ValueType,
};

/// Apply `name=value` assignments to one file, or by category to several
pub fn set(ctx: &CodecContext, files: &[String], assignments: &[(String, String)]) -> Result<()> {
    let resources = resources(files)?;
    let registry = HandlerRegistry::new(ctx.clone());

    let reader = registry.reader(&resources);
    let mut fields = reader.borrow_mut().read_metadata();
    {
        let reader = reader.borrow();
        for (name, value) in assignments {
            assign(&*reader, &mut fields, name, value, resources.len() > 1)?;
        }
    }

    let mut writer = registry
        .writer(&resources)
        .with_context(|| format!("{} is read-only", reader.borrow().resource_name()))?;
    writer
        .write_metadata(&fields)
        .with_context(|| format!("Failed to write {}", files.join(", ")))?;

    tracing::info!("Updated {} file(s)", resources.len());
    Ok(())
}

fn assign(
    reader: &dyn MetadataReader,
    fields: &mut FieldSet,
    name: &str,
    value: &str,
    aggregate: bool,
) -> Result<()> {
    let field = if fields.find(name).is_some() {
        fields.find_mut(name)
    } else if let Some(category) = FieldCategory::from_name(name) {
        reader.category_field(true, fields, category)
    } else if aggregate {
        bail!("'{}' is not a category; several files are edited by category", name);
    } else {
        fields.push(Field::empty(name));
        fields.find_mut(name)
    };

    let Some(field) = field else {
        bail!("'{}' is not supported by this format", name);
    };
    if !field.flags.editable {
        bail!("'{}' is read-only", field.name);
    }

    tracing::debug!(field = %field.name, value, "assigning");
    let parsed = parse_value(field.value_type, value);
    field.set_value(parsed, 0);
    if !aggregate {
        field.values.truncate(1);
    }
    Ok(())
}

fn parse_value(value_type: ValueType, value: &str) -> FieldValue {
    match value_type {
        ValueType::Integer => value
            .trim()
            .parse()
            .map(FieldValue::Integer)
            .unwrap_or_else(|_| FieldValue::text(value)),
        ValueType::TriState => match value.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" => FieldValue::Flag(Some(true)),
            "no" | "false" => FieldValue::Flag(Some(false)),
            "unknown" => FieldValue::Flag(None),
            _ => FieldValue::text(value),
        },
        _ => FieldValue::text(value),
    }
}
