//! Core types of the metadata model

mod category;
mod field;
mod origin;

pub use category::{CatalogRecord, FieldCategory};
pub use field::{hint, Field, FieldFlags, FieldSet, FieldValue, ValueType};
pub use origin::{EpubOrigin, ExthRecord, FieldOrigin, XmpContainer, XmpOrigin};
