//! Folio Core Library
//!
//! Reads and writes the bibliographic metadata embedded in e-book
//! containers (EPUB, PDF, MOBI/AZW, CBZ/CBR, HTML). Every format is read
//! into the same [`FieldSet`] model; a [`HandlerRegistry`] picks the codec
//! for a resource and composes several resources into one common view.

pub mod aggregate;
pub mod codec;
pub mod config;
pub mod cover;
pub mod error;
pub mod registry;
pub mod resource;
pub mod types;
pub mod xml;

pub use aggregate::AggregateCodec;
pub use codec::{MetadataCodec, MetadataReader, MetadataWriter, NullCodec};
pub use config::{CodecContext, CodecOptions, CoverConflictResolver, CoverDecision, RefreshControl};
pub use error::{MetadataError, ParseError, Result, WriteError};
pub use registry::{Codec, Format, HandlerRegistry, InvalidatingWriter, SharedReader};
pub use resource::{FileResource, Resource, ResourceRef};
pub use types::{CatalogRecord, Field, FieldCategory, FieldSet, FieldValue, ValueType};
