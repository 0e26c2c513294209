//! Error types for Folio Core

use thiserror::Error;

/// Result type alias using MetadataError
pub type Result<T> = std::result::Result<T, MetadataError>;

/// Top-level error type for all metadata operations
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    /// The operation exists on the trait but this format cannot perform it
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that occur while parsing a container or its metadata documents
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    #[error("Invalid MOBI: {0}")]
    InvalidMobi(String),

    #[error("Invalid comic book archive: {0}")]
    InvalidComicBook(String),

    #[error("Invalid XML: {0}")]
    InvalidXml(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Malformed content: {0}")]
    MalformedContent(String),
}

/// Errors that occur while serializing metadata back into a container
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Writer produced no output for {0}")]
    EmptyOutput(String),

    #[error("Field rejected: {0}")]
    RejectedField(String),

    #[error("Write cancelled: {0}")]
    Cancelled(String),
}

impl From<quick_xml::Error> for ParseError {
    fn from(err: quick_xml::Error) -> Self {
        ParseError::InvalidXml(err.to_string())
    }
}

impl From<zip::result::ZipError> for MetadataError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => MetadataError::Io(io),
            other => MetadataError::Parse(ParseError::MalformedContent(other.to_string())),
        }
    }
}
