//! Format detection and the reader/writer handout with its one-entry cache

use crate::aggregate::AggregateCodec;
use crate::codec::{
    ComicBookCodec, EpubCodec, HtmlCodec, MetadataCodec, MetadataReader, MetadataWriter, MobiCodec,
    NullCodec, PdfCodec,
};
use crate::config::CodecContext;
use crate::error::Result;
use crate::resource::{Resource, ResourceRef};
use crate::types::{CatalogRecord, Field, FieldCategory, FieldSet};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use zip::ZipArchive;

/// Container formats with a codec
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Epub,
    Pdf,
    Mobi,
    ComicBook,
    Html,
}

impl Format {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "epub" => Some(Format::Epub),
            "pdf" => Some(Format::Pdf),
            "mobi" | "azw" | "azw3" | "prc" => Some(Format::Mobi),
            "cbz" | "cbr" => Some(Format::ComicBook),
            "html" | "htm" | "xhtml" => Some(Format::Html),
            _ => None,
        }
    }

    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or(mime).trim().to_ascii_lowercase();
        match essence.as_str() {
            "application/epub+zip" => Some(Format::Epub),
            "application/pdf" => Some(Format::Pdf),
            "application/x-mobipocket-ebook" | "application/vnd.amazon.ebook" => Some(Format::Mobi),
            "application/vnd.comicbook+zip"
            | "application/vnd.comicbook-rar"
            | "application/x-cbz"
            | "application/x-cbr" => Some(Format::ComicBook),
            "text/html" | "application/xhtml+xml" => Some(Format::Html),
            _ => None,
        }
    }

    /// Sniff the leading bytes of a container
    ///
    /// Zip archives are opened to tell an EPUB (which has
    /// `META-INF/container.xml`) from a comic book.
    pub fn sniff(resource: &dyn Resource) -> Option<Self> {
        let head = resource.read_prefix(1024).ok()?;
        if head.starts_with(b"%PDF-") {
            return Some(Format::Pdf);
        }
        if matches!(head.get(60..68), Some(b"BOOKMOBI") | Some(b"TEXtREAd")) {
            return Some(Format::Mobi);
        }
        if head.starts_with(b"PK\x03\x04") {
            let has_container = resource
                .open_read()
                .ok()
                .and_then(|reader| ZipArchive::new(reader).ok())
                .map(|mut zip| zip.by_name("META-INF/container.xml").is_ok())
                .unwrap_or(false);
            return Some(if has_container {
                Format::Epub
            } else {
                Format::ComicBook
            });
        }
        if head.starts_with(b"Rar!") {
            return Some(Format::ComicBook);
        }

        let text = String::from_utf8_lossy(&head);
        let start = text.trim_start_matches('\u{FEFF}').trim_start().to_ascii_lowercase();
        if start.starts_with("<html") || start.starts_with("<!doctype html") {
            return Some(Format::Html);
        }
        None
    }

    /// Extension or MIME hint first, then the content signature
    pub fn detect(resource: &dyn Resource) -> Option<Self> {
        resource
            .extension()
            .and_then(|ext| Self::from_extension(&ext))
            .or_else(|| resource.mime_type().and_then(Self::from_mime_type))
            .or_else(|| Self::sniff(resource))
    }
}

/// A single-resource codec, with or without write capability
pub enum Codec {
    ReadWrite(Box<dyn MetadataCodec>),
    ReadOnly(Box<dyn MetadataReader>),
}

impl Codec {
    /// The codec for `resource`, or the null codec when nothing matches
    pub fn open(resource: ResourceRef, ctx: &CodecContext) -> Self {
        let ctx = ctx.clone();
        match Format::detect(resource.as_ref()) {
            Some(Format::Epub) => Codec::ReadWrite(Box::new(EpubCodec::new(resource, ctx))),
            Some(Format::Pdf) => Codec::ReadWrite(Box::new(PdfCodec::new(resource, ctx))),
            Some(Format::Mobi) => Codec::ReadWrite(Box::new(MobiCodec::new(resource, ctx))),
            Some(Format::ComicBook) => {
                Codec::ReadWrite(Box::new(ComicBookCodec::new(resource, ctx)))
            }
            Some(Format::Html) => Codec::ReadOnly(Box::new(HtmlCodec::new(resource, ctx))),
            None => {
                tracing::debug!("No codec for {}", resource.name());
                Codec::ReadOnly(Box::new(NullCodec::new(resource.name())))
            }
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, Codec::ReadWrite(_))
    }

    pub fn writer(&mut self) -> Option<&mut dyn MetadataCodec> {
        match self {
            Codec::ReadWrite(codec) => Some(codec.as_mut()),
            Codec::ReadOnly(_) => None,
        }
    }

    fn into_writer(self) -> Option<Box<dyn MetadataCodec>> {
        match self {
            Codec::ReadWrite(codec) => Some(codec),
            Codec::ReadOnly(_) => None,
        }
    }
}

macro_rules! delegate {
    ($self:ident, $codec:ident => $call:expr) => {
        match $self {
            Codec::ReadWrite($codec) => $call,
            Codec::ReadOnly($codec) => $call,
        }
    };
}

impl MetadataReader for Codec {
    fn resource_name(&self) -> String {
        delegate!(self, c => c.resource_name())
    }

    fn read_metadata(&mut self) -> FieldSet {
        delegate!(self, c => c.read_metadata())
    }

    fn category_names(&self, category: FieldCategory) -> &'static [&'static str] {
        delegate!(self, c => c.category_names(category))
    }

    fn synthesize(&self, category: FieldCategory) -> Field {
        delegate!(self, c => c.synthesize(category))
    }

    fn category_field<'a>(
        &self,
        create: bool,
        fields: &'a mut FieldSet,
        category: FieldCategory,
    ) -> Option<&'a mut Field> {
        delegate!(self, c => c.category_field(create, fields, category))
    }

    fn fill_record(&self, fields: &FieldSet, record: &mut CatalogRecord) {
        delegate!(self, c => c.fill_record(fields, record))
    }

    fn read_cover(&mut self) -> Option<Vec<u8>> {
        delegate!(self, c => c.read_cover())
    }

    fn plain_metadata(&mut self) -> Option<Vec<u8>> {
        delegate!(self, c => c.plain_metadata())
    }

    fn plain_metadata_mime(&self) -> Option<&'static str> {
        delegate!(self, c => c.plain_metadata_mime())
    }
}

/// Reader handed out by the registry
pub type SharedReader = Rc<RefCell<dyn MetadataReader>>;

struct CachedReader {
    keys: BTreeSet<String>,
    reader: SharedReader,
}

type ReaderCache = Rc<RefCell<Option<CachedReader>>>;

fn key_set(resources: &[ResourceRef]) -> BTreeSet<String> {
    resources.iter().map(|r| r.key().to_string()).collect()
}

/// Hands out readers and writers for one resource or a selection
///
/// Exactly one reader is cached; asking again for the same resource set
/// (in any order) returns the same instance until a writer from this
/// registry succeeds.
pub struct HandlerRegistry {
    ctx: CodecContext,
    cache: ReaderCache,
}

impl HandlerRegistry {
    pub fn new(ctx: CodecContext) -> Self {
        Self {
            ctx,
            cache: Rc::new(RefCell::new(None)),
        }
    }

    pub fn context(&self) -> &CodecContext {
        &self.ctx
    }

    pub fn reader(&self, resources: &[ResourceRef]) -> SharedReader {
        let keys = key_set(resources);
        if let Some(cached) = self.cache.borrow().as_ref() {
            if cached.keys == keys {
                tracing::debug!("Reusing cached reader for {} resource(s)", keys.len());
                return cached.reader.clone();
            }
        }

        let reader: SharedReader = match resources {
            [] => Rc::new(RefCell::new(NullCodec::new(""))),
            [single] => Rc::new(RefCell::new(Codec::open(single.clone(), &self.ctx))),
            many => Rc::new(RefCell::new(AggregateCodec::open(many, &self.ctx))),
        };
        *self.cache.borrow_mut() = Some(CachedReader {
            keys,
            reader: reader.clone(),
        });
        reader
    }

    /// A writer for the resources, or `None` when they cannot be written
    pub fn writer(&self, resources: &[ResourceRef]) -> Option<InvalidatingWriter> {
        let inner: Box<dyn MetadataCodec> = match resources {
            [] => return None,
            [single] => Codec::open(single.clone(), &self.ctx).into_writer()?,
            many => Box::new(AggregateCodec::open(many, &self.ctx)),
        };
        Some(InvalidatingWriter {
            inner,
            cache: self.cache.clone(),
        })
    }

    /// Drop the cached reader
    pub fn invalidate(&self) {
        self.cache.borrow_mut().take();
    }
}

/// Writer that clears the registry's reader cache after every successful write
pub struct InvalidatingWriter {
    inner: Box<dyn MetadataCodec>,
    cache: ReaderCache,
}

impl InvalidatingWriter {
    /// The codec behind this writer, for reading fields to edit
    pub fn codec(&mut self) -> &mut dyn MetadataCodec {
        self.inner.as_mut()
    }

    fn invalidate_on_success(&self, result: Result<()>) -> Result<()> {
        if result.is_ok() && self.cache.borrow_mut().take().is_some() {
            tracing::debug!("Invalidated cached reader after write");
        }
        result
    }
}

impl MetadataWriter for InvalidatingWriter {
    fn write_metadata(&mut self, fields: &FieldSet) -> Result<()> {
        let result = self.inner.write_metadata(fields);
        self.invalidate_on_success(result)
    }

    fn store_plain_metadata(&mut self, data: &[u8]) -> Result<()> {
        let result = self.inner.store_plain_metadata(data);
        self.invalidate_on_success(result)
    }
}
