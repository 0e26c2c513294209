//! Format-specific state carried alongside a field
//!
//! Origins are plain values: cloning a field copies its origin structurally,
//! there are no live references into a parsed document.

/// Where a field came from and what a writer needs to rebuild it
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldOrigin {
    /// Synthesized by the caller or the aggregate codec
    #[default]
    None,
    /// An element of the OPF `<metadata>` block
    Epub(EpubOrigin),
    /// A key of the PDF trailer Info dictionary
    PdfInfo,
    /// A property of the PDF XMP packet
    Xmp(XmpOrigin),
    /// A MOBI EXTH record
    Exth(ExthRecord),
    /// The MOBI full name
    MobiTitle,
    /// The MOBI cover image record
    MobiCover,
    /// An element of `ComicInfo.xml`
    ComicInfo { raw_xml: bool },
    /// A `<meta>`/`<title>` tag of an HTML head
    Html,
}

/// The OPF element a field was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpubOrigin {
    /// Qualified element name as written in the document (`dc:creator`, `meta`)
    pub element: String,
    /// Attributes in document order
    pub attributes: Vec<(String, String)>,
}

impl EpubOrigin {
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Attribute value by local name, ignoring any namespace prefix
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.rsplit(':').next() == Some(local_name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace (or add) the attribute with the given local name
    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        let local = key.rsplit(':').next().unwrap_or(key);
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|(k, _)| k.rsplit(':').next() == Some(local))
        {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }
}

/// RDF list container kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmpContainer {
    Seq,
    Alt,
    Bag,
}

impl XmpContainer {
    pub fn from_element(name: &str) -> Option<Self> {
        match name {
            "rdf:Seq" => Some(XmpContainer::Seq),
            "rdf:Alt" => Some(XmpContainer::Alt),
            "rdf:Bag" => Some(XmpContainer::Bag),
            _ => None,
        }
    }

    pub fn element_name(self) -> &'static str {
        match self {
            XmpContainer::Seq => "rdf:Seq",
            XmpContainer::Alt => "rdf:Alt",
            XmpContainer::Bag => "rdf:Bag",
        }
    }
}

/// The XMP schema a property belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmpOrigin {
    /// Namespace prefix (`dc`, `xap`, `pdf`, ...)
    pub prefix: String,
    /// Namespace URI declared for the prefix
    pub uri: String,
    /// Set on list properties and on their members
    pub container: Option<XmpContainer>,
}

impl XmpOrigin {
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            uri: uri.into(),
            container: None,
        }
    }

    pub fn in_container(mut self, container: XmpContainer) -> Self {
        self.container = Some(container);
        self
    }
}

/// One raw EXTH record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExthRecord {
    pub record_type: u32,
    pub data: Vec<u8>,
}

impl ExthRecord {
    pub fn new(record_type: u32, data: Vec<u8>) -> Self {
        Self { record_type, data }
    }

    /// Size of the record on disk, header included
    pub fn encoded_len(&self) -> usize {
        8 + self.data.len()
    }
}
