//! Read-only metadata from the `<head>` of an HTML document

use crate::codec::{degrade, MetadataReader};
use crate::config::CodecContext;
use crate::error::Result;
use crate::resource::ResourceRef;
use crate::types::{Field, FieldCategory, FieldOrigin, FieldSet};
use encoding_rs::Encoding;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

fn charset_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([A-Za-z0-9_.:\-]+)"#).ok()
        })
        .as_ref()
}

/// Decode the head window, honouring a declared charset when the bytes are not UTF-8
pub(crate) fn decode_head(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    if !text.contains('\u{FFFD}') {
        return text.into_owned();
    }

    let declared = charset_pattern()
        .and_then(|re| re.captures(&text))
        .and_then(|caps| caps.get(1))
        .and_then(|label| Encoding::for_label(label.as_str().as_bytes()));
    match declared {
        Some(encoding) => {
            tracing::debug!("Re-decoding HTML head as {}", encoding.name());
            encoding.decode_without_bom_handling(data).0.into_owned()
        }
        None => text.into_owned(),
    }
}

pub struct HtmlCodec {
    resource: ResourceRef,
    ctx: CodecContext,
}

impl HtmlCodec {
    pub fn new(resource: ResourceRef, ctx: CodecContext) -> Self {
        Self { resource, ctx }
    }

    fn read_fields(&self) -> Result<FieldSet> {
        let window = self.ctx.options.html_head_window;
        let head = self.resource.read_prefix(window)?;
        let fields = parse_head(&decode_head(&head));
        tracing::debug!("Read {} fields from {}", fields.len(), self.resource.name());
        Ok(fields)
    }
}

/// `<title>` and every named `<meta>` as read-only fields
pub(crate) fn parse_head(html: &str) -> FieldSet {
    let document = Html::parse_document(html);
    let mut fields = FieldSet::new();

    if let Ok(selector) = Selector::parse("title") {
        if let Some(title) = document.select(&selector).next() {
            let text: String = title.text().collect();
            fields.push_non_empty(read_only("title", text.trim()));
        }
    }

    if let Ok(selector) = Selector::parse("meta[name][content]") {
        for meta in document.select(&selector) {
            let element = meta.value();
            if let (Some(name), Some(content)) = (element.attr("name"), element.attr("content")) {
                fields.push_non_empty(read_only(name.trim(), content.trim()));
            }
        }
    }

    fields
}

fn read_only(name: &str, value: &str) -> Field {
    Field::new(name, value)
        .with_origin(FieldOrigin::Html)
        .read_only()
}

impl MetadataReader for HtmlCodec {
    fn resource_name(&self) -> String {
        self.resource.name().to_string()
    }

    fn read_metadata(&mut self) -> FieldSet {
        self.read_fields()
            .unwrap_or_else(|e| degrade(self.resource.as_ref(), e))
    }

    fn category_names(&self, category: FieldCategory) -> &'static [&'static str] {
        match category {
            FieldCategory::Title => &["title", "dc.title"],
            FieldCategory::Author => &["author", "dc.creator"],
            FieldCategory::Keywords => &["keywords"],
            FieldCategory::Description => &["description", "dc.description"],
            FieldCategory::Language => &["language", "dc.language"],
            FieldCategory::CreationDate => &["date", "dc.date"],
            _ => &[],
        }
    }
}
