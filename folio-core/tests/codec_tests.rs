//! Round-trip tests for every container format
//!
//! ## Test Strategy
//!
//! 1. **Detection**: the registry picks the right codec from the file alone
//! 2. **Round trips**: read, edit, write through the registry writer, read again
//! 3. **Preservation**: bytes the metadata model does not own survive a write

mod common;

use common::*;
use folio_core::codec::comic::COMIC_INFO;
use folio_core::config::FixedCoverDecision;
use folio_core::types::{ExthRecord, FieldValue};
use folio_core::{
    CodecContext, CoverDecision, Field, FieldCategory, FieldSet, Format, HandlerRegistry,
    MetadataReader, MetadataWriter,
};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

fn registry() -> HandlerRegistry {
    HandlerRegistry::new(CodecContext::default())
}

// =============================================================================
// EPUB
// =============================================================================

#[test]
fn test_epub_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (path, resource) = write_file(dir.path(), "book", &epub_bytes(&opf("Dune", "Frank Herbert")));
    assert_eq!(Format::detect(resource.as_ref()), Some(Format::Epub));

    let registry = registry();
    let mut fields = registry.reader(&[resource.clone()]).borrow_mut().read_metadata();
    assert_eq!(fields.values_of("author"), vec!["Frank Herbert"]);
    assert_eq!(fields.values_of("isbn"), vec!["9780306406157"]);
    assert_eq!(fields.values_of("calibre:series"), vec!["Chronicles"]);

    fields.find_mut("title").unwrap().set_value("Dune Messiah", 0);
    fields.push(Field::new("publisher", "Chilton"));
    let mut writer = registry.writer(&[resource.clone()]).unwrap();
    writer.write_metadata(&fields).unwrap();

    let reread = registry.reader(&[resource.clone()]).borrow_mut().read_metadata();
    assert_eq!(reread.values_of("title"), vec!["Dune Messiah"]);
    assert_eq!(reread.values_of("publisher"), vec!["Chilton"]);
    assert_eq!(reread.values_of("language"), vec!["en"]);

    // Content documents are carried over untouched
    let mut archive = zip::ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
    let mut chapter = String::new();
    archive
        .by_name("OEBPS/ch1.xhtml")
        .unwrap()
        .read_to_string(&mut chapter)
        .unwrap();
    assert_eq!(chapter, "<html><body><p>Once upon a time</p></body></html>");
    assert_eq!(archive.by_index(0).unwrap().name(), "mimetype");
}

#[test]
fn test_epub_declared_cover_beats_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let (_, resource) = write_file(dir.path(), "book.epub", &epub_bytes(&opf("T", "A")));
    let reader = registry().reader(&[resource]);
    let cover = reader.borrow_mut().read_cover();
    assert_eq!(cover.as_deref(), Some(JPEG));
}

#[test]
fn test_epub_catalog_record() {
    let dir = tempfile::tempdir().unwrap();
    let (_, resource) = write_file(dir.path(), "book.epub", &epub_bytes(&opf("Dune", "Frank Herbert")));
    let reader = registry().reader(&[resource]);
    let mut reader = reader.borrow_mut();
    let fields = reader.read_metadata();
    let mut record = folio_core::CatalogRecord::new();
    reader.fill_record(&fields, &mut record);

    assert_eq!(record.title.as_deref(), Some("Dune"));
    assert_eq!(record.series_name.as_deref(), Some("Chronicles"));
    assert_eq!(record.series_index.as_deref(), Some("2"));
    assert_eq!(record.genre.as_deref(), Some("Fiction"));
    assert_eq!(record.cover.as_deref(), Some(JPEG));
}

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

/// Replace the cover of an EPUB with a PNG and retitle it, answering the
/// cover conflict with `decision`
fn replace_epub_cover(path: &Path, decision: CoverDecision) -> FieldSet {
    let resource = folio_core::FileResource::shared(path);
    let ctx = CodecContext::default().with_cover_resolver(Arc::new(FixedCoverDecision(decision)));
    let registry = HandlerRegistry::new(ctx);

    let mut fields = registry.reader(&[resource.clone()]).borrow_mut().read_metadata();
    fields.find_mut("title").unwrap().set_value("New", 0);
    fields.find_mut("cover").unwrap().set_value(PNG.to_vec(), 0);
    registry
        .writer(&[resource.clone()])
        .unwrap()
        .write_metadata(&fields)
        .unwrap();

    let reread = registry.reader(&[resource]).borrow_mut().read_metadata();
    reread
}

fn package_document(path: &Path) -> String {
    String::from_utf8(zip_entry(path, "OEBPS/content.opf").unwrap()).unwrap()
}

#[test]
fn test_epub_cover_overwrite_reuses_entry() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = write_file(dir.path(), "book.epub", &epub_bytes(&opf("Old", "A")));

    let fields = replace_epub_cover(&path, CoverDecision::Overwrite);
    assert_eq!(fields.values_of("title"), vec!["New"]);
    assert_eq!(zip_entry(&path, "OEBPS/images/front.jpg").as_deref(), Some(PNG));
    assert_eq!(zip_entry(&path, "OEBPS/cover.png"), None);

    let opf = package_document(&path);
    assert!(opf.contains(r#"<meta name="cover" content="cover-img"/>"#));
    assert!(!opf.contains("cover-image"));
}

#[test]
fn test_epub_cover_add_new_keeps_both_images() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = write_file(dir.path(), "book.epub", &epub_bytes(&opf("Old", "A")));

    let fields = replace_epub_cover(&path, CoverDecision::AddNew);
    assert_eq!(fields.values_of("title"), vec!["New"]);
    assert_eq!(zip_entry(&path, "OEBPS/images/front.jpg").as_deref(), Some(JPEG));
    assert_eq!(zip_entry(&path, "OEBPS/cover.png").as_deref(), Some(PNG));

    let opf = package_document(&path);
    assert!(opf.contains(r#"<meta name="cover" content="cover-image"/>"#));
    assert!(opf.contains(r#"href="cover.png""#));
    assert!(opf.contains(r#"<item id="cover-img" href="images/front.jpg""#));

    let cover = fields.find("cover").unwrap();
    assert_eq!(cover.hint(folio_core::types::hint::FROM_EBOOK_RESOURCE), Some("OEBPS/cover.png"));
}

#[test]
fn test_epub_cover_cancel_still_writes_other_fields() {
    let dir = tempfile::tempdir().unwrap();
    let (path, resource) = write_file(dir.path(), "book.epub", &epub_bytes(&opf("Old", "A")));

    let fields = replace_epub_cover(&path, CoverDecision::Cancel);
    assert_eq!(fields.values_of("title"), vec!["New"]);
    assert_eq!(zip_entry(&path, "OEBPS/images/front.jpg").as_deref(), Some(JPEG));
    assert_eq!(zip_entry(&path, "OEBPS/cover.png"), None);
    assert!(package_document(&path).contains(r#"<meta name="cover" content="cover-img"/>"#));

    let cover = registry().reader(&[resource]).borrow_mut().read_cover();
    assert_eq!(cover.as_deref(), Some(JPEG));
}

// =============================================================================
// PDF
// =============================================================================

#[test]
fn test_pdf_round_trip_keeps_creator_order() {
    let dir = tempfile::tempdir().unwrap();
    let (_, resource) = write_file(dir.path(), "paper", &pdf_bytes("Info Title", Some(XMP_CREATORS)));
    assert_eq!(Format::detect(resource.as_ref()), Some(Format::Pdf));

    let registry = registry();
    let reader = registry.reader(&[resource.clone()]);
    let mut fields = reader.borrow_mut().read_metadata();
    let title = reader
        .borrow()
        .category_field(false, &mut fields, FieldCategory::Title)
        .map(|f| f.value());
    assert_eq!(title.as_deref(), Some("Packet Title"));

    fields.find_mut("Title").unwrap().set_value("Edited Info Title", 0);
    registry
        .writer(&[resource.clone()])
        .unwrap()
        .write_metadata(&fields)
        .unwrap();

    let fields = registry.reader(&[resource]).borrow_mut().read_metadata();
    assert_eq!(fields.values_of("Title"), vec!["Edited Info Title"]);
    match fields.find("dc:creator").and_then(|f| f.first()) {
        Some(FieldValue::Fields(members)) => {
            let names: Vec<String> = members.iter().map(Field::value).collect();
            assert_eq!(names, vec!["Zed", "Amy", "Max"]);
        }
        other => panic!("unexpected creator value {:?}", other),
    }
}

// =============================================================================
// MOBI
// =============================================================================

#[test]
fn test_mobi_protected_records_are_byte_identical() {
    let protected = vec![
        ExthRecord::new(121, 7u32.to_be_bytes().to_vec()),
        ExthRecord::new(201, 0u32.to_be_bytes().to_vec()),
        ExthRecord::new(300, vec![0x00, 0xFF, 0x10, 0x20, 0x30]),
        ExthRecord::new(777, b"\x00odd\xffbytes".to_vec()),
    ];
    let mut exth = vec![ExthRecord::new(100, b"First Author".to_vec())];
    exth.extend(protected.iter().cloned());

    let dir = tempfile::tempdir().unwrap();
    let (path, resource) = write_file(dir.path(), "book.azw3", &mobi_bytes("A Kindle Book", &exth));
    let registry = registry();

    let mut fields = registry.reader(&[resource.clone()]).borrow_mut().read_metadata();
    fields.find_mut("author").unwrap().set_value("Second Author", 0);
    fields.push(Field::new("unmapped", "rejected"));
    registry
        .writer(&[resource.clone()])
        .unwrap()
        .write_metadata(&fields)
        .unwrap();

    let fields = registry.reader(&[resource.clone()]).borrow_mut().read_metadata();
    assert_eq!(fields.values_of("author"), vec!["Second Author"]);
    assert_eq!(fields.values_of("title"), vec!["A Kindle Book"]);
    assert!(fields.find("unmapped").is_none());

    // Every protected record is written back exactly as it was read
    let data = std::fs::read(&path).unwrap();
    let block_start = data
        .windows(4)
        .position(|w| w == b"EXTH")
        .expect("EXTH block");
    let records = folio_core::codec::mobi::exth::parse_exth(&data[block_start..]).unwrap();
    for record in &protected {
        assert!(records.contains(record), "missing {:?}", record);
    }

    let after = mobi_records(&data);
    assert_eq!(after.len(), 3);
    assert_eq!(after[2], JPEG);
    let cover = registry.reader(&[resource]).borrow_mut().read_cover();
    assert_eq!(cover.as_deref(), Some(JPEG));
}

// =============================================================================
// Comic books
// =============================================================================

#[test]
fn test_comic_round_trip() {
    let info = "<ComicInfo><Series>Saga</Series><Number>1</Number><Manga>Unknown</Manga></ComicInfo>";
    let dir = tempfile::tempdir().unwrap();
    let (path, resource) = write_file(dir.path(), "issue", &cbz_bytes(Some(info)));
    assert_eq!(Format::detect(resource.as_ref()), Some(Format::ComicBook));

    let registry = registry();
    let reader = registry.reader(&[resource.clone()]);
    let mut fields = reader.borrow_mut().read_metadata();
    assert_eq!(fields.find("Manga").unwrap().first(), Some(&FieldValue::Flag(None)));
    reader
        .borrow()
        .category_field(true, &mut fields, FieldCategory::Author)
        .unwrap()
        .set_value("Brian K. Vaughan", 0);
    fields.find_mut("Number").unwrap().set_value(FieldValue::Integer(2), 0);

    registry
        .writer(&[resource.clone()])
        .unwrap()
        .write_metadata(&fields)
        .unwrap();

    let reader = registry.reader(&[resource]);
    let fields = reader.borrow_mut().read_metadata();
    assert_eq!(fields.values_of("Writer"), vec!["Brian K. Vaughan"]);
    assert_eq!(fields.values_of("Number"), vec!["2"]);
    assert_eq!(reader.borrow_mut().read_cover().as_deref(), Some(JPEG));

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
    assert!(archive.by_name(COMIC_INFO).is_ok());
    assert_eq!(archive.len(), 3);
}

// =============================================================================
// HTML
// =============================================================================

#[test]
fn test_html_is_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let (_, resource) = write_file(
        dir.path(),
        "page",
        br#"<!doctype html><html><head><title>Notes</title><meta name="author" content="Ann"></head></html>"#,
    );
    assert_eq!(Format::detect(resource.as_ref()), Some(Format::Html));

    let registry = registry();
    let fields = registry.reader(&[resource.clone()]).borrow_mut().read_metadata();
    assert_eq!(fields.values_of("author"), vec!["Ann"]);
    assert!(registry.writer(&[resource]).is_none());
}
