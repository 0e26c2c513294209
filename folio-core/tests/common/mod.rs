//! In-memory fixture builders shared by the integration tests
//!
//! Every fixture is written into a `tempfile` directory so tests never
//! depend on files checked into the repository.

#![allow(dead_code)]

use folio_core::codec::mobi::exth::encode_exth;
use folio_core::types::ExthRecord;
use folio_core::{FileResource, ResourceRef};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

// =============================================================================
// EPUB
// =============================================================================

pub fn opf(title: &str, author: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="bookid" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>{title}</dc:title>
    <dc:creator opf:role="aut">{author}</dc:creator>
    <dc:language>en</dc:language>
    <dc:subject>Fiction</dc:subject>
    <dc:identifier id="bookid" opf:scheme="uuid">urn:uuid:1b4e28ba-2fa1-11d2-883f-0016d3cca427</dc:identifier>
    <dc:identifier opf:scheme="ISBN">9780306406157</dc:identifier>
    <meta name="calibre:series" content="Chronicles"/>
    <meta name="calibre:series_index" content="2"/>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="cover-img" href="images/front.jpg" media-type="image/jpeg"/>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="ch1"/></spine>
</package>"#
    )
}

pub fn epub_bytes(opf: &str) -> Vec<u8> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default();

    zip.start_file("mimetype", stored).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();
    zip.start_file("META-INF/container.xml", deflated).unwrap();
    zip.write_all(
        br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
    )
    .unwrap();
    zip.start_file("OEBPS/content.opf", deflated).unwrap();
    zip.write_all(opf.as_bytes()).unwrap();
    zip.start_file("OEBPS/ch1.xhtml", deflated).unwrap();
    zip.write_all(b"<html><body><p>Once upon a time</p></body></html>").unwrap();
    zip.start_file("OEBPS/images/front.jpg", stored).unwrap();
    zip.write_all(JPEG).unwrap();
    zip.finish().unwrap().into_inner()
}

// =============================================================================
// PDF
// =============================================================================

pub fn pdf_bytes(title: &str, xmp: Option<&str>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    };
    if let Some(xmp) = xmp {
        let stream = Stream::new(
            dictionary! { "Type" => "Metadata", "Subtype" => "XML" },
            xmp.as_bytes().to_vec(),
        );
        catalog.set("Metadata", Object::Reference(doc.add_object(stream)));
    }
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(title),
        "Author" => Object::string_literal("Info Author"),
    });
    doc.trailer.set("Info", Object::Reference(info_id));

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

pub const XMP_CREATORS: &str = r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/">
  <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
    <rdf:Description rdf:about="" xmlns:dc="http://purl.org/dc/elements/1.1/">
      <dc:creator><rdf:Seq><rdf:li>Zed</rdf:li><rdf:li>Amy</rdf:li><rdf:li>Max</rdf:li></rdf:Seq></dc:creator>
      <dc:title><rdf:Alt><rdf:li xml:lang="x-default">Packet Title</rdf:li></rdf:Alt></dc:title>
    </rdf:Description>
  </rdf:RDF>
</x:xmpmeta>
<?xpacket end="w"?>"#;

// =============================================================================
// MOBI
// =============================================================================

fn put(data: &mut [u8], at: usize, value: u32) {
    data[at..at + 4].copy_from_slice(&value.to_be_bytes());
}

/// A three-record BOOKMOBI file: header, one text record, one JPEG
pub fn mobi_bytes(title: &str, exth: &[ExthRecord]) -> Vec<u8> {
    let header_len = 232usize;
    let mut rec0 = vec![0u8; 16 + header_len];
    rec0[16..20].copy_from_slice(b"MOBI");
    put(&mut rec0, 20, header_len as u32);
    put(&mut rec0, 28, 65001);
    put(&mut rec0, 108, 2);
    put(&mut rec0, 128, 0x40);
    rec0.extend_from_slice(&encode_exth(exth));
    let name_offset = rec0.len();
    rec0.extend_from_slice(title.as_bytes());
    rec0.extend_from_slice(&[0, 0]);
    while rec0.len() % 4 != 0 {
        rec0.push(0);
    }
    put(&mut rec0, 84, name_offset as u32);
    put(&mut rec0, 88, title.len() as u32);

    let records: [&[u8]; 3] = [&rec0, b"<html><body>text</body></html>", JPEG];
    let mut out = vec![0u8; 78];
    let short: Vec<u8> = title.bytes().take(31).collect();
    out[..short.len()].copy_from_slice(&short);
    out[60..68].copy_from_slice(b"BOOKMOBI");
    out[76..78].copy_from_slice(&(records.len() as u16).to_be_bytes());
    let mut offset = 78 + records.len() * 8 + 2;
    for (i, record) in records.iter().enumerate() {
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&[0, 0, 0, (2 * i) as u8]);
        offset += record.len();
    }
    out.extend_from_slice(&[0, 0]);
    for record in records {
        out.extend_from_slice(record);
    }
    out
}

/// Records of a MOBI file, split by the offsets in its record list
pub fn mobi_records(data: &[u8]) -> Vec<Vec<u8>> {
    let count = u16::from_be_bytes([data[76], data[77]]) as usize;
    let offsets: Vec<usize> = (0..count)
        .map(|i| {
            let at = 78 + i * 8;
            u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]) as usize
        })
        .collect();
    (0..count)
        .map(|i| data[offsets[i]..offsets.get(i + 1).copied().unwrap_or(data.len())].to_vec())
        .collect()
}

// =============================================================================
// Comic books
// =============================================================================

pub fn cbz_bytes(comic_info: Option<&str>) -> Vec<u8> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    zip.start_file("001.jpg", options).unwrap();
    zip.write_all(JPEG).unwrap();
    zip.start_file("002.jpg", options).unwrap();
    zip.write_all(&[0xFF, 0xD8, 0xFF, 0xDB]).unwrap();
    if let Some(info) = comic_info {
        zip.start_file("ComicInfo.xml", options).unwrap();
        zip.write_all(info.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

// =============================================================================
// Files
// =============================================================================

/// Bytes of one archive entry, or `None` when the archive lacks it
pub fn zip_entry(path: &Path, name: &str) -> Option<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    let mut file = archive.by_name(name).ok()?;
    let mut data = Vec::new();
    std::io::Read::read_to_end(&mut file, &mut data).unwrap();
    Some(data)
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> (PathBuf, ResourceRef) {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    let resource = FileResource::shared(&path);
    (path, resource)
}
