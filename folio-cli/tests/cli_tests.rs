//! Integration tests for the Folio CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

fn folio() -> Command {
    Command::cargo_bin("folio-cli").unwrap()
}

/// Create a minimal EPUB 2 with a declared cover
fn create_test_epub(dir: &TempDir, name: &str, title: &str, author: &str) -> PathBuf {
    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="bookid" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>{title}</dc:title>
    <dc:creator opf:role="aut">{author}</dc:creator>
    <dc:language>en</dc:language>
    <dc:identifier id="bookid">urn:uuid:1b4e28ba-2fa1-11d2-883f-0016d3cca427</dc:identifier>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="cover-img" href="cover.jpg" media-type="image/jpeg"/>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="ch1"/></spine>
</package>"#
    );

    let path = dir.path().join(name);
    let mut zip = ZipWriter::new(fs::File::create(&path).unwrap());
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default();
    zip.start_file("mimetype", stored).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();
    zip.start_file("META-INF/container.xml", deflated).unwrap();
    zip.write_all(
        br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
    )
    .unwrap();
    zip.start_file("content.opf", deflated).unwrap();
    zip.write_all(opf.as_bytes()).unwrap();
    zip.start_file("ch1.xhtml", deflated).unwrap();
    zip.write_all(b"<html><body><p>Text</p></body></html>").unwrap();
    zip.start_file("cover.jpg", stored).unwrap();
    zip.write_all(JPEG).unwrap();
    zip.finish().unwrap();
    path
}

fn create_test_cbz(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut zip = ZipWriter::new(fs::File::create(&path).unwrap());
    zip.start_file("001.jpg", SimpleFileOptions::default()).unwrap();
    zip.write_all(JPEG).unwrap();
    zip.finish().unwrap();
    path
}

fn create_test_html(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(
        &path,
        r#"<!DOCTYPE html><html><head><title>Notes</title><meta name="author" content="Ann"></head><body></body></html>"#,
    )
    .unwrap();
    path
}

fn info_json(path: &PathBuf) -> serde_json::Value {
    let output = folio()
        .args(["info", "--json", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_help() {
    folio()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("info"))
        .stdout(predicate::str::contains("set"))
        .stdout(predicate::str::contains("cover"))
        .stdout(predicate::str::contains("plain"))
        .stdout(predicate::str::contains("batch"));
}

#[test]
fn test_version() {
    folio()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("folio"));
}

#[test]
fn test_set_help() {
    folio()
        .args(["set", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Change metadata fields"))
        .stdout(predicate::str::contains("--field"));
}

#[test]
fn test_info_nonexistent_file() {
    folio()
        .args(["info", "/nonexistent/file.epub"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No such file"));
}

#[test]
fn test_info_html_is_read_only() {
    let temp_dir = TempDir::new().unwrap();
    let input = create_test_html(&temp_dir, "page.html");

    folio()
        .args(["info", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Notes"))
        .stdout(predicate::str::contains("Writable:    no"))
        .stdout(predicate::str::contains("(read-only)"));
}

#[test]
fn test_info_json_output() {
    let temp_dir = TempDir::new().unwrap();
    let input = create_test_epub(&temp_dir, "dune.epub", "Dune", "Frank Herbert");

    let info = info_json(&input);
    assert_eq!(info[0]["format"], "epub");
    assert_eq!(info[0]["writable"], true);
    assert_eq!(info[0]["record"]["title"], "Dune");
    assert_eq!(info[0]["record"]["authors"][0], "Frank Herbert");
}

#[test]
fn test_set_single_file() {
    let temp_dir = TempDir::new().unwrap();
    let input = create_test_epub(&temp_dir, "dune.epub", "Dune", "Frank Herbert");

    folio()
        .args([
            "set",
            input.to_str().unwrap(),
            "--field",
            "title=Dune Messiah",
            "--field",
            "publisher=Chilton",
        ])
        .assert()
        .success();

    let info = info_json(&input);
    assert_eq!(info[0]["record"]["title"], "Dune Messiah");
    let fields = info[0]["fields"].as_array().unwrap();
    assert!(fields.iter().any(|f| f["name"] == "publisher"));
}

#[test]
fn test_set_several_files_by_category() {
    let temp_dir = TempDir::new().unwrap();
    let first = create_test_epub(&temp_dir, "a.epub", "One", "a");
    let second = create_test_epub(&temp_dir, "b.epub", "Two", "a");
    let third = create_test_epub(&temp_dir, "c.epub", "Three", "b");

    folio()
        .args([
            "set",
            first.to_str().unwrap(),
            second.to_str().unwrap(),
            third.to_str().unwrap(),
            "--field",
            "author=c",
        ])
        .assert()
        .success();

    let authors: Vec<serde_json::Value> = [&first, &second, &third]
        .iter()
        .map(|p| info_json(p)[0]["record"]["authors"][0].clone())
        .collect();
    assert_eq!(authors, vec!["c", "c", "b"]);
}

#[test]
fn test_set_several_files_requires_category() {
    let temp_dir = TempDir::new().unwrap();
    let first = create_test_epub(&temp_dir, "a.epub", "One", "a");
    let second = create_test_epub(&temp_dir, "b.epub", "Two", "a");

    folio()
        .args([
            "set",
            first.to_str().unwrap(),
            second.to_str().unwrap(),
            "--field",
            "publisher=X",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a category"));
}

#[test]
fn test_set_read_only_format() {
    let temp_dir = TempDir::new().unwrap();
    let input = create_test_html(&temp_dir, "page.html");

    folio()
        .args(["set", input.to_str().unwrap(), "--field", "title=New"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("read-only"));
}

#[test]
fn test_set_invalid_assignment() {
    folio()
        .args(["set", "/some/file.epub", "--field", "title"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("name=value"));
}

#[test]
fn test_cover_extraction() {
    let temp_dir = TempDir::new().unwrap();
    let input = create_test_epub(&temp_dir, "dune.epub", "Dune", "Frank Herbert");
    let output = temp_dir.path().join("cover.jpg");

    folio()
        .args([
            "cover",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    assert_eq!(fs::read(&output).unwrap(), JPEG);
}

#[test]
fn test_cover_missing() {
    let temp_dir = TempDir::new().unwrap();
    let input = create_test_html(&temp_dir, "page.html");
    let output = temp_dir.path().join("cover.jpg");

    folio()
        .args([
            "cover",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no cover image"));
}

#[test]
fn test_plain_prints_opf() {
    let temp_dir = TempDir::new().unwrap();
    let input = create_test_epub(&temp_dir, "dune.epub", "Dune", "Frank Herbert");

    folio()
        .args(["plain", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("<dc:title>Dune</dc:title>"));
}

#[test]
fn test_plain_store_comic_info() {
    let temp_dir = TempDir::new().unwrap();
    let input = create_test_cbz(&temp_dir, "issue.cbz");
    let document = temp_dir.path().join("ComicInfo.xml");
    fs::write(
        &document,
        "<ComicInfo><Series>Saga</Series><Number>1</Number></ComicInfo>",
    )
    .unwrap();

    folio()
        .args([
            "plain",
            input.to_str().unwrap(),
            "--store",
            document.to_str().unwrap(),
        ])
        .assert()
        .success();

    folio()
        .args(["plain", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("<Series>Saga</Series>"));
}

#[test]
fn test_plain_store_rejects_malformed_document() {
    let temp_dir = TempDir::new().unwrap();
    let input = create_test_cbz(&temp_dir, "issue.cbz");
    let document = temp_dir.path().join("broken.xml");
    fs::write(&document, "<ComicInfo><Series>").unwrap();

    folio()
        .args([
            "plain",
            input.to_str().unwrap(),
            "--store",
            document.to_str().unwrap(),
        ])
        .assert()
        .failure();
}

#[test]
fn test_batch_invalid_jobs() {
    folio()
        .args(["batch", "/some/input/dir", "--jobs", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 1"));
}

#[test]
fn test_batch_empty_directory() {
    let temp_dir = TempDir::new().unwrap();

    folio()
        .args(["batch", temp_dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_batch_with_files() {
    let temp_dir = TempDir::new().unwrap();
    create_test_epub(&temp_dir, "book1.epub", "Book 1", "a");
    create_test_epub(&temp_dir, "book2.epub", "Book 2", "b");
    create_test_html(&temp_dir, "notes.html");
    fs::write(temp_dir.path().join("readme.txt"), "skipped").unwrap();

    let output = folio()
        .args(["batch", temp_dir.path().to_str().unwrap(), "--jobs", "2"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let lines: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["record"]["title"], "Book 1");
    assert_eq!(lines[1]["record"]["title"], "Book 2");
    assert_eq!(lines[2]["format"], "html");
}

#[test]
fn test_invalid_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let input = create_test_html(&temp_dir, "page.html");
    let config = temp_dir.path().join("folio.json");
    fs::write(&config, "{ not json").unwrap();

    folio()
        .args([
            "--config",
            config.to_str().unwrap(),
            "info",
            input.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config file"));
}

#[test]
fn test_config_file_is_applied() {
    let temp_dir = TempDir::new().unwrap();
    let input = create_test_html(&temp_dir, "page.html");
    let config = temp_dir.path().join("folio.json");
    fs::write(&config, r#"{"html_head_window": 4096}"#).unwrap();

    folio()
        .args([
            "--config",
            config.to_str().unwrap(),
            "info",
            input.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ann"));
}

#[test]
fn test_verbose_flag() {
    let temp_dir = TempDir::new().unwrap();
    let input = create_test_html(&temp_dir, "page.html");

    folio()
        .args(["--verbose", "info", input.to_str().unwrap()])
        .assert()
        .success();
}
