//! Batch metadata listing command implementation

use anyhow::{bail, Result};
use folio_core::{CatalogRecord, CodecContext, FileResource, Format, HandlerRegistry};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// One JSON line of batch output
#[derive(Serialize)]
struct BatchEntry {
    file: String,
    format: Option<Format>,
    fields: usize,
    record: CatalogRecord,
}

/// Read every supported file of `input_dir` in parallel and print one JSON
/// line per file, in file name order
pub fn batch(ctx: &CodecContext, input_dir: &str, jobs: usize) -> Result<()> {
    let input_path = Path::new(input_dir);

    // Find all supported files
    let mut files: Vec<PathBuf> = fs::read_dir(input_path)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .and_then(Format::from_extension)
                    .is_some()
        })
        .collect();
    files.sort();

    if files.is_empty() {
        eprintln!("No supported files found in {}", input_dir);
        return Ok(());
    }

    tracing::info!("Found {} files to read", files.len());

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")?
            .progress_chars("##-"),
    );

    let error_count = AtomicUsize::new(0);

    // Configure thread pool
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build_global()
        .ok(); // Ignore if already configured

    // Registries are single-threaded, so each file gets its own
    let entries: Vec<BatchEntry> = files
        .par_iter()
        .filter_map(|path| {
            let entry = process_file(ctx, path);
            if entry.is_none() {
                error_count.fetch_add(1, Ordering::Relaxed);
                tracing::error!("No metadata could be read from {:?}", path);
            }
            progress.inc(1);
            entry
        })
        .collect();

    progress.finish_and_clear();

    for entry in &entries {
        println!("{}", serde_json::to_string(entry)?);
    }

    let errors = error_count.load(Ordering::Relaxed);
    if errors > 0 {
        bail!("Batch completed with {} unreadable files", errors);
    }

    Ok(())
}

fn process_file(ctx: &CodecContext, path: &Path) -> Option<BatchEntry> {
    let resource = FileResource::shared(path);
    let format = Format::detect(resource.as_ref());
    let registry = HandlerRegistry::new(ctx.clone());

    let reader = registry.reader(&[resource]);
    let mut reader = reader.borrow_mut();
    let fields = reader.read_metadata();
    if fields.is_empty() {
        return None;
    }

    let mut record = CatalogRecord::new();
    reader.fill_record(&fields, &mut record);
    tracing::debug!("Read {} fields from {:?}", fields.len(), path);

    Some(BatchEntry {
        file: path.display().to_string(),
        format,
        fields: fields.len(),
        record,
    })
}
