//! Info command implementation

use super::resources;
use anyhow::Result;
use folio_core::{CatalogRecord, CodecContext, FieldSet, Format, HandlerRegistry};
use serde::Serialize;

/// Book info output
#[derive(Serialize)]
struct BookInfo {
    file: String,
    format: Option<Format>,
    writable: bool,
    fields: FieldSet,
    record: CatalogRecord,
}

/// Display the metadata of each file
pub fn info(ctx: &CodecContext, files: &[String], json: bool) -> Result<()> {
    let registry = HandlerRegistry::new(ctx.clone());
    let mut infos = Vec::with_capacity(files.len());

    for (file, resource) in files.iter().zip(resources(files)?) {
        let format = Format::detect(resource.as_ref());
        let reader = registry.reader(std::slice::from_ref(&resource));
        let mut reader = reader.borrow_mut();

        let fields = reader.read_metadata();
        let mut record = CatalogRecord::new();
        reader.fill_record(&fields, &mut record);
        drop(reader);

        infos.push(BookInfo {
            file: file.clone(),
            format,
            writable: registry.writer(&[resource]).is_some(),
            fields,
            record,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    for (i, info) in infos.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("File:        {}", info.file);
        match info.format {
            Some(format) => println!("Format:      {:?}", format),
            None => println!("Format:      unknown"),
        }
        println!("Writable:    {}", if info.writable { "yes" } else { "no" });
        if info.fields.is_empty() {
            println!("(no metadata)");
        }
        for field in &info.fields {
            let values: Vec<String> = field.values.iter().map(ToString::to_string).collect();
            let marker = if field.flags.editable { "" } else { " (read-only)" };
            println!("  {}{}: {}", field.name, marker, values.join("; "));
        }
    }

    Ok(())
}
