//! Folio CLI - Command-line interface for e-book metadata

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use folio_core::{CodecContext, CodecOptions};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Parse and validate jobs argument (must be at least 1)
fn parse_jobs(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
    if n < 1 {
        Err("jobs must be at least 1".to_string())
    } else {
        Ok(n)
    }
}

/// Parse a `name=value` assignment
fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("'{}' is not of the form name=value", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("field name must not be empty".to_string());
    }
    Ok((name.to_string(), value.to_string()))
}

#[derive(Parser)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON file with codec options
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the metadata of one or more e-books
    Info {
        /// Input files
        #[arg(required = true)]
        files: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change metadata fields; several files are edited by category
    Set {
        /// Input files
        #[arg(required = true)]
        files: Vec<String>,

        /// Assignment of the form name=value (repeatable)
        #[arg(short, long = "field", required = true, value_parser = parse_assignment)]
        fields: Vec<(String, String)>,
    },

    /// Extract the cover image of an e-book
    Cover {
        /// Input file path
        input: String,

        /// Output image path
        #[arg(short, long)]
        output: String,
    },

    /// Print or replace the raw metadata document (OPF, XMP, ComicInfo.xml)
    Plain {
        /// Input file path
        input: String,

        /// Replace the document with the contents of this file
        #[arg(long)]
        store: Option<String>,
    },

    /// Read the metadata of every e-book in a directory as JSON lines
    Batch {
        /// Input directory
        input_dir: String,

        /// Number of parallel jobs (must be at least 1)
        #[arg(short, long, default_value = "4", value_parser = parse_jobs)]
        jobs: usize,
    },
}

fn load_context(config: Option<&PathBuf>) -> Result<CodecContext> {
    let options = match config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            CodecOptions::from_json(&json)
                .with_context(|| format!("Invalid config file: {}", path.display()))?
        }
        None => CodecOptions::default(),
    };
    Ok(CodecContext::new(options))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for command output
    let filter = if cli.verbose {
        "folio_cli=debug,folio_core=debug"
    } else {
        "folio_cli=info,folio_core=warn"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let ctx = load_context(cli.config.as_ref())?;

    match cli.command {
        Commands::Info { files, json } => commands::info(&ctx, &files, json),

        Commands::Set { files, fields } => commands::set(&ctx, &files, &fields),

        Commands::Cover { input, output } => commands::cover(&ctx, &input, &output),

        Commands::Plain { input, store } => commands::plain(&ctx, &input, store.as_deref()),

        Commands::Batch { input_dir, jobs } => commands::batch(&ctx, &input_dir, jobs),
    }
}
