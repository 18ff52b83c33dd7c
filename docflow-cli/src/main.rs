use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docflow_core::{Collect, Document, HydrateMode, Hydrator, Key, LogLevel, Scalar, WildcardMatch};
use serde_json::Value;
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "docflow")]
#[command(about = "docflow CLI - aggregate, hydrate and inspect JSON documents")]
#[command(version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "DOCFLOW_LOG", default_value = "warn")]
    log_level: LogLevel,

    /// Pretty-print the JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline over a list of documents
    Aggregate {
        /// Pipeline spec (.json)
        pipeline: PathBuf,
        /// Input file, a JSON array of documents (stdin if omitted or "-")
        input: Option<PathBuf>,
        /// Read one document per line instead of a JSON array
        #[arg(long)]
        ndjson: bool,
    },
    /// Bind a document against a template
    Hydrate {
        /// Template document (.json)
        template: PathBuf,
        /// Input document (stdin if omitted or "-")
        input: Option<PathBuf>,
        /// Omit template fields missing from the input
        #[arg(long)]
        populate: bool,
        /// Keep input scalar types instead of casting to the template's
        #[arg(long)]
        no_coerce: bool,
    },
    /// Print the "/"-joined leaf map of a document
    Flatten {
        /// Input document (stdin if omitted or "-")
        input: Option<PathBuf>,
        /// Only leaves whose path matches this pattern ("*" matches anything)
        #[arg(long)]
        pattern: Option<String>,
        /// With --pattern, print a path -> value map instead of a value list
        #[arg(long)]
        keyed: bool,
    },
    /// Layer several JSON files, later files overriding earlier ones
    Merge {
        /// Files to merge, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Drop null and empty-string leaves while loading
        #[arg(long)]
        clean: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.to_level_filter())
        .init();
    docflow_core::set_log_level(cli.log_level);

    let output = match cli.command {
        Commands::Aggregate {
            pipeline,
            input,
            ndjson,
        } => aggregate(&pipeline, input.as_deref(), ndjson)?,
        Commands::Hydrate {
            template,
            input,
            populate,
            no_coerce,
        } => hydrate(&template, input.as_deref(), populate, !no_coerce)?,
        Commands::Flatten {
            input,
            pattern,
            keyed,
        } => flatten(input.as_deref(), pattern.as_deref(), keyed)?,
        Commands::Merge { files, clean } => merge(&files, clean)?,
    };

    let json = if cli.pretty {
        output.to_json_pretty()
    } else {
        output.to_json()
    };
    let json = json.with_context(|| "Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn is_stdin(path: Option<&Path>) -> bool {
    path.map_or(true, |p| p.as_os_str() == "-")
}

fn read_text(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) if !is_stdin(path) => {
            fs::read_to_string(p).with_context(|| format!("Failed to read file: {}", p.display()))
        }
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .with_context(|| "Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn read_document(path: Option<&Path>, clean: bool) -> Result<Document> {
    let text = read_text(path)?;
    let name = path.map_or("<stdin>".into(), |p| p.display().to_string());
    let doc = if clean {
        Document::from_json_clean(&text)
    } else {
        Document::from_json(&text)
    };
    doc.with_context(|| format!("Invalid JSON in: {}", name))
}

/// Run the pipeline; NDJSON input is streamed row by row
fn aggregate(pipeline: &Path, input: Option<&Path>, ndjson: bool) -> Result<Document> {
    let spec_text = fs::read_to_string(pipeline)
        .with_context(|| format!("Failed to read pipeline: {}", pipeline.display()))?;
    let spec: Value = serde_json::from_str(&spec_text)
        .with_context(|| format!("Invalid JSON in: {}", pipeline.display()))?;
    let collect = Collect::from_json(&spec)
        .with_context(|| format!("Invalid pipeline: {}", pipeline.display()))?;

    if !ndjson {
        let rows = match read_document(input, false)? {
            Document::Container(rows) => rows,
            Document::Scalar(_) => anyhow::bail!("Input must be a JSON array of documents"),
        };
        return Ok(collect.values(rows.into_iter().map(|(_, row)| row))?);
    }

    let reader: Box<dyn BufRead> = match input {
        Some(p) if !is_stdin(input) => Box::new(BufReader::new(
            fs::File::open(p).with_context(|| format!("Failed to open: {}", p.display()))?,
        )),
        _ => Box::new(BufReader::new(io::stdin())),
    };
    let rows = reader
        .lines()
        .filter(|line| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
        .map(|line| {
            let line = line.map_err(serde_json::Error::io)?;
            Document::from_json(&line)
        });
    Ok(collect.try_values(rows)?)
}

fn hydrate(template: &Path, input: Option<&Path>, populate: bool, coerce: bool) -> Result<Document> {
    let reference = read_document(Some(template), false)?;
    let doc = read_document(input, false)?;
    let mode = if populate {
        HydrateMode::Populate
    } else {
        HydrateMode::Hydrate
    };
    Ok(Hydrator::new()
        .mode(mode)
        .coerce(coerce)
        .hydrate(&reference, &doc))
}

fn flatten(input: Option<&Path>, pattern: Option<&str>, keyed: bool) -> Result<Document> {
    let doc = read_document(input, false)?;
    let pattern = match pattern {
        Some(p) => p,
        None => return Ok(leaf_map(doc.flatten())),
    };
    Ok(match doc.wildcard_match(pattern, keyed)? {
        WildcardMatch::Values(values) => {
            Document::from(values.into_iter().map(Document::from).collect::<Vec<_>>())
        }
        WildcardMatch::Keyed(map) => leaf_map(map),
    })
}

fn leaf_map(leaves: impl IntoIterator<Item = (String, Scalar)>) -> Document {
    Document::Container(
        leaves
            .into_iter()
            .map(|(path, value)| (Key::Name(path), Document::from(value)))
            .collect(),
    )
}

fn merge(files: &[PathBuf], clean: bool) -> Result<Document> {
    let mut merged = Document::new();
    for file in files {
        log::debug!("merging {}", file.display());
        merged.merge(read_document(Some(file), clean)?);
    }
    Ok(merged)
}
