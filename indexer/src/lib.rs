//! Corpus readers feeding an [`IndexBuilder`].
//!
//! Two layouts are understood: line corpora (one document per line, the
//! document's external id is its 1-based line number) and JSON / JSONL files
//! of `{ "id", "title", "body" }` objects.

use anyhow::{bail, Context, Result};
use ircore::tokenizer::tokenize;
use ircore::{Document, IndexBuilder, InvertedIndex};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Deserialize)]
struct InputDoc {
    id: String,
    #[serde(default)]
    title: String,
    body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CorpusFormat {
    /// Pick by extension: .json/.jsonl are JSON, anything else is a line corpus
    #[default]
    Auto,
    Line,
    Json,
}

impl CorpusFormat {
    fn resolve(self, file: &Path) -> CorpusFormat {
        match self {
            CorpusFormat::Auto => match file.extension().and_then(|s| s.to_str()) {
                Some("json" | "jsonl") => CorpusFormat::Json,
                _ => CorpusFormat::Line,
            },
            other => other,
        }
    }
}

/// Files making up the corpus, in a stable order so document ids are
/// reproducible across builds.
pub fn corpus_files(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("corpus path {} does not exist", input.display());
    }
    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}

/// Reads every document under `input` into `builder`.
pub fn ingest(input: &Path, format: CorpusFormat, builder: &mut IndexBuilder) -> Result<()> {
    let files = corpus_files(input)?;
    let single = files.len() == 1 && input.is_file();
    for file in files {
        let prefix = if single {
            None
        } else {
            Some(file.strip_prefix(input).unwrap_or(&file).display().to_string())
        };
        let before = builder.num_docs();
        match format.resolve(&file) {
            CorpusFormat::Json => ingest_json(&file, builder)?,
            _ => ingest_lines(&file, prefix.as_deref(), builder)?,
        }
        tracing::info!(file = %file.display(), docs = builder.num_docs() - before, "ingested corpus file");
    }
    Ok(())
}

/// Builds a complete index from the corpus at `input`.
pub fn build_index(input: &Path, format: CorpusFormat) -> Result<InvertedIndex> {
    let mut builder = IndexBuilder::new();
    ingest(input, format, &mut builder)?;
    Ok(builder.finish())
}

fn ingest_lines(file: &Path, prefix: Option<&str>, builder: &mut IndexBuilder) -> Result<()> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    for (n, line) in BufReader::new(f).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", file.display()))?;
        let external_id = match prefix {
            Some(p) => format!("{p}:{}", n + 1),
            None => (n + 1).to_string(),
        };
        // blank lines stay as empty documents so ids line up with the file
        builder.add_document(Document::new(tokenize(&line)).with_external_id(external_id))?;
    }
    Ok(())
}

fn ingest_json(file: &Path, builder: &mut IndexBuilder) -> Result<()> {
    let is_jsonl = file.extension().and_then(|s| s.to_str()) == Some("jsonl");
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    if is_jsonl {
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let doc: InputDoc =
                serde_json::from_str(&line).with_context(|| format!("{}:{}: malformed document", file.display(), n + 1))?;
            add_json_doc(doc, builder)?;
        }
        return Ok(());
    }
    let json: serde_json::Value =
        serde_json::from_reader(reader).with_context(|| format!("parsing {}", file.display()))?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                add_json_doc(serde_json::from_value(v)?, builder)?;
            }
        }
        serde_json::Value::Object(_) => add_json_doc(serde_json::from_value(json)?, builder)?,
        _ => tracing::warn!(file = %file.display(), "skipping JSON file without documents"),
    }
    Ok(())
}

fn add_json_doc(doc: InputDoc, builder: &mut IndexBuilder) -> Result<()> {
    let mut tokens = tokenize(&doc.title);
    tokens.extend(tokenize(&doc.body));
    builder.add_document(Document::new(tokens).with_external_id(doc.id))?;
    Ok(())
}
