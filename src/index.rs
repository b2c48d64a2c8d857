//! Examples index aggregation
//!
//! Scans a data directory for generated trace documents and maintains an
//! `examples.json` index the visualization app uses as its menu. Entries are
//! keyed by relative file path: re-running the scan adds new files and keeps
//! existing entries untouched.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Name of the index file, excluded from scans.
pub const INDEX_FILE: &str = "examples.json";

const DESCRIPTION_MAX_LEN: usize = 100;

/// One entry of the examples index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExampleEntry {
    /// Identifier, the file stem
    pub id: String,
    /// "inference" or "training"
    #[serde(rename = "type")]
    pub kind: String,
    /// Prompt (inference) or text excerpt (training)
    pub prompt: String,
    /// Language code
    pub language: String,
    /// Menu description
    pub description: String,
    /// Number of recorded steps
    pub num_tokens: usize,
    /// Name of the model that produced the trace
    pub model_id: String,
    /// Path relative to the data directory
    pub file: String,
    /// Sampling temperature (inference documents only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Candidates per step (inference documents only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    /// Text source (training documents only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// The `examples.json` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExamplesIndex {
    /// All indexed examples
    pub examples: Vec<ExampleEntry>,
}

/// Collect `*.json` files under `dir`, recursively, excluding the index.
fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json")
            && path.file_name().is_some_and(|name| name != INDEX_FILE)
        {
            out.push(path);
        }
    }
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Language from a `lang-001-variant.json` style filename; "en" otherwise.
fn language_from_filename(path: &Path) -> String {
    let stem = file_stem(path);
    match stem.split_once('-') {
        Some((lang, _)) => lang.to_string(),
        None => "en".to_string(),
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() > DESCRIPTION_MAX_LEN {
        let cut: String = text.chars().take(DESCRIPTION_MAX_LEN).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

/// Number of recorded steps in a parsed document.
fn count_steps(data: &Value) -> usize {
    if let Some(steps) = data.get("generation_steps").and_then(Value::as_array) {
        steps.len()
    } else if let Some(steps) = data.get("training_steps").and_then(Value::as_array) {
        steps.len()
    } else {
        data.get("num_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize
    }
}

/// Build an index entry from one parsed document.
fn entry_for(data: &Value, path: &Path, data_dir: &Path) -> ExampleEntry {
    let kind = data
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("inference")
        .to_string();
    let is_inference = data.get("prompt").is_some();

    let (prompt, language, temperature, top_k) = if is_inference {
        (
            data["prompt"].as_str().unwrap_or_default().to_string(),
            data.get("language")
                .and_then(Value::as_str)
                .map_or_else(|| language_from_filename(path), ToString::to_string),
            data.get("temperature").and_then(Value::as_f64).map(|t| t as f32),
            data.get("top_k").and_then(Value::as_u64).map(|k| k as usize),
        )
    } else {
        let text = data.get("text").and_then(Value::as_str).unwrap_or_default();
        (excerpt(text), language_from_filename(path), None, None)
    };

    let file = path
        .strip_prefix(data_dir)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned();

    ExampleEntry {
        id: file_stem(path),
        kind,
        description: prompt.clone(),
        prompt,
        language,
        num_tokens: count_steps(data),
        model_id: data
            .pointer("/model_info/name")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        file,
        temperature,
        top_k,
        source: data
            .get("source")
            .and_then(Value::as_str)
            .map(ToString::to_string),
    }
}

/// Scan `data_dir` and build entries for every parseable trace document,
/// sorted by relative path. Unparseable files are skipped with a warning.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn build_entries(data_dir: &Path) -> Result<Vec<ExampleEntry>> {
    let mut files = Vec::new();
    collect_json_files(data_dir, &mut files)?;
    files.sort();

    let mut entries = Vec::new();
    for path in files {
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable file");
                continue;
            }
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(data) => entries.push(entry_for(&data, &path, data_dir)),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unparseable file");
            }
        }
    }
    Ok(entries)
}

/// Scan `data_dir`, merge with any existing index (existing entries win,
/// keyed by `file`), and write `examples.json` back into the directory.
///
/// Returns `(new_entries, total_entries)`.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or the index cannot be
/// written.
pub fn update_index(data_dir: &Path) -> Result<(usize, usize)> {
    let scanned = build_entries(data_dir)?;

    let index_path = data_dir.join(INDEX_FILE);
    let mut index: ExamplesIndex = match std::fs::read_to_string(&index_path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => ExamplesIndex::default(),
    };

    let existing: std::collections::HashSet<String> =
        index.examples.iter().map(|e| e.file.clone()).collect();
    let fresh: Vec<ExampleEntry> = scanned
        .into_iter()
        .filter(|entry| !existing.contains(&entry.file))
        .collect();
    let added = fresh.len();
    index.examples.extend(fresh);

    std::fs::write(&index_path, serde_json::to_string_pretty(&index)?)?;
    Ok((added, index.examples.len()))
}
