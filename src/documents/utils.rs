//! Stable identifiers, dataset JSON I/O, and directory helpers shared by the chunkers.

use serde::Serialize;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::path::Path;
use walkdir::WalkDir;

use super::types::ProcessorError;

/// Compute a deterministic chunk identifier from its provenance.
///
/// The hash covers the source file name, the chunk's sequence index, and the
/// first 50 characters of content, so re-processing the same file yields the
/// same IDs in the same order.
pub fn stable_chunk_id(file_name: &str, index: usize, content: &str) -> String {
    let prefix: String = content.chars().take(50).collect();
    digest(&format!("{file_name}_{index}_{prefix}"))
}

/// Compute a deterministic document identifier from the file name.
pub fn stable_doc_id(file_name: &str) -> String {
    digest(file_name)
}

fn digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derive a subject label from a file's position under the ingestion root.
///
/// Files directly under the root have no path-derived subject; nested files
/// get their directory path with separators normalized, underscores spaced,
/// and each word title-cased.
pub fn subject_from_path(file_path: &Path, base_dir: &Path) -> Option<String> {
    let parent = file_path.parent()?;
    let rel = parent.strip_prefix(base_dir).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    let joined = rel
        .components()
        .map(|part| title_case(&part.as_os_str().to_string_lossy().replace('_', " ")))
        .collect::<Vec<_>>()
        .join("/");
    Some(joined)
}

fn title_case(input: &str) -> String {
    input
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Build a nested map describing the directory shape under `base_dir`.
///
/// Each directory node lists its subdirectories as nested objects and its
/// files under a `documents` array.
pub fn directory_structure(base_dir: &Path) -> Value {
    let mut root = Map::new();

    for entry in WalkDir::new(base_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
    {
        let Ok(rel) = entry.path().strip_prefix(base_dir) else {
            continue;
        };

        let files: Vec<Value> = std::fs::read_dir(entry.path())
            .map(|dir| {
                let mut names: Vec<String> = dir
                    .filter_map(Result::ok)
                    .filter(|child| child.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                    .map(|child| child.file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                names.into_iter().map(Value::String).collect()
            })
            .unwrap_or_default();

        let node = node_for_path(&mut root, rel);
        if !files.is_empty() {
            node.insert("documents".into(), Value::Array(files));
        }
    }

    Value::Object(root)
}

fn node_for_path<'a>(root: &'a mut Map<String, Value>, rel: &Path) -> &'a mut Map<String, Value> {
    let mut current = root;
    for part in rel.components() {
        let key = part.as_os_str().to_string_lossy().into_owned();
        current = current
            .entry(key)
            .or_insert_with(|| json!({}))
            .as_object_mut()
            .expect("directory nodes are always objects");
    }
    current
}

/// Serialize a dataset (or any record) to pretty-printed JSON on disk.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<(), ProcessorError> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|source| ProcessorError::Json {
            path: path.display().to_string(),
            source,
        })?;
    std::fs::write(path, rendered)?;
    Ok(())
}

/// Load a JSON file into the requested record type.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ProcessorError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|source| ProcessorError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Current timestamp formatted for dataset metadata.
pub fn current_timestamp_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
