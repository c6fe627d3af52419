//! Directory-backed [`GuideSource`].
//!
//! The guide publishes one JSON file per custom format, each carrying a
//! `trash_id`, a `name` and the custom format body alongside other `trash_*`
//! metadata. [`DirectoryGuide`] reads every `*.json` file from the configured
//! directories (non-recursively, in file name order) and turns each into a
//! [`GuideDefinition`] with the `trash_*` keys removed.
//!
//! A file that cannot be parsed, or lacks a `trash_id` or `name`, is skipped
//! with a warning. A directory that cannot be listed fails the whole fetch.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::contract::{GuideDefinition, GuideSource};
use crate::document::Document;
use crate::error::GuideError;

#[derive(Debug, Clone)]
pub struct DirectoryGuide {
    paths: Vec<PathBuf>,
}

impl DirectoryGuide {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn load(&self) -> Result<Vec<GuideDefinition>, GuideError> {
        let mut definitions = Vec::new();
        for dir in &self.paths {
            let mut files = json_files(dir)?;
            files.sort();
            for file in files {
                if let Some(definition) = read_definition(&file) {
                    definitions.push(definition);
                }
            }
        }
        info!(count = definitions.len(), "Loaded custom formats from guide");
        Ok(definitions)
    }
}

#[async_trait]
impl GuideSource for DirectoryGuide {
    async fn fetch_definitions(&self) -> Result<Vec<GuideDefinition>, GuideError> {
        self.load()
    }
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>, GuideError> {
    let io_err = |source| GuideError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    Ok(files)
}

fn read_definition(path: &Path) -> Option<GuideDefinition> {
    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str::<Value>(&content).map_err(|e| e.to_string()));
    let value = match parsed {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping unreadable guide file");
            return None;
        }
    };

    let document = match Document::try_from(value) {
        Ok(document) => document,
        Err(_) => {
            warn!(path = %path.display(), "Skipping guide file that is not a JSON object");
            return None;
        }
    };

    let content_id = document.get("trash_id").and_then(Value::as_str).map(str::to_owned);
    let name = document.name().map(str::to_owned);
    let (Some(content_id), Some(name)) = (content_id, name) else {
        warn!(path = %path.display(), "Skipping guide file without trash_id or name");
        return None;
    };

    debug!(path = %path.display(), trash_id = %content_id, name = %name, "Read guide custom format");
    Some(GuideDefinition {
        content_id,
        name,
        document: document.without_guide_properties(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn loads_json_files_and_strips_guide_properties() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("first.json"),
            r#"{"name": "first", "trash_id": "1", "trash_foo": "foo", "extra": "e1"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("second.json"),
            r#"{"name": "second", "trash_id": "2"}"#,
        )
        .unwrap();
        fs::write(dir.path().join("collection_of_cfs.md"), "").unwrap();

        let definitions = DirectoryGuide::new(vec![dir.path().to_path_buf()])
            .load()
            .unwrap();

        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].content_id, "1");
        assert_eq!(definitions[0].name, "first");
        assert_eq!(
            definitions[0].document,
            Document::try_from(json!({"name": "first", "extra": "e1"})).unwrap()
        );
        assert_eq!(definitions[1].content_id, "2");
    }

    #[test]
    fn malformed_files_are_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.json"), "{ not json").unwrap();
        fs::write(dir.path().join("b.json"), "[1, 2]").unwrap();
        fs::write(dir.path().join("c.json"), r#"{"name": "no id"}"#).unwrap();
        fs::write(dir.path().join("d.json"), r#"{"name": "ok", "trash_id": "d"}"#).unwrap();

        let definitions = DirectoryGuide::new(vec![dir.path().to_path_buf()])
            .load()
            .unwrap();

        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].content_id, "d");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let guide = DirectoryGuide::new(vec![dir.path().join("absent")]);
        assert!(matches!(guide.load(), Err(GuideError::Io { .. })));
    }
}
