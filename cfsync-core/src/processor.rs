//! Definition processing: selection, cache join, rename and orphan detection.
//!
//! This stage is pure. Malformed definitions are filtered with a warning rather
//! than failing the run.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CustomFormatCache};
use crate::config::SyncConfig;
use crate::contract::{GuideDefinition, ProcessedDefinition};

/// Output of [`process`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedDefinitions {
    pub processed: Vec<ProcessedDefinition>,
    /// Cache entries with no selected definition left.
    pub orphaned: Vec<CacheEntry>,
    /// `(last known name, guide name)` for cached definitions renamed in the guide.
    pub renamed: Vec<(String, String)>,
    /// Configured trash ids or names that no guide definition carries.
    pub unmatched: Vec<String>,
}

pub fn process(
    definitions: &[GuideDefinition],
    config: &SyncConfig,
    cache: &CustomFormatCache,
) -> ProcessedDefinitions {
    let definitions = dedupe(definitions);
    let unmatched = config.custom_formats.unmatched(&definitions);

    let mut processed = Vec::new();
    let mut renamed = Vec::new();
    for definition in definitions
        .into_iter()
        .filter(|d| config.custom_formats.selects(d))
    {
        let entry = cache.get(&definition.content_id);
        if let Some(entry) = entry {
            if entry.last_known_name != definition.name {
                info!(
                    trash_id = %definition.content_id,
                    old = %entry.last_known_name,
                    new = %definition.name,
                    "Custom format renamed in guide"
                );
                renamed.push((entry.last_known_name.clone(), definition.name.clone()));
            }
        }

        let mut document = definition.document;
        document.insert("name", Value::String(definition.name.clone()));
        processed.push(ProcessedDefinition {
            content_id: definition.content_id,
            name: definition.name,
            document,
            cached_remote_id: entry.map(|e| e.remote_id),
        });
    }

    let retained: HashSet<&str> = processed.iter().map(|p| p.content_id.as_str()).collect();
    let orphaned: Vec<CacheEntry> = cache
        .entries()
        .filter(|entry| !retained.contains(entry.content_id.as_str()))
        .cloned()
        .collect();

    info!(
        processed = processed.len(),
        orphaned = orphaned.len(),
        renamed = renamed.len(),
        unmatched = unmatched.len(),
        "Processed guide custom formats"
    );

    ProcessedDefinitions {
        processed,
        orphaned,
        renamed,
        unmatched,
    }
}

/// Drops malformed definitions and collapses duplicate trash ids.
///
/// The last duplicate wins but takes the position of the first occurrence.
fn dedupe(definitions: &[GuideDefinition]) -> Vec<GuideDefinition> {
    let mut out: Vec<GuideDefinition> = Vec::with_capacity(definitions.len());
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for definition in definitions {
        if definition.content_id.trim().is_empty() || definition.name.trim().is_empty() {
            warn!(
                trash_id = %definition.content_id,
                name = %definition.name,
                "Skipping guide definition without a trash id or name"
            );
            continue;
        }
        match positions.get(definition.content_id.as_str()) {
            Some(&index) => {
                warn!(
                    trash_id = %definition.content_id,
                    kept = %definition.name,
                    replaced = %out[index].name,
                    "Duplicate trash id in guide, keeping the later definition"
                );
                out[index] = definition.clone();
            }
            None => {
                debug!(trash_id = %definition.content_id, name = %definition.name, "Guide definition");
                positions.insert(definition.content_id.as_str(), out.len());
                out.push(definition.clone());
            }
        }
    }
    out
}
