use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::contract::GuideDefinition;

/// Per-target synchronisation settings, read-only to the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub custom_formats: CustomFormatSelection,
    /// Delete remote custom formats that were synced before but are no longer selected.
    #[serde(default)]
    pub delete_old_custom_formats: bool,
}

impl SyncConfig {
    pub fn trace_loaded(&self, target: &str) {
        info!(
            target_name = target,
            include_all = self.custom_formats.include_all,
            trash_ids = self.custom_formats.trash_ids.len(),
            names = self.custom_formats.names.len(),
            excluded = self.custom_formats.exclude.len(),
            delete_old_custom_formats = self.delete_old_custom_formats,
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}

/// Which guide definitions a target wants.
///
/// A definition is selected when `include_all` is set, its trash id is listed
/// in `trash_ids`, or its name is listed in `names` (case-insensitive).
/// Anything matching `exclude` by trash id or name is then removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomFormatSelection {
    #[serde(default)]
    pub include_all: bool,
    #[serde(default)]
    pub trash_ids: Vec<String>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl CustomFormatSelection {
    pub fn selects(&self, definition: &GuideDefinition) -> bool {
        let included = self.include_all
            || self.trash_ids.iter().any(|id| *id == definition.content_id)
            || self
                .names
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&definition.name));

        included && !self.excludes(definition)
    }

    fn excludes(&self, definition: &GuideDefinition) -> bool {
        self.exclude.iter().any(|entry| {
            *entry == definition.content_id || entry.eq_ignore_ascii_case(&definition.name)
        })
    }

    /// Configured trash ids and names that match no definition at all.
    pub fn unmatched(&self, definitions: &[GuideDefinition]) -> Vec<String> {
        let missing_ids = self
            .trash_ids
            .iter()
            .filter(|id| !definitions.iter().any(|d| d.content_id == **id));
        let missing_names = self.names.iter().filter(|name| {
            !definitions
                .iter()
                .any(|d| d.name.eq_ignore_ascii_case(name))
        });
        missing_ids.chain(missing_names).cloned().collect()
    }
}
