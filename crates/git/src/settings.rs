use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendKind;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Git behaviour knobs, stored under the `"git"` key of the host settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSettings {
    /// Prefer `--filter=blob:none` clones when both ends support it.
    pub partial_clone: bool,
    /// After a partial clone, download the remaining objects in the background.
    pub full_clone: bool,
    pub backend: BackendKind,
    pub color: bool,
    pub pager: bool,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            partial_clone: true,
            full_clone: true,
            backend: BackendKind::default(),
            color: false,
            pager: false,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsDocument {
    #[serde(default)]
    git: GitSettings,
}

impl GitSettings {
    /// Load from a settings file, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<SettingsDocument>(&content) {
                Ok(doc) => doc.git,
                Err(e) => {
                    tracing::warn!("Failed to parse settings {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::info!(
                    "No settings at {} ({e}), using defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Write these settings under the `"git"` key, preserving other keys.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let mut doc = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str::<serde_json::Value>(&content)
                .unwrap_or_else(|_| serde_json::Value::Object(Default::default())),
            Err(_) => serde_json::Value::Object(Default::default()),
        };
        if !doc.is_object() {
            doc = serde_json::Value::Object(Default::default());
        }
        if let Some(map) = doc.as_object_mut() {
            map.insert("git".to_string(), serde_json::to_value(self)?);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&doc)?)?;
        Ok(())
    }
}
