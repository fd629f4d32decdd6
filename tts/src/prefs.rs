//! Preferred-voice cache.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::warn;

use crate::error::Result;
use crate::voice::primary_subtag;

type Table = BTreeMap<String, BTreeMap<String, String>>;

/// Remembers which voice the user picked per client and language.
///
/// When backed by a file, the whole table is rewritten as JSON on every
/// update so the choice survives restarts.
#[derive(Debug, Default)]
pub struct PreferredVoices {
    table: RwLock<Table>,
    path: Option<PathBuf>,
}

impl PreferredVoices {
    /// Creates a cache that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the cache from `path`. A missing file yields an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = if path.exists() {
            let content = std::fs::read(&path)?;
            if content.iter().all(u8::is_ascii_whitespace) {
                Table::new()
            } else {
                serde_json::from_slice(&content)?
            }
        } else {
            Table::new()
        };

        Ok(Self {
            table: RwLock::new(table),
            path: Some(path),
        })
    }

    /// Returns the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Looks up the preferred voice for `lang`, falling back to the
    /// preference recorded for its primary subtag.
    pub fn get(&self, client: &str, lang: &str) -> Option<String> {
        let table = self.table.read();
        let langs = table.get(client)?;
        langs
            .get(lang)
            .or_else(|| langs.get(&primary_subtag(lang)))
            .cloned()
    }

    /// Records an explicit voice choice for `lang` and its primary subtag,
    /// then persists the table. Persistence failures are logged.
    pub fn set(&self, client: &str, lang: &str, voice_id: &str) {
        {
            let mut table = self.table.write();
            let langs = table.entry(client.to_string()).or_default();
            langs.insert(lang.to_string(), voice_id.to_string());
            let primary = primary_subtag(lang);
            if !primary.is_empty() {
                langs.insert(primary, voice_id.to_string());
            }
        }

        if let Err(e) = self.save() {
            warn!(error = %e, "tts: failed to persist preferred voices");
        }
    }

    /// Writes the table to the backing file. No-op for in-memory caches.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_vec_pretty(&*self.table.read())?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
