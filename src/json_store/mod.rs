//! Per-title JSON override store
//!
//! Two files carry human-curated display text: `/mods2/game_name.json`
//! (flat map of slot directory name to display name) and each title's
//! `mod_name.json` (map of mod key to display name and description).
//! Every operation is a read-modify-rewrite of the whole file; a missing
//! file reads as `{}` and is created on first write.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Display overrides for one mod, keyed by `mod_name` or `mod_name[X]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModOverride {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

/// One JSON override file, rewritten wholesale on every mutation.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the file; absent file is an empty object, malformed file is an
    /// error (never partially rewritten).
    fn load(&self) -> Result<Map<String, Value>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(_) => return Err(Error::IoRead(self.path.clone())),
        };

        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Unknown(format!("{}: {e}", self.path.display())))?;

        match value {
            Value::Object(map) => Ok(map),
            _ => Err(Error::Unknown(format!(
                "{}: root is not an object",
                self.path.display()
            ))),
        }
    }

    /// Pretty-print and atomically replace the file.
    fn store(&self, map: &Map<String, Value>) -> Result<()> {
        let text = serde_json::to_string_pretty(&Value::Object(map.clone()))
            .map_err(|e| Error::Unknown(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|_| Error::IoCreate(parent.to_path_buf()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text).map_err(|_| Error::IoWrite(tmp.clone()))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|_| Error::IoRename(tmp, self.path.clone()))?;
        Ok(())
    }

    /// Create the file with an empty object if it does not exist yet.
    pub fn ensure_exists(&self) -> Result<()> {
        if !self.path.exists() {
            self.store(&Map::new())?;
        }
        Ok(())
    }

    /// Root-level string lookup. A missing key falls back to the key itself.
    pub fn get_root(&self, key: &str) -> String {
        self.load()
            .ok()
            .and_then(|map| map.get(key).and_then(|v| v.as_str().map(str::to_string)))
            .unwrap_or_else(|| key.to_string())
    }

    /// Nested string lookup (`root_key.nested_key`), empty when absent.
    pub fn get_nested(&self, root_key: &str, nested_key: &str) -> String {
        self.load()
            .ok()
            .and_then(|map| {
                map.get(root_key)
                    .and_then(|v| v.get(nested_key))
                    .and_then(|v| v.as_str().map(str::to_string))
            })
            .unwrap_or_default()
    }

    /// Typed lookup of one mod's overrides, tried under `mod_name` first and
    /// `mod_name[X]` second.
    pub fn get_override(&self, keys: &[String]) -> Option<ModOverride> {
        let map = self.load().ok()?;
        for key in keys {
            if let Some(value) = map.get(key.as_str()) {
                if let Ok(overrides) = serde_json::from_value(value.clone()) {
                    return Some(overrides);
                }
            }
        }
        None
    }

    /// Insert or replace a root-level string value.
    pub fn set_root(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.load()?;
        map.insert(key.to_string(), Value::String(value.to_string()));
        self.store(&map)
    }

    /// Insert or replace a nested string value, creating the root object as
    /// needed.
    pub fn set_nested(&self, root_key: &str, nested_key: &str, value: &str) -> Result<()> {
        let mut map = self.load()?;
        let root = map
            .entry(root_key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match root {
            Value::Object(obj) => {
                obj.insert(nested_key.to_string(), Value::String(value.to_string()));
            }
            other => {
                // A scalar under the root key is replaced by an object.
                let mut obj = Map::new();
                obj.insert(nested_key.to_string(), Value::String(value.to_string()));
                *other = Value::Object(obj);
            }
        }
        self.store(&map)
    }

    /// Rename a root key, failing when the old key is absent.
    pub fn rename_root(&self, old_key: &str, new_key: &str) -> Result<()> {
        let mut map = self.load()?;
        let value = map
            .remove(old_key)
            .ok_or_else(|| Error::Unknown(format!("missing key {old_key}")))?;
        map.insert(new_key.to_string(), value);
        self.store(&map)
    }

    /// Rename a root key, creating a fresh empty object when absent.
    pub fn rename_or_create_root(&self, old_key: &str, new_key: &str) -> Result<()> {
        let mut map = self.load()?;
        let value = map.remove(old_key).unwrap_or_else(|| Value::Object(Map::new()));
        map.insert(new_key.to_string(), value);
        self.store(&map)
    }

    /// Remove a root key. Removing an absent key is a no-op.
    pub fn remove_root(&self, key: &str) -> Result<()> {
        let mut map = self.load()?;
        if map.remove(key).is_some() {
            self.store(&map)?;
        }
        Ok(())
    }

    /// Remove a nested key. Absent root or key is a no-op.
    pub fn remove_nested(&self, root_key: &str, nested_key: &str) -> Result<()> {
        let mut map = self.load()?;
        let mut changed = false;
        if let Some(Value::Object(obj)) = map.get_mut(root_key) {
            changed = obj.remove(nested_key).is_some();
        }
        if changed {
            self.store(&map)?;
        }
        Ok(())
    }
}
