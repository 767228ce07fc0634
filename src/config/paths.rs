//! SD-card path layout
//!
//! Every location the core touches is derived from one root so tests can
//! point the whole tree at a scratch directory. On hardware the root is `/`
//! (the SD card mount).

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Directory under `/mods2/` that receives mods for not-yet-indexed titles.
pub const ADD_MOD_SLOT: &str = "0000-add-mod-0000";

/// Manages the fixed on-card layout
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    /// Layout rooted at the SD card mount
    pub fn new() -> Self {
        Self { root: PathBuf::from("/") }
    }

    /// Layout rooted at an arbitrary directory (tests, host-side tooling)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Mod tree root: /mods2/
    pub fn mods_root(&self) -> PathBuf {
        self.root.join("mods2")
    }

    /// Drop slot for unindexed mods: /mods2/0000-add-mod-0000/
    pub fn add_mod_slot(&self) -> PathBuf {
        self.mods_root().join(ADD_MOD_SLOT)
    }

    /// Global per-title name overrides: /mods2/game_name.json
    pub fn game_name_json(&self) -> PathBuf {
        self.mods_root().join("game_name.json")
    }

    /// Slot directory for a title: /mods2/<slot>/
    pub fn slot_dir(&self, slot_dirname: &str) -> PathBuf {
        self.mods_root().join(slot_dirname)
    }

    /// Mod root for a title: /mods2/<slot>/<hex16 id>/
    pub fn title_mod_root(&self, slot_dirname: &str, title_id: u64) -> PathBuf {
        self.slot_dir(slot_dirname).join(format!("{title_id:016X}"))
    }

    /// Per-title mod overrides: /mods2/<slot>/<hex16 id>/mod_name.json
    pub fn mod_name_json(&self, slot_dirname: &str, title_id: u64) -> PathBuf {
        self.title_mod_root(slot_dirname, title_id).join("mod_name.json")
    }

    /// Patch overlay root: /atmosphere/
    pub fn atmosphere_root(&self) -> PathBuf {
        self.root.join("atmosphere")
    }

    /// /atmosphere/contents/
    pub fn atmosphere_contents(&self) -> PathBuf {
        self.atmosphere_root().join("contents")
    }

    /// /atmosphere/exefs_patches/
    pub fn atmosphere_exefs_patches(&self) -> PathBuf {
        self.atmosphere_root().join("exefs_patches")
    }

    /// Binary title cache: /switch/nxtc_version.bin
    pub fn title_cache_file(&self) -> PathBuf {
        self.root.join("switch").join("nxtc_version.bin")
    }

    /// Create the directories the app expects on first launch.
    ///
    /// `/mods2/` and the add-mod slot are auto-created; everything under
    /// `/atmosphere/` is created lazily by the transfer engine.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [self.mods_root(), self.add_mod_slot()] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                tracing::warn!("failed to create {}: {e}", dir.display());
                Error::IoCreate(dir.clone())
            })?;
        }
        Ok(())
    }

    /// True when `path` sits strictly below one of the two writable
    /// atmosphere roots. The transfer engine refuses to touch anything else.
    pub fn is_under_patch_roots(&self, path: &Path) -> bool {
        let contents = self.atmosphere_contents();
        let exefs = self.atmosphere_exefs_patches();
        (path.starts_with(&contents) && path != contents)
            || (path.starts_with(&exefs) && path != exefs)
    }
}
