//! Mod catalogue and transfer
//!
//! A title's mods live as directories under `/mods2/<slot>/<hex id>/`.
//! The directory name is the whole state: an optional trailing type tag
//! (`[F]`, `[G]`, `[C]`, `[P]`, `[B]`) and a trailing `$` marking the mod
//! as currently applied. Records are rebuilt from disk every time the list
//! is entered; install toggles are a single rename performed after the
//! transfer engine succeeds.

mod progress;
mod transfer;

pub use progress::{ProgressChannel, ProgressState};
pub use transfer::{
    detect_payload, Operation, Payload, TransferEngine, COPY_BUFFER_SIZE, STDIO_BUFFER_SIZE,
};

use std::path::{Path, PathBuf};

use regex_lite::Regex;

use crate::error::{Error, Result};
use crate::json_store::JsonFile;
use crate::sort::pinyin_key;

/// Purpose classification embedded in a mod directory name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModTypeTag {
    #[default]
    None,
    Fps,
    Hd,
    Cheat,
    Play,
    Beauty,
}

impl ModTypeTag {
    fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "F" => Some(Self::Fps),
            "G" => Some(Self::Hd),
            "C" => Some(Self::Cheat),
            "P" => Some(Self::Play),
            "B" => Some(Self::Beauty),
            _ => None,
        }
    }

    /// The bracketed text as it appears on disk; empty for untyped mods.
    pub fn text(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Fps => "[F]",
            Self::Hd => "[G]",
            Self::Cheat => "[C]",
            Self::Play => "[P]",
            Self::Beauty => "[B]",
        }
    }
}

/// One mod belonging to a title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModRecord {
    /// Directory name without the type tag and installed marker.
    pub mod_name: String,
    /// Curated name from mod_name.json, else `mod_name`.
    pub display_name: String,
    pub mod_type_tag: ModTypeTag,
    /// True iff the on-disk directory name ends with `$`.
    pub installed: bool,
    /// Absolute path of the mod directory as found on disk.
    pub path: PathBuf,
    /// Curated description from mod_name.json, else empty.
    pub description: String,
}

/// Split a raw directory name into (mod_name, tag, installed).
fn parse_mod_dirname(dirname: &str) -> (String, ModTypeTag, bool) {
    let (stripped, installed) = match dirname.strip_suffix('$') {
        Some(stripped) => (stripped, true),
        None => (dirname, false),
    };

    let re = Regex::new(r"^(.*)\[([^\[\]]+)\]$").unwrap();
    if let Some(caps) = re.captures(stripped) {
        if let Some(tag) = ModTypeTag::from_letter(&caps[2]) {
            return (caps[1].to_string(), tag, installed);
        }
    }
    (stripped.to_string(), ModTypeTag::None, installed)
}

/// Rebuild the record list for one title from its mod root.
///
/// Dotted names are skipped (this also leaves `mod_name.json` alone);
/// display names and descriptions come from the per-title override file.
pub fn scan_mods(title_mod_root: &Path, overrides: &JsonFile) -> Vec<ModRecord> {
    let Ok(entries) = std::fs::read_dir(title_mod_root) else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for entry in entries.flatten() {
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let dirname = entry.file_name().to_string_lossy().to_string();
        if dirname.contains('.') {
            continue;
        }

        let (mod_name, mod_type_tag, installed) = parse_mod_dirname(&dirname);
        let keys = [
            mod_name.clone(),
            format!("{mod_name}{}", mod_type_tag.text()),
        ];
        let curated = overrides.get_override(&keys).unwrap_or_default();

        records.push(ModRecord {
            display_name: if curated.display_name.is_empty() {
                mod_name.clone()
            } else {
                curated.display_name
            },
            mod_name,
            mod_type_tag,
            installed,
            path: entry.path(),
            description: curated.description,
        });
    }

    sort_mods(&mut records);
    records
}

/// Installed first; typed before untyped within each group; typed ordered
/// by tag text; ties by display-name pinyin key.
pub fn sort_mods(records: &mut [ModRecord]) {
    records.sort_by(|a, b| {
        let untyped = |r: &ModRecord| r.mod_type_tag == ModTypeTag::None;
        b.installed
            .cmp(&a.installed)
            .then_with(|| untyped(a).cmp(&untyped(b)))
            .then_with(|| a.mod_type_tag.text().cmp(b.mod_type_tag.text()))
            .then_with(|| pinyin_key(&a.display_name).cmp(&pinyin_key(&b.display_name)))
    });
}

/// Flip the installed marker by renaming the mod directory.
///
/// This is the last step of install/uninstall and the authoritative state
/// change; the engine must have succeeded before it runs. Renaming to the
/// current state is a no-op.
pub fn set_installed(mod_path: &Path, installed: bool) -> Result<PathBuf> {
    let dirname = mod_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| Error::IoRename(mod_path.to_path_buf(), mod_path.to_path_buf()))?;

    let currently = dirname.ends_with('$');
    if currently == installed {
        return Ok(mod_path.to_path_buf());
    }

    let new_name = if installed {
        format!("{dirname}$")
    } else {
        dirname.trim_end_matches('$').to_string()
    };
    let new_path = mod_path.with_file_name(new_name);

    std::fs::rename(mod_path, &new_path)
        .map_err(|_| Error::IoRename(mod_path.to_path_buf(), new_path.clone()))?;
    Ok(new_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, tag: ModTypeTag, installed: bool) -> ModRecord {
        ModRecord {
            mod_name: name.to_string(),
            display_name: name.to_string(),
            mod_type_tag: tag,
            installed,
            path: PathBuf::from(format!("/mods2/G/0100000000001000/{name}")),
            description: String::new(),
        }
    }

    #[test]
    fn test_parse_mod_dirname() {
        assert_eq!(
            parse_mod_dirname("SpeedHack[F]$"),
            ("SpeedHack".to_string(), ModTypeTag::Fps, true)
        );
        assert_eq!(
            parse_mod_dirname("Texture[G]"),
            ("Texture".to_string(), ModTypeTag::Hd, false)
        );
        assert_eq!(
            parse_mod_dirname("Plain$"),
            ("Plain".to_string(), ModTypeTag::None, true)
        );
        assert_eq!(
            parse_mod_dirname("Plain"),
            ("Plain".to_string(), ModTypeTag::None, false)
        );
        // unrecognized tag letters stay part of the name
        assert_eq!(
            parse_mod_dirname("Odd[Z]"),
            ("Odd[Z]".to_string(), ModTypeTag::None, false)
        );
    }

    #[test]
    fn test_scan_reads_state_from_names() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        for dir in ["ModA[F]$", "ModB", "ModC[C]", ".hidden", "has.dot"] {
            std::fs::create_dir_all(root.join(dir)).unwrap();
        }
        std::fs::write(root.join("mod_name.json"), "{}").unwrap();

        let overrides = JsonFile::new(root.join("mod_name.json"));
        let records = scan_mods(root, &overrides);

        assert_eq!(records.len(), 3);
        let a = records.iter().find(|r| r.mod_name == "ModA").unwrap();
        assert!(a.installed);
        assert_eq!(a.mod_type_tag, ModTypeTag::Fps);
        assert!(a.path.ends_with("ModA[F]$"));

        let b = records.iter().find(|r| r.mod_name == "ModB").unwrap();
        assert!(!b.installed);
        assert_eq!(b.display_name, "ModB");
    }

    #[test]
    fn test_scan_applies_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("SpeedHack[F]")).unwrap();

        let overrides = JsonFile::new(root.join("mod_name.json"));
        overrides
            .set_nested("SpeedHack[F]", "display_name", "60 FPS")
            .unwrap();
        overrides
            .set_nested("SpeedHack[F]", "description", "Unlocks the cap")
            .unwrap();

        let records = scan_mods(root, &overrides);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].display_name, "60 FPS");
        assert_eq!(records[0].description, "Unlocks the cap");
    }

    #[test]
    fn test_sort_groups_and_tags() {
        let mut records = vec![
            record("plain", ModTypeTag::None, false),
            record("hd", ModTypeTag::Hd, false),
            record("cheat", ModTypeTag::Cheat, false),
            record("installed-plain", ModTypeTag::None, true),
            record("installed-fps", ModTypeTag::Fps, true),
        ];
        sort_mods(&mut records);

        let names: Vec<&str> = records.iter().map(|r| r.mod_name.as_str()).collect();
        // installed first, typed before untyped, tags in bracket-text order
        assert_eq!(
            names,
            vec!["installed-fps", "installed-plain", "cheat", "hd", "plain"]
        );
    }

    #[test]
    fn test_set_installed_renames_once() {
        let tmp = tempfile::tempdir().unwrap();
        let mod_dir = tmp.path().join("ModA[F]");
        std::fs::create_dir_all(&mod_dir).unwrap();

        let installed = set_installed(&mod_dir, true).unwrap();
        assert!(installed.ends_with("ModA[F]$"));
        assert!(installed.exists());
        assert!(!mod_dir.exists());

        // flipping to the current state changes nothing
        let same = set_installed(&installed, true).unwrap();
        assert_eq!(same, installed);

        let back = set_installed(&installed, false).unwrap();
        assert!(back.ends_with("ModA[F]"));
        assert!(back.exists());
    }
}
