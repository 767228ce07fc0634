//! Title catalogue
//!
//! Discovers installed titles by walking the `/mods2/` tree, resolves
//! per-language metadata through the binary cache or a live NS query, and
//! feeds records to the UI one at a time under the shared lock.

mod cache;
mod nacp;

pub use cache::{CachedTitle, TitleCache};
pub use nacp::{
    is_valid_jpeg_icon, ControlData, Nacp, NacpLanguageEntry, NacpProvider,
    NACP_LANGUAGE_ENTRY_COUNT, NACP_MAX_ICON_SIZE,
};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex_lite::Regex;

use crate::config::{Config, ADD_MOD_SLOT};
use crate::json_store::JsonFile;
use crate::loader::{ResourceLoadScheduler, TaskKind};
use crate::sort::pinyin_key;
use crate::task::CancelFlag;

/// 64-bit application id. Games carry `0x01` in the top byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TitleId(pub u64);

impl TitleId {
    pub fn is_game(self) -> bool {
        (self.0 >> 56) == 0x01
    }

    pub fn hex(self) -> String {
        format!("{:016X}", self.0)
    }
}

impl std::fmt::Display for TitleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

/// One installed title and its resolved metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleRecord {
    pub id: TitleId,
    /// Name in the current system language (or the localized placeholder).
    pub display_name: String,
    pub publisher: String,
    /// NACP display_version; the localized NONE text when the title itself
    /// is absent or its NS record unreadable.
    pub display_version: String,
    /// JPEG bytes, possibly empty when no valid icon was available.
    pub icon_jpeg: Vec<u8>,
    /// Directory under /mods2/ grouping this title's mods.
    pub mod_slot_dirname: String,
    /// Display name for the slot, after game_name.json overrides.
    pub slot_display_name: String,
    /// Optional `[version]` suffix parsed from the slot directory name.
    pub mod_slot_version: String,
    /// Decimal count of mod directories under the title's mod root.
    pub mod_count: String,
}

impl TitleRecord {
    /// Installed means the NS record resolved; orphan-mod entries carry the
    /// localized NONE text instead.
    pub fn is_installed(&self, none_game_text: &str) -> bool {
        self.display_version != none_game_text
    }
}

/// Installed titles first, then byte-lex on the localized first-character
/// key of the display name.
pub fn sort_titles(entries: &mut [TitleRecord], none_game_text: &str) {
    entries.sort_by(|a, b| {
        let a_installed = a.is_installed(none_game_text);
        let b_installed = b.is_installed(none_game_text);
        b_installed
            .cmp(&a_installed)
            .then_with(|| pinyin_key(&a.display_name).cmp(&pinyin_key(&b.display_name)))
    });
}

/// Shared catalogue state, owned by the UI thread, appended to by the
/// background scanner under the lock.
#[derive(Default)]
pub struct TitleIndex {
    pub entries: Mutex<Vec<TitleRecord>>,
    /// Flipped once enough records exist for the UI to leave the splash
    /// screen.
    pub initial_batch_ready: AtomicBool,
    pub scan_running: AtomicBool,
}

impl TitleIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Invoked on the UI side (through the load scheduler) for every record
/// that arrived with icon bytes.
pub type IconHook = Arc<dyn Fn(TitleId, Vec<u8>) + Send + Sync>;

/// A slot directory under /mods2/ that points at a title.
#[derive(Debug, Clone)]
struct DiscoveredSlot {
    slot_dirname: String,
    slot_name: String,
    slot_version: String,
    title_id: TitleId,
    mod_count: usize,
}

/// Split `NAME` / `NAME[version]`.
fn parse_slot_dirname(dirname: &str) -> (String, String) {
    let re = Regex::new(r"^(.*)\[([^\[\]]+)\]$").unwrap();
    match re.captures(dirname) {
        Some(caps) => (caps[1].to_string(), caps[2].to_string()),
        None => (dirname.to_string(), String::new()),
    }
}

/// The single 16-hex-digit subdirectory naming the title id.
fn find_title_dir(slot_path: &PathBuf) -> Option<(TitleId, PathBuf)> {
    let entries = std::fs::read_dir(slot_path).ok()?;
    for entry in entries.flatten() {
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.len() == 16 && name.chars().all(|c| c.is_ascii_hexdigit()) {
            if let Ok(id) = u64::from_str_radix(&name, 16) {
                return Some((TitleId(id), entry.path()));
            }
        }
    }
    None
}

/// Non-hidden subdirectories of the title's mod root.
fn count_mod_dirs(title_dir: &PathBuf) -> usize {
    let Ok(entries) = std::fs::read_dir(title_dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| !e.file_name().to_string_lossy().contains('.'))
        .count()
}

/// Background title scanner. Emits one record at a time and keeps the
/// binary cache warm.
pub struct TitleScanner<P> {
    config: Config,
    provider: P,
}

impl<P: NacpProvider> TitleScanner<P> {
    pub fn new(config: Config, provider: P) -> Self {
        Self { config, provider }
    }

    /// Walk `/mods2/`, resolve every slot and append records to `index`.
    ///
    /// Runs on a worker thread; `scheduler`/`icon_hook` receive a
    /// priority-0 icon task per record that carries icon bytes.
    pub fn scan(
        &self,
        index: &TitleIndex,
        scheduler: Option<&ResourceLoadScheduler>,
        icon_hook: Option<IconHook>,
        cancel: &CancelFlag,
    ) {
        index.scan_running.store(true, Ordering::Release);

        let cache_path = self.config.paths.title_cache_file();
        let mut cache = TitleCache::load_or_empty(&cache_path, self.config.language);
        let mut cache_dirty = false;

        let slot_names = JsonFile::new(self.config.paths.game_name_json());
        let slots = self.discover_slots();
        tracing::info!("title scan: {} slot(s) discovered", slots.len());

        let mut emitted = 0usize;
        for slot in slots {
            if cancel.is_stop_requested() {
                break;
            }

            let record = self.resolve_record(&slot, &slot_names, &mut cache, &mut cache_dirty);

            if !record.icon_jpeg.is_empty() {
                if let (Some(scheduler), Some(hook)) = (scheduler, icon_hook.as_ref()) {
                    let hook = Arc::clone(hook);
                    let id = record.id;
                    let icon = record.icon_jpeg.clone();
                    scheduler.submit(0, TaskKind::Icon, move || hook(id, icon));
                }
            }

            {
                let mut entries = index.entries.lock().unwrap();
                entries.push(record);
            }
            emitted += 1;
            if emitted == 4 {
                index.initial_batch_ready.store(true, Ordering::Release);
            }

            // keep shared FS locks breathable
            std::thread::sleep(Duration::from_millis(1));
        }

        if cache_dirty {
            if let Err(e) = cache.flush(&cache_path) {
                tracing::warn!("title cache flush failed, running cacheless: {e}");
                TitleCache::wipe(&cache_path);
            }
        }

        index.initial_batch_ready.store(true, Ordering::Release);
        index.scan_running.store(false, Ordering::Release);
    }

    fn discover_slots(&self) -> Vec<DiscoveredSlot> {
        let mods_root = self.config.paths.mods_root();
        let entries = match std::fs::read_dir(&mods_root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("cannot open {}: {e}", mods_root.display());
                return Vec::new();
            }
        };

        let mut slots = Vec::new();
        for entry in entries.flatten() {
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let dirname = entry.file_name().to_string_lossy().to_string();
            if dirname.starts_with('.') || dirname == ADD_MOD_SLOT {
                continue;
            }

            let Some((title_id, title_dir)) = find_title_dir(&entry.path()) else {
                tracing::debug!("slot {dirname} has no title directory, skipping");
                continue;
            };
            let mod_count = count_mod_dirs(&title_dir);
            if title_id.0 == 0 || mod_count == 0 {
                continue;
            }

            let (slot_name, slot_version) = parse_slot_dirname(&dirname);
            slots.push(DiscoveredSlot {
                slot_dirname: dirname,
                slot_name,
                slot_version,
                title_id,
                mod_count,
            });
        }
        slots
    }

    fn resolve_record(
        &self,
        slot: &DiscoveredSlot,
        slot_names: &JsonFile,
        cache: &mut TitleCache,
        cache_dirty: &mut bool,
    ) -> TitleRecord {
        let strings = &self.config.strings;
        let slot_display_name = slot_names.get_root(&slot.slot_dirname);

        let mut record = TitleRecord {
            id: slot.title_id,
            display_name: slot.slot_name.clone(),
            publisher: strings.unknown.to_string(),
            display_version: strings.none_game.to_string(),
            icon_jpeg: Vec::new(),
            mod_slot_dirname: slot.slot_dirname.clone(),
            slot_display_name,
            mod_slot_version: slot.slot_version.clone(),
            mod_count: slot.mod_count.to_string(),
        };

        if let Some(cached) = cache.get(slot.title_id.0) {
            record.display_name = cached.name.clone();
            record.publisher = cached.publisher.clone();
            record.display_version = cached.version.clone();
            record.icon_jpeg = cached.icon.clone();
            return record;
        }

        match self.provider.control_data(slot.title_id.0) {
            Ok(control) => {
                match control.nacp.resolve_language_entry(self.config.language) {
                    Some(entry) => {
                        record.display_name = if entry.name.is_empty() {
                            strings.unknown.to_string()
                        } else {
                            entry.name.clone()
                        };
                        record.publisher = if entry.publisher.is_empty() {
                            strings.unknown.to_string()
                        } else {
                            entry.publisher.clone()
                        };
                    }
                    None => {
                        record.display_name = strings.unknown.to_string();
                        record.publisher = strings.unknown.to_string();
                    }
                }
                record.display_version = control.nacp.display_version.clone();
                if is_valid_jpeg_icon(&control.icon) {
                    record.icon_jpeg = control.icon.clone();
                }

                if !record.icon_jpeg.is_empty() {
                    cache.insert(CachedTitle {
                        title_id: slot.title_id.0,
                        name: record.display_name.clone(),
                        publisher: record.publisher.clone(),
                        version: record.display_version.clone(),
                        version_info: control.version_info,
                        icon: record.icon_jpeg.clone(),
                    });
                    *cache_dirty = true;
                }
            }
            Err(_) => {
                tracing::debug!("ns query failed for {}", slot.title_id);
                // record keeps the NONE version: orphan mods, title gone
            }
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Paths, SetLanguage};
    use crate::error::Error;
    use std::collections::HashMap;
    use std::path::Path;

    struct FixtureProvider {
        titles: HashMap<u64, ControlData>,
    }

    impl NacpProvider for FixtureProvider {
        fn control_data(&self, title_id: u64) -> crate::error::Result<ControlData> {
            self.titles
                .get(&title_id)
                .cloned()
                .ok_or(Error::NsQueryFailed(title_id))
        }
    }

    fn jpeg_icon() -> Vec<u8> {
        vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]
    }

    fn control(name: &str, publisher: &str, version: &str) -> ControlData {
        let mut data = ControlData {
            icon: jpeg_icon(),
            ..Default::default()
        };
        data.nacp.display_version = version.to_string();
        data.nacp.lang_entries[SetLanguage::EnUs.nacp_slot()] = NacpLanguageEntry {
            name: name.to_string(),
            publisher: publisher.to_string(),
        };
        data
    }

    fn make_slot(root: &Path, slot: &str, id: u64, mods: &[&str]) {
        let title_dir = root.join("mods2").join(slot).join(format!("{id:016X}"));
        std::fs::create_dir_all(&title_dir).unwrap();
        for m in mods {
            std::fs::create_dir_all(title_dir.join(m)).unwrap();
        }
    }

    fn scan_with(
        root: &Path,
        provider: FixtureProvider,
    ) -> (Vec<TitleRecord>, Config) {
        let config = Config::new(Paths::with_root(root), SetLanguage::EnUs);
        let scanner = TitleScanner::new(config.clone(), provider);
        let index = TitleIndex::new();
        scanner.scan(&index, None, None, &CancelFlag::new());
        let entries = index.entries.lock().unwrap().clone();
        (entries, config)
    }

    #[test]
    fn test_title_id_game_check() {
        assert!(TitleId(0x0100000000001000).is_game());
        assert!(!TitleId(0x0200000000001000).is_game());
        assert_eq!(TitleId(0x0100000000001000).hex(), "0100000000001000");
    }

    #[test]
    fn test_slot_dirname_parsing() {
        assert_eq!(
            parse_slot_dirname("Game1[1.0.0]"),
            ("Game1".to_string(), "1.0.0".to_string())
        );
        assert_eq!(parse_slot_dirname("Game1"), ("Game1".to_string(), String::new()));
    }

    #[test]
    fn test_scan_resolves_and_caches() {
        let tmp = tempfile::tempdir().unwrap();
        make_slot(tmp.path(), "Game1[1.0.0]", 0x0100000000001000, &["ModA", "ModB"]);

        let mut titles = HashMap::new();
        titles.insert(0x0100000000001000, control("Game One", "Studio", "1.0.0"));
        let (entries, config) = scan_with(tmp.path(), FixtureProvider { titles });

        assert_eq!(entries.len(), 1);
        let rec = &entries[0];
        assert_eq!(rec.display_name, "Game One");
        assert_eq!(rec.publisher, "Studio");
        assert_eq!(rec.display_version, "1.0.0");
        assert_eq!(rec.mod_count, "2");
        assert_eq!(rec.mod_slot_version, "1.0.0");
        assert_eq!(rec.icon_jpeg, jpeg_icon());

        // second scan resolves from the cache file, no provider needed
        let (entries2, _) = scan_with(tmp.path(), FixtureProvider { titles: HashMap::new() });
        assert_eq!(entries2[0].display_name, "Game One");
        assert!(config.paths.title_cache_file().exists());
    }

    #[test]
    fn test_ns_failure_marks_none_version() {
        let tmp = tempfile::tempdir().unwrap();
        make_slot(tmp.path(), "Gone", 0x0100000000009000, &["ModX"]);
        let (entries, config) = scan_with(tmp.path(), FixtureProvider { titles: HashMap::new() });

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].display_version, config.strings.none_game);
        assert!(!entries[0].is_installed(config.strings.none_game));
        // failed queries must not be cached
        assert!(!config.paths.title_cache_file().exists());
    }

    #[test]
    fn test_scan_skips_empty_and_malformed_slots() {
        let tmp = tempfile::tempdir().unwrap();
        make_slot(tmp.path(), "Good", 0x0100000000001000, &["ModA"]);
        // no mods inside
        make_slot(tmp.path(), "Empty", 0x0100000000002000, &[]);
        // no hex title dir at all
        std::fs::create_dir_all(tmp.path().join("mods2/Stray/not-a-title")).unwrap();

        let mut titles = HashMap::new();
        titles.insert(0x0100000000001000, control("Good Game", "Studio", "1.0"));
        let (entries, _) = scan_with(tmp.path(), FixtureProvider { titles });
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].mod_slot_dirname, "Good");
    }

    #[test]
    fn test_sort_groups_installed_first() {
        let make = |name: &str, version: &str| TitleRecord {
            id: TitleId(1),
            display_name: name.to_string(),
            publisher: String::new(),
            display_version: version.to_string(),
            icon_jpeg: Vec::new(),
            mod_slot_dirname: String::new(),
            slot_display_name: String::new(),
            mod_slot_version: String::new(),
            mod_count: "0".to_string(),
        };
        let mut entries = vec![
            make("Zebra", "NONE"),
            make("中文游戏", "1.0"),
            make("Apple", "1.0"),
        ];
        sort_titles(&mut entries, "NONE");
        assert_eq!(entries[0].display_name, "Apple");
        assert_eq!(entries[1].display_name, "中文游戏"); // ZHONG
        assert_eq!(entries[2].display_name, "Zebra");
    }
}
