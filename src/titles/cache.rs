//! Binary title cache
//!
//! Persists resolved title metadata (name, publisher, version, icon) at
//! `/switch/nxtc_version.bin` so relaunches do not repeat NS queries. The
//! format is little-endian with a byte-swapped magic, a fixed-size entry
//! table and a 16-aligned blob area; every entry and blob carries a CRC32.
//!
//! The cache fails open: any validation miss deletes the file and the
//! session falls back to live NS queries.

use std::path::Path;

use crate::config::SetLanguage;
use crate::error::{Error, Result};
use crate::titles::nacp::NACP_MAX_ICON_SIZE;

const TITLE_CACHE_MAGIC: &[u8; 4] = b"NXTC";
const TITLE_CACHE_VERSION: u8 = 1;
const TITLE_CACHE_ALIGNMENT: usize = 0x10;
const HEADER_LEN: usize = 0x10;
const ENTRY_LEN: usize = 0x28;

fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// One cached title, strings resolved for the cache's language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTitle {
    pub title_id: u64,
    pub name: String,
    pub publisher: String,
    pub version: String,
    pub version_info: u32,
    pub icon: Vec<u8>,
}

impl CachedTitle {
    fn blob_size(&self) -> usize {
        align_up(self.name.len(), TITLE_CACHE_ALIGNMENT)
            + align_up(self.publisher.len(), TITLE_CACHE_ALIGNMENT)
            + align_up(self.version.len(), TITLE_CACHE_ALIGNMENT)
            + self.icon.len()
    }

    fn is_storable(&self) -> bool {
        self.title_id != 0
            && !self.name.is_empty()
            && !self.publisher.is_empty()
            && !self.version.is_empty()
            && !self.icon.is_empty()
            && self.icon.len() <= NACP_MAX_ICON_SIZE
            && self.name.len() <= u16::MAX as usize
            && self.publisher.len() <= u16::MAX as usize
            && self.version.len() <= u16::MAX as usize
    }
}

/// In-memory title cache bound to one system language.
#[derive(Debug)]
pub struct TitleCache {
    language: SetLanguage,
    entries: Vec<CachedTitle>,
}

impl TitleCache {
    pub fn empty(language: SetLanguage) -> Self {
        Self { language, entries: Vec::new() }
    }

    /// Load the cache file, validating every field and checksum.
    ///
    /// A missing file yields an empty cache. Any corruption (or a language
    /// mismatch after a system-language change) deletes the file and
    /// returns [`Error::CacheCorrupt`].
    pub fn load(path: &Path, language: SetLanguage) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::empty(language));
            }
            Err(_) => return Err(Error::IoRead(path.to_path_buf())),
        };

        match Self::parse(&bytes, language) {
            Some(cache) => Ok(cache),
            None => {
                tracing::warn!("title cache invalid, deleting {}", path.display());
                let _ = std::fs::remove_file(path);
                Err(Error::CacheCorrupt)
            }
        }
    }

    /// Load, falling back to an empty cache on corruption (the file has
    /// already been deleted by then).
    pub fn load_or_empty(path: &Path, language: SetLanguage) -> Self {
        Self::load(path, language).unwrap_or_else(|_| Self::empty(language))
    }

    fn parse(bytes: &[u8], language: SetLanguage) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        if &bytes[0..4] != TITLE_CACHE_MAGIC
            || bytes[4] != TITLE_CACHE_VERSION
            || bytes[5] != language as u8
        {
            return None;
        }
        let entry_count = u32::from_le_bytes(bytes[8..12].try_into().ok()?) as usize;
        if entry_count == 0 {
            return None;
        }

        let entries_len = entry_count.checked_mul(ENTRY_LEN)?;
        let blob_area_start = HEADER_LEN.checked_add(entries_len)?;
        if bytes.len() < blob_area_start {
            return None;
        }
        let blob_area = &bytes[blob_area_start..];

        let mut entries = Vec::with_capacity(entry_count);
        for i in 0..entry_count {
            let raw = &bytes[HEADER_LEN + i * ENTRY_LEN..HEADER_LEN + (i + 1) * ENTRY_LEN];
            entries.push(Self::parse_entry(raw, blob_area)?);
        }

        Some(Self { language, entries })
    }

    fn parse_entry(raw: &[u8], blob_area: &[u8]) -> Option<CachedTitle> {
        let stored_crc = u32::from_le_bytes(raw[36..40].try_into().ok()?);
        let mut zeroed = [0u8; ENTRY_LEN];
        zeroed.copy_from_slice(raw);
        zeroed[36..40].fill(0);
        if crc32fast::hash(&zeroed) != stored_crc {
            return None;
        }

        let title_id = u64::from_le_bytes(raw[0..8].try_into().ok()?);
        let name_len = u16::from_le_bytes(raw[8..10].try_into().ok()?) as usize;
        let publisher_len = u16::from_le_bytes(raw[10..12].try_into().ok()?) as usize;
        let version_len = u16::from_le_bytes(raw[12..14].try_into().ok()?) as usize;
        let version_info = u32::from_le_bytes(raw[16..20].try_into().ok()?);
        let icon_size = u32::from_le_bytes(raw[20..24].try_into().ok()?) as usize;
        let blob_offset = u32::from_le_bytes(raw[24..28].try_into().ok()?) as usize;
        let blob_size = u32::from_le_bytes(raw[28..32].try_into().ok()?) as usize;
        let blob_crc = u32::from_le_bytes(raw[32..36].try_into().ok()?);

        let expected_blob_size = align_up(name_len, TITLE_CACHE_ALIGNMENT)
            + align_up(publisher_len, TITLE_CACHE_ALIGNMENT)
            + align_up(version_len, TITLE_CACHE_ALIGNMENT)
            + icon_size;

        if title_id == 0
            || name_len == 0
            || publisher_len == 0
            || version_len == 0
            || icon_size == 0
            || icon_size > NACP_MAX_ICON_SIZE
            || blob_offset % TITLE_CACHE_ALIGNMENT != 0
            || blob_size != expected_blob_size
        {
            return None;
        }

        let blob = blob_area.get(blob_offset..blob_offset.checked_add(blob_size)?)?;
        if crc32fast::hash(blob) != blob_crc {
            return None;
        }

        let mut cursor = 0usize;
        let mut take_string = |len: usize| -> Option<String> {
            let s = std::str::from_utf8(blob.get(cursor..cursor + len)?).ok()?;
            cursor = align_up(cursor + len, TITLE_CACHE_ALIGNMENT);
            Some(s.to_string())
        };

        let name = take_string(name_len)?;
        let publisher = take_string(publisher_len)?;
        let version = take_string(version_len)?;
        let icon = blob.get(cursor..cursor + icon_size)?.to_vec();

        Some(CachedTitle {
            title_id,
            name,
            publisher,
            version,
            version_info,
            icon,
        })
    }

    /// Serialize and atomically replace the cache file. An empty cache
    /// deletes the file instead (a zero-entry file would be invalid).
    pub fn flush(&self, path: &Path) -> Result<()> {
        if self.entries.is_empty() {
            let _ = std::fs::remove_file(path);
            return Ok(());
        }

        let bytes = self.serialize();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|_| Error::IoCreate(parent.to_path_buf()))?;
        }
        let tmp = path.with_extension("bin.tmp");
        std::fs::write(&tmp, bytes).map_err(|_| Error::IoWrite(tmp.clone()))?;
        std::fs::rename(&tmp, path).map_err(|_| Error::IoRename(tmp, path.to_path_buf()))?;
        Ok(())
    }

    fn serialize(&self) -> Vec<u8> {
        let storable: Vec<&CachedTitle> =
            self.entries.iter().filter(|e| e.is_storable()).collect();

        let entries_len = storable.len() * ENTRY_LEN;
        let mut out = Vec::with_capacity(HEADER_LEN + entries_len);

        out.extend_from_slice(TITLE_CACHE_MAGIC);
        out.push(TITLE_CACHE_VERSION);
        out.push(self.language as u8);
        out.extend_from_slice(&[0u8; 2]);
        out.extend_from_slice(&(storable.len() as u32).to_le_bytes());
        out.extend_from_slice(&[0u8; 4]);

        let mut blob_area: Vec<u8> = Vec::new();
        for entry in &storable {
            let blob_offset = blob_area.len();
            debug_assert!(blob_offset % TITLE_CACHE_ALIGNMENT == 0);

            for field in [entry.name.as_bytes(), entry.publisher.as_bytes(), entry.version.as_bytes()] {
                blob_area.extend_from_slice(field);
                blob_area.resize(align_up(blob_area.len(), TITLE_CACHE_ALIGNMENT), 0);
            }
            blob_area.extend_from_slice(&entry.icon);

            let blob_size = blob_area.len() - blob_offset;
            let blob_crc = crc32fast::hash(&blob_area[blob_offset..]);
            // pad so the next blob starts aligned
            blob_area.resize(align_up(blob_area.len(), TITLE_CACHE_ALIGNMENT), 0);

            let mut raw = [0u8; ENTRY_LEN];
            raw[0..8].copy_from_slice(&entry.title_id.to_le_bytes());
            raw[8..10].copy_from_slice(&(entry.name.len() as u16).to_le_bytes());
            raw[10..12].copy_from_slice(&(entry.publisher.len() as u16).to_le_bytes());
            raw[12..14].copy_from_slice(&(entry.version.len() as u16).to_le_bytes());
            raw[16..20].copy_from_slice(&entry.version_info.to_le_bytes());
            raw[20..24].copy_from_slice(&(entry.icon.len() as u32).to_le_bytes());
            raw[24..28].copy_from_slice(&(blob_offset as u32).to_le_bytes());
            raw[28..32].copy_from_slice(&(blob_size as u32).to_le_bytes());
            raw[32..36].copy_from_slice(&blob_crc.to_le_bytes());
            let entry_crc = crc32fast::hash(&raw);
            raw[36..40].copy_from_slice(&entry_crc.to_le_bytes());
            out.extend_from_slice(&raw);
        }

        out.extend_from_slice(&blob_area);
        out
    }

    pub fn language(&self) -> SetLanguage {
        self.language
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, title_id: u64) -> Option<&CachedTitle> {
        self.entries.iter().find(|e| e.title_id == title_id)
    }

    /// Insert or replace the entry for `entry.title_id`.
    pub fn insert(&mut self, entry: CachedTitle) {
        match self.entries.iter_mut().find(|e| e.title_id == entry.title_id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Delete the cache file outright (forced renewal).
    pub fn wipe(path: &Path) {
        let _ = std::fs::remove_file(path);
    }
}
