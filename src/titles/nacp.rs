//! NACP metadata model and the platform query seam
//!
//! The NS title registry lives behind [`NacpProvider`] so the catalogue can
//! run against the real OS service on hardware and against fixtures in
//! tests.

use crate::config::SetLanguage;
use crate::error::Result;

/// Language slots in a NACP.
pub const NACP_LANGUAGE_ENTRY_COUNT: usize = 16;

/// Hard cap on an application icon, enforced on both cache reads and
/// NACP-originated writes.
pub const NACP_MAX_ICON_SIZE: usize = 0x20000;

/// One language slot: title name and publisher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NacpLanguageEntry {
    pub name: String,
    pub publisher: String,
}

/// The slice of the application control property we consume.
#[derive(Debug, Clone, Default)]
pub struct Nacp {
    pub lang_entries: [NacpLanguageEntry; NACP_LANGUAGE_ENTRY_COUNT],
    pub display_version: String,
}

impl Nacp {
    /// Pick the name/publisher pair for `language`.
    ///
    /// The mapped slot wins; when both of its strings are empty the slots
    /// are scanned in order for the first non-empty entry. Returns `None`
    /// when every slot is empty (the caller substitutes the localized
    /// placeholder).
    pub fn resolve_language_entry(&self, language: SetLanguage) -> Option<&NacpLanguageEntry> {
        let mapped = &self.lang_entries[language.nacp_slot()];
        if !mapped.name.is_empty() || !mapped.publisher.is_empty() {
            return Some(mapped);
        }
        self.lang_entries
            .iter()
            .find(|entry| !entry.name.is_empty() || !entry.publisher.is_empty())
    }
}

/// Control data returned by the NS query: NACP, the JPEG icon, and the
/// numeric version used for ordering and compatibility checks.
#[derive(Debug, Clone, Default)]
pub struct ControlData {
    pub nacp: Nacp,
    pub icon: Vec<u8>,
    pub version_info: u32,
}

/// Platform NS metadata query.
pub trait NacpProvider {
    /// Fetch control data for a title. Failure marks the record as not
    /// installed rather than aborting the scan.
    fn control_data(&self, title_id: u64) -> Result<ControlData>;
}

/// Icon sanity check: JPEG SOI/EOI markers and the NACP size cap.
pub fn is_valid_jpeg_icon(bytes: &[u8]) -> bool {
    bytes.len() >= 4
        && bytes.len() <= NACP_MAX_ICON_SIZE
        && bytes.starts_with(&[0xFF, 0xD8])
        && bytes.ends_with(&[0xFF, 0xD9])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nacp_with(slot: usize, name: &str, publisher: &str) -> Nacp {
        let mut nacp = Nacp::default();
        nacp.lang_entries[slot] = NacpLanguageEntry {
            name: name.to_string(),
            publisher: publisher.to_string(),
        };
        nacp
    }

    #[test]
    fn test_mapped_slot_wins() {
        let mut nacp = nacp_with(0, "US Name", "US Pub");
        nacp.lang_entries[2] = NacpLanguageEntry {
            name: "JP Name".to_string(),
            publisher: "JP Pub".to_string(),
        };
        let entry = nacp.resolve_language_entry(SetLanguage::Ja).unwrap();
        assert_eq!(entry.name, "JP Name");
    }

    #[test]
    fn test_empty_mapped_slot_falls_back_to_first_non_empty() {
        let nacp = nacp_with(7, "IT Name", "IT Pub");
        let entry = nacp.resolve_language_entry(SetLanguage::EnUs).unwrap();
        assert_eq!(entry.name, "IT Name");
    }

    #[test]
    fn test_all_empty_resolves_to_none() {
        let nacp = Nacp::default();
        assert!(nacp.resolve_language_entry(SetLanguage::EnUs).is_none());
    }

    #[test]
    fn test_icon_validation() {
        let mut icon = vec![0xFF, 0xD8, 0x00, 0x11, 0xFF, 0xD9];
        assert!(is_valid_jpeg_icon(&icon));
        icon[0] = 0x00;
        assert!(!is_valid_jpeg_icon(&icon));
        assert!(!is_valid_jpeg_icon(&[0xFF, 0xD8]));
        let oversized = vec![0u8; NACP_MAX_ICON_SIZE + 1];
        assert!(!is_valid_jpeg_icon(&oversized));
    }
}
