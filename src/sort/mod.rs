//! Locale-aware ordering helpers
//!
//! Chinese-mixed names sort by the pinyin of their first character so that
//! CJK titles interleave predictably with Latin ones. Version strings are
//! compared through a canonical form that tolerates the usual formatting
//! drift between slot tags and NACP display versions.

use pinyin::ToPinyin;

/// Sort key for the first character of `text`.
///
/// CJK ideographs map to the uppercase pinyin of their first reading;
/// anything else keys on the raw bytes of the first codepoint. Comparison
/// is plain byte-lex on the returned string.
pub fn pinyin_key(text: &str) -> String {
    let Some(first) = text.chars().next() else {
        return String::new();
    };

    // The upstream reading table mislabels U+4F20; pin it to CHUAN.
    if first == '\u{4F20}' {
        return "CHUAN".to_string();
    }

    match first.to_pinyin() {
        Some(p) => p.plain().to_uppercase(),
        None => first.to_string(),
    }
}

/// Canonical form used for mod-vs-game version compatibility: trimmed,
/// lowercased, leading `v` dropped, dots removed, trailing zeros stripped
/// down to at least one digit.
pub fn canonical_version(version: &str) -> String {
    let mut canon: String = version
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    if let Some(stripped) = canon.strip_prefix('v') {
        canon = stripped.to_string();
    }

    canon.retain(|c| c != '.');

    while canon.len() > 1 && canon.ends_with('0') {
        canon.pop();
    }

    canon
}

/// A mod slot version is compatible with the installed game version when
/// their canonical forms match.
pub fn versions_compatible(mod_version: &str, game_version: &str) -> bool {
    canonical_version(mod_version) == canonical_version(game_version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinyin_key_chuan_correction() {
        assert!(pinyin_key("传说之下").starts_with("CHUAN"));
    }

    #[test]
    fn test_pinyin_key_cjk() {
        assert_eq!(pinyin_key("中文"), "ZHONG");
        assert_eq!(pinyin_key("塞尔达"), "SAI");
    }

    #[test]
    fn test_pinyin_key_latin_passthrough() {
        assert_eq!(pinyin_key("Mario"), "M");
        assert_eq!(pinyin_key("zelda"), "z");
        assert_eq!(pinyin_key(""), "");
    }

    #[test]
    fn test_canonical_version() {
        assert_eq!(canonical_version("v1.0.0"), "1");
        assert_eq!(canonical_version(" V1.2.0 "), "12");
        assert_eq!(canonical_version("1.02"), "102");
        assert_eq!(canonical_version("0.0.0"), "0");
        assert_eq!(canonical_version("0"), "0");
    }

    #[test]
    fn test_versions_compatible() {
        assert!(versions_compatible("v1.0.0", "1.0"));
        assert!(versions_compatible("1.2", "V1.2.0"));
        assert!(!versions_compatible("1.2", "1.3"));
    }
}
