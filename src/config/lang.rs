//! System language handling
//!
//! Maps the platform language setting to NACP language-entry slots and
//! provides the localized strings the catalogue and transfer layers embed
//! in records and progress dialogs.

/// Platform system language, in the order the OS reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SetLanguage {
    Ja = 0,
    EnUs = 1,
    Fr = 2,
    De = 3,
    It = 4,
    Es = 5,
    ZhCn = 6,
    Ko = 7,
    Nl = 8,
    Pt = 9,
    Ru = 10,
    ZhTw = 11,
    EnGb = 12,
    FrCa = 13,
    Es419 = 14,
    ZhHans = 15,
    ZhHant = 16,
    PtBr = 17,
}

impl SetLanguage {
    /// Decode the raw OS value. Unknown values fall back to American English.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Ja,
            1 => Self::EnUs,
            2 => Self::Fr,
            3 => Self::De,
            4 => Self::It,
            5 => Self::Es,
            6 => Self::ZhCn,
            7 => Self::Ko,
            8 => Self::Nl,
            9 => Self::Pt,
            10 => Self::Ru,
            11 => Self::ZhTw,
            12 => Self::EnGb,
            13 => Self::FrCa,
            14 => Self::Es419,
            15 => Self::ZhHans,
            16 => Self::ZhHant,
            17 => Self::PtBr,
            _ => Self::EnUs,
        }
    }

    /// NACP language-entry slot holding this language's name/publisher pair.
    pub fn nacp_slot(self) -> usize {
        match self {
            Self::Ja => 2,
            Self::EnUs => 0,
            Self::Fr => 3,
            Self::De => 4,
            Self::It => 7,
            Self::Es => 6,
            Self::ZhCn | Self::ZhHans => 14,
            Self::Ko => 12,
            Self::Nl => 8,
            Self::Pt => 10,
            Self::Ru => 11,
            Self::ZhTw | Self::ZhHant => 13,
            Self::EnGb => 1,
            Self::FrCa => 9,
            Self::Es419 => 5,
            Self::PtBr => 15,
        }
    }
}

/// Localized strings used by the core.
///
/// Only the strings the data layers need live here; screen text belongs to
/// the UI.
#[derive(Debug, Clone)]
pub struct Strings {
    /// Placeholder when a NACP has no usable name/publisher in any slot.
    pub unknown: &'static str,
    /// display_version of a title whose NS record is absent or corrupt.
    pub none_game: &'static str,
    /// Progress label shown while the uninstall pass counts files.
    pub calculating_files: &'static str,
    /// Final dialog text after a stop request.
    pub cancelled: &'static str,
    /// Final dialog text on success; `{}` receives the elapsed time.
    pub done_fmt: &'static str,
}

impl Strings {
    pub fn for_language(lang: SetLanguage) -> Self {
        match lang {
            SetLanguage::ZhCn | SetLanguage::ZhHans => Self {
                unknown: "[未知]",
                none_game: "无",
                calculating_files: "正在计算文件",
                cancelled: "操作已取消",
                done_fmt: "完成，用时 {}",
            },
            SetLanguage::ZhTw | SetLanguage::ZhHant => Self {
                unknown: "[未知]",
                none_game: "無",
                calculating_files: "正在計算檔案",
                cancelled: "操作已取消",
                done_fmt: "完成，用時 {}",
            },
            SetLanguage::Ja => Self {
                unknown: "[不明]",
                none_game: "なし",
                calculating_files: "ファイルを計算中",
                cancelled: "操作はキャンセルされました",
                done_fmt: "完了 ({})",
            },
            _ => Self {
                unknown: "[UNKNOWN]",
                none_game: "NONE",
                calculating_files: "Calculating files",
                cancelled: "Operation cancelled",
                done_fmt: "Done in {}",
            },
        }
    }

    /// Render the success dialog text with an elapsed duration.
    pub fn done_message(&self, elapsed_secs: f64) -> String {
        self.done_fmt.replace("{}", &format_duration(elapsed_secs))
    }
}

/// Compact h/m/s rendering for the final dialog. Sub-second runs display
/// as "0.1s" so the dialog never shows a zero.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 1.0 {
        return "0.1s".to_string();
    }

    let total = seconds as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{hours}h{minutes}m{secs}s")
    } else if minutes > 0 {
        format!("{minutes}m{secs}s")
    } else {
        format!("{secs}s")
    }
}
