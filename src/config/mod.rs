//! Application configuration: SD-card layout, system language and the
//! localized strings derived from it.

mod lang;
mod paths;

pub use lang::{format_duration, SetLanguage, Strings};
pub use paths::{Paths, ADD_MOD_SLOT};

/// Application-owned configuration, constructed once at startup and passed
/// by reference to whoever needs it. No global state.
#[derive(Debug, Clone)]
pub struct Config {
    pub paths: Paths,
    pub language: SetLanguage,
    pub strings: Strings,
}

impl Config {
    pub fn new(paths: Paths, language: SetLanguage) -> Self {
        Self {
            paths,
            language,
            strings: Strings::for_language(language),
        }
    }
}
