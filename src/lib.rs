//! nxmodman - mod manager core for Atmosphere-based Switch homebrew
//!
//! This crate provides the data layers of an on-console mod manager:
//! - Title catalogue with a CRC-checked binary metadata cache
//! - Per-title mod catalogue driven by directory-name state
//! - Install/uninstall transfer engine targeting the /atmosphere/ overlay
//! - Priority-scheduled icon loading with a per-frame budget
//! - JSON override store for curated display names and descriptions
//!
//! Rendering, input and audio belong to the embedding application; the
//! crate exposes progress channels and record vectors for a UI to poll.

pub const APP_VERSION: &str = "0.1.0";

pub mod config;
pub mod error;
pub mod json_store;
pub mod loader;
pub mod mods;
pub mod mtp;
pub mod sort;
pub mod task;
pub mod titles;

pub use config::Config;
pub use error::{Error, Result};
