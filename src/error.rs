//! Stable error kinds for the core

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the catalogue, cache and transfer layers.
///
/// The identity of each variant is stable; the user-visible strings are
/// resolved per language by the config layer before display.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open {0}")]
    IoOpen(PathBuf),

    #[error("failed to read {0}")]
    IoRead(PathBuf),

    #[error("failed to write {0}")]
    IoWrite(PathBuf),

    #[error("failed to create {0}")]
    IoCreate(PathBuf),

    #[error("failed to rename {0} to {1}")]
    IoRename(PathBuf, PathBuf),

    #[error("failed to delete {0}")]
    IoDelete(PathBuf),

    #[error("failed to open archive {0}")]
    ZipOpen(PathBuf),

    #[error("failed to read archive entry in {0}")]
    ZipEntryRead(PathBuf),

    #[error("mod structure invalid: {0}")]
    StructureInvalid(String),

    #[error("title cache corrupt")]
    CacheCorrupt,

    #[error("ns metadata query failed for {0:016X}")]
    NsQueryFailed(u64),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Unknown(String),
}

impl Error {
    /// True when the task ended because its stop flag was raised.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
