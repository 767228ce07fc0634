//! Filesystem proxy seam for the MTP bridge
//!
//! An optional USB/MTP component can expose parts of the card to a host PC.
//! Its only coupling to the core is this trait; the PTP protocol itself
//! lives outside the crate. [`SdCardFs`] is the standard backend a consumer
//! hands out for `/mods2/`.
//!
//! Write calls are rejected up front on read-only backends: MTP clients
//! tend to ignore the advertised read-only flag and try anyway.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Entry classification for host-side listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
}

/// Open mode for [`FileSystemProxy::open_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOpenMode {
    Read,
    Write,
}

/// The filesystem surface the MTP bridge drives.
///
/// Handles are plain values owned by the bridge; `close_*` exists so
/// backends with real handle tables can release them eagerly.
pub trait FileSystemProxy {
    type FileHandle;
    type DirHandle;

    fn name(&self) -> &str;
    fn is_read_only(&self) -> bool;

    fn total_space(&self, path: &Path) -> Result<u64>;
    fn free_space(&self, path: &Path) -> Result<u64>;
    fn entry_type(&self, path: &Path) -> Result<EntryType>;

    fn create_file(&self, path: &Path, size: u64) -> Result<()>;
    fn delete_file(&self, path: &Path) -> Result<()>;
    fn rename_file(&self, old: &Path, new: &Path) -> Result<()>;
    fn open_file(&self, path: &Path, mode: FileOpenMode) -> Result<Self::FileHandle>;
    fn file_size(&self, handle: &mut Self::FileHandle) -> Result<u64>;
    fn set_file_size(&self, handle: &mut Self::FileHandle, size: u64) -> Result<()>;
    fn read_file(&self, handle: &mut Self::FileHandle, offset: u64, buf: &mut [u8])
        -> Result<usize>;
    fn write_file(&self, handle: &mut Self::FileHandle, offset: u64, buf: &[u8]) -> Result<()>;
    fn close_file(&self, handle: Self::FileHandle);

    fn create_directory(&self, path: &Path) -> Result<()>;
    fn delete_directory_recursively(&self, path: &Path) -> Result<()>;
    fn rename_directory(&self, old: &Path, new: &Path) -> Result<()>;
    fn open_directory(&self, path: &Path) -> Result<Self::DirHandle>;
    fn read_directory(&self, handle: &mut Self::DirHandle) -> Result<Option<(String, EntryType)>>;
    fn entry_count(&self, path: &Path) -> Result<u64>;
    fn close_directory(&self, handle: Self::DirHandle);
}

/// Directory listing cursor for [`SdCardFs`].
pub struct SdDirHandle {
    entries: std::vec::IntoIter<(String, EntryType)>,
}

/// `std::fs` backend rooted at one directory of the card.
pub struct SdCardFs {
    root: PathBuf,
    name: String,
    read_only: bool,
}

impl SdCardFs {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>, read_only: bool) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
            read_only,
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        // host paths arrive absolute; graft them under the exposed root
        let relative: PathBuf = path
            .components()
            .filter(|c| matches!(c, std::path::Component::Normal(_)))
            .collect();
        self.root.join(relative)
    }

    fn guard_writable(&self) -> Result<()> {
        if self.read_only {
            Err(Error::Unknown(format!("{} is read-only", self.name)))
        } else {
            Ok(())
        }
    }
}

impl FileSystemProxy for SdCardFs {
    type FileHandle = File;
    type DirHandle = SdDirHandle;

    fn name(&self) -> &str {
        &self.name
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn total_space(&self, _path: &Path) -> Result<u64> {
        // no statvfs on the exposed surface; report a fixed large volume
        Ok(u64::MAX / 2)
    }

    fn free_space(&self, _path: &Path) -> Result<u64> {
        Ok(u64::MAX / 2)
    }

    fn entry_type(&self, path: &Path) -> Result<EntryType> {
        let full = self.resolve(path);
        let meta = fs::metadata(&full).map_err(|_| Error::IoOpen(full))?;
        Ok(if meta.is_dir() {
            EntryType::Directory
        } else {
            EntryType::File
        })
    }

    fn create_file(&self, path: &Path, size: u64) -> Result<()> {
        self.guard_writable()?;
        let full = self.resolve(path);
        let file = File::create(&full).map_err(|_| Error::IoCreate(full.clone()))?;
        file.set_len(size).map_err(|_| Error::IoWrite(full))?;
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        self.guard_writable()?;
        let full = self.resolve(path);
        fs::remove_file(&full).map_err(|_| Error::IoDelete(full))
    }

    fn rename_file(&self, old: &Path, new: &Path) -> Result<()> {
        self.guard_writable()?;
        let (old, new) = (self.resolve(old), self.resolve(new));
        fs::rename(&old, &new).map_err(|_| Error::IoRename(old, new))
    }

    fn open_file(&self, path: &Path, mode: FileOpenMode) -> Result<File> {
        if mode == FileOpenMode::Write {
            self.guard_writable()?;
        }
        let full = self.resolve(path);
        let file = match mode {
            FileOpenMode::Read => File::open(&full),
            FileOpenMode::Write => OpenOptions::new().read(true).write(true).open(&full),
        };
        file.map_err(|_| Error::IoOpen(full))
    }

    fn file_size(&self, handle: &mut File) -> Result<u64> {
        handle
            .metadata()
            .map(|m| m.len())
            .map_err(|e| Error::Unknown(e.to_string()))
    }

    fn set_file_size(&self, handle: &mut File, size: u64) -> Result<()> {
        self.guard_writable()?;
        handle
            .set_len(size)
            .map_err(|e| Error::Unknown(e.to_string()))
    }

    fn read_file(&self, handle: &mut File, offset: u64, buf: &mut [u8]) -> Result<usize> {
        handle
            .seek(SeekFrom::Start(offset))
            .and_then(|_| handle.read(buf))
            .map_err(|e| Error::Unknown(e.to_string()))
    }

    fn write_file(&self, handle: &mut File, offset: u64, buf: &[u8]) -> Result<()> {
        self.guard_writable()?;
        handle
            .seek(SeekFrom::Start(offset))
            .and_then(|_| handle.write_all(buf))
            .map_err(|e| Error::Unknown(e.to_string()))
    }

    fn close_file(&self, handle: File) {
        drop(handle);
    }

    fn create_directory(&self, path: &Path) -> Result<()> {
        self.guard_writable()?;
        let full = self.resolve(path);
        fs::create_dir(&full).map_err(|_| Error::IoCreate(full))
    }

    fn delete_directory_recursively(&self, path: &Path) -> Result<()> {
        self.guard_writable()?;
        let full = self.resolve(path);
        fs::remove_dir_all(&full).map_err(|_| Error::IoDelete(full))
    }

    fn rename_directory(&self, old: &Path, new: &Path) -> Result<()> {
        self.guard_writable()?;
        let (old, new) = (self.resolve(old), self.resolve(new));
        fs::rename(&old, &new).map_err(|_| Error::IoRename(old, new))
    }

    fn open_directory(&self, path: &Path) -> Result<SdDirHandle> {
        let full = self.resolve(path);
        let entries = fs::read_dir(&full).map_err(|_| Error::IoOpen(full))?;
        let mut listing = Vec::new();
        for entry in entries.flatten() {
            let kind = match entry.file_type() {
                Ok(t) if t.is_dir() => EntryType::Directory,
                Ok(_) => EntryType::File,
                Err(_) => continue,
            };
            listing.push((entry.file_name().to_string_lossy().to_string(), kind));
        }
        listing.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(SdDirHandle {
            entries: listing.into_iter(),
        })
    }

    fn read_directory(&self, handle: &mut SdDirHandle) -> Result<Option<(String, EntryType)>> {
        Ok(handle.entries.next())
    }

    fn entry_count(&self, path: &Path) -> Result<u64> {
        let full = self.resolve(path);
        let entries = fs::read_dir(&full).map_err(|_| Error::IoOpen(full))?;
        Ok(entries.flatten().count() as u64)
    }

    fn close_directory(&self, handle: SdDirHandle) {
        drop(handle);
    }
}
