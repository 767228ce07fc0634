//! Mod transfer engine
//!
//! Moves a mod's payload between its directory under `/mods2/` and the
//! `/atmosphere/` overlay. Two payload shapes exist: a folder tree holding
//! `contents/` and/or `exefs_patches/`, or a single zip archive with the
//! same two names at its first level. Anything else is rejected before a
//! byte is touched.
//!
//! Writes and removals only ever land below `/atmosphere/contents/` and
//! `/atmosphere/exefs_patches/`. A failed or cancelled install rolls back
//! every file it wrote and every directory it created; uninstall is
//! idempotent and prunes emptied directories up to (never through) the two
//! roots.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::ZipArchive;

use crate::config::{Config, Paths, Strings};
use crate::error::{Error, Result};
use crate::mods::progress::ProgressChannel;
use crate::task::CancelFlag;

/// Bulk copy buffer shared across all files of a job.
pub const COPY_BUFFER_SIZE: usize = 8 * 1024 * 1024;
/// Stdio buffer on both ends of a copy.
pub const STDIO_BUFFER_SIZE: usize = 1024 * 1024;
/// Counting-phase progress granularity.
const COUNT_PROGRESS_STEP: usize = 50;
/// Files above this size report intra-file progress.
const INTRA_FILE_THRESHOLD: u64 = 8 * 1024 * 1024;
/// Intra-file progress granularity, percent.
const INTRA_FILE_STEP: u32 = 5;

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Install,
    Uninstall,
}

/// Payload shape of a mod directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// `contents/` and/or `exefs_patches/` directly under the mod dir.
    Folder,
    /// Exactly one `.zip` and nothing else.
    Zip(PathBuf),
}

/// Classify a mod directory, rejecting every other shape.
pub fn detect_payload(mod_dir: &Path) -> Result<Payload> {
    let entries = fs::read_dir(mod_dir).map_err(|_| Error::IoOpen(mod_dir.to_path_buf()))?;

    let mut has_payload_dir = false;
    let mut zips: Vec<PathBuf> = Vec::new();
    let mut other: Option<String> = None;
    let mut total = 0usize;

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        total += 1;
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            if name == "contents" || name == "exefs_patches" {
                has_payload_dir = true;
            } else {
                other = Some(name);
            }
        } else if name.to_lowercase().ends_with(".zip") {
            zips.push(entry.path());
        } else {
            other = Some(name);
        }
    }

    if has_payload_dir && other.is_none() && zips.is_empty() {
        return Ok(Payload::Folder);
    }
    if zips.len() == 1 && !has_payload_dir && other.is_none() && total == 1 {
        return Ok(Payload::Zip(zips.remove(0)));
    }

    Err(Error::StructureInvalid(match other {
        Some(name) => format!("unexpected entry '{name}' in {}", mod_dir.display()),
        None => format!("no usable payload in {}", mod_dir.display()),
    }))
}

/// Strip traversal components from an archive entry path.
fn sanitize_entry_name(name: &str) -> String {
    name.replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect::<Vec<_>>()
        .join("/")
}

fn display_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn is_not_empty_error(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::DirectoryNotEmpty | ErrorKind::AlreadyExists)
}

/// One install/uninstall job against the atmosphere overlay.
///
/// The engine never touches the UI and never renames the mod directory;
/// the caller flips the installed marker after a successful run.
pub struct TransferEngine<'a> {
    paths: &'a Paths,
    strings: &'a Strings,
    progress: &'a ProgressChannel,
    cancel: &'a CancelFlag,
}

impl<'a> TransferEngine<'a> {
    pub fn new(config: &'a Config, progress: &'a ProgressChannel, cancel: &'a CancelFlag) -> Self {
        Self {
            paths: &config.paths,
            strings: &config.strings,
            progress,
            cancel,
        }
    }

    /// Dispatch on the payload shape and run the operation to completion.
    pub fn run(&self, mod_dir: &Path, operation: Operation) -> Result<()> {
        match (detect_payload(mod_dir)?, operation) {
            (Payload::Folder, Operation::Install) => self.install_folder(mod_dir),
            (Payload::Folder, Operation::Uninstall) => self.uninstall_folder(mod_dir),
            (Payload::Zip(zip), Operation::Install) => self.install_zip(&zip),
            (Payload::Zip(zip), Operation::Uninstall) => self.uninstall_zip(&zip),
        }
    }

    fn check_cancel(&self) -> Result<()> {
        if self.cancel.is_stop_requested() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn publish_counting(&self, counted: usize) {
        let label = self.strings.calculating_files.to_string();
        self.progress.publish(|state| {
            state.total_files = counted;
            state.current_file = label;
        });
    }

    // ---- folder install -------------------------------------------------

    fn install_folder(&self, mod_dir: &Path) -> Result<()> {
        self.publish_counting(0);

        let plan = self.collect_folder_payload(mod_dir)?;
        if plan.pairs.is_empty() {
            return Err(Error::StructureInvalid(format!(
                "payload of {} holds no files",
                mod_dir.display()
            )));
        }

        let total = plan.pairs.len();
        let bytes_total = plan.bytes_total;
        self.progress.publish(|state| {
            state.total_files = total;
            state.bytes_total = bytes_total;
        });

        let mut created_dirs = Vec::new();
        if let Err(e) = self.create_directories(&plan.dirs, &mut created_dirs) {
            self.rollback(&[], &created_dirs);
            return Err(e);
        }

        let mut written = Vec::new();
        if let Err(e) = self.copy_files(&plan.pairs, &mut written) {
            self.rollback(&written, &created_dirs);
            return Err(e);
        }

        Ok(())
    }

    /// Walk `exefs_patches/` and `contents/` below the mod dir, pairing
    /// each file with its target and recording every directory to create.
    fn collect_folder_payload(&self, mod_dir: &Path) -> Result<FolderPlan> {
        let atmosphere = self.paths.atmosphere_root();
        let mut plan = FolderPlan {
            dirs: vec![atmosphere.clone()],
            ..Default::default()
        };

        for root in ["exefs_patches", "contents"] {
            let source_root = mod_dir.join(root);
            if !source_root.is_dir() {
                continue;
            }
            plan.dirs.push(atmosphere.join(root));

            for entry in WalkDir::new(&source_root).min_depth(1) {
                self.check_cancel()?;
                let entry = entry.map_err(|_| Error::IoOpen(source_root.clone()))?;
                let relative = entry
                    .path()
                    .strip_prefix(mod_dir)
                    .map_err(|_| Error::IoOpen(entry.path().to_path_buf()))?;
                let target_path = atmosphere.join(relative);

                if entry.file_type().is_dir() {
                    plan.dirs.push(target_path);
                } else if entry.file_type().is_file() {
                    plan.bytes_total += entry.metadata().map(|m| m.len()).unwrap_or(0);
                    plan.pairs.push((entry.path().to_path_buf(), target_path));
                    if plan.pairs.len() % COUNT_PROGRESS_STEP == 0 {
                        self.publish_counting(plan.pairs.len());
                    }
                }
            }
        }
        Ok(plan)
    }

    /// Sorted, deduplicated batch mkdir. An already-existing directory is
    /// success; a fresh one is recorded for rollback.
    fn create_directories(&self, dirs: &[PathBuf], created: &mut Vec<PathBuf>) -> Result<()> {
        let mut sorted: Vec<&PathBuf> = dirs.iter().collect();
        sorted.sort();
        sorted.dedup();

        for dir in sorted {
            self.check_cancel()?;
            match fs::create_dir(dir) {
                Ok(()) => created.push(dir.clone()),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(_) => return Err(Error::IoCreate(dir.clone())),
            }
        }
        Ok(())
    }

    fn copy_files(&self, pairs: &[(PathBuf, PathBuf)], written: &mut Vec<PathBuf>) -> Result<()> {
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let total = pairs.len();

        for (index, (source, target)) in pairs.iter().enumerate() {
            self.check_cancel()?;

            let file_size = fs::metadata(source)
                .map_err(|_| Error::IoOpen(source.clone()))?
                .len();
            let src = File::open(source).map_err(|_| Error::IoOpen(source.clone()))?;
            let mut reader = BufReader::with_capacity(STDIO_BUFFER_SIZE, src);
            let dst = File::create(target).map_err(|_| Error::IoCreate(target.clone()))?;
            written.push(target.clone());
            let mut writer = BufWriter::with_capacity(STDIO_BUFFER_SIZE, dst);

            let name = display_name_of(source);
            let mut copied = 0u64;
            let mut last_percent = 0u32;

            loop {
                self.check_cancel()?;
                let n = reader
                    .read(&mut buffer)
                    .map_err(|_| Error::IoRead(source.clone()))?;
                if n == 0 {
                    break;
                }
                writer
                    .write_all(&buffer[..n])
                    .map_err(|_| Error::IoWrite(target.clone()))?;
                copied += n as u64;

                if file_size > INTRA_FILE_THRESHOLD {
                    let percent = ((copied * 100) / file_size) as u32;
                    if percent >= last_percent + INTRA_FILE_STEP || percent >= 100 {
                        last_percent = percent;
                        let name = name.clone();
                        self.progress.publish(|state| {
                            state.current_file = name;
                            state.file_percent = percent as f32;
                            state.bytes_done += n as u64;
                        });
                        continue;
                    }
                }
                self.progress.publish(|state| state.bytes_done += n as u64);
            }
            writer.flush().map_err(|_| Error::IoWrite(target.clone()))?;

            self.progress.publish(|state| {
                state.files_done = index + 1;
                state.current_file = name;
                state.file_percent = 0.0;
                state.overall_percent = (index + 1) as f32 / total as f32 * 100.0;
            });
        }
        Ok(())
    }

    /// Delete everything a failed install managed to write, then its
    /// directories, deepest first, as long as they emptied out and sit
    /// strictly below the two patch roots.
    fn rollback(&self, written: &[PathBuf], created_dirs: &[PathBuf]) {
        tracing::info!(
            "rolling back install: {} file(s), {} dir(s)",
            written.len(),
            created_dirs.len()
        );
        for path in written {
            let _ = fs::remove_file(path);
        }

        let mut dirs: Vec<&PathBuf> = created_dirs
            .iter()
            .filter(|d| self.paths.is_under_patch_roots(d))
            .collect();
        dirs.sort_by(|a, b| {
            let depth = |p: &Path| p.components().count();
            depth(b).cmp(&depth(a)).then_with(|| b.cmp(a))
        });
        for dir in dirs {
            // fails quietly when a preexisting file keeps it non-empty
            let _ = fs::remove_dir(dir);
        }
    }

    // ---- zip install ----------------------------------------------------

    fn install_zip(&self, zip_path: &Path) -> Result<()> {
        self.publish_counting(0);

        let file = File::open(zip_path).map_err(|_| Error::ZipOpen(zip_path.to_path_buf()))?;
        let mut archive =
            ZipArchive::new(file).map_err(|_| Error::ZipOpen(zip_path.to_path_buf()))?;

        let atmosphere = self.paths.atmosphere_root();
        let mut first_level: BTreeSet<String> = BTreeSet::new();
        let mut dirs: Vec<PathBuf> = vec![atmosphere.clone()];
        let mut files: Vec<ZipFilePlan> = Vec::new();
        let mut bytes_total = 0u64;

        for index in 0..archive.len() {
            self.check_cancel()?;
            let entry = archive
                .by_index(index)
                .map_err(|_| Error::ZipEntryRead(zip_path.to_path_buf()))?;
            let name = sanitize_entry_name(entry.name());
            if name.is_empty() {
                continue;
            }

            let first = name.split('/').next().unwrap_or(&name).to_string();
            first_level.insert(first);

            if !entry.is_dir() {
                let mut prefix = PathBuf::new();
                let components: Vec<&str> = name.split('/').collect();
                for dir_part in &components[..components.len() - 1] {
                    prefix.push(dir_part);
                    dirs.push(atmosphere.join(&prefix));
                }
                bytes_total += entry.size();
                files.push(ZipFilePlan {
                    index,
                    name,
                    crc32: entry.crc32(),
                    size: entry.size(),
                });
            }
        }

        if first_level.is_empty() || first_level.len() > 2 {
            return Err(Error::StructureInvalid(format!(
                "archive {} must hold contents/ and/or exefs_patches/ only",
                zip_path.display()
            )));
        }
        for name in &first_level {
            if name != "contents" && name != "exefs_patches" {
                return Err(Error::StructureInvalid(format!(
                    "archive {} has forbidden first-level entry '{name}'",
                    zip_path.display()
                )));
            }
        }

        let total = files.len();
        self.progress.publish(|state| {
            state.total_files = total;
            state.bytes_total = bytes_total;
        });

        let mut created_dirs = Vec::new();
        if let Err(e) = self.create_directories(&dirs, &mut created_dirs) {
            self.rollback(&[], &created_dirs);
            return Err(e);
        }

        let mut written = Vec::new();
        if let Err(e) =
            self.extract_files(&mut archive, zip_path, &files, &mut written)
        {
            self.rollback(&written, &created_dirs);
            return Err(e);
        }

        Ok(())
    }

    fn extract_files(
        &self,
        archive: &mut ZipArchive<File>,
        zip_path: &Path,
        files: &[ZipFilePlan],
        written: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let atmosphere = self.paths.atmosphere_root();
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let total = files.len();

        for (done, plan) in files.iter().enumerate() {
            self.check_cancel()?;
            let target = atmosphere.join(&plan.name);
            let display = display_name_of(&target);

            // an identical file already on disk is not a conflict
            if target.is_file() && file_crc32(&target, &mut buffer)? == plan.crc32 {
                tracing::debug!("skipping {} (crc match)", target.display());
                let size = plan.size;
                self.progress.publish(|state| {
                    state.files_done = done + 1;
                    state.current_file = display;
                    state.overall_percent = (done + 1) as f32 / total as f32 * 100.0;
                    state.bytes_done += size;
                });
                continue;
            }

            let mut entry = archive
                .by_index(plan.index)
                .map_err(|_| Error::ZipEntryRead(zip_path.to_path_buf()))?;
            let dst = File::create(&target).map_err(|_| Error::IoCreate(target.clone()))?;
            written.push(target.clone());
            let mut writer = BufWriter::with_capacity(STDIO_BUFFER_SIZE, dst);

            loop {
                self.check_cancel()?;
                let n = entry
                    .read(&mut buffer)
                    .map_err(|_| Error::ZipEntryRead(zip_path.to_path_buf()))?;
                if n == 0 {
                    break;
                }
                writer
                    .write_all(&buffer[..n])
                    .map_err(|_| Error::IoWrite(target.clone()))?;
                self.progress.publish(|state| state.bytes_done += n as u64);
            }
            writer.flush().map_err(|_| Error::IoWrite(target.clone()))?;

            self.progress.publish(|state| {
                state.files_done = done + 1;
                state.current_file = display;
                state.overall_percent = (done + 1) as f32 / total as f32 * 100.0;
            });
        }
        Ok(())
    }

    // ---- uninstall ------------------------------------------------------

    fn uninstall_folder(&self, mod_dir: &Path) -> Result<()> {
        self.publish_counting(0);

        let atmosphere = self.paths.atmosphere_root();
        let mut targets = Vec::new();
        for root in ["exefs_patches", "contents"] {
            let source_root = mod_dir.join(root);
            if !source_root.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&source_root).min_depth(1) {
                self.check_cancel()?;
                let entry = entry.map_err(|_| Error::IoOpen(source_root.clone()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(mod_dir)
                    .map_err(|_| Error::IoOpen(entry.path().to_path_buf()))?;
                targets.push(atmosphere.join(relative));
                if targets.len() % COUNT_PROGRESS_STEP == 0 {
                    self.publish_counting(targets.len());
                }
            }
        }

        if targets.is_empty() {
            return Err(Error::StructureInvalid(format!(
                "payload of {} holds no files",
                mod_dir.display()
            )));
        }

        self.remove_targets(&targets)
    }

    fn uninstall_zip(&self, zip_path: &Path) -> Result<()> {
        self.publish_counting(0);

        let file = File::open(zip_path).map_err(|_| Error::ZipOpen(zip_path.to_path_buf()))?;
        let mut archive =
            ZipArchive::new(file).map_err(|_| Error::ZipOpen(zip_path.to_path_buf()))?;

        let atmosphere = self.paths.atmosphere_root();
        let mut entries: Vec<String> = Vec::new();
        for index in 0..archive.len() {
            self.check_cancel()?;
            let entry = archive
                .by_index(index)
                .map_err(|_| Error::ZipEntryRead(zip_path.to_path_buf()))?;
            if entry.is_dir() {
                continue;
            }
            let name = sanitize_entry_name(entry.name());
            if !name.is_empty() {
                entries.push(name);
            }
        }

        // deepest first so directories drain bottom-up
        entries.sort_by(|a, b| {
            let depth = |s: &str| s.matches('/').count();
            depth(b).cmp(&depth(a)).then_with(|| b.cmp(a))
        });

        let targets: Vec<PathBuf> = entries.iter().map(|name| atmosphere.join(name)).collect();
        if targets.is_empty() {
            return Err(Error::StructureInvalid(format!(
                "archive {} holds no files",
                zip_path.display()
            )));
        }

        self.remove_targets(&targets)
    }

    /// Delete cached targets in order, pruning emptied directories upward
    /// each time the containing directory changes. Missing files are fine;
    /// the first real failure is reported after the pass finishes.
    fn remove_targets(&self, targets: &[PathBuf]) -> Result<()> {
        let total = targets.len();
        self.progress.publish(|state| {
            state.total_files = total;
        });

        let mut last_dir: Option<PathBuf> = None;
        let mut first_error: Option<Error> = None;

        for (index, target) in targets.iter().enumerate() {
            self.check_cancel()?;

            let current_dir = target.parent().map(Path::to_path_buf);
            if let (Some(prev), Some(current)) = (&last_dir, &current_dir) {
                if prev != current {
                    self.prune_upward(prev);
                }
            }

            match fs::remove_file(target) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("failed to delete {}: {e}", target.display());
                    if first_error.is_none() {
                        first_error = Some(Error::IoDelete(target.clone()));
                    }
                }
            }

            last_dir = current_dir;
            let display = display_name_of(target);
            self.progress.publish(|state| {
                state.files_done = index + 1;
                state.current_file = display;
                state.overall_percent = (index + 1) as f32 / total as f32 * 100.0;
            });
        }

        if let Some(dir) = &last_dir {
            self.prune_upward(dir);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Walk from `dir` toward `/atmosphere/`, removing empty directories.
    /// Stops at the first non-empty directory and never removes
    /// `/atmosphere/contents`, `/atmosphere/exefs_patches` or anything at
    /// or above the overlay root.
    fn prune_upward(&self, dir: &Path) {
        let atmosphere = self.paths.atmosphere_root();
        let contents = self.paths.atmosphere_contents();
        let exefs = self.paths.atmosphere_exefs_patches();

        let mut current = dir.to_path_buf();
        loop {
            if !current.starts_with(&atmosphere) || current == atmosphere {
                break;
            }
            if current == contents || current == exefs {
                break;
            }
            if let Err(e) = fs::remove_dir(&current) {
                if is_not_empty_error(&e) {
                    break;
                }
                // anything else (already gone, etc.): keep climbing
            }
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }
    }
}

#[derive(Debug, Default)]
struct FolderPlan {
    pairs: Vec<(PathBuf, PathBuf)>,
    dirs: Vec<PathBuf>,
    bytes_total: u64,
}

#[derive(Debug)]
struct ZipFilePlan {
    index: usize,
    name: String,
    crc32: u32,
    size: u64,
}

/// CRC32 (IEEE) of a file, streamed through the shared copy buffer.
fn file_crc32(path: &Path, buffer: &mut [u8]) -> Result<u32> {
    let file = File::open(path).map_err(|_| Error::IoOpen(path.to_path_buf()))?;
    let mut reader = BufReader::with_capacity(STDIO_BUFFER_SIZE, file);
    let mut hasher = crc32fast::Hasher::new();
    loop {
        let n = reader
            .read(buffer)
            .map_err(|_| Error::IoRead(path.to_path_buf()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SetLanguage;
    use std::io::Write as _;
    use zip::write::SimpleFileOptions;

    struct Fixture {
        _tmp: tempfile::TempDir,
        config: Config,
        progress: ProgressChannel,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let config = Config::new(Paths::with_root(tmp.path()), SetLanguage::EnUs);
            Self {
                _tmp: tmp,
                config,
                progress: ProgressChannel::new(),
            }
        }

        fn run(&self, mod_dir: &Path, op: Operation) -> Result<()> {
            let cancel = CancelFlag::new();
            TransferEngine::new(&self.config, &self.progress, &cancel).run(mod_dir, op)
        }

        fn run_cancelled(&self, mod_dir: &Path, op: Operation) -> Result<()> {
            let cancel = CancelFlag::new();
            cancel.request_stop();
            TransferEngine::new(&self.config, &self.progress, &cancel).run(mod_dir, op)
        }

        fn mod_dir(&self, name: &str) -> PathBuf {
            let dir = self
                .config
                .paths
                .title_mod_root("Game1[1.0.0]", 0x0100000000001000)
                .join(name);
            fs::create_dir_all(&dir).unwrap();
            dir
        }

        fn atmosphere_files(&self) -> Vec<PathBuf> {
            let root = self.config.paths.atmosphere_root();
            if !root.exists() {
                return Vec::new();
            }
            let mut files: Vec<PathBuf> = WalkDir::new(&root)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path().to_path_buf())
                .collect();
            files.sort();
            files
        }
    }

    fn write_file(path: &Path, bytes: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    fn make_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, bytes) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_detect_payload_shapes() {
        let fx = Fixture::new();

        let folder = fx.mod_dir("FolderMod");
        fs::create_dir_all(folder.join("contents")).unwrap();
        assert_eq!(detect_payload(&folder).unwrap(), Payload::Folder);

        let zipped = fx.mod_dir("ZipMod");
        make_zip(&zipped.join("mod.ZIP"), &[("contents/a.bin", b"a".as_slice())]);
        assert!(matches!(detect_payload(&zipped).unwrap(), Payload::Zip(_)));

        // zip plus a readme is invalid
        let mixed = fx.mod_dir("Mixed");
        make_zip(&mixed.join("mod.zip"), &[("contents/a.bin", b"a".as_slice())]);
        fs::write(mixed.join("readme.txt"), b"hi").unwrap();
        assert!(matches!(
            detect_payload(&mixed),
            Err(Error::StructureInvalid(_))
        ));

        // contents/ plus an extra file is invalid
        let extra = fx.mod_dir("Extra");
        fs::create_dir_all(extra.join("contents")).unwrap();
        fs::write(extra.join("stray.bin"), b"x").unwrap();
        assert!(matches!(
            detect_payload(&extra),
            Err(Error::StructureInvalid(_))
        ));
    }

    #[test]
    fn test_fresh_folder_install() {
        let fx = Fixture::new();
        let mod_dir = fx.mod_dir("ModA");
        let payload: Vec<u8> = (0u8..10).collect();
        write_file(
            &mod_dir.join("contents/0100000000001000/romfs/a.bin"),
            &payload,
        );

        fx.run(&mod_dir, Operation::Install).unwrap();

        let target = fx
            .config
            .paths
            .atmosphere_contents()
            .join("0100000000001000/romfs/a.bin");
        assert_eq!(fs::read(&target).unwrap(), payload);

        let snap = fx.progress.snapshot();
        assert_eq!(snap.total_files, 1);
        assert_eq!(snap.files_done, 1);
        assert_eq!(snap.overall_percent, 100.0);
    }

    #[test]
    fn test_zip_install_lands_both_trees() {
        let fx = Fixture::new();
        let mod_dir = fx.mod_dir("ModB");
        make_zip(
            &mod_dir.join("mod.zip"),
            &[
                ("contents/abc/1.bin", b"12345".as_slice()),
                ("exefs_patches/p/patch.bin", b"abc".as_slice()),
            ],
        );

        fx.run(&mod_dir, Operation::Install).unwrap();

        let paths = &fx.config.paths;
        assert_eq!(
            fs::read(paths.atmosphere_contents().join("abc/1.bin")).unwrap(),
            b"12345"
        );
        assert_eq!(
            fs::read(paths.atmosphere_exefs_patches().join("p/patch.bin")).unwrap(),
            b"abc"
        );
    }

    #[test]
    fn test_zip_with_foreign_first_level_rejected() {
        let fx = Fixture::new();
        let mod_dir = fx.mod_dir("ModC");
        make_zip(
            &mod_dir.join("mod.zip"),
            &[
                ("contents/x", b"x".as_slice()),
                ("extras/y", b"y".as_slice()),
            ],
        );

        assert!(matches!(
            fx.run(&mod_dir, Operation::Install),
            Err(Error::StructureInvalid(_))
        ));
        assert!(fx.atmosphere_files().is_empty());
    }

    #[test]
    fn test_zip_patches_dir_rejected() {
        let fx = Fixture::new();
        let mod_dir = fx.mod_dir("ModP");
        make_zip(
            &mod_dir.join("mod.zip"),
            &[
                ("contents/x", b"x".as_slice()),
                ("patches/y", b"y".as_slice()),
            ],
        );
        assert!(matches!(
            fx.run(&mod_dir, Operation::Install),
            Err(Error::StructureInvalid(_))
        ));
        assert!(fx.atmosphere_files().is_empty());
    }

    #[test]
    fn test_zip_crc_match_skips_overwrite() {
        let fx = Fixture::new();
        let mod_dir = fx.mod_dir("ModD");
        make_zip(&mod_dir.join("mod.zip"), &[("contents/a.bin", b"same".as_slice())]);

        let target = fx.config.paths.atmosphere_contents().join("a.bin");
        write_file(&target, b"same");
        let mtime_before = fs::metadata(&target).unwrap().modified().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        fx.run(&mod_dir, Operation::Install).unwrap();

        assert_eq!(fs::metadata(&target).unwrap().modified().unwrap(), mtime_before);
        assert_eq!(fs::read(&target).unwrap(), b"same");
    }

    #[test]
    fn test_uninstall_then_reinstall_round_trip() {
        let fx = Fixture::new();
        let mod_dir = fx.mod_dir("ModA");
        write_file(
            &mod_dir.join("contents/0100000000001000/romfs/a.bin"),
            b"payload",
        );

        fx.run(&mod_dir, Operation::Install).unwrap();
        assert_eq!(fx.atmosphere_files().len(), 1);

        fx.run(&mod_dir, Operation::Uninstall).unwrap();
        assert!(fx.atmosphere_files().is_empty());
        // emptied intermediates pruned, roots intact
        assert!(!fx
            .config
            .paths
            .atmosphere_contents()
            .join("0100000000001000")
            .exists());
        assert!(fx.config.paths.atmosphere_contents().exists());

        // idempotent: second uninstall succeeds with nothing to do
        fx.run(&mod_dir, Operation::Uninstall).unwrap();
    }

    #[test]
    fn test_uninstall_leaves_peer_files_and_their_dirs() {
        let fx = Fixture::new();
        let mod_dir = fx.mod_dir("ModA");
        write_file(&mod_dir.join("contents/title/romfs/a.bin"), b"a");

        fx.run(&mod_dir, Operation::Install).unwrap();
        // a peer file from some other mod in the same directory
        let peer = fx.config.paths.atmosphere_contents().join("title/romfs/peer.bin");
        write_file(&peer, b"peer");

        fx.run(&mod_dir, Operation::Uninstall).unwrap();
        assert!(peer.exists());
        assert!(fx.config.paths.atmosphere_contents().join("title/romfs").exists());
    }

    #[test]
    fn test_zip_uninstall_removes_deepest_first() {
        let fx = Fixture::new();
        let mod_dir = fx.mod_dir("ModB");
        make_zip(
            &mod_dir.join("mod.zip"),
            &[
                ("contents/abc/1.bin", b"12345".as_slice()),
                ("exefs_patches/p/patch.bin", b"abc".as_slice()),
            ],
        );

        fx.run(&mod_dir, Operation::Install).unwrap();
        fx.run(&mod_dir, Operation::Uninstall).unwrap();

        assert!(fx.atmosphere_files().is_empty());
        assert!(!fx.config.paths.atmosphere_contents().join("abc").exists());
        assert!(!fx.config.paths.atmosphere_exefs_patches().join("p").exists());
        assert!(fx.config.paths.atmosphere_contents().exists());
        assert!(fx.config.paths.atmosphere_exefs_patches().exists());
    }

    #[test]
    fn test_cancel_before_copy_leaves_disk_untouched() {
        let fx = Fixture::new();
        let mod_dir = fx.mod_dir("ModA");
        write_file(&mod_dir.join("contents/t/a.bin"), b"a");

        let err = fx.run_cancelled(&mod_dir, Operation::Install).unwrap_err();
        assert!(err.is_cancelled());
        assert!(fx.atmosphere_files().is_empty());
        assert!(!fx.config.paths.atmosphere_root().exists());
    }

    #[test]
    fn test_failed_install_rolls_back_files_and_dirs() {
        let fx = Fixture::new();
        let mod_dir = fx.mod_dir("ModA");
        write_file(&mod_dir.join("contents/t/deep/a.bin"), b"a");
        write_file(&mod_dir.join("contents/t/deep/b.bin"), b"b");

        // a directory squatting on b.bin's target path makes the copy fail
        let clash = fx.config.paths.atmosphere_contents().join("t/deep/b.bin");
        fs::create_dir_all(&clash).unwrap();

        let err = fx.run(&mod_dir, Operation::Install).unwrap_err();
        assert!(matches!(err, Error::IoCreate(_)));

        // a.bin was written before the failure and must be gone again
        assert!(fx.atmosphere_files().is_empty());
        // directories created by this install were pruned up to the roots;
        // the squatter keeps its chain alive
        assert!(clash.exists());
    }

    #[test]
    fn test_rollback_prunes_created_dirs_completely() {
        let fx = Fixture::new();
        let mod_dir = fx.mod_dir("ModA");
        // exefs copies first; the contents copy then fails on a squatting
        // directory, so the already-written exefs tree must vanish again
        write_file(&mod_dir.join("exefs_patches/px/a.bin"), b"a");
        write_file(&mod_dir.join("contents/t/b.bin"), b"b");
        let clash = fx.config.paths.atmosphere_contents().join("t/b.bin");
        fs::create_dir_all(&clash).unwrap();

        let result = fx.run(&mod_dir, Operation::Install);
        assert!(result.is_err());
        assert!(fx.atmosphere_files().is_empty());
        assert!(!fx.config.paths.atmosphere_exefs_patches().join("px").exists());
        assert!(fx.config.paths.atmosphere_exefs_patches().exists());
    }

    #[test]
    fn test_uninstall_missing_files_is_success() {
        let fx = Fixture::new();
        let mod_dir = fx.mod_dir("ModA");
        write_file(&mod_dir.join("contents/t/a.bin"), b"a");

        // nothing was ever installed
        fx.run(&mod_dir, Operation::Uninstall).unwrap();
        let snap = fx.progress.snapshot();
        assert_eq!(snap.files_done, 1);
    }

    #[test]
    fn test_progress_counts_files() {
        let fx = Fixture::new();
        let mod_dir = fx.mod_dir("ModA");
        for i in 0..7 {
            write_file(&mod_dir.join(format!("contents/t/f{i}.bin")), b"data");
        }

        fx.run(&mod_dir, Operation::Install).unwrap();
        let snap = fx.progress.snapshot();
        assert_eq!(snap.total_files, 7);
        assert_eq!(snap.files_done, 7);
        assert_eq!(snap.bytes_total, 28);
        assert_eq!(snap.bytes_done, 28);
    }
}
