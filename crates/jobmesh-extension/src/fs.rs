// jobmesh-extension/src/fs.rs
// ============================================================================
// Module: Extension Filesystem
// Description: Pluggable filesystem used by the extension manager.
// Purpose: Keep manifest and binary writes testable and atomic.
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`ExtensionFs`] is the seam between the manager and storage. [`OsFs`]
//! writes to disk and applies Unix modes; [`MemoryFs`] keeps everything in
//! memory and records modes so tests can assert them. Writes are atomic:
//! content lands in a sibling temp file that is renamed over the target.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Mode applied to extension binaries.
pub const BINARY_MODE: u32 = 0o755;
/// Mode applied to extension directories.
pub const DIRECTORY_MODE: u32 = 0o750;
/// Mode applied to the manifest.
pub const MANIFEST_MODE: u32 = 0o644;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Filesystem operations needed by the extension manager.
pub trait ExtensionFs: Send + Sync {
    /// Reads a file; `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an I/O error for anything but a missing file.
    fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>>;

    /// Atomically replaces `path` with `contents` and applies `mode`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the write or rename fails.
    fn write_atomic(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()>;

    /// Creates `path` and missing parents with `mode`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when creation fails.
    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Removes a file; missing files are ignored.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when removal fails.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Removes a directory tree; missing directories are ignored.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when removal fails.
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Returns true when `path` is an existing file.
    fn is_file(&self, path: &Path) -> bool;
}

// ============================================================================
// SECTION: OS Filesystem
// ============================================================================

/// Disk-backed filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl ExtensionFs for OsFs {
    fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write_atomic(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
        let temp_path = temp_path_for(path)?;
        let mut file =
            fs::OpenOptions::new().create(true).write(true).truncate(true).open(&temp_path)?;
        let result = file.write_all(contents).and_then(|()| file.sync_all());
        drop(file);
        if let Err(err) = result.and_then(|()| set_mode(&temp_path, mode)) {
            let _ = fs::remove_file(&temp_path);
            return Err(err);
        }
        fs::rename(&temp_path, path).inspect_err(|_| {
            let _ = fs::remove_file(&temp_path);
        })
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut missing = Vec::new();
        let mut cursor = Some(path);
        while let Some(dir) = cursor {
            if dir.as_os_str().is_empty() || dir.exists() {
                break;
            }
            missing.push(dir.to_path_buf());
            cursor = dir.parent();
        }
        fs::create_dir_all(path)?;
        for dir in missing {
            set_mode(&dir, mode)?;
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        match fs::remove_dir_all(path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Returns the sibling temp path used for atomic writes.
fn temp_path_for(path: &Path) -> io::Result<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "path does not include a file name")
        })?;
    Ok(path.with_file_name(format!(".{file_name}.tmp.{}", std::process::id())))
}

/// Applies a Unix mode; a no-op elsewhere.
#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

/// Applies a Unix mode; a no-op elsewhere.
#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

// ============================================================================
// SECTION: Memory Filesystem
// ============================================================================

/// In-memory file entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MemoryFile {
    /// File contents.
    contents: Vec<u8>,
    /// Applied mode.
    mode: u32,
}

/// In-memory state.
#[derive(Debug, Default)]
struct MemoryState {
    /// Files by path.
    files: BTreeMap<PathBuf, MemoryFile>,
    /// Directories by path with their mode.
    dirs: BTreeMap<PathBuf, u32>,
    /// When set, writes to this path fail.
    fail_writes_to: Option<PathBuf>,
}

/// In-memory filesystem for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryFs {
    /// Guarded state.
    state: Mutex<MemoryState>,
}

impl MemoryFs {
    /// Creates an empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mode of a file or directory.
    #[must_use]
    pub fn mode(&self, path: &Path) -> Option<u32> {
        let state = self.state.lock().ok()?;
        state.files.get(path).map(|file| file.mode).or_else(|| state.dirs.get(path).copied())
    }

    /// Returns every file path in order.
    #[must_use]
    pub fn files(&self) -> Vec<PathBuf> {
        self.state.lock().map(|state| state.files.keys().cloned().collect()).unwrap_or_default()
    }

    /// Makes subsequent writes to `path` fail.
    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_writes_to = Some(path.into());
        }
    }

    /// Locks the state.
    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| io::Error::other("memory fs mutex poisoned"))
    }
}

impl ExtensionFs for MemoryFs {
    fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        Ok(self.lock()?.files.get(path).map(|file| file.contents.clone()))
    }

    fn write_atomic(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
        let mut state = self.lock()?;
        if state.fail_writes_to.as_deref() == Some(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "write rejected"));
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !state.dirs.contains_key(parent)
        {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", parent.display()),
            ));
        }
        state.files.insert(path.to_path_buf(), MemoryFile {
            contents: contents.to_vec(),
            mode,
        });
        Ok(())
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut state = self.lock()?;
        for dir in path.ancestors().filter(|dir| !dir.as_os_str().is_empty()) {
            state.dirs.entry(dir.to_path_buf()).or_insert(mode);
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.lock()?.files.remove(path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock()?;
        state.files.retain(|file, _| !file.starts_with(path));
        state.dirs.retain(|dir, _| !dir.starts_with(path));
        Ok(())
    }

    fn is_file(&self, path: &Path) -> bool {
        self.state.lock().map(|state| state.files.contains_key(path)).unwrap_or(false)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
