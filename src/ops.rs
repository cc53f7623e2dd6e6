//! Filesystem operations behind the API handlers.
//!
//! These are blocking functions; handlers run them on the blocking pool.
//! Every path argument is a [`ResolvedPath`], and every new path an operation
//! produces is derived through the [`Sandbox`].

use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use tempfile::tempfile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::Config;
use crate::error::FileServerError;
use crate::sandbox::{ResolvedPath, Sandbox, join_logical};
use crate::sanitize::sanitize_filename;

/// One row of a directory listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    /// Logical path relative to the served root
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Parent,
}

/// Where a move should land, as given by the `target_dir` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveTarget {
    /// `..`: the parent of the current directory
    Parent,
    /// empty: the served root
    Root,
    /// a directory relative to the current directory
    Dir(String),
}

impl MoveTarget {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            ".." => MoveTarget::Parent,
            "" => MoveTarget::Root,
            other => MoveTarget::Dir(other.trim_start_matches('/').to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ZipLimits {
    pub max_bytes: u64,
    pub max_entries: u64,
}

impl ZipLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_bytes: config.max_zip_bytes,
            max_entries: config.max_zip_entries,
        }
    }

    pub fn unlimited() -> Self {
        Self {
            max_bytes: 0,
            max_entries: 0,
        }
    }
}

fn modified_secs(metadata: &fs::Metadata) -> Option<u64> {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs()))
}

/// List a directory: hidden entries skipped, sorted by name (case-sensitive),
/// with a `parent` entry first unless `dir` is the served root.
pub fn list_directory(dir: &ResolvedPath) -> Result<Vec<DirectoryEntry>, FileServerError> {
    let metadata = fs::metadata(dir.as_path())?;
    if !metadata.is_dir() {
        return Err(FileServerError::InvalidInput(
            "Path is not a directory".to_string(),
        ));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir.as_path())? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }

        // Follows symlinks; a dangling link is listed as a plain file.
        let metadata = match fs::metadata(entry.path()) {
            Ok(metadata) => Some(metadata),
            Err(_) => entry.metadata().ok(),
        };
        let is_dir = metadata.as_ref().is_some_and(|m| m.is_dir());
        let path = join_logical(dir.logical(), &name);

        let item = if is_dir {
            DirectoryEntry {
                name,
                path,
                kind: EntryKind::Directory,
                size: None,
                modified: metadata.as_ref().and_then(modified_secs),
                mime_type: None,
            }
        } else {
            let mime = mime_guess::from_path(&name)
                .first_or_octet_stream()
                .to_string();
            DirectoryEntry {
                name,
                path,
                kind: EntryKind::File,
                size: metadata.as_ref().map(|m| m.len()),
                modified: metadata.as_ref().and_then(modified_secs),
                mime_type: Some(mime),
            }
        };
        entries.push(item);
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));

    if let Some(parent) = dir.parent_logical() {
        entries.insert(
            0,
            DirectoryEntry {
                name: "..".to_string(),
                path: parent.to_string(),
                kind: EntryKind::Parent,
                size: None,
                modified: None,
                mime_type: None,
            },
        );
    }

    debug!(
        "Listed {} entries in {}",
        entries.len(),
        dir.as_path().display()
    );
    Ok(entries)
}

/// Check that `target` can be deleted: it exists, is not the served root, and
/// is not a non-empty directory. Returns the kind that would be removed.
pub fn check_delete(target: &ResolvedPath) -> Result<EntryKind, FileServerError> {
    if target.is_root() {
        warn!("Attempted to delete root directory");
        return Err(FileServerError::InvalidInput(
            "Cannot delete root directory".to_string(),
        ));
    }

    let metadata = fs::symlink_metadata(target.as_path()).map_err(|_| {
        FileServerError::NotFound("File or directory not found".to_string())
    })?;

    if !metadata.is_dir() {
        return Ok(EntryKind::File);
    }

    if fs::read_dir(target.as_path())?.next().is_some() {
        return Err(FileServerError::InvalidInput(
            "Cannot delete non-empty directory. Please remove all files and subdirectories first."
                .to_string(),
        ));
    }
    Ok(EntryKind::Directory)
}

/// Delete a file or an empty directory. Returns the kind that was removed.
pub fn delete_entry(target: &ResolvedPath) -> Result<EntryKind, FileServerError> {
    let kind = check_delete(target)?;

    if kind == EntryKind::Directory {
        info!("Deleting directory: {}", target.as_path().display());
        fs::remove_dir(target.as_path())?;
    } else {
        info!("Deleting file: {}", target.as_path().display());
        fs::remove_file(target.as_path())?;
    }

    Ok(kind)
}

/// Resolve the destination directory of a move relative to `current_dir`.
pub fn resolve_move_target(
    sandbox: &Sandbox,
    current_dir: &str,
    target: &MoveTarget,
) -> Result<ResolvedPath, FileServerError> {
    match target {
        MoveTarget::Parent => {
            let current = sandbox.resolve(current_dir)?;
            let Some(parent) = current.parent_logical() else {
                return Err(FileServerError::InvalidInput(
                    "Cannot move to parent directory from root".to_string(),
                ));
            };
            sandbox.resolve(parent)
        }
        MoveTarget::Root => sandbox.resolve(""),
        MoveTarget::Dir(dir) => sandbox.resolve_in(current_dir, dir),
    }
}

/// Check that `source` can be moved into `target_dir` and return the destination.
pub fn check_move(
    sandbox: &Sandbox,
    source: &ResolvedPath,
    target_dir: &ResolvedPath,
) -> Result<ResolvedPath, FileServerError> {
    if !source.as_path().is_file() {
        return Err(FileServerError::NotFound(
            "Source file not found".to_string(),
        ));
    }

    if !target_dir.as_path().is_dir() {
        return Err(FileServerError::NotFound(
            "Target directory not found".to_string(),
        ));
    }

    let file_name = source
        .file_name()
        .ok_or_else(|| FileServerError::InvalidInput("Invalid source file".to_string()))?;
    let destination = sandbox.child(target_dir, &file_name)?;

    if fs::symlink_metadata(destination.as_path()).is_ok() {
        return Err(FileServerError::Conflict(
            "File already exists in target directory".to_string(),
        ));
    }

    Ok(destination)
}

/// Move a regular file into `target_dir`, keeping its name.
pub fn move_file(
    sandbox: &Sandbox,
    source: &ResolvedPath,
    target_dir: &ResolvedPath,
) -> Result<ResolvedPath, FileServerError> {
    let destination = check_move(sandbox, source, target_dir)?;

    info!(
        "Moving: {} -> {}",
        source.as_path().display(),
        destination.as_path().display()
    );

    match fs::rename(source.as_path(), destination.as_path()) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::CrossesDevices => {
            debug!("Rename crosses devices, copying instead");
            fs::copy(source.as_path(), destination.as_path())?;
            fs::remove_file(source.as_path())?;
        }
        Err(err) => return Err(err.into()),
    }

    Ok(destination)
}

/// Check that `source` can be renamed to `new_name` and return the destination.
pub fn check_rename(
    sandbox: &Sandbox,
    source: &ResolvedPath,
    new_name: &str,
) -> Result<ResolvedPath, FileServerError> {
    let new_name = sanitize_filename(new_name)
        .ok_or_else(|| FileServerError::InvalidInput("Invalid new name".to_string()))?;

    let Some(parent) = source.parent_logical() else {
        warn!("Attempted to rename root directory");
        return Err(FileServerError::InvalidInput(
            "Cannot rename root directory".to_string(),
        ));
    };

    if fs::symlink_metadata(source.as_path()).is_err() {
        return Err(FileServerError::NotFound(
            "File or directory not found".to_string(),
        ));
    }

    let destination = sandbox.resolve_in(parent, &new_name)?;
    if fs::symlink_metadata(destination.as_path()).is_ok() {
        return Err(FileServerError::Conflict(
            "A file or directory with that name already exists".to_string(),
        ));
    }

    Ok(destination)
}

/// Rename a file or directory to a sanitized sibling name.
pub fn rename_entry(
    sandbox: &Sandbox,
    source: &ResolvedPath,
    new_name: &str,
) -> Result<ResolvedPath, FileServerError> {
    let destination = check_rename(sandbox, source, new_name)?;

    info!(
        "Renaming: {} -> {}",
        source.as_path().display(),
        destination.as_path().display()
    );
    fs::rename(source.as_path(), destination.as_path())?;

    Ok(destination)
}

/// Check that the sanitized directory `name` can be created under `parent`
/// and return its path.
pub fn check_create_directory(
    sandbox: &Sandbox,
    parent: &str,
    name: &str,
) -> Result<ResolvedPath, FileServerError> {
    let name = sanitize_filename(name)
        .ok_or_else(|| FileServerError::InvalidInput("Invalid directory name".to_string()))?;

    let target = sandbox.resolve_in(parent, &name)?;
    if fs::symlink_metadata(target.as_path()).is_ok() {
        return Err(FileServerError::Conflict(
            "Directory already exists".to_string(),
        ));
    }

    Ok(target)
}

/// Create the sanitized directory `name` under the logical directory `parent`,
/// including any missing intermediate directories.
pub fn create_directory(
    sandbox: &Sandbox,
    parent: &str,
    name: &str,
) -> Result<ResolvedPath, FileServerError> {
    let target = check_create_directory(sandbox, parent, name)?;

    info!("Creating directory: {}", target.as_path().display());
    fs::create_dir_all(target.as_path())?;

    Ok(target)
}

/// Archive name for a zipped directory: `<name>.zip`.
pub fn zip_file_name(source: &ResolvedPath) -> String {
    let name = source.file_name().unwrap_or_else(|| "archive".to_string());
    format!("{name}.zip")
}

/// Build a deflate zip of every regular file under `source`, with entry names
/// relative to `source`. The archive is written to an anonymous temp file,
/// which is returned rewound together with its size.
pub fn zip_directory(
    source: &ResolvedPath,
    limits: ZipLimits,
) -> Result<(fs::File, u64), FileServerError> {
    if !source.as_path().is_dir() {
        return Err(FileServerError::NotFound(
            "Directory not found".to_string(),
        ));
    }

    enforce_zip_limits(source.as_path(), limits)?;

    let file = tempfile()?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut count = 0u64;
    for entry in WalkDir::new(source.as_path()).sort_by_file_name() {
        let entry = entry.map_err(|err| FileServerError::Internal(err.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = archive_name(source.as_path(), entry.path());
        if relative.is_empty() {
            continue;
        }

        let mut input = fs::File::open(entry.path())?;
        let size = input.metadata()?.len();
        zip.start_file(relative.as_str(), options.large_file(needs_large_file(size)))?;
        std::io::copy(&mut input, &mut zip)?;
        count += 1;
    }

    let mut file = zip.finish()?;
    file.flush()?;

    let size = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(0))?;

    info!(
        "Created archive of {} ({} files, {} bytes)",
        source.as_path().display(),
        count,
        size
    );

    Ok((file, size))
}

/// Entries of 4 GiB or more must be written with zip64 headers.
fn needs_large_file(size: u64) -> bool {
    size >= u64::from(u32::MAX)
}

/// Entry name of `path` inside an archive rooted at `base`, always `/`-separated.
fn archive_name(base: &Path, path: &Path) -> String {
    let Ok(relative) = path.strip_prefix(base) else {
        return String::new();
    };

    relative
        .components()
        .filter_map(|component| match component {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn enforce_zip_limits(dir: &Path, limits: ZipLimits) -> Result<(), FileServerError> {
    if limits.max_bytes == 0 && limits.max_entries == 0 {
        return Ok(());
    }

    let mut total_bytes = 0u64;
    let mut total_entries = 0u64;

    for entry in WalkDir::new(dir).into_iter().filter_map(|entry| entry.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        total_entries = total_entries.saturating_add(1);
        total_bytes = total_bytes.saturating_add(size);

        if limits.max_entries > 0 && total_entries > limits.max_entries {
            return Err(FileServerError::ZipTooManyEntries {
                entries: total_entries,
                limit: limits.max_entries,
            });
        }

        if limits.max_bytes > 0 && total_bytes > limits.max_bytes {
            return Err(FileServerError::ZipTooLarge {
                size: total_bytes,
                limit: limits.max_bytes,
            });
        }
    }

    Ok(())
}
