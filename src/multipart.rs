//! `multipart/form-data` upload decoding.
//!
//! The request body is split on the `--<boundary>` delimiter; every part that
//! carries a non-empty `filename` becomes an [`UploadedFile`]. Files are then
//! written into the target directory without ever overwriting an existing
//! entry: a taken name gets `_1`, `_2`, ... inserted before its extension.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::LazyLock;

use bytes::Bytes;
use memchr::memmem;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::FileServerError;
use crate::sandbox::{ResolvedPath, Sandbox};
use crate::sanitize::{MAX_FILENAME_LEN, sanitize_filename, split_extension};

static BOUNDARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)boundary=("[^"]+"|[^;\s]+)"#).expect("boundary regex is valid")
});

static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename="([^"]*)""#).expect("filename regex is valid")
});

const HEADER_SEPARATOR: &[u8] = b"\r\n\r\n";

/// Parts shorter than this cannot hold headers plus a body.
const MIN_PART_LEN: usize = 10;

/// Give up on finding a free suffixed name after this many attempts.
const MAX_SUFFIX_ATTEMPTS: u32 = 10_000;

/// A file payload extracted from an upload body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub sanitized_name: String,
    pub content: Bytes,
}

/// Extract the boundary token from a `multipart/form-data` content type.
pub fn boundary_from_content_type(content_type: &str) -> Result<String, FileServerError> {
    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case("multipart/form-data") {
        return Err(FileServerError::InvalidInput(
            "Invalid content type".to_string(),
        ));
    }

    let boundary = BOUNDARY_RE
        .captures(content_type)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
        .ok_or_else(|| {
            FileServerError::InvalidInput("Missing boundary in Content-Type".to_string())
        })?;

    Ok(boundary)
}

fn find_subslice(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    memmem::find(&haystack[from..], needle).map(|pos| pos + from)
}

/// Split `body` on `--<boundary>` and return the file parts it contains.
///
/// Parts without a header/body separator, without a `filename`, or whose
/// filename fails sanitization are skipped.
pub fn decode_parts(body: &Bytes, boundary: &str) -> Vec<UploadedFile> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut files = Vec::new();
    let mut start = 0;
    loop {
        let end = find_subslice(body, delimiter, start).unwrap_or(body.len());
        if let Some(file) = decode_part(body.slice(start..end)) {
            files.push(file);
        }
        if end >= body.len() {
            break;
        }
        start = end + delimiter.len();
    }

    files
}

fn decode_part(part: Bytes) -> Option<UploadedFile> {
    if part.len() < MIN_PART_LEN {
        return None;
    }

    let Some(separator) = find_subslice(&part, HEADER_SEPARATOR, 0) else {
        debug!("Skipping multipart part without header separator");
        return None;
    };

    let headers = String::from_utf8_lossy(&part[..separator]);
    let original_name = FILENAME_RE
        .captures(&headers)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())?;

    if original_name.is_empty() {
        return None;
    }

    let mut content = part.slice(separator + HEADER_SEPARATOR.len()..);
    if content.ends_with(b"\r\n") {
        content.truncate(content.len() - 2);
    }
    if content.ends_with(b"--") {
        content.truncate(content.len() - 2);
    }

    let Some(sanitized_name) = sanitize_filename(&original_name) else {
        warn!("Rejected invalid upload filename: {:?}", original_name);
        return None;
    };

    Some(UploadedFile {
        original_name,
        sanitized_name,
        content,
    })
}

/// Candidate names for `name`: the name itself, then `stem_1.ext`, `stem_2.ext`, ...
///
/// The stem is shortened so a suffixed name never exceeds [`MAX_FILENAME_LEN`]
/// characters. An extension too long to keep is treated as part of the stem.
fn candidate_name(name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return name.to_string();
    }

    let suffix = format!("_{attempt}");
    let (stem, ext) = split_extension(name);
    let (stem, ext) = if ext.chars().count() + suffix.len() < MAX_FILENAME_LEN {
        (stem, ext)
    } else {
        (name, "")
    };

    let budget = MAX_FILENAME_LEN - suffix.len() - ext.chars().count();
    let stem: String = stem.chars().take(budget).collect();
    format!("{stem}{suffix}{ext}")
}

/// Write `file` into `target_dir` under the first free candidate name.
fn write_unique(
    sandbox: &Sandbox,
    target_dir: &ResolvedPath,
    file: &UploadedFile,
) -> Result<String, FileServerError> {
    for attempt in 0..MAX_SUFFIX_ATTEMPTS {
        let name = candidate_name(&file.sanitized_name, attempt);
        let destination = sandbox.child(target_dir, &name)?;

        let mut output = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination.as_path())
        {
            Ok(output) => output,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        };

        output.write_all(&file.content)?;
        output.flush()?;

        info!(
            "Uploaded file: {} ({} bytes)",
            destination.as_path().display(),
            file.content.len()
        );
        return Ok(name);
    }

    Err(FileServerError::Conflict(format!(
        "No free name available for {}",
        file.sanitized_name
    )))
}

/// Uploads land only in an existing directory.
pub fn check_target_dir(target_dir: &ResolvedPath) -> Result<(), FileServerError> {
    if !target_dir.as_path().is_dir() {
        return Err(FileServerError::NotFound(
            "Target directory does not exist".to_string(),
        ));
    }
    Ok(())
}

/// Decode `body` and write every file part into `target_dir`.
///
/// Returns the names the files were stored under. A part that fails to write
/// is logged and skipped; if nothing at all was written the upload fails.
pub fn store_upload(
    sandbox: &Sandbox,
    target_dir: &ResolvedPath,
    body: &Bytes,
    boundary: &str,
) -> Result<Vec<String>, FileServerError> {
    check_target_dir(target_dir)?;

    let mut stored = Vec::new();
    for file in decode_parts(body, boundary) {
        match write_unique(sandbox, target_dir, &file) {
            Ok(name) => stored.push(name),
            Err(err) => warn!("Error saving file {}: {}", file.original_name, err),
        }
    }

    if stored.is_empty() {
        return Err(FileServerError::InvalidInput(
            "No valid files were uploaded".to_string(),
        ));
    }

    Ok(stored)
}
