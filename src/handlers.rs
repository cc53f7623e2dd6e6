use std::path::Path;

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::{Html, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::AppState;
use crate::error::{FileServerError, JsonError};
use crate::multipart;
use crate::ops::{self, EntryKind, MoveTarget, ZipLimits};
use crate::preview::{self, PreviewKind};
use crate::render;
use crate::sandbox::{ResolvedPath, join_logical};

/// Streams are read in chunks of this size.
const STREAM_CHUNK_SIZE: usize = 8 * 1024;

/// Query parameters naming a file inside a directory
#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub file: Option<String>,
    /// Current directory relative to root
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveQuery {
    pub file: Option<String>,
    /// `..` for the parent directory, empty for the root
    pub target_dir: Option<String>,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameQuery {
    pub file: Option<String>,
    pub new_name: Option<String>,
    #[serde(default)]
    pub path: String,
}

/// Query parameters naming a directory inside the current directory
#[derive(Debug, Deserialize)]
pub struct DirQuery {
    pub dir: Option<String>,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Target directory relative to root
    #[serde(default)]
    pub dir: String,
}

/// Result body of every mutation endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResponse {
    pub success: bool,
    pub message: String,
    /// Logical path of the affected entry after the operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl OperationResponse {
    fn ok(message: impl Into<String>, path: Option<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            path,
        })
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn require(value: Option<String>, message: &str) -> Result<String, FileServerError> {
    value.ok_or_else(|| FileServerError::InvalidInput(message.to_string()))
}

/// Run a blocking filesystem operation on the blocking pool.
async fn run_blocking<T, F>(operation: F) -> Result<T, FileServerError>
where
    F: FnOnce() -> Result<T, FileServerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(|err| FileServerError::Internal(err.to_string()))?
}

/// `Content-Disposition` value; non-ASCII names use the RFC 6266 `filename*` form.
pub fn content_disposition(disposition: &str, file_name: &str) -> String {
    if file_name.is_ascii() {
        let safe: String = file_name
            .chars()
            .filter(|c| !c.is_ascii_control())
            .map(|c| if c == '"' { '\'' } else { c })
            .collect();
        format!("{disposition}; filename=\"{safe}\"")
    } else {
        format!(
            "{disposition}; filename*=UTF-8''{}",
            urlencoding::encode(file_name)
        )
    }
}

async fn regular_file_size(path: &ResolvedPath) -> Result<u64, FileServerError> {
    match fs::metadata(path.as_path()).await {
        Ok(metadata) if metadata.is_file() => Ok(metadata.len()),
        _ => Err(FileServerError::NotFound("File not found".to_string())),
    }
}

async fn stream_file(
    path: &Path,
    size: u64,
    content_type: String,
    disposition: Option<String>,
) -> Result<Response, FileServerError> {
    let file = fs::File::open(path).await?;
    let body = Body::from_stream(ReaderStream::with_capacity(file, STREAM_CHUNK_SIZE));

    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, size.to_string()),
        ],
        body,
    )
        .into_response();

    if let Some(disposition) = disposition {
        let value = HeaderValue::from_str(&disposition)
            .map_err(|err| FileServerError::Internal(err.to_string()))?;
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}

async fn download_response(target: &ResolvedPath, size: u64) -> Result<Response, FileServerError> {
    let file_name = target.file_name().unwrap_or_else(|| "download".to_string());
    let mime = mime_guess::from_path(target.as_path())
        .first_or_octet_stream()
        .to_string();

    debug!("Downloading file: {}", target.as_path().display());
    stream_file(
        target.as_path(),
        size,
        mime,
        Some(content_disposition("attachment", &file_name)),
    )
    .await
}

// ============================================================================
// Read handlers
// ============================================================================

/// GET /api/preview - Image bytes, inline PDF, or highlighted text page
pub async fn preview(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Result<Response, FileServerError> {
    let file = require(query.file, "Missing file parameter")?;
    let target = state.sandbox.resolve_in(&query.path, &file)?;
    let size = regular_file_size(&target).await?;
    let file_name = target.file_name().unwrap_or_default();

    match PreviewKind::classify(&file_name, &state.config) {
        PreviewKind::Image(mime) => stream_file(target.as_path(), size, mime, None).await,
        PreviewKind::Pdf => {
            stream_file(
                target.as_path(),
                size,
                "application/pdf".to_string(),
                Some(content_disposition("inline", &file_name)),
            )
            .await
        }
        PreviewKind::Text => {
            if size > state.config.max_preview_size {
                return Err(FileServerError::FileTooLarge {
                    size,
                    limit: state.config.max_preview_size,
                });
            }

            debug!("Syntax highlighting file: {}", target.as_path().display());
            let bytes = fs::read(target.as_path()).await?;
            let content = String::from_utf8_lossy(&bytes).into_owned();
            let path = target.as_path().to_path_buf();
            let theme = state.config.highlight_theme.clone();

            // syntect is CPU-bound
            let highlighted =
                run_blocking(move || preview::highlight_code(&content, &path, &theme)).await?;

            Ok(Html(render::text_preview_page(&file_name, &highlighted)).into_response())
        }
        PreviewKind::Unsupported => Err(FileServerError::UnsupportedMedia),
    }
}

/// GET /api/download - Stream a file as an attachment
pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Result<Response, FileServerError> {
    let file = require(query.file, "Missing file parameter")?;
    let target = state.sandbox.resolve_in(&query.path, &file)?;
    let size = regular_file_size(&target).await?;

    download_response(&target, size).await
}

/// GET /api/zip - Stream a directory as a zip archive
pub async fn zip_directory(
    State(state): State<AppState>,
    Query(query): Query<DirQuery>,
) -> Result<Response, FileServerError> {
    let dir = require(query.dir, "Missing directory parameter")?;
    let source = state.sandbox.resolve_in(&query.path, &dir)?;
    let zip_name = ops::zip_file_name(&source);
    let limits = ZipLimits::from_config(&state.config);

    debug!("Downloading directory as zip: {}", source.as_path().display());

    let (zip_file, zip_size) = run_blocking(move || ops::zip_directory(&source, limits)).await?;
    let body = Body::from_stream(ReaderStream::with_capacity(
        fs::File::from_std(zip_file),
        STREAM_CHUNK_SIZE,
    ));

    let disposition = HeaderValue::from_str(&content_disposition("attachment", &zip_name))
        .map_err(|err| FileServerError::Internal(err.to_string()))?;

    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_LENGTH, zip_size.to_string()),
        ],
        body,
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_DISPOSITION, disposition);

    Ok(response)
}

/// Fallback - List a directory or download a file at the request path
pub async fn browse(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> Result<Response, FileServerError> {
    if method != Method::GET && method != Method::HEAD {
        return Err(FileServerError::NotFound("Endpoint not found".to_string()));
    }

    let target = state.sandbox.resolve_encoded(uri.path())?;
    let metadata = fs::metadata(target.as_path())
        .await
        .map_err(|_| FileServerError::NotFound("File not found".to_string()))?;

    let response = if metadata.is_dir() {
        let dir = target.clone();
        let entries = run_blocking(move || ops::list_directory(&dir)).await?;
        Html(render::directory_page(target.logical(), &entries)).into_response()
    } else if metadata.is_file() {
        download_response(&target, metadata.len()).await?
    } else {
        return Err(FileServerError::NotFound("File not found".to_string()));
    };

    if method == Method::HEAD {
        let (parts, _) = response.into_parts();
        return Ok(Response::from_parts(parts, Body::empty()));
    }

    Ok(response)
}

/// Unknown API route
pub async fn not_found() -> FileServerError {
    FileServerError::NotFound("Endpoint not found".to_string())
}

// ============================================================================
// Mutation handlers
//
// GET performs the operation. HEAD runs the same parameter, sandbox and
// filesystem checks and answers with the status GET would, without mutating.
// ============================================================================

fn is_dry_run(method: &Method) -> bool {
    *method == Method::HEAD
}

/// GET /api/delete - Delete a file or an empty directory
pub async fn delete_file(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<FileQuery>,
) -> Result<Json<OperationResponse>, JsonError> {
    let file = require(query.file, "Missing file parameter")?;
    let target = state
        .sandbox
        .resolve_existing(&join_logical(&query.path, &file))?;
    let logical = target.logical().to_string();
    let dry_run = is_dry_run(&method);

    let kind = run_blocking(move || {
        if dry_run {
            ops::check_delete(&target)
        } else {
            ops::delete_entry(&target)
        }
    })
    .await?;

    let message = match kind {
        EntryKind::Directory => "Directory deleted successfully",
        _ => "File deleted successfully",
    };

    Ok(OperationResponse::ok(message, Some(logical)))
}

/// GET /api/move - Move a file to another directory
pub async fn move_file(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<MoveQuery>,
) -> Result<Json<OperationResponse>, JsonError> {
    let (Some(file), Some(target_dir)) = (query.file, query.target_dir) else {
        return Err(FileServerError::InvalidInput(
            "Missing file or target directory parameter".to_string(),
        )
        .into());
    };

    let sandbox = state.sandbox.clone();
    let source = sandbox.resolve_in(&query.path, &file)?;
    let target = MoveTarget::parse(&target_dir);
    let current_dir = query.path;
    let dry_run = is_dry_run(&method);

    let destination = run_blocking(move || {
        let target_dir = ops::resolve_move_target(&sandbox, &current_dir, &target)?;
        if dry_run {
            ops::check_move(&sandbox, &source, &target_dir)
        } else {
            ops::move_file(&sandbox, &source, &target_dir)
        }
    })
    .await?;

    Ok(OperationResponse::ok(
        format!("File moved successfully to /{}", destination.logical()),
        Some(destination.logical().to_string()),
    ))
}

/// GET /api/rename - Rename a file or directory in place
pub async fn rename_file(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<RenameQuery>,
) -> Result<Json<OperationResponse>, JsonError> {
    let (Some(file), Some(new_name)) = (query.file, query.new_name) else {
        return Err(FileServerError::InvalidInput(
            "Missing file or new name parameter".to_string(),
        )
        .into());
    };

    let sandbox = state.sandbox.clone();
    let source = sandbox.resolve_existing(&join_logical(&query.path, &file))?;
    let dry_run = is_dry_run(&method);

    let destination = run_blocking(move || {
        if dry_run {
            ops::check_rename(&sandbox, &source, &new_name)
        } else {
            ops::rename_entry(&sandbox, &source, &new_name)
        }
    })
    .await?;

    Ok(OperationResponse::ok(
        format!(
            "Renamed successfully to {}",
            destination.file_name().unwrap_or_default()
        ),
        Some(destination.logical().to_string()),
    ))
}

/// GET /api/mkdir - Create a directory
pub async fn create_dir(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<DirQuery>,
) -> Result<Json<OperationResponse>, JsonError> {
    let dir = require(query.dir, "Missing directory parameter")?;
    let sandbox = state.sandbox.clone();
    let parent = query.path;
    let dry_run = is_dry_run(&method);

    let created = run_blocking(move || {
        if dry_run {
            ops::check_create_directory(&sandbox, &parent, &dir)
        } else {
            ops::create_directory(&sandbox, &parent, &dir)
        }
    })
    .await?;

    Ok(OperationResponse::ok(
        "Directory created successfully",
        Some(created.logical().to_string()),
    ))
}

/// POST /api/upload - Store the files of a multipart body
pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let target_logical = query.dir.clone();

    match store_upload(&state, &query.dir, &headers, body).await {
        Ok(uploaded) => Html(render::upload_success_page(&uploaded, &target_logical)).into_response(),
        Err(err) => {
            warn!("Upload rejected: {}", err);
            (
                err.status_code(),
                Html(render::upload_error_page(&err.to_string())),
            )
                .into_response()
        }
    }
}

/// HEAD /api/upload - Check the target directory without reading a body
pub async fn upload_head(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
) -> Result<StatusCode, FileServerError> {
    let target = state.sandbox.resolve(&query.dir)?;
    run_blocking(move || multipart::check_target_dir(&target)).await?;
    Ok(StatusCode::OK)
}

async fn store_upload(
    state: &AppState,
    dir: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Vec<String>, FileServerError> {
    let target = state.sandbox.resolve(dir)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let boundary = multipart::boundary_from_content_type(content_type)?;

    let sandbox = state.sandbox.clone();
    run_blocking(move || multipart::store_upload(&sandbox, &target, &body, &boundary)).await
}
