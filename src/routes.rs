use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{MethodRouter, any, get, post},
};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::AppState;
use crate::handlers;
use crate::sandbox::has_parent_segment;

/// Operation endpoints under `/api`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRoute {
    Preview,
    Download,
    Delete,
    Move,
    Rename,
    Mkdir,
    Zip,
    Upload,
}

impl ApiRoute {
    pub const ALL: [ApiRoute; 8] = [
        ApiRoute::Preview,
        ApiRoute::Download,
        ApiRoute::Delete,
        ApiRoute::Move,
        ApiRoute::Rename,
        ApiRoute::Mkdir,
        ApiRoute::Zip,
        ApiRoute::Upload,
    ];

    pub fn path(self) -> &'static str {
        match self {
            ApiRoute::Preview => "/api/preview",
            ApiRoute::Download => "/api/download",
            ApiRoute::Delete => "/api/delete",
            ApiRoute::Move => "/api/move",
            ApiRoute::Rename => "/api/rename",
            ApiRoute::Mkdir => "/api/mkdir",
            ApiRoute::Zip => "/api/zip",
            ApiRoute::Upload => "/api/upload",
        }
    }

    /// GET routes also answer HEAD; mutation handlers only validate on HEAD.
    fn method_router(self, max_upload_size: usize) -> MethodRouter<AppState> {
        match self {
            ApiRoute::Preview => get(handlers::preview),
            ApiRoute::Download => get(handlers::download),
            ApiRoute::Zip => get(handlers::zip_directory),
            ApiRoute::Delete => get(handlers::delete_file),
            ApiRoute::Move => get(handlers::move_file),
            ApiRoute::Rename => get(handlers::rename_file),
            ApiRoute::Mkdir => get(handlers::create_dir),
            ApiRoute::Upload => post(handlers::upload)
                .head(handlers::upload_head)
                .layer(DefaultBodyLimit::max(max_upload_size)),
        }
    }
}

/// Reject any request whose decoded path has a `..` segment, before routing.
pub async fn reject_traversal(request: Request, next: Next) -> Response {
    let raw = request.uri().path();
    let decoded = urlencoding::decode(raw)
        .map(|path| path.into_owned())
        .unwrap_or_else(|_| raw.to_string());

    if has_parent_segment(&decoded) {
        warn!("Path traversal attempt rejected: {:?}", raw);
        return (StatusCode::FORBIDDEN, "Access forbidden").into_response();
    }

    next.run(request).await
}

/// Create file server routes
pub fn file_routes(max_upload_size: u64) -> Router<AppState> {
    let max_upload_size = usize::try_from(max_upload_size).unwrap_or(usize::MAX);

    let router = ApiRoute::ALL
        .into_iter()
        .fold(Router::new(), |router, route| {
            router.route(route.path(), route.method_router(max_upload_size))
        });

    router
        // Unknown operation endpoints
        .route("/api/{*rest}", any(handlers::not_found))
        // Everything else is a filesystem lookup
        .fallback(handlers::browse)
}

/// Build the complete application for `state`.
pub fn app(state: AppState) -> Router {
    let max_upload_size = state.config.max_upload_size;

    Router::new()
        .merge(file_routes(max_upload_size))
        .layer(middleware::from_fn(reject_traversal))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_paths_are_unique_and_prefixed() {
        let mut paths: Vec<&str> = ApiRoute::ALL.iter().map(|r| r.path()).collect();
        assert!(paths.iter().all(|p| p.starts_with("/api/")));
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), ApiRoute::ALL.len());
    }
}
