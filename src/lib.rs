//! Local file server with directory browsing, previews, uploads and file management.
//!
//! Everything is confined to a single served root: requests are resolved
//! through a [`Sandbox`] before any filesystem operation runs. The crate can be
//! used as the `lithe-files` binary or embedded via [`routes::app`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod multipart;
pub mod ops;
pub mod preview;
pub mod render;
pub mod routes;
pub mod sandbox;
pub mod sanitize;

use std::path::Path;
use std::sync::Arc;

pub use config::Config;
pub use error::FileServerError;
pub use sandbox::{ResolvedPath, Sandbox};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Served root directory
    pub sandbox: Sandbox,
    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState serving `root_dir` with the default config.
    pub fn new(root_dir: impl AsRef<Path>) -> Result<Self, FileServerError> {
        Self::with_config(root_dir, Config::default())
    }

    /// Create a new AppState serving `root_dir` with the given config.
    pub fn with_config(root_dir: impl AsRef<Path>, config: Config) -> Result<Self, FileServerError> {
        Ok(Self {
            sandbox: Sandbox::new(root_dir)?,
            config: Arc::new(config),
        })
    }
}
