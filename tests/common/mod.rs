//! Test utilities and common setup.
#![allow(dead_code)]

use std::fs;
use std::path::Path;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response},
};
use lithe_files::{AppState, Config, routes};
use tempfile::TempDir;
use tower::ServiceExt;

/// A served temp directory plus the router in front of it.
pub struct TestServer {
    pub dir: TempDir,
    pub app: Router,
}

impl TestServer {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Method::GET, uri).await
    }

    pub async fn send(&self, method: Method, uri: &str) -> Response<Body> {
        self.request(
            Request::builder()
                .uri(uri)
                .method(method)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

/// Create the app over an empty temp directory with the default config.
pub fn test_app() -> TestServer {
    test_app_with_config(Config::default())
}

pub fn test_app_with_config(config: Config) -> TestServer {
    let dir = TempDir::new().expect("create temp dir");
    let state = AppState::with_config(dir.path(), config).expect("create app state");
    TestServer {
        dir,
        app: routes::app(state),
    }
}

/// Write `content` to `relative` under the served root, creating parents.
pub fn write_file(root: &Path, relative: &str, content: impl AsRef<[u8]>) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Build a `multipart/form-data` body; `None` filename makes a plain field.
pub fn multipart_body(boundary: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    for (field, filename, content) in parts {
        out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        let disposition = match filename {
            Some(name) => format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            ),
            None => format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n"),
        };
        out.extend_from_slice(disposition.as_bytes());
        out.extend_from_slice(content);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    out
}
