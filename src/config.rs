use std::path::Path;

use serde::{Deserialize, Serialize};

/// File server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum request body size for uploads (in bytes)
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,

    /// Maximum file size rendered as a text preview (in bytes)
    #[serde(default = "default_max_preview_size")]
    pub max_preview_size: u64,

    /// Syntect theme used for text previews
    #[serde(default = "default_highlight_theme")]
    pub highlight_theme: String,

    /// Maximum uncompressed bytes in a zip export (0 = unlimited)
    #[serde(default)]
    pub max_zip_bytes: u64,

    /// Maximum number of files in a zip export (0 = unlimited)
    #[serde(default)]
    pub max_zip_entries: u64,

    /// Extensions previewed as text regardless of their guessed MIME type
    #[serde(default = "default_text_extensions")]
    pub text_extensions: Vec<String>,
}

fn default_max_upload_size() -> u64 {
    100 * 1024 * 1024 // 100 MB
}

fn default_max_preview_size() -> u64 {
    1024 * 1024
}

fn default_highlight_theme() -> String {
    "base16-ocean.dark".to_string()
}

fn default_text_extensions() -> Vec<String> {
    [
        // Scripting and web
        ".py", ".pyw", ".js", ".jsx", ".ts", ".tsx", ".json", ".html", ".htm", ".css", ".scss",
        ".sass", ".less", ".xml", ".xsl", ".yaml", ".yml", ".md", ".markdown", ".txt", ".text",
        ".ini", ".cfg", ".conf", ".env",
        // Shell
        ".sh", ".bash", ".zsh", ".fish", ".bat", ".cmd", ".ps1",
        // Systems
        ".c", ".h", ".cpp", ".cxx", ".cc", ".hpp", ".hxx", ".cs", ".rs", ".go",
        // Other languages
        ".java", ".php", ".phtml", ".rb", ".rbw", ".pl", ".pm", ".swift", ".kt", ".kts",
        ".scala", ".clj", ".cljs", ".hs", ".elm", ".lua", ".r", ".m", ".vim", ".dockerfile",
        ".containerfile",
        // Data
        ".sql", ".csv", ".tsv", ".log", ".properties", ".toml", ".gitignore",
        ".gitattributes", ".editorconfig",
        // Markup
        ".svg", ".rss", ".atom", ".tex", ".latex", ".rtf",
    ]
    .iter()
    .map(|ext| ext.to_string())
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_upload_size: default_max_upload_size(),
            max_preview_size: default_max_preview_size(),
            highlight_theme: default_highlight_theme(),
            max_zip_bytes: 0,
            max_zip_entries: 0,
            text_extensions: default_text_extensions(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Check if a file name ends with one of the text preview extensions
    pub fn is_text_file(&self, file_name: &str) -> bool {
        let lower = file_name.to_ascii_lowercase();
        self.text_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str("max_upload_size = 1024\n").unwrap();
        assert_eq!(config.max_upload_size, 1024);
        assert_eq!(config.max_preview_size, default_max_preview_size());
        assert_eq!(config.highlight_theme, "base16-ocean.dark");
        assert_eq!(config.max_zip_entries, 0);
        assert!(!config.text_extensions.is_empty());
    }

    #[test]
    fn test_is_text_file() {
        let config = Config::default();
        assert!(config.is_text_file("main.rs"));
        assert!(config.is_text_file("README.MD"));
        assert!(config.is_text_file(".gitignore"));
        assert!(!config.is_text_file("photo.jpg"));
        assert!(!config.is_text_file("archive.zip"));
    }
}
