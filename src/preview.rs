use std::path::Path;
use std::sync::LazyLock;

use syntect::highlighting::ThemeSet;
use syntect::html::{IncludeBackground, styled_line_to_highlighted_html};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use crate::Config;
use crate::error::FileServerError;

// Lazy-loaded syntax highlighting assets
static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

const FALLBACK_THEME: &str = "base16-ocean.dark";

/// How a file is shown by the preview endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewKind {
    /// Raw image bytes with the given MIME type
    Image(String),
    /// PDF streamed inline
    Pdf,
    /// Syntax-highlighted text page
    Text,
    Unsupported,
}

impl PreviewKind {
    /// Classify by guessed MIME type first, then by configured text extensions.
    pub fn classify(file_name: &str, config: &Config) -> Self {
        let mime = mime_guess::from_path(file_name).first();
        let is_pdf_ext = Path::new(file_name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        match mime {
            Some(mime) if mime.type_() == mime_guess::mime::IMAGE => {
                PreviewKind::Image(mime.essence_str().to_string())
            }
            Some(mime) if mime.subtype() == mime_guess::mime::PDF => PreviewKind::Pdf,
            _ if is_pdf_ext => PreviewKind::Pdf,
            Some(mime) if mime.type_() == mime_guess::mime::TEXT => PreviewKind::Text,
            _ if config.is_text_file(file_name) => PreviewKind::Text,
            _ => PreviewKind::Unsupported,
        }
    }
}

/// Highlight code using syntect, as an HTML table with line numbers.
pub fn highlight_code(content: &str, path: &Path, theme_name: &str) -> Result<String, FileServerError> {
    let syntax = path
        .extension()
        .and_then(|ext| SYNTAX_SET.find_syntax_by_extension(ext.to_str().unwrap_or("")))
        .or_else(|| SYNTAX_SET.find_syntax_by_first_line(content))
        .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());

    let theme = THEME_SET
        .themes
        .get(theme_name)
        .or_else(|| THEME_SET.themes.get(FALLBACK_THEME))
        .ok_or_else(|| FileServerError::Internal("Theme not found".to_string()))?;

    let mut highlighter = syntect::easy::HighlightLines::new(syntax, theme);
    let mut html_output = String::with_capacity(content.len() * 2);

    html_output.push_str("<table class=\"highlighted-code\"><tbody>");

    for (i, line) in LinesWithEndings::from(content).enumerate() {
        let regions = highlighter
            .highlight_line(line, &SYNTAX_SET)
            .map_err(|e| FileServerError::Internal(e.to_string()))?;
        let html_line = styled_line_to_highlighted_html(&regions[..], IncludeBackground::No)
            .map_err(|e| FileServerError::Internal(e.to_string()))?;

        html_output.push_str("<tr>");
        html_output.push_str(&format!("<td class=\"line-number\">{}</td>", i + 1));
        html_output.push_str("<td class=\"line\">");
        if html_line.trim().is_empty() {
            html_output.push(' ');
        } else {
            html_output.push_str(html_line.trim_end_matches('\n'));
        }
        html_output.push_str("</td></tr>");
    }

    html_output.push_str("</tbody></table>");

    Ok(html_output)
}
