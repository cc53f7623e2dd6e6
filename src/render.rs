//! Minimal HTML pages for browser clients.
//!
//! Listings, text previews and upload results are rendered here; all names are
//! escaped, and links are built from logical paths.

use crate::ops::{DirectoryEntry, EntryKind};

/// Escape text for use in HTML content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// URL for a logical path: each segment percent-encoded, rooted at `/`.
pub fn href(logical: &str) -> String {
    let encoded: Vec<String> = logical
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("/{}", encoded.join("/"))
}

/// Human-readable size, e.g. `1.5 KB`.
pub fn format_size(size: u64) -> String {
    let mut value = size as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} TB")
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape_html(title),
        body
    )
}

/// Directory listing page for `logical` (empty for the served root).
pub fn directory_page(logical: &str, entries: &[DirectoryEntry]) -> String {
    let display = format!("/{logical}");
    let mut rows = String::new();

    for entry in entries {
        let size = entry.size.map(format_size).unwrap_or_default();
        let modified = entry.modified.map(|m| m.to_string()).unwrap_or_default();
        let label = match entry.kind {
            EntryKind::Directory => format!("{}/", entry.name),
            _ => entry.name.clone(),
        };
        rows.push_str(&format!(
            "<tr class=\"{kind}\"><td><a href=\"{href}\">{label}</a></td><td>{size}</td><td>{modified}</td></tr>\n",
            kind = match entry.kind {
                EntryKind::File => "file",
                EntryKind::Directory => "directory",
                EntryKind::Parent => "parent",
            },
            href = escape_html(&href(&entry.path)),
            label = escape_html(&label),
        ));
    }

    let upload_action = format!("/api/upload?dir={}", urlencoding::encode(logical));
    let body = format!(
        "<h1>Index of {title}</h1>\n\
         <form method=\"post\" enctype=\"multipart/form-data\" action=\"{action}\">\
         <input type=\"file\" name=\"file\" multiple> <button type=\"submit\">Upload</button></form>\n\
         <table>\n<thead><tr><th>Name</th><th>Size</th><th>Modified</th></tr></thead>\n\
         <tbody>\n{rows}</tbody>\n</table>",
        title = escape_html(&display),
        action = escape_html(&upload_action),
    );

    page(&display, &body)
}

/// Text preview page wrapping already highlighted HTML.
pub fn text_preview_page(file_name: &str, highlighted: &str) -> String {
    let body = format!("<h1>{}</h1>\n{}", escape_html(file_name), highlighted);
    page(file_name, &body)
}

pub fn upload_success_page(uploaded: &[String], target_dir: &str) -> String {
    let items: String = uploaded
        .iter()
        .map(|name| format!("<li>{}</li>", escape_html(name)))
        .collect();
    let body = format!(
        "<h1>Upload successful</h1>\n<p>{} file(s) uploaded.</p>\n<ul>{}</ul>\n<p><a href=\"{}\">Back</a></p>",
        uploaded.len(),
        items,
        escape_html(&href(target_dir))
    );
    page("Upload successful", &body)
}

pub fn upload_error_page(message: &str) -> String {
    let body = format!(
        "<h1>Upload failed</h1>\n<p>{}</p>\n<p><a href=\"/\">Back</a></p>",
        escape_html(message)
    );
    page("Upload failed", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<a href=\"x\">'&'</a>"),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_href_encodes_segments() {
        assert_eq!(href(""), "/");
        assert_eq!(href("docs/my file.txt"), "/docs/my%20file.txt");
        assert_eq!(href("a#b/c?d"), "/a%23b/c%3Fd");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.0 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_directory_page_escapes_names() {
        let entries = vec![DirectoryEntry {
            name: "<img>.txt".to_string(),
            path: "<img>.txt".to_string(),
            kind: EntryKind::File,
            size: Some(3),
            modified: None,
            mime_type: Some("text/plain".to_string()),
        }];
        let html = directory_page("", &entries);
        assert!(html.contains("&lt;img&gt;.txt"));
        assert!(!html.contains("<img>"));
        assert!(html.contains("href=\"/%3Cimg%3E.txt\""));
    }

    #[test]
    fn test_upload_pages() {
        let html = upload_success_page(&["a_1.txt".to_string()], "docs");
        assert!(html.contains("<li>a_1.txt</li>"));
        assert!(html.contains("href=\"/docs\""));

        let html = upload_error_page("No valid files were uploaded");
        assert!(html.contains("No valid files were uploaded"));
    }
}
