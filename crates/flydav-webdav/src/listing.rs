//! Directory listings rendered as JSON or HTML.

use flydav_storage::Metadata;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::Serialize;
use std::fmt::Write as _;

/// Characters escaped in a path segment of a link.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/');

/// One row of a listing, with a principal-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
}

fn child_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

fn parent_path(dir: &str) -> String {
    match dir.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => dir[..i].to_string(),
    }
}

/// Build the rows for directory `dir` from storage metadata.
///
/// Entries are re-rooted at `dir` so storage keys never leak to the client.
/// Below the root, `.` and `..` are prepended.
pub fn entries(dir: &str, children: &[Metadata]) -> Vec<ListingEntry> {
    let mut rows = Vec::with_capacity(children.len() + 2);
    if dir != "/" {
        rows.push(ListingEntry {
            name: ".".to_string(),
            path: dir.to_string(),
            is_dir: true,
            size: 0,
        });
        rows.push(ListingEntry {
            name: "..".to_string(),
            path: parent_path(dir),
            is_dir: true,
            size: 0,
        });
    }
    rows.extend(children.iter().map(|m| ListingEntry {
        name: m.name.clone(),
        path: child_path(dir, &m.name),
        is_dir: m.is_dir,
        size: m.size,
    }));
    rows
}

/// Serialize rows as a JSON array.
pub fn render_json(rows: &[ListingEntry]) -> Result<String, serde_json::Error> {
    serde_json::to_string(rows)
}

/// Human-readable size using binary units.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// URL for a principal-relative path under the mount prefix.
pub fn href(mount_prefix: &str, path: &str, is_dir: bool) -> String {
    let mut url = mount_prefix.trim_end_matches('/').to_string();
    for seg in path.split('/').filter(|s| !s.is_empty()) {
        url.push('/');
        url.extend(utf8_percent_encode(seg, SEGMENT));
    }
    if url.is_empty() || is_dir {
        url.push('/');
    }
    url
}

/// Render a self-contained HTML page for directory `dir`.
pub fn render_html(dir: &str, rows: &[ListingEntry], mount_prefix: &str) -> String {
    let title = escape_html(dir);
    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Index of {title}</title>\n\
         <style>body{{font-family:sans-serif}}td{{padding:0 1em}}</style>\n</head>\n<body>\n\
         <h1>Index of {title}</h1>\n<table>\n<tr><th>Name</th><th>Size</th><th>Type</th></tr>\n"
    );
    for row in rows {
        let link = escape_html(&href(mount_prefix, &row.path, row.is_dir));
        let name = escape_html(&row.name);
        let (size, kind) = if row.is_dir {
            ("-".to_string(), "directory")
        } else {
            (format_size(row.size), "file")
        };
        let _ = writeln!(
            html,
            "<tr><td><a href=\"{link}\">{name}</a></td><td>{size}</td><td>{kind}</td></tr>"
        );
    }
    html.push_str("</table>\n</body>\n</html>\n");
    html
}
