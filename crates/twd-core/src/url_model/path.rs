//! Child path construction and parsing.

use std::sync::OnceLock;

use regex::Regex;

use super::sanitize::sanitize_component;
use super::{DEFAULT_FILENAME, DEFAULT_LABEL};

/// Download root with leading and trailing `/` stripped.
pub fn clean_root(root: &str) -> &str {
    root.trim_matches('/')
}

/// Canonical relative path for a child image. Empty label or filename fall back
/// to [`DEFAULT_LABEL`] / [`DEFAULT_FILENAME`].
pub fn child_path(root: &str, thread_id: u64, label: Option<&str>, filename: &str) -> String {
    let label = match label.filter(|l| !l.is_empty()) {
        Some(l) => sanitize_component(l),
        None => DEFAULT_LABEL.to_string(),
    };
    let file = if filename.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitize_component(filename)
    };
    format!("{}/{}/{}/{}", clean_root(root), thread_id, label, file)
}

/// Extracts the last path segment from a URL for use as a filename hint.
///
/// Returns `None` if the URL cannot be parsed or the path is empty/root.
pub fn filename_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path().split('/').filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// A collision-renamed child path decomposed back into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatePath {
    pub thread_id: u64,
    pub label: String,
    /// Filename without the ` (n)` suffix.
    pub base_filename: String,
    /// Path the file would have had without the rename.
    pub canonical_path: String,
}

fn duplicate_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*) \((\d+)\)(\.\w+)$").ok())
        .as_ref()
}

/// Recognizes `…/{thread_id}/{label}/{stem} ({n}){ext}`.
///
/// Accepts absolute or relative paths and either separator; returns `None`
/// for anything that is not a numbered duplicate inside a thread directory.
pub fn parse_duplicate_path(path: &str) -> Option<DuplicatePath> {
    let normalized = path.replace('\\', "/");
    let parts: Vec<&str> = normalized.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() < 4 {
        return None;
    }
    let file = parts[parts.len() - 1];
    let label = parts[parts.len() - 2];
    let thread_id: u64 = parts[parts.len() - 3].parse().ok()?;

    let caps = duplicate_re()?.captures(file)?;
    let base_filename = format!("{}{}", &caps[1], &caps[3]);
    let canonical_path = format!(
        "{}/{}",
        normalized.trim_end_matches('/').rsplit_once('/')?.0,
        base_filename
    );
    Some(DuplicatePath {
        thread_id,
        label: label.to_string(),
        base_filename,
        canonical_path,
    })
}
