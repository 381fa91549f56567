//! Filesystem walk for the destination-exists check.

use std::fs;
use std::path::Path;

use regex::Regex;

use super::curl_manager::PART_SUFFIX;

/// Collects `/`-separated paths relative to `root` of regular files whose
/// relative path matches `pattern`. Partial downloads are ignored. Stops
/// after `limit` matches. Runs in the current thread.
pub(crate) fn walk_matching(root: &Path, pattern: &Regex, limit: usize) -> Vec<String> {
    let mut out = Vec::new();
    if limit == 0 {
        return out;
    }
    let mut stack = vec![(root.to_path_buf(), String::new())];
    while let Some((dir, rel)) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let child_rel = if rel.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", rel, name)
            };
            let Ok(ft) = entry.file_type() else {
                continue;
            };
            if ft.is_dir() {
                stack.push((entry.path(), child_rel));
            } else if ft.is_file() && !name.ends_with(PART_SUFFIX) && pattern.is_match(&child_rel) {
                out.push(child_rel);
                if out.len() >= limit {
                    return out;
                }
            }
        }
    }
    out
}
