//! Path component sanitization.

/// Replaces every character outside `[A-Za-z0-9_.-]` with `_`.
///
/// Applied to the attribution label and the filename; one replacement per
/// character, no collapsing, so the mapping stays stable across restarts.
pub fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
