//! Collision renaming: `name.ext` -> `name (1).ext`, `name (2).ext`, ...

/// `n`-th collision name for `filename`; the extension is the text after the
/// last dot, if any.
pub fn numbered_name(filename: &str, n: u32) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", filename, n),
    }
}

/// First candidate for which `taken` is false: the name itself, then
/// numbered names.
pub(crate) fn first_free(filename: &str, mut taken: impl FnMut(&str) -> bool) -> String {
    if !taken(filename) {
        return filename.to_string();
    }
    let mut n = 1u32;
    loop {
        let candidate = numbered_name(filename, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
