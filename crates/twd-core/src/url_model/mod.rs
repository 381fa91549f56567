//! Child path model.
//!
//! Every downloaded image has one canonical relative path,
//! `{root}/{thread_id}/{label}/{file}`, which doubles as its history key.
//! The transfer manager may rename a colliding file to `{stem} ({n}){ext}`;
//! [`parse_duplicate_path`] maps such a name back to its canonical path.

mod path;
mod sanitize;

pub use path::{child_path, clean_root, filename_from_url_path, parse_duplicate_path, DuplicatePath};
pub use sanitize::sanitize_component;

/// Label used when a post has no poster name.
pub const DEFAULT_LABEL: &str = "Anonymous";
/// Filename used when a child URL has no usable last segment.
pub const DEFAULT_FILENAME: &str = "unknown_file";
