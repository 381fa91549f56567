//! JSON model of catalog pages and thread documents.
//!
//! Parsing is lenient at the entry level (bad catalog entries are skipped)
//! and strict at the document level (a thread without posts is malformed).

use serde_json::Value;

use super::urls::media_url;
use crate::retry::FetchError;

/// One image-bearing post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    /// Upstream renamed-file timestamp; the local filename stem.
    pub tim: u64,
    /// Extension including the dot, e.g. `.jpg`.
    pub ext: String,
    /// Poster name, used as the attribution label.
    pub name: Option<String>,
}

impl ChildRef {
    /// Child-local identifier: `{tim}{ext}`.
    pub fn filename(&self) -> String {
        format!("{}{}", self.tim, self.ext)
    }

    pub fn url(&self, media_base: &str, board: &str) -> String {
        media_url(media_base, board, &self.filename())
    }
}

/// Current upstream state of one thread.
#[derive(Debug, Clone)]
pub struct ThreadSnapshot {
    pub closed: bool,
    pub archived: bool,
    /// Subject of the opening post.
    pub subject: Option<String>,
    /// Unix seconds of the opening post.
    pub time: Option<i64>,
    /// Image posts in upstream order.
    pub children: Vec<ChildRef>,
}

impl ThreadSnapshot {
    pub fn from_json(v: &Value) -> Result<Self, FetchError> {
        let posts = v
            .get("posts")
            .and_then(Value::as_array)
            .ok_or_else(|| FetchError::Malformed("thread document has no posts array".into()))?;
        let op = posts
            .first()
            .ok_or_else(|| FetchError::Malformed("thread document has no posts".into()))?;

        let flag = |key: &str| op.get(key).and_then(Value::as_i64) == Some(1);
        let children = posts.iter().filter_map(child_from_post).collect();

        Ok(Self {
            closed: flag("closed"),
            archived: flag("archived"),
            subject: op
                .get("sub")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            time: op.get("time").and_then(Value::as_i64).filter(|t| *t > 0),
            children,
        })
    }

    pub fn is_closed_or_archived(&self) -> bool {
        self.closed || self.archived
    }

    pub fn total_children(&self) -> usize {
        self.children.len()
    }

    /// Word used in logs for the upstream terminal state.
    pub fn terminal_state(&self) -> &'static str {
        if self.closed {
            "closed"
        } else {
            "archived"
        }
    }
}

fn child_from_post(post: &Value) -> Option<ChildRef> {
    let tim = post.get("tim").and_then(Value::as_u64).filter(|t| *t > 0)?;
    let ext = post
        .get("ext")
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())?;
    Some(ChildRef {
        tim,
        ext: ext.to_string(),
        name: post
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// A thread as listed in the board catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub no: u64,
    pub time: Option<i64>,
    pub sub: Option<String>,
    pub com: Option<String>,
}

/// Flattens the catalog's page array into entries. Pages without a `threads`
/// array and entries without a numeric `no` are skipped.
pub fn parse_catalog(v: &Value) -> Result<Vec<CatalogEntry>, FetchError> {
    let pages = v
        .as_array()
        .ok_or_else(|| FetchError::Malformed("catalog response was not an array".into()))?;
    let mut out = Vec::new();
    for page in pages {
        let Some(threads) = page.get("threads").and_then(Value::as_array) else {
            continue;
        };
        for t in threads {
            let Some(no) = t.get("no").and_then(Value::as_u64).filter(|n| *n > 0) else {
                continue;
            };
            let text = |key: &str| t.get(key).and_then(Value::as_str).map(str::to_string);
            out.push(CatalogEntry {
                no,
                time: t.get("time").and_then(Value::as_i64),
                sub: text("sub"),
                com: text("com"),
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn thread_children_in_order() {
        let doc = json!({"posts": [
            {"no": 1, "sub": "Wallpapers", "time": 1700000000, "tim": 111, "ext": ".jpg", "name": "Anonymous"},
            {"no": 2, "com": "text only"},
            {"no": 3, "tim": 222, "ext": ".png", "name": "bob"}
        ]});
        let t = ThreadSnapshot::from_json(&doc).unwrap();
        assert!(!t.is_closed_or_archived());
        assert_eq!(t.subject.as_deref(), Some("Wallpapers"));
        assert_eq!(t.total_children(), 2);
        assert_eq!(t.children[0].filename(), "111.jpg");
        assert_eq!(t.children[1].name.as_deref(), Some("bob"));
        assert_eq!(
            t.children[1].url("https://i.4cdn.org", "wg"),
            "https://i.4cdn.org/wg/222.png"
        );
    }

    #[test]
    fn closed_and_archived_flags() {
        let closed = ThreadSnapshot::from_json(&json!({"posts": [{"no": 1, "closed": 1}]})).unwrap();
        assert!(closed.is_closed_or_archived());
        assert_eq!(closed.terminal_state(), "closed");
        let archived =
            ThreadSnapshot::from_json(&json!({"posts": [{"no": 1, "archived": 1}]})).unwrap();
        assert!(archived.is_closed_or_archived());
        assert_eq!(archived.terminal_state(), "archived");
    }

    #[test]
    fn thread_without_posts_is_malformed() {
        assert!(matches!(
            ThreadSnapshot::from_json(&json!({"posts": []})),
            Err(FetchError::Malformed(_))
        ));
        assert!(matches!(
            ThreadSnapshot::from_json(&json!([1, 2])),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn catalog_skips_invalid_pages_and_entries() {
        let doc = json!([
            {"page": 1, "threads": [
                {"no": 10, "time": 5, "sub": "a"},
                {"no": "bad"},
                {"time": 6}
            ]},
            {"page": 2},
            null,
            {"page": 3, "threads": [{"no": 11, "com": "b"}]}
        ]);
        let entries = parse_catalog(&doc).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].no, 10);
        assert_eq!(entries[1].com.as_deref(), Some("b"));
        assert_eq!(entries[1].time, None);
    }

    #[test]
    fn non_array_catalog_is_malformed() {
        assert!(matches!(
            parse_catalog(&json!({"threads": []})),
            Err(FetchError::Malformed(_))
        ));
    }
}
