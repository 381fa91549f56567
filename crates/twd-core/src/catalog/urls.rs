//! URL builders for the board API and media host.

fn base(s: &str) -> &str {
    s.trim_end_matches('/')
}

pub fn catalog_url(api_base: &str, board: &str) -> String {
    format!("{}/{}/catalog.json", base(api_base), board)
}

pub fn thread_url(api_base: &str, board: &str, thread_id: u64) -> String {
    format!("{}/{}/thread/{}.json", base(api_base), board, thread_id)
}

pub fn media_url(media_base: &str, board: &str, filename: &str) -> String {
    format!("{}/{}/{}", base(media_base), board, filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_api_urls() {
        assert_eq!(
            catalog_url("https://a.4cdn.org", "wg"),
            "https://a.4cdn.org/wg/catalog.json"
        );
        assert_eq!(
            thread_url("https://a.4cdn.org/", "wg", 123),
            "https://a.4cdn.org/wg/thread/123.json"
        );
        assert_eq!(
            media_url("https://i.4cdn.org", "wg", "1700.jpg"),
            "https://i.4cdn.org/wg/1700.jpg"
        );
    }
}
