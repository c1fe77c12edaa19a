//! DSS endpoint URL builders and pagination helpers

/// Build search URL
pub fn search_url(base_url: &str) -> String {
    format!("{}/search", trim(base_url))
}

/// Build bundle manifest URL
pub fn bundle_url(base_url: &str, uuid: &str) -> String {
    format!("{}/bundles/{}", trim(base_url), uuid)
}

/// Build file download URL
pub fn file_url(base_url: &str, uuid: &str) -> String {
    format!("{}/files/{}", trim(base_url), uuid)
}

fn trim(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header
///
/// ```
/// use dss_etl::api::endpoints::next_link;
///
/// let header = r#"<https://dss/v1/search?per_page=500&search_after=x>; rel="next""#;
/// assert_eq!(next_link(header).as_deref(), Some("https://dss/v1/search?per_page=500&search_after=x"));
/// ```
pub fn next_link(header: &str) -> Option<String> {
    let mut rest = header;

    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let end = after.find('>')?;
        let target = &after[..end];
        let tail = &after[end + 1..];
        let params = match tail.find('<') {
            Some(next) => &tail[..next],
            None => tail,
        };

        if params.split(';').any(is_next_relation) {
            return Some(target.to_string());
        }

        rest = &tail[params.len()..];
    }

    None
}

fn is_next_relation(param: &str) -> bool {
    match param.split_once('=') {
        Some((key, value)) => {
            key.trim().eq_ignore_ascii_case("rel")
                && value
                    .trim()
                    .trim_end_matches(',')
                    .trim()
                    .trim_matches('"')
                    .split_whitespace()
                    .any(|rel| rel.eq_ignore_ascii_case("next"))
        },
        None => false,
    }
}
