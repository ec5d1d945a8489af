use crate::UrlError;
use url::Url;

/// Query keys that only identify a campaign or referrer, never content
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "msclkid", "dclid", "mc_cid", "mc_eid", "_ga", "_hsenc", "_hsmi", "ref",
    "source",
];

/// Canonical form of a page URL, used as the visited-set key
///
/// Equivalent spellings of one page collapse to the same key:
///
/// - scheme must be http or https and is kept as given
/// - host lowercased, leading `www.` dropped, port kept
/// - `.`/`..` and empty path segments resolved, trailing slash dropped
///   (the root stays `/`)
/// - fragment dropped
/// - tracking parameters (`utm_*`, click ids) dropped, the rest sorted by key
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::normalize_url;
///
/// let url = normalize_url("https://WWW.EXAMPLE.COM/about/#team").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/about");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url)
}

/// [`normalize_url`] for a URL that is already parsed, e.g. a resolved link
pub fn normalize_parsed(mut url: Url) -> Result<Url, UrlError> {
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(UrlError::InvalidScheme(format!(
                "expected http or https, got {}",
                other
            )))
        }
    }

    let host = canonical_host(url.host_str().ok_or(UrlError::MissingDomain)?);
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("cannot set host {}: {}", host, e)))?;

    let path = canonical_path(url.path());
    url.set_path(&path);
    url.set_fragment(None);

    let query = canonical_query(&url);
    match query {
        Some(pairs) => {
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }
        None => url.set_query(None),
    }

    Ok(url)
}

fn canonical_host(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(bare) if !bare.is_empty() => bare.to_string(),
        _ => host,
    }
}

fn canonical_path(path: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if segment == ".." {
            kept.pop();
        } else {
            kept.push(segment);
        }
    }
    format!("/{}", kept.join("/"))
}

/// Remaining query pairs sorted by key; `None` when nothing is left
fn canonical_query(url: &Url) -> Option<Vec<(String, String)>> {
    url.query()?;

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if pairs.is_empty() {
        return None;
    }

    // Stable, so repeated keys keep their relative order
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    Some(pairs)
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
