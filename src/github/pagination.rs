//! Cursor-following retrieval of JSON array endpoints.
//!
//! GitHub paginates list endpoints and advertises the next page through the
//! `Link` response header. [`fetch_pages`] walks that chain with an explicit
//! loop, while the cursor extraction itself sits behind [`NextPageCursor`]
//! so a host with another paging convention only needs a new cursor type.
//!
//! See <https://docs.github.com/en/rest/using-the-rest-api/using-pagination-in-the-rest-api>.

use reqwest::header::{HeaderMap, LINK};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use url::Url;

use super::client::{check_status, ApiError};

/// Extracts the location of the next page from a response.
pub trait NextPageCursor: Send + Sync {
    /// Returns the next page's URL, resolved against `current`, or `None`
    /// when the response was the last page.
    fn next_page(&self, current: &Url, headers: &HeaderMap) -> Option<Url>;
}

/// RFC 8288 `Link` header cursor: follows the link whose relation is `next`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkHeaderCursor;

impl NextPageCursor for LinkHeaderCursor {
    fn next_page(&self, current: &Url, headers: &HeaderMap) -> Option<Url> {
        let value = headers.get(LINK)?.to_str().ok()?;
        let target = parse_next_link(value)?;
        current.join(target).ok()
    }
}

/// Finds the target of the `rel="next"` entry in a `Link` header value.
///
/// Handles several comma-separated links, quoted or bare `rel` values,
/// space-separated relation lists and any letter case
/// (`<https://x/?page=2>; rel="Next"` is accepted).
pub fn parse_next_link(header: &str) -> Option<&str> {
    let mut rest = header;
    loop {
        let start = rest.find('<')?;
        let end = start + rest[start..].find('>')?;
        let target = rest[start + 1..end].trim();
        let after = &rest[end + 1..];
        // Parameters run until the next link value begins.
        let params_end = after.find('<').unwrap_or(after.len());
        let params = &after[..params_end];
        if has_next_relation(params) {
            return Some(target);
        }
        rest = &after[params_end..];
    }
}

fn has_next_relation(params: &str) -> bool {
    params
        .split([';', ','])
        .filter_map(|param| param.split_once('='))
        .filter(|(key, _)| key.trim().eq_ignore_ascii_case("rel"))
        .any(|(_, value)| {
            value
                .trim()
                .trim_matches('"')
                .split_ascii_whitespace()
                .any(|rel| rel.eq_ignore_ascii_case("next"))
        })
}

/// Fetches a JSON array endpoint, following next-page cursors.
///
/// # Arguments
///
/// * `http` - HTTP client
/// * `url` - First page
/// * `headers` - Sent unchanged with every page request
/// * `label` - Names the operation in error messages
/// * `max_results` - Stop once this many elements are accumulated
/// * `cursor` - Next-page extraction strategy
///
/// # Returns
///
/// The elements of every fetched page, in server order, truncated to
/// `max_results`.
///
/// The walk also ends on a page with no elements and on a `next` link
/// pointing at a page already fetched, so a looping chain terminates.
///
/// # Errors
///
/// The first non-success response aborts with [`ApiError::Status`]; there is
/// no retry. A page that is not a JSON array of `T` yields
/// [`ApiError::Decode`].
pub async fn fetch_pages<T: DeserializeOwned>(
    http: &reqwest::Client,
    url: Url,
    headers: &HeaderMap,
    label: &str,
    max_results: Option<usize>,
    cursor: &dyn NextPageCursor,
) -> Result<Vec<T>, ApiError> {
    let cap = max_results.unwrap_or(usize::MAX);
    let mut results: Vec<T> = Vec::new();
    let mut next = Some(url);
    let mut pages = 0usize;
    let mut visited: HashSet<Url> = HashSet::new();

    while let Some(page_url) = next.take() {
        visited.insert(page_url.clone());
        let response = http
            .get(page_url.clone())
            .headers(headers.clone())
            .send()
            .await
            .map_err(|source| ApiError::network(label, source))?;
        check_status(&response, label)?;

        // Capture the cursor before the body consumes the response.
        let following = cursor.next_page(&page_url, response.headers());

        let bytes = response
            .bytes()
            .await
            .map_err(|source| ApiError::network(label, source))?;
        let page: Vec<T> =
            serde_json::from_slice(&bytes).map_err(|source| ApiError::decode(label, source))?;
        pages += 1;
        let page_len = page.len();
        results.extend(page);

        if results.len() >= cap || page_len == 0 {
            break;
        }
        next = match following {
            Some(url) if visited.contains(&url) => {
                tracing::warn!(label, url = %url, "Next page link revisits a fetched page, stopping");
                None
            }
            other => other,
        };
    }

    results.truncate(cap);
    tracing::debug!(label, pages, results = results.len(), "Pagination finished");
    Ok(results)
}
