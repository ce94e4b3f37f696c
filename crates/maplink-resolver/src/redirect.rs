//! Stage 1: follow HTTP redirects from the input link to its terminal URL.

use percent_encoding::percent_decode_str;
use reqwest::{Client, Url};

use crate::error::ResolveError;

/// Maximum number of redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

/// The URL reached after following every redirect, in both its wire form
/// (used for further fetches) and percent-decoded form (used for pattern
/// matching and reported back to callers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalUrl {
    pub raw: String,
    pub decoded: String,
}

impl TerminalUrl {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let decoded = decode_terminal_url(&raw);
        Self { raw, decoded }
    }
}

/// Issue a GET for `query`, following up to [`MAX_REDIRECTS`] hops, and
/// return the URL actually reached.
///
/// The response status of the final hop is not inspected; a 404 page is
/// still a terminal URL worth matching against.
///
/// # Errors
///
/// - [`ResolveError::InvalidUrl`] if `query` is not an absolute URL.
/// - [`ResolveError::TooManyRedirects`] if the hop limit is exceeded.
/// - [`ResolveError::Http`] on any other transport failure.
pub async fn follow_redirects(client: &Client, query: &str) -> Result<TerminalUrl, ResolveError> {
    let url = Url::parse(query.trim()).map_err(|e| ResolveError::InvalidUrl {
        url: query.to_string(),
        reason: e.to_string(),
    })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_redirect() {
            ResolveError::TooManyRedirects {
                url: query.to_string(),
                limit: MAX_REDIRECTS,
            }
        } else {
            ResolveError::Http(e)
        }
    })?;

    let terminal = TerminalUrl::new(response.url().as_str());
    tracing::debug!(
        query,
        terminal = %terminal.raw,
        status = response.status().as_u16(),
        "followed redirects"
    );
    Ok(terminal)
}

/// Percent-decode a terminal URL, falling back to the raw string when it
/// contains malformed escapes or decodes to invalid UTF-8.
#[must_use]
pub fn decode_terminal_url(raw: &str) -> String {
    if has_malformed_escape(raw) {
        tracing::debug!(url = raw, "malformed percent escape; keeping raw URL");
        return raw.to_string();
    }
    match percent_decode_str(raw).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            tracing::debug!(url = raw, error = %e, "percent-decoded URL is not UTF-8; keeping raw URL");
            raw.to_string()
        }
    }
}

/// `true` when a `%` is not followed by two hex digits.
fn has_malformed_escape(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.iter().enumerate().any(|(i, &b)| {
        b == b'%'
            && !(bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit))
    })
}
