//! Request model and path resolution.
//!
//! [`resolve`] is the pure front door of every middleware: it strips the query string
//! from a request URL and extracts the extension used for filtering.

use std::collections::BTreeMap;

/// An incoming asset request as seen by the middleware.
///
/// Only `url` drives build decisions; `method` and `headers` are carried so the request
/// can be handed on to the next stage unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    /// HTTP method, e.g. `GET`
    pub method: String,
    /// Raw request URL (path plus optional query string)
    pub url: String,
    /// Request headers
    pub headers: BTreeMap<String, String>,
}

impl AssetRequest {
    /// Create a request with the given method and URL and no headers.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Shorthand for a `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Resolve this request's URL.
    pub fn resolve(&self) -> ResolvedPath<'_> {
        resolve(&self.url)
    }
}

/// A request path split into its bare path and extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPath<'a> {
    /// The path with everything from the first `?` removed
    pub bare: &'a str,
    /// Substring after the last `.` of `bare`; empty when there is none
    pub extension: &'a str,
}

impl ResolvedPath<'_> {
    /// The bare path without leading slashes, suitable for joining onto a root.
    pub fn relative(&self) -> &str {
        self.bare.trim_start_matches('/')
    }
}

/// Split a request path into bare path and extension.
///
/// ```
/// use assetmill::core::request::resolve;
///
/// let resolved = resolve("/js/app.min.js?v=12");
/// assert_eq!(resolved.bare, "/js/app.min.js");
/// assert_eq!(resolved.extension, "js");
/// assert_eq!(resolve("/README").extension, "");
/// ```
pub fn resolve(request_path: &str) -> ResolvedPath<'_> {
    let bare = match request_path.find(['?', '#']) {
        Some(ix) => &request_path[..ix],
        None => request_path,
    };
    let extension = bare.rfind('.').map_or("", |ix| &bare[ix + 1..]);
    ResolvedPath { bare, extension }
}
