//! Request and response types exchanged between the platform, the
//! strategies and the cache tiers.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, WorkerError};

/// Status code synthesized for the offline navigation fallback.
pub const OFFLINE_STATUS: u16 = 503;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "HEAD" => Some(Method::Head),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "PATCH" => Some(Method::Patch),
            "DELETE" => Some(Method::Delete),
            "OPTIONS" => Some(Method::Options),
            _ => None,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        };
        f.write_str(name)
    }
}

/// How the page issued the request. Only navigations get the offline shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RequestMode {
    Navigate,
    #[default]
    Subresource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
}

impl Request {
    pub fn new(method: Method, url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| WorkerError::InvalidRequest(format!("{}: {}", url, e)))?;
        Ok(Self {
            method,
            url,
            mode: RequestMode::Subresource,
        })
    }

    pub fn get(url: &str) -> Result<Self> {
        Self::new(Method::Get, url)
    }

    /// A top-level page navigation to `url`.
    pub fn navigate(url: &str) -> Result<Self> {
        Ok(Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)?
        })
    }

    /// Same origin, different path. Used for manifest and fallback lookups.
    pub fn sibling(&self, path: &str) -> Result<Self> {
        let url = self
            .url
            .join(path)
            .map_err(|e| WorkerError::InvalidRequest(format!("{}: {}", path, e)))?;
        Ok(Self {
            method: Method::Get,
            url,
            mode: RequestMode::Subresource,
        })
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Identity under which the response is stored in a tier.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Synthesized response for navigations when neither network nor shell is available.
    pub fn offline() -> Self {
        Self::new(OFFLINE_STATUS, "Offline").with_header("content-type", "text/plain")
    }

    /// Only a plain 200 is ever written into a tier.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("get"), Some(Method::Get));
        assert_eq!(Method::parse("POST"), Some(Method::Post));
        assert_eq!(Method::parse("BREW"), None);
    }

    #[test]
    fn test_request_scheme_detection() {
        assert!(Request::get("https://campus.test/").unwrap().is_http());
        assert!(Request::get("http://campus.test/app.js").unwrap().is_http());
        assert!(!Request::get("chrome-extension://abc/script.js").unwrap().is_http());
    }

    #[test]
    fn test_request_sibling_keeps_origin() {
        let req = Request::navigate("https://campus.test/contacts").unwrap();
        let root = req.sibling("/").unwrap();
        assert_eq!(root.url.as_str(), "https://campus.test/");
        assert!(!root.is_navigation());
    }

    #[test]
    fn test_cache_key_includes_method_and_url() {
        let req = Request::get("https://campus.test/index.html").unwrap();
        assert_eq!(req.cache_key(), "GET https://campus.test/index.html");
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = Request::get("not a url").unwrap_err();
        assert!(matches!(err, WorkerError::InvalidRequest(_)));
    }

    #[test]
    fn test_offline_response() {
        let resp = Response::offline();
        assert_eq!(resp.status, OFFLINE_STATUS);
        assert_eq!(resp.text(), "Offline");
        assert_eq!(resp.header("Content-Type"), Some("text/plain"));
        assert!(!resp.is_cacheable());
    }
}
