use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("unknown HTTP method '{method}'")]
    UnknownMethod { method: String },

    #[error("invalid header format: {header}")]
    InvalidHeader { header: String },

    #[error("invalid target URL: {url}")]
    InvalidTarget { url: String },
}

/// The standard request methods a route can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }
}

impl FromStr for Method {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "CONNECT" => Ok(Method::Connect),
            "OPTIONS" => Ok(Method::Options),
            "TRACE" => Ok(Method::Trace),
            "PATCH" => Ok(Method::Patch),
            _ => Err(RouteError::UnknownMethod {
                method: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Connect => reqwest::Method::CONNECT,
            Method::Options => reqwest::Method::OPTIONS,
            Method::Trace => reqwest::Method::TRACE,
            Method::Patch => reqwest::Method::PATCH,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Parses a `Key: Value` header as given on the command line.
pub fn parse_header(raw: &str) -> Result<Header, RouteError> {
    match raw.split_once(": ") {
        Some((key, value)) if !key.trim().is_empty() => Ok(Header::new(key.trim(), value)),
        _ => Err(RouteError::InvalidHeader {
            header: raw.to_string(),
        }),
    }
}

/// A request template independent of any target host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub headers: Vec<Header>,
    pub source: String,
}

impl Route {
    /// Builds a route, prefixing the path with `/` when it lacks one.
    pub fn new(method: Method, path: &str, source: impl Into<String>) -> Self {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        Self {
            method,
            path,
            headers: Vec::new(),
            source: source.into(),
        }
    }

    pub fn get(path: &str, source: impl Into<String>) -> Self {
        Self::new(Method::Get, path, source)
    }

    pub fn with_headers(mut self, headers: Vec<Header>) -> Self {
        self.headers = headers;
        self
    }
}

/// A scan destination. `host` carries the port when it is not the default.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub is_tls: bool,
    pub headers: Vec<Header>,
}

impl Target {
    pub fn new(host: impl Into<String>, is_tls: bool) -> Self {
        Self {
            host: host.into(),
            is_tls,
            headers: Vec::new(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let invalid = || RouteError::InvalidTarget {
            url: raw.to_string(),
        };
        let url = url::Url::parse(raw.trim()).map_err(|_| invalid())?;
        let is_tls = match url.scheme() {
            "https" => true,
            "http" => false,
            _ => return Err(invalid()),
        };
        let host = url.host_str().ok_or_else(invalid)?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Self::new(host, is_tls))
    }

    pub fn scheme(&self) -> &'static str {
        if self.is_tls {
            "https"
        } else {
            "http"
        }
    }

    /// `host:port` form suitable for dialing.
    pub fn address(&self) -> String {
        if self.host.rsplit_once(':').map_or(false, |(_, port)| {
            !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())
        }) {
            return self.host.clone();
        }
        let port = if self.is_tls { 443 } else { 80 };
        format!("{}:{port}", self.host)
    }

    /// Absolute URL for a route on this target, also the request target a
    /// forward proxy expects on a plain connection.
    pub fn url_for(&self, route: &Route) -> String {
        format!("{}://{}{}", self.scheme(), self.host, route.path)
    }
}

/// Keeps routes whose source is in `apis`. An empty set keeps everything.
pub fn filter_by_source(routes: Vec<Route>, apis: &HashSet<String>) -> Vec<Route> {
    if apis.is_empty() {
        return routes;
    }
    routes
        .into_iter()
        .filter(|r| apis.contains(&r.source))
        .collect()
}

pub fn force_method(routes: &mut [Route], method: Method) {
    for r in routes.iter_mut() {
        r.method = method;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_new_prefixes_missing_slash() {
        assert_eq!(Route::get("admin", "w").path, "/admin");
        assert_eq!(Route::get("/admin", "w").path, "/admin");
        assert_eq!(Route::get("", "w").path, "/");
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("patch".parse::<Method>().unwrap(), Method::Patch);
        assert_eq!(" Get ".parse::<Method>().unwrap(), Method::Get);
        assert!("FETCH".parse::<Method>().is_err());
    }

    #[test]
    fn parse_header_splits_on_first_separator() {
        let h = parse_header("Authorization: Bearer a: b").unwrap();
        assert_eq!(h.key, "Authorization");
        assert_eq!(h.value, "Bearer a: b");
        assert!(parse_header("NoSeparator").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn target_builds_urls_and_addresses() {
        let t = Target::parse("https://api.example.com").unwrap();
        assert!(t.is_tls);
        assert_eq!(t.address(), "api.example.com:443");
        assert_eq!(
            t.url_for(&Route::get("/v1/users", "w")),
            "https://api.example.com/v1/users"
        );

        let t = Target::parse("http://127.0.0.1:8080/ignored").unwrap();
        assert_eq!(t.host, "127.0.0.1:8080");
        assert_eq!(t.address(), "127.0.0.1:8080");
        assert!(Target::parse("ftp://example.com").is_err());
    }

    #[test]
    fn filter_and_force_method() {
        let routes = vec![Route::get("/a", "one"), Route::get("/b", "two")];
        let keep: HashSet<String> = ["two".to_string()].into_iter().collect();
        let mut out = filter_by_source(routes.clone(), &keep);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, "/b");

        force_method(&mut out, Method::Post);
        assert_eq!(out[0].method, Method::Post);

        assert_eq!(filter_by_source(routes, &HashSet::new()).len(), 2);
    }
}
