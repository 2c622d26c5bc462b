//! HTTP/1.1 request parsing and construction.
//!
//! Requests reach the pipeline one of two ways: parsed from raw bytes by the
//! host server ([`Request::parse`]) or built programmatically
//! ([`Request::builder`]), which is how tests and embedding hosts construct
//! them. Either way a `Request` is immutable once the pipeline sees it.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// An inbound HTTP request.
///
/// Carries everything the pipeline stages key off: method, path, query,
/// headers, the remote client address, and whether the connection arrived
/// over a secure transport.
///
/// # Examples
///
/// ```
/// use gantry::http::{Method, Request};
///
/// let request = Request::builder(Method::Get, "/posts/1")
///     .query("page=2")
///     .remote_addr("10.0.0.1".parse().unwrap())
///     .build();
///
/// assert_eq!(request.full_path(), "/posts/1?page=2");
/// assert_eq!(request.remote_addr().to_string(), "10.0.0.1");
/// assert!(!request.is_secure());
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    remote_addr: IpAddr,
    secure: bool,
    body: Bytes,
    params: HashMap<String, String>,
}

impl Request {
    /// Maximum number of headers supported per request.
    const MAX_HEADERS: usize = 64;

    /// Starts building a request programmatically.
    pub fn builder(method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            method,
            path: path.into(),
            query: None,
            headers: Headers::new(),
            remote_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            secure: false,
            body: Bytes::new(),
        }
    }

    /// Parses a raw HTTP/1.1 request from a byte slice.
    ///
    /// `remote_addr` is the peer address of the connection the bytes arrived
    /// on; `secure` records whether that connection is TLS-terminated.
    /// Returns the parsed `Request` and the byte offset at which the body
    /// begins in `buf` (immediately after the `\r\n\r\n` header terminator).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — more data is needed to complete the headers.
    /// - [`RequestError::Parse`] — the data is malformed.
    /// - [`RequestError::MissingField`] — method, path, or version is absent.
    pub fn parse(
        buf: &[u8],
        remote_addr: IpAddr,
        secure: bool,
    ) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse()
            .unwrap(); // Infallible

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match raw_path.find('?') {
            Some(pos) => (
                raw_path[..pos].to_owned(),
                Some(raw_path[pos + 1..].to_owned()),
            ),
            None => (raw_path.to_owned(), None),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.append(header.name, value);
            }
        }

        let params = query.as_deref().map(parse_query_string).unwrap_or_default();
        let body = Bytes::copy_from_slice(&buf[body_offset..]);

        Ok((
            Self {
                method,
                path,
                query,
                version,
                headers: header_map,
                remote_addr,
                secure,
                body,
                params,
            },
            body_offset,
        ))
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the path with the query string reattached, e.g. `/posts?page=2`.
    ///
    /// Cache keys and redirect targets are derived from this form.
    pub fn full_path(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the remote client address.
    pub fn remote_addr(&self) -> IpAddr {
        self.remote_addr
    }

    /// Returns `true` if the request arrived over a secure transport.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns a parsed query parameter value by key.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }
}

/// Builder for programmatically constructed requests.
///
/// Created by [`Request::builder`]. Defaults: HTTP/1.1, loopback remote
/// address, insecure transport, empty body.
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    path: String,
    query: Option<String>,
    headers: Headers,
    remote_addr: IpAddr,
    secure: bool,
    body: Bytes,
}

impl RequestBuilder {
    /// Sets the raw query string (without the leading `?`).
    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the remote client address.
    #[must_use]
    pub fn remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = addr;
        self
    }

    /// Marks the request as having arrived over a secure transport.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Finalizes the request.
    pub fn build(self) -> Request {
        let params = self
            .query
            .as_deref()
            .map(parse_query_string)
            .unwrap_or_default();
        Request {
            method: self.method,
            path: self.path,
            query: self.query,
            version: 1,
            headers: self.headers,
            remote_addr: self.remote_addr,
            secure: self.secure,
            body: self.body,
            params,
        }
    }
}

/// Parses a URL query string (`key=value&key2=value2`) into a `HashMap`.
///
/// `+` is decoded as a space; full percent-decoding is intentionally omitted.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?.replace('+', " ");
            let value = parts.next().unwrap_or("").replace('+', " ");
            Some((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw, loopback(), false).unwrap();
        assert_eq!(req.method().as_str(), "GET");
        assert_eq!(req.path(), "/");
        assert_eq!(req.version(), 1);
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert_eq!(offset, raw.len()); // no body
    }

    #[test]
    fn parse_preserves_query() {
        let raw = b"GET /search?q=rust&page=2 HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (req, _) = Request::parse(raw, loopback(), false).unwrap();
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_string(), Some("q=rust&page=2"));
        assert_eq!(req.query_param("q"), Some("rust"));
        assert_eq!(req.full_path(), "/search?q=rust&page=2");
    }

    #[test]
    fn parse_records_connection_facts() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let remote: IpAddr = "10.0.0.1".parse().unwrap();
        let (req, _) = Request::parse(raw, remote, true).unwrap();
        assert_eq!(req.remote_addr(), remote);
        assert!(req.is_secure());
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(
            Request::parse(raw, loopback(), false),
            Err(RequestError::Incomplete)
        ));
    }

    #[test]
    fn keep_alive_http11_default() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, _) = Request::parse(raw, loopback(), false).unwrap();
        assert!(req.is_keep_alive());
    }

    #[test]
    fn connection_close() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
        let (req, _) = Request::parse(raw, loopback(), false).unwrap();
        assert!(!req.is_keep_alive());
    }

    #[test]
    fn content_length() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
        let (req, body_offset) = Request::parse(raw, loopback(), false).unwrap();
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(&raw[body_offset..], b"hello");
    }

    #[test]
    fn builder_defaults() {
        let req = Request::builder(Method::Get, "/").build();
        assert_eq!(req.full_path(), "/");
        assert!(!req.is_secure());
        assert!(req.body().is_empty());
        assert!(req.is_keep_alive());
    }

    #[test]
    fn builder_full() {
        let req = Request::builder(Method::Post, "/posts")
            .query("draft=1")
            .header("Authorization", "Bearer t")
            .remote_addr("192.168.1.9".parse().unwrap())
            .secure(true)
            .body(&b"{\"title\":\"x\"}"[..])
            .build();
        assert_eq!(req.query_param("draft"), Some("1"));
        assert_eq!(req.headers().get("authorization"), Some("Bearer t"));
        assert_eq!(req.remote_addr().to_string(), "192.168.1.9");
        assert!(req.is_secure());
    }
}
