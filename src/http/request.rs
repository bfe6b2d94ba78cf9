use crate::{
    errors::{ErrorKind, ParseError},
    http::{
        text::{parse_query, percent_decode},
        types::{eq_ignore_case, slice_to_usize, Headers},
    },
    Method,
};
use memchr::{memchr, memmem};
use std::{collections::HashMap, net::SocketAddr, str};

pub(crate) const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// A parsed HTTP request.
///
/// Created fresh for every connection by [`Request::parse`]. Path parameters
/// are empty until the [`Router`](crate::Router) matches a route and binds
/// them on its own copy of the request.
///
/// # Input format
///
/// ```text
/// [METHOD] SP [TARGET] SP [VERSION] CRLF
/// *( [NAME] ":" [VALUE] CRLF )
/// CRLF
/// [BODY]
/// ```
///
/// - The head (everything before the blank line) must be valid UTF-8.
/// - Unknown methods are accepted as [`Method::Unknown`].
/// - The version token is required but not interpreted.
/// - Header names and values are trimmed; lines without a colon are skipped;
///   a repeated header keeps its last value.
/// - The body is whatever follows the blank line, taken verbatim.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) raw_target: String,
    pub(crate) path: String,
    pub(crate) version: String,
    pub(crate) query: HashMap<String, String>,
    pub(crate) headers: Headers,
    pub(crate) body: Vec<u8>,
    pub(crate) path_params: HashMap<String, String>,
    pub(crate) remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Builds a request by hand, splitting `target` into path and query the
    /// same way the parser does. Handy for testing handlers and routers.
    ///
    /// ```
    /// use snack_box::{Method, Request};
    ///
    /// let req = Request::new(Method::Get, "/search?q=rust+lang");
    /// assert_eq!(req.path(), "/search");
    /// assert_eq!(req.query_param("q"), Some("rust lang"));
    /// ```
    pub fn new(method: Method, target: &str) -> Self {
        let mut request = Request {
            method,
            version: "HTTP/1.1".to_string(),
            ..Request::default()
        };
        request.set_target(target);
        request
    }

    /// Parses a complete request from `bytes`.
    ///
    /// Fails only when the head is not terminated by `\r\n\r\n`, is not
    /// UTF-8, or its request line has fewer than three tokens.
    ///
    /// ```
    /// use snack_box::{Method, Request};
    ///
    /// let req = Request::parse(b"GET /hello/world?x=1&y=2 HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
    ///
    /// assert_eq!(req.method(), Method::Get);
    /// assert_eq!(req.path(), "/hello/world");
    /// assert_eq!(req.query_param("x"), Some("1"));
    /// assert_eq!(req.header("host"), Some("localhost"));
    /// ```
    #[inline]
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        Self::from_bytes(bytes).map_err(ParseError)
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, ErrorKind> {
        let head_end = memmem::find(bytes, HEAD_TERMINATOR).ok_or(ErrorKind::IncompleteHead)?;
        let head = simdutf8::basic::from_utf8(&bytes[..head_end])
            .map_err(|_| ErrorKind::InvalidEncoding)?;

        let mut lines = head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));

        let mut request = Request::default();

        // Parsing the first line
        {
            let first_line = lines.next().ok_or(ErrorKind::InvalidRequestLine)?;
            let mut parts = first_line.split(' ').filter(|part| !part.is_empty());

            let (Some(method), Some(target), Some(version)) =
                (parts.next(), parts.next(), parts.next())
            else {
                return Err(ErrorKind::InvalidRequestLine);
            };

            request.method = Method::parse(method.as_bytes());
            request.version = version.to_string();
            request.set_target(target);
        }

        // Parsing headers
        for line in lines {
            if line.is_empty() {
                break;
            }

            let Some(colon) = memchr(b':', line.as_bytes()) else {
                continue;
            };

            request
                .headers
                .insert(line[..colon].trim(), line[colon + 1..].trim());
        }

        request.body = bytes[head_end + HEAD_TERMINATOR.len()..].to_vec();

        Ok(request)
    }

    fn set_target(&mut self, target: &str) {
        let (path, query) = match memchr(b'?', target.as_bytes()) {
            Some(pos) => (&target[..pos], &target[pos + 1..]),
            None => (target, ""),
        };

        self.raw_target = target.to_string();
        self.path = percent_decode(path);
        self.query = parse_query(query);
    }
}

// Builder-style setters, mostly for tests and middleware chains
impl Request {
    #[inline]
    pub fn with_header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[inline]
    pub fn with_body<B: Into<Vec<u8>>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    #[inline]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

// Public API
impl Request {
    #[inline(always)]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// The request target exactly as it appeared on the request line.
    #[inline(always)]
    pub fn raw_target(&self) -> &str {
        &self.raw_target
    }

    /// The percent-decoded path, without the query string.
    #[inline(always)]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The protocol token from the request line, e.g. `HTTP/1.1`.
    #[inline(always)]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[inline(always)]
    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    #[inline]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    #[inline(always)]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the header value with case-insensitive name matching
    /// (per [RFC 7230](https://tools.ietf.org/html/rfc7230#section-3.2)).
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_ignore_case(name)
    }

    #[inline(always)]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Parameters bound by the matched route, e.g. `id` for `/users/:id`.
    #[inline(always)]
    pub fn path_params(&self) -> &HashMap<String, String> {
        &self.path_params
    }

    #[inline]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    #[inline(always)]
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

/// Parses `bytes`; see [`Request::parse`].
#[inline]
pub fn parse_request(bytes: &[u8]) -> Result<Request, ParseError> {
    Request::parse(bytes)
}

/// Finds the end of the head (index of the first byte of `\r\n\r\n`).
#[inline]
pub(crate) fn find_head_end(buffer: &[u8]) -> Option<usize> {
    memmem::find(buffer, HEAD_TERMINATOR)
}

/// Reads a `Content-Length` value out of a raw head, if present and valid.
///
/// Used by the reader to decide how much body to wait for; the parser itself
/// never looks at the header.
pub(crate) fn content_length(head: &[u8]) -> Option<usize> {
    head.split(|byte| *byte == b'\n').skip(1).find_map(|line| {
        let colon = memchr(b':', line)?;
        if !eq_ignore_case(line[..colon].trim_ascii(), b"content-length") {
            return None;
        }

        slice_to_usize(line[colon + 1..].trim_ascii())
    })
}
