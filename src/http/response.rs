//! HTTP response value and its wire serialization.

use crate::{
    http::{text::now_rfc3339, types::Headers},
    Method, StatusCode,
};
use std::io::Write;

pub(crate) const SERVER_NAME: &str = "SnackBox/0.1";

/// HTTP response returned by handlers, middleware and the static file
/// fallback.
///
/// Every response starts with `Server` and `Connection: close` headers. The
/// server adds `Date` and `Content-Length` before writing if the handler did
/// not set them (see [`finalize`](Response::finalize)).
///
/// # Examples
/// ```
/// use snack_box::{Response, StatusCode};
///
/// let resp = Response::new(StatusCode::CREATED)
///     .with_header("Content-Type", "application/json")
///     .with_body(r#"{"id":7}"#);
///
/// assert_eq!(resp.status(), StatusCode::CREATED);
/// assert_eq!(resp.headers().get("Content-Length"), Some("8"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

// Constructors
impl Response {
    /// An empty response with the default headers.
    #[inline]
    pub fn new<S: Into<StatusCode>>(status: S) -> Self {
        let mut headers = Headers::new();
        headers.insert("Server", SERVER_NAME);
        headers.insert("Connection", "close");

        Self {
            status: status.into(),
            headers,
            body: Vec::new(),
        }
    }

    /// A `text/plain; charset=utf-8` response.
    #[inline]
    pub fn text<S: Into<StatusCode>, B: Into<Vec<u8>>>(status: S, body: B) -> Self {
        Self::with_content_type(status, body, "text/plain; charset=utf-8")
    }

    /// A `text/html; charset=utf-8` response.
    #[inline]
    pub fn html<S: Into<StatusCode>, B: Into<Vec<u8>>>(status: S, body: B) -> Self {
        Self::with_content_type(status, body, "text/html; charset=utf-8")
    }

    /// A response with an explicit content type.
    #[inline]
    pub fn with_content_type<S, B>(status: S, body: B, content_type: &str) -> Self
    where
        S: Into<StatusCode>,
        B: Into<Vec<u8>>,
    {
        Self::new(status)
            .with_header("Content-Type", content_type)
            .with_body(body)
    }

    #[inline]
    pub fn not_found() -> Self {
        Self::text(StatusCode::NOT_FOUND, "Not Found")
    }

    /// `405 Method Not Allowed` with an `Allow` header listing `allowed`.
    ///
    /// ```
    /// use snack_box::{Method, Response};
    ///
    /// let resp = Response::method_not_allowed(&[Method::Get, Method::Put]);
    /// assert_eq!(resp.status().as_u16(), 405);
    /// assert_eq!(resp.headers().get("Allow"), Some("GET, PUT"));
    /// ```
    pub fn method_not_allowed(allowed: &[Method]) -> Self {
        let mut resp = Self::text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");

        if !allowed.is_empty() {
            let allow = allowed
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            resp.headers.insert("Allow", allow);
        }

        resp
    }

    #[inline]
    pub fn bad_request() -> Self {
        Self::text(StatusCode::BAD_REQUEST, "Bad Request")
    }

    #[inline]
    pub fn payload_too_large() -> Self {
        Self::text(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large")
    }

    #[inline]
    pub fn internal_error() -> Self {
        Self::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    }

    #[inline]
    pub fn service_unavailable() -> Self {
        Self::text(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
    }
}

// Builder
impl Response {
    #[inline]
    pub fn with_status<S: Into<StatusCode>>(mut self, status: S) -> Self {
        self.status = status.into();
        self
    }

    /// Sets a header, replacing one with the exact same name.
    #[inline]
    pub fn with_header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces the body and updates `Content-Length` to match it.
    #[inline]
    pub fn with_body<B: Into<Vec<u8>>>(mut self, body: B) -> Self {
        self.set_body(body);
        self
    }

    #[inline]
    pub fn set_body<B: Into<Vec<u8>>>(&mut self, body: B) {
        self.body = body.into();
        self.headers.remove_ignore_case("Content-Length");
        self.headers
            .insert("Content-Length", self.body.len().to_string());
    }
}

// Accessors
impl Response {
    #[inline(always)]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[inline(always)]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    #[inline(always)]
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    #[inline(always)]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl Response {
    /// Fills in the headers every response on the wire must carry.
    ///
    /// - `Date` is added when no `Date` header exists.
    /// - `Content-Length` is added when missing, and rewritten when the
    ///   existing value is not the body's exact byte length.
    pub fn finalize(&mut self) {
        if !self.headers.contains_ignore_case("Date") {
            self.headers.insert("Date", now_rfc3339());
        }

        let length = self.body.len().to_string();
        if self.headers.get_ignore_case("Content-Length") != Some(length.as_str()) {
            self.headers.remove_ignore_case("Content-Length");
            self.headers.insert("Content-Length", length);
        }
    }

    /// Serializes the response as it would appear on the wire.
    ///
    /// Headers are written in insertion order and the body verbatim. No
    /// headers are added here; call [`finalize`](Response::finalize) first
    /// for a complete message.
    ///
    /// ```
    /// use snack_box::{Response, StatusCode};
    ///
    /// let bytes = Response::text(StatusCode::OK, "hi").to_bytes();
    /// assert_eq!(
    ///     bytes,
    ///     b"HTTP/1.1 200 OK\r\n\
    ///       Server: SnackBox/0.1\r\n\
    ///       Connection: close\r\n\
    ///       Content-Type: text/plain; charset=utf-8\r\n\
    ///       Content-Length: 2\r\n\
    ///       \r\n\
    ///       hi"
    /// );
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(128 + self.body.len());

        // Writing into a Vec cannot fail
        let _ = write!(
            buffer,
            "HTTP/1.1 {} {}\r\n",
            self.status.as_u16(),
            self.status.reason()
        );
        for (name, value) in self.headers.iter() {
            buffer.extend_from_slice(name.as_bytes());
            buffer.extend_from_slice(b": ");
            buffer.extend_from_slice(value.as_bytes());
            buffer.extend_from_slice(b"\r\n");
        }
        buffer.extend_from_slice(b"\r\n");
        buffer.extend_from_slice(&self.body);

        buffer
    }
}

/// Serializes `response`; see [`Response::to_bytes`].
#[inline]
pub fn serialize_response(response: &Response) -> Vec<u8> {
    response.to_bytes()
}
