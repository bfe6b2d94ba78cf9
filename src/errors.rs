use crate::{Response, StatusCode};
use std::{error, fmt, io, net::SocketAddr};

/// Failures while reading or parsing a single request.
///
/// Everything here is local to one connection: the server answers with the
/// mapped status (or drops the socket for I/O failures) and keeps serving.
#[derive(Debug, PartialEq)]
pub(crate) enum ErrorKind {
    /// The buffer does not contain a `\r\n\r\n` terminated head.
    IncompleteHead,
    /// Fewer than method, target and version tokens on the request line.
    InvalidRequestLine,
    /// The head is not valid UTF-8.
    InvalidEncoding,

    PayloadTooLarge,
    Io(IoError),
}

macro_rules! http_errors {
    ($($name:ident: $status:ident => $message:literal; )*) => {
        pub(crate) const fn status(&self) -> StatusCode {
            match self { $(
                Self::$name { .. } => StatusCode::$status,
            )* }
        }

        pub(crate) const fn message(&self) -> &'static str {
            match self { $(
                Self::$name { .. } => $message,
            )* }
        }
    };
}

impl ErrorKind {
    http_errors! {
        IncompleteHead: BAD_REQUEST => "Bad Request";
        InvalidRequestLine: BAD_REQUEST => "Bad Request";
        InvalidEncoding: BAD_REQUEST => "Bad Request";

        PayloadTooLarge: PAYLOAD_TOO_LARGE => "Payload Too Large";
        Io: SERVICE_UNAVAILABLE => "Service Unavailable";
    }

    #[inline]
    pub(crate) fn to_response(&self) -> Response {
        Response::text(self.status(), self.message())
    }
}

impl error::Error for ErrorKind {}
impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io(IoError(err))
    }
}

#[derive(Debug)]
pub(crate) struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

/// A request that could not be parsed.
///
/// Returned by [`Request::parse`](crate::Request::parse); the server answers
/// such requests with [`status`](ParseError::status) and closes the connection.
#[derive(Debug, PartialEq)]
pub struct ParseError(pub(crate) ErrorKind);

impl ParseError {
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.0.status()
    }
}

impl error::Error for ParseError {}
impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ErrorKind::IncompleteHead => f.write_str("request head is not terminated by a blank line"),
            ErrorKind::InvalidRequestLine => f.write_str("malformed request line"),
            ErrorKind::InvalidEncoding => f.write_str("request head is not valid UTF-8"),
            ErrorKind::PayloadTooLarge => f.write_str("request is too large"),
            ErrorKind::Io(err) => write!(f, "I/O error: {}", err.0),
        }
    }
}

/// Errors that stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create listening socket: {0}")]
    Socket(#[source] io::Error),

    #[error("failed to bind {addr} (is something already listening there?): {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to register listener with the runtime: {0}")]
    Runtime(#[source] io::Error),
}
