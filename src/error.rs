use std::error::Error as StdError;
use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Configuration, raised before dispatch.
    #[error("missing url or path")]
    MissingUrl,

    #[error("url object is missing pathname")]
    MissingPathname,

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid url part: {0}")]
    UrlPart(&'static str),

    #[error("invalid http method: {0}")]
    InvalidMethod(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("header value is undefined: {0}")]
    UndefinedHeader(String),

    #[error("invalid cookie name: {0}")]
    InvalidCookie(String),

    // Body protocol, delivered through completion.
    #[error("content-length {declared} does not match payload length {actual}")]
    ContentLengthMismatch { declared: u64, actual: u64 },

    #[error("content-length header not a number")]
    BadContentLength,

    // Transport.
    #[error("socket hang up")]
    SocketHangUp,

    #[error("The operation was aborted")]
    Aborted,

    #[error("Simulated")]
    Simulated,

    #[error("write after end")]
    WriteAfterEnd,

    #[error("write after destroy")]
    Destroyed,

    #[error("cannot set headers after they are sent")]
    HeadersSent,

    #[error("handler panicked: {0}")]
    HandlerPanic(String),

    #[error("{0}")]
    Other(Box<dyn StdError + Send + Sync>),

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("http: {0}")]
    Http(#[from] http::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap any error, typically one handed to `destroy()` by a handler.
    pub fn other<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Error::Other(err.into())
    }

    /// Short error code, such as `ECONNRESET` for a hang up.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Error::SocketHangUp => Some("ECONNRESET"),
            Error::Aborted => Some("ABORT_ERR"),
            Error::ContentLengthMismatch { .. } => Some("ERR_HTTP_CONTENT_LENGTH_MISMATCH"),
            Error::HeadersSent => Some("ERR_HTTP_HEADERS_SENT"),
            Error::WriteAfterEnd => Some("ERR_STREAM_WRITE_AFTER_END"),
            Error::Destroyed => Some("ERR_STREAM_DESTROYED"),
            _ => None,
        }
    }

    /// True for errors that are raised before a dispatch starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MissingUrl
                | Error::MissingPathname
                | Error::Url(_)
                | Error::UrlPart(_)
                | Error::InvalidMethod(_)
                | Error::InvalidHeader(_)
                | Error::UndefinedHeader(_)
                | Error::InvalidCookie(_)
        )
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(e: http::header::InvalidHeaderName) -> Self {
        Error::InvalidHeader(e.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Error::InvalidHeader(e.to_string())
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(e) => e,
            e => io::Error::new(io::ErrorKind::Other, e),
        }
    }
}
