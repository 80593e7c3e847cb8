use std::fmt;
use std::io;

use http::Method;
use serde::Serialize;

use crate::abort::AbortSignal;
use crate::target::{Query, UrlInput};
use crate::util::is_token;
use crate::Error;

/// Methods accepted when options are validated.
const METHODS: &[&str] = &[
    "ACL",
    "BIND",
    "CHECKOUT",
    "CONNECT",
    "COPY",
    "DELETE",
    "GET",
    "HEAD",
    "LINK",
    "LOCK",
    "M-SEARCH",
    "MERGE",
    "MKACTIVITY",
    "MKCALENDAR",
    "MKCOL",
    "MOVE",
    "NOTIFY",
    "OPTIONS",
    "PATCH",
    "POST",
    "PROPFIND",
    "PROPPATCH",
    "PURGE",
    "PUT",
    "QUERY",
    "REBIND",
    "REPORT",
    "SEARCH",
    "SOURCE",
    "SUBSCRIBE",
    "TRACE",
    "UNBIND",
    "UNLINK",
    "UNLOCK",
    "UNSUBSCRIBE",
];

/// Everything needed to build one injected request.
///
/// A `&str` or `String` converts to options with only the url set.
///
/// ```
/// use hootinject::{InjectOptions, Simulate};
///
/// let opts = InjectOptions::new("/hello")
///     .method("post")
///     .header("x-custom", "1")
///     .payload("hi")
///     .simulate(Simulate { split: true, ..Default::default() });
///
/// assert_eq!(opts.method.as_deref(), Some("post"));
/// ```
#[derive(Debug)]
pub struct InjectOptions {
    pub url: Option<UrlInput>,
    /// Deprecated alias of `url`.
    pub path: Option<UrlInput>,
    pub method: Option<String>,
    /// Header names with values. `None` marks a header as explicitly absent, which
    /// is only allowed for `user-agent` and `content-type`.
    pub headers: Vec<(String, Option<String>)>,
    pub query: Option<Query>,
    pub cookies: Vec<(String, String)>,
    pub payload: Payload,
    pub remote_address: String,
    /// Overrides the host derived from the url.
    pub authority: Option<String>,
    pub simulate: Simulate,
    /// Check url and method before dispatching.
    pub validate: bool,
    pub signal: Option<AbortSignal>,
}

/// Edge cases to force on the request body stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Simulate {
    /// Signal end of body. When false the body never ends.
    pub end: bool,
    /// Deliver the body as two chunks, first byte and the rest.
    pub split: bool,
    /// Raise an error after the body.
    pub error: bool,
    /// Raise close after the body.
    pub close: bool,
}

impl Default for Simulate {
    fn default() -> Self {
        Simulate {
            end: true,
            split: false,
            error: false,
            close: false,
        }
    }
}

pub enum Payload {
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    /// Sent as `application/json`.
    Json(serde_json::Value),
    /// Read to the end before the handler is invoked.
    Stream(Box<dyn io::Read + Send>),
}

impl Payload {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }

    pub fn stream(reader: impl io::Read + Send + 'static) -> Self {
        Payload::Stream(Box::new(reader))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Empty
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Text(v) => f.debug_tuple("Text").field(v).finish(),
            Self::Bytes(v) => write!(f, "Bytes({} bytes)", v.len()),
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Stream(_) => write!(f, "Stream"),
        }
    }
}

impl From<&str> for Payload {
    fn from(v: &str) -> Self {
        Payload::Text(v.to_string())
    }
}

impl From<String> for Payload {
    fn from(v: String) -> Self {
        Payload::Text(v)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        Payload::Bytes(v)
    }
}

impl From<&[u8]> for Payload {
    fn from(v: &[u8]) -> Self {
        Payload::Bytes(v.to_vec())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(v: serde_json::Value) -> Self {
        Payload::Json(v)
    }
}

impl Default for InjectOptions {
    fn default() -> Self {
        InjectOptions {
            url: None,
            path: None,
            method: None,
            headers: vec![],
            query: None,
            cookies: vec![],
            payload: Payload::Empty,
            remote_address: "127.0.0.1".to_string(),
            authority: None,
            simulate: Simulate::default(),
            validate: true,
            signal: None,
        }
    }
}

impl InjectOptions {
    pub fn new(url: impl Into<UrlInput>) -> Self {
        InjectOptions {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn url(mut self, url: impl Into<UrlInput>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Set a header. The value is stringified.
    pub fn header(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.set_header(name.into(), Some(value.to_string()));
        self
    }

    /// Suppress a default header, `user-agent` or `content-type`.
    pub fn unset_header(mut self, name: impl Into<String>) -> Self {
        self.set_header(name.into(), None);
        self
    }

    pub(crate) fn set_header(&mut self, name: String, value: Option<String>) {
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(entry) => *entry = (name, value),
            None => self.headers.push((name, value)),
        }
    }

    pub fn query(mut self, query: impl Into<Query>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Alias of [`InjectOptions::payload`].
    pub fn body(self, payload: impl Into<Payload>) -> Self {
        self.payload(payload)
    }

    pub fn remote_address(mut self, addr: impl Into<String>) -> Self {
        self.remote_address = addr.into();
        self
    }

    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    pub fn simulate(mut self, simulate: Simulate) -> Self {
        self.simulate = simulate;
        self
    }

    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Checks done before anything is built.
    pub(crate) fn check(&self) -> Result<(), Error> {
        if !self.validate {
            return Ok(());
        }

        match self.target() {
            None => return Err(Error::MissingUrl),
            Some(UrlInput::Parts(p)) if p.pathname.is_empty() => {
                return Err(Error::MissingPathname)
            }
            _ => {}
        }

        if let Some(m) = &self.method {
            let upper = m.to_ascii_uppercase();
            if !METHODS.contains(&upper.as_str()) {
                return Err(Error::InvalidMethod(m.clone()));
            }
        }

        Ok(())
    }

    pub(crate) fn target(&self) -> Option<&UrlInput> {
        self.url.as_ref().or(self.path.as_ref())
    }

    /// Only the deprecated `path` names the target.
    pub(crate) fn uses_path(&self) -> bool {
        self.url.is_none() && self.path.is_some()
    }

    pub(crate) fn parsed_method(&self) -> Result<Method, Error> {
        let Some(m) = &self.method else {
            return Ok(Method::GET);
        };

        let upper = m.to_ascii_uppercase();

        if !is_token(&upper) {
            return Err(Error::InvalidMethod(m.clone()));
        }

        Method::from_bytes(upper.as_bytes()).map_err(|_| Error::InvalidMethod(m.clone()))
    }
}

impl From<&str> for InjectOptions {
    fn from(url: &str) -> Self {
        InjectOptions::new(url)
    }
}

impl From<String> for InjectOptions {
    fn from(url: String) -> Self {
        InjectOptions::new(url)
    }
}
