use std::collections::HashMap;
use std::fmt;

use http::header::SET_COOKIE;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::cookie::Cookie;
use crate::req::Request;
use crate::res::Response;
use crate::Error;

/// What a handler responded with.
pub struct Reply {
    status: StatusCode,
    status_message: String,
    headers: HeaderMap,
    chunks: Vec<Vec<u8>>,
    raw_payload: Vec<u8>,
    payload: String,
    trailers: HashMap<String, String>,
    request: Request,
    response: Response,
}

impl Reply {
    pub(crate) fn new(
        status: StatusCode,
        status_message: String,
        headers: HeaderMap,
        chunks: Vec<Vec<u8>>,
        trailers: HashMap<String, String>,
        request: Request,
        response: Response,
    ) -> Self {
        let raw_payload = chunks.concat();
        let payload = String::from_utf8_lossy(&raw_payload).into_owned();

        Reply {
            status,
            status_message,
            headers,
            chunks,
            raw_payload,
            payload,
            trailers,
            request,
            response,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    /// The headers as sent, including `date`, `connection` and
    /// `transfer-encoding` when the server side added them.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if it is a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn raw_payload(&self) -> &[u8] {
        &self.raw_payload
    }

    /// The body decoded as UTF-8. Invalid sequences are replaced.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Alias of [`Reply::payload`].
    pub fn body(&self) -> &str {
        &self.payload
    }

    /// The body in the chunks it was written.
    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    pub fn trailers(&self) -> &HashMap<String, String> {
        &self.trailers
    }

    /// Cookies from all `set-cookie` headers.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(Cookie::parse)
            .collect()
    }

    /// Parse the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_slice(&self.raw_payload)?)
    }

    pub fn raw_request(&self) -> &Request {
        &self.request
    }

    pub fn raw_response(&self) -> &Response {
        &self.response
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("payload", &self.payload)
            .field("trailers", &self.trailers)
            .finish()
    }
}
