use std::io::{self, Write};

use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, Method, StatusCode};

use crate::util::has_token;

/// How the response body is framed on the (discarded) wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyMode {
    NoBody,
    Sized(u64),
    Chunked,
}

impl BodyMode {
    /// Pick framing when the head is flushed. `implicit_len` is the length of the
    /// complete body when the response ends before the head was sent.
    pub fn for_response(
        method: &Method,
        status: StatusCode,
        headers: &HeaderMap,
        implicit_len: Option<u64>,
    ) -> Self {
        let code = status.as_u16();

        let has_no_body =
            // Responses to HEAD never have a body, whatever the headers say.
            method == Method::HEAD ||
            // A successful CONNECT switches to a tunnel.
            status.is_success() && method == Method::CONNECT ||
            // 1xx, 204 and 304 never have a body.
            status.is_informational() ||
            matches!(code, 204 | 304);

        if has_no_body {
            return Self::NoBody;
        }

        let chunked = headers
            .get_all(TRANSFER_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| has_token(v, "chunked"));

        if chunked {
            return Self::Chunked;
        }

        if let Some(v) = headers.get(CONTENT_LENGTH) {
            let len = v
                .to_str()
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0);
            return Self::Sized(len);
        }

        match implicit_len {
            Some(len) => Self::Sized(len),
            None => Self::Chunked,
        }
    }

    pub fn has_body(&self) -> bool {
        matches!(self, BodyMode::Sized(_) | BodyMode::Chunked)
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self, Self::Chunked)
    }

    pub fn write(&self, input: &[u8], w: &mut impl Write) -> io::Result<()> {
        match self {
            BodyMode::NoBody => Ok(()),
            BodyMode::Sized(_) => w.write_all(input),
            // An empty chunk would read as end of body.
            BodyMode::Chunked if input.is_empty() => Ok(()),
            BodyMode::Chunked => {
                write!(w, "{:0x?}\r\n", input.len())?;
                w.write_all(input)?;
                write!(w, "\r\n")
            }
        }
    }

    /// End the body. For chunked bodies that is the last chunk and the trailers.
    pub fn finish(&self, trailers: &[(String, String)], w: &mut impl Write) -> io::Result<()> {
        if !self.is_chunked() {
            return Ok(());
        }

        write!(w, "0\r\n")?;
        for (name, value) in trailers {
            write!(w, "{}: {}\r\n", name, value)?;
        }
        write!(w, "\r\n")
    }
}
