use std::io::{self, Write};

use http::header::{CONNECTION, CONTENT_LENGTH, DATE, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::Error;

/// The transport the response believes it writes to. Accepts everything,
/// keeps nothing but a byte count.
#[derive(Debug, Default)]
pub(crate) struct DiscardSink {
    written: u64,
    destroyed: bool,
}

impl DiscardSink {
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn destroy(&mut self) -> bool {
        !std::mem::replace(&mut self.destroyed, true)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl Write for DiscardSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.destroyed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "socket destroyed"));
        }
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Status line and headers. `extra` are headers a server adds on its own.
pub(crate) fn serialize_head(
    status: StatusCode,
    reason: &str,
    headers: &HeaderMap,
    extra: &[(&str, String)],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);

    // Writing to a Vec does not fail.
    let _ = write!(out, "HTTP/1.1 {} {}\r\n", status.as_u16(), reason);

    for (name, value) in headers {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    for (name, value) in extra {
        let _ = write!(out, "{}: {}\r\n", name, value);
    }

    out.extend_from_slice(b"\r\n");

    out
}

/// Read back the headers a server typically adds, so they can be reported.
pub(crate) fn scan_head(head: &[u8]) -> Result<Vec<(HeaderName, HeaderValue)>, Error> {
    let count = head.split(|b| *b == b'\n').count();
    let mut headers = vec![httparse::EMPTY_HEADER; count];
    let mut res = httparse::Response::new(&mut headers);

    match res.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(Error::InvalidHeader("incomplete response head".into()))
        }
        Err(e) => return Err(Error::InvalidHeader(e.to_string())),
    }

    let mut found = vec![];

    for h in res.headers.iter() {
        let name = h.name.to_ascii_lowercase();
        let name = match name.as_str() {
            "date" => DATE,
            "connection" => CONNECTION,
            "content-length" => CONTENT_LENGTH,
            "transfer-encoding" => TRANSFER_ENCODING,
            _ => continue,
        };
        found.push((name, HeaderValue::from_bytes(h.value)?));
    }

    Ok(found)
}
