//! The request side of a dispatch.
//!
//! A [`Request`] is built from [`InjectOptions`] in two steps. Building validates and
//! normalizes headers, which can fail synchronously. Preparing materializes the body,
//! which for a stream means reading it to the end, and that can fail with a body
//! protocol error.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Version};
use parking_lot::Mutex;
use url::Url;

use crate::cookie;
use crate::event::Listeners;
use crate::options::{InjectOptions, Payload, Simulate};
use crate::target::{host_header, request_target, resolve, UrlInput};
use crate::Error;

pub(crate) const USER_AGENT_DEFAULT: &str = "hootinject";

type OnDestroy = Box<dyn FnOnce(Option<Error>) + Send>;

/// The simulated incoming request handed to the handler.
///
/// Cheap to clone, all clones share the same body stream.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

struct Inner {
    method: Method,
    url: String,
    href: Url,
    headers: HeaderMap,
    socket: Socket,
    simulate: Simulate,
    body: Vec<u8>,
    state: Mutex<ReadState>,
    warned: AtomicBool,
    on_data: Listeners<[u8]>,
    on_end: Listeners<()>,
    on_error: Listeners<Error>,
    on_close: Listeners<()>,
    on_destroy: Mutex<Option<OnDestroy>>,
}

#[derive(Default)]
struct ReadState {
    /// The single emission pass has started.
    done: bool,
    queue: VecDeque<Emission>,
    ended: bool,
    destroyed: bool,
    /// Chunk partially consumed by `io::Read`.
    partial: Option<(Vec<u8>, usize)>,
}

enum Emission {
    Data(Vec<u8>),
    Error,
    Close,
    End,
}

enum Pulled {
    Chunk(Vec<u8>),
    End,
    Pending,
    Error,
    Destroyed,
}

/// The remote end of the request.
#[derive(Debug, Clone)]
pub struct Socket {
    remote_address: String,
}

impl Socket {
    pub fn remote_address(&self) -> &str {
        &self.remote_address
    }
}

/// A request built from options, body not yet materialized.
pub(crate) struct PendingRequest {
    method: Method,
    href: Url,
    headers: HeaderMap,
    socket: Socket,
    simulate: Simulate,
    body: Body,
}

enum Body {
    Ready(Vec<u8>),
    Stream(Box<dyn Read + Send>),
}

impl PendingRequest {
    pub fn new(options: InjectOptions) -> Result<Self, Error> {
        if options.uses_path() {
            warn!("option `path` is deprecated, use `url`");
        }

        let target = match options.target() {
            Some(t) => t.clone(),
            None => UrlInput::Str("/".to_string()),
        };
        let href = resolve(&target, options.query.as_ref())?;

        let method = options.parsed_method()?;

        let mut headers = HeaderMap::new();
        let mut no_user_agent = false;
        let mut no_content_type = false;

        for (name, value) in options.headers {
            let lower = name.to_ascii_lowercase();
            let Some(value) = value else {
                match lower.as_str() {
                    "user-agent" => no_user_agent = true,
                    "content-type" => no_content_type = true,
                    _ => return Err(Error::UndefinedHeader(name)),
                }
                continue;
            };
            let name = HeaderName::from_bytes(lower.as_bytes())?;
            headers.insert(name, HeaderValue::from_str(&value)?);
        }

        if !no_user_agent && !headers.contains_key(USER_AGENT) {
            headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_DEFAULT));
        }

        if !headers.contains_key(HOST) {
            let host = match &options.authority {
                Some(a) => a.clone(),
                None => host_header(&href),
            };
            headers.insert(HOST, HeaderValue::from_str(&host)?);
        }

        if !options.cookies.is_empty() {
            let mut parts = vec![];
            if let Some(existing) = headers.get(COOKIE) {
                parts.push(String::from_utf8_lossy(existing.as_bytes()).into_owned());
            }
            for (name, value) in &options.cookies {
                parts.push(cookie::serialize(name, value)?);
            }
            headers.insert(COOKIE, HeaderValue::from_str(&parts.join("; "))?);
        }

        let sized = |b: Vec<u8>, headers: &mut HeaderMap| {
            if !headers.contains_key(CONTENT_LENGTH) {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(b.len()));
            }
            Body::Ready(b)
        };

        let body = match options.payload {
            Payload::Empty => Body::Ready(vec![]),
            Payload::Text(s) => sized(s.into_bytes(), &mut headers),
            Payload::Bytes(b) => sized(b, &mut headers),
            Payload::Json(v) => {
                if !no_content_type && !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                sized(serde_json::to_vec(&v)?, &mut headers)
            }
            Payload::Stream(r) => Body::Stream(r),
        };

        Ok(PendingRequest {
            method,
            href,
            headers,
            socket: Socket {
                remote_address: options.remote_address,
            },
            simulate: options.simulate,
            body,
        })
    }

    /// Materialize the body and reconcile it with any declared content-length.
    pub fn prepare(self) -> Result<Request, Error> {
        let PendingRequest {
            method,
            href,
            mut headers,
            socket,
            simulate,
            body,
        } = self;

        let (mut body, streamed) = match body {
            Body::Ready(b) => (b, false),
            Body::Stream(mut r) => {
                let mut buf = vec![];
                r.read_to_end(&mut buf)?;
                trace!("Drained payload stream: {} bytes", buf.len());
                (buf, true)
            }
        };

        let declared = headers
            .get(CONTENT_LENGTH)
            .map(|v| v.to_str().ok().and_then(|s| s.trim().parse::<u64>().ok()));

        match declared {
            Some(None) => return Err(Error::BadContentLength),
            Some(Some(declared)) => {
                let actual = body.len() as u64;
                if declared > actual {
                    return Err(Error::ContentLengthMismatch { declared, actual });
                }
                if declared < actual {
                    debug!("Truncate payload {} to content-length {}", actual, declared);
                    body.truncate(declared as usize);
                }
            }
            None if streamed => {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
            }
            None => {}
        }

        Ok(Request {
            inner: Arc::new(Inner {
                method,
                url: request_target(&href),
                href,
                headers,
                socket,
                simulate,
                body,
                state: Mutex::new(ReadState::default()),
                warned: AtomicBool::new(false),
                on_data: Listeners::new(),
                on_end: Listeners::new(),
                on_error: Listeners::new(),
                on_close: Listeners::new(),
                on_destroy: Mutex::new(None),
            }),
        })
    }
}

impl Request {
    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    /// Path and query, like `/hello?a=b`.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn path(&self) -> &str {
        self.inner.href.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.inner.href.query().filter(|q| !q.is_empty())
    }

    /// The fully resolved url, including scheme and host.
    pub fn href(&self) -> &Url {
        &self.inner.href
    }

    pub fn version(&self) -> Version {
        Version::HTTP_11
    }

    pub fn http_version(&self) -> &'static str {
        "1.1"
    }

    /// Length of the materialized body.
    pub fn payload_len(&self) -> usize {
        self.inner.body.len()
    }

    /// Header names are lowercase.
    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Headers as a flat list of name/value pairs.
    pub fn raw_headers(&self) -> Vec<(String, String)> {
        self.inner
            .headers
            .iter()
            .map(|(k, v)| {
                let v = String::from_utf8_lossy(v.as_bytes()).into_owned();
                (k.as_str().to_string(), v)
            })
            .collect()
    }

    pub fn socket(&self) -> &Socket {
        &self.inner.socket
    }

    #[deprecated(note = "use socket()")]
    pub fn connection(&self) -> &Socket {
        if !self.inner.warned.swap(true, Ordering::Relaxed) {
            warn!("request.connection() is deprecated, use request.socket()");
        }
        &self.inner.socket
    }

    pub fn simulate(&self) -> Simulate {
        self.inner.simulate
    }

    /// The next body chunk. `Ok(None)` at end of body.
    ///
    /// A request simulating no end gives `WouldBlock` once the body is consumed.
    pub fn next_chunk(&self) -> io::Result<Option<Vec<u8>>> {
        {
            let mut state = self.inner.state.lock();
            if let Some((chunk, pos)) = state.partial.take() {
                return Ok(Some(chunk[pos..].to_vec()));
            }
        }

        match self.pull() {
            Pulled::Chunk(v) => Ok(Some(v)),
            Pulled::End => Ok(None),
            p => Err(p.into_io_error()),
        }
    }

    /// Consume the whole body, handing each chunk to the data listeners.
    pub fn resume(&self) {
        loop {
            match self.pull() {
                Pulled::Chunk(_) => continue,
                Pulled::Error => continue,
                _ => break,
            }
        }
    }

    /// Body was read through to the end.
    pub fn is_complete(&self) -> bool {
        self.inner.state.lock().ended
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    pub fn on_data(&self, f: impl FnMut(&[u8]) + Send + 'static) -> &Self {
        self.inner.on_data.add(f);
        self
    }

    pub fn on_end(&self, mut f: impl FnMut() + Send + 'static) -> &Self {
        self.inner.on_end.add(move |_| f());
        self
    }

    pub fn on_error(&self, f: impl FnMut(&Error) + Send + 'static) -> &Self {
        self.inner.on_error.add(f);
        self
    }

    pub fn on_close(&self, mut f: impl FnMut() + Send + 'static) -> &Self {
        self.inner.on_close.add(move |_| f());
        self
    }

    /// Tear down the request. Only the first call has any effect.
    ///
    /// An error is delivered to error listeners, unless the body was already read
    /// to the end. Close listeners run either way. The dispatch completes with the
    /// error, or with a hang up if there is none, unless the response finished
    /// first.
    pub fn destroy(&self, error: Option<Error>) {
        let ended = {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.ended
        };

        debug!("Request destroyed: {:?}", error);

        if let Some(e) = &error {
            if ended {
                trace!("Skip error after end of body");
            } else {
                self.inner.on_error.emit(e);
            }
        }
        self.inner.on_close.emit(&());

        let hook = self.inner.on_destroy.lock().take();
        if let Some(hook) = hook {
            hook(error);
        }
    }

    /// Convert to an `http::Request` carrying this request as the body.
    pub fn into_http(self) -> Result<http::Request<Request>, Error> {
        let mut builder = http::Request::builder()
            .method(self.inner.method.clone())
            .uri(self.inner.url.as_str())
            .version(Version::HTTP_11);

        if let Some(headers) = builder.headers_mut() {
            *headers = self.inner.headers.clone();
        }

        Ok(builder.body(self)?)
    }

    pub(crate) fn set_on_destroy(&self, f: impl FnOnce(Option<Error>) + Send + 'static) {
        *self.inner.on_destroy.lock() = Some(Box::new(f));
    }

    pub(crate) fn wants_close(&self) -> bool {
        self.inner
            .headers
            .get(http::header::CONNECTION)
            .and_then(|v| v.to_str().ok())
            .map(|v| crate::util::has_token(v, "close"))
            .unwrap_or(false)
    }

    fn emissions(&self) -> VecDeque<Emission> {
        let body = &self.inner.body;
        let simulate = self.inner.simulate;
        let mut queue = VecDeque::new();

        if !body.is_empty() {
            if simulate.split {
                queue.push_back(Emission::Data(body[..1].to_vec()));
                if body.len() > 1 {
                    queue.push_back(Emission::Data(body[1..].to_vec()));
                }
            } else {
                queue.push_back(Emission::Data(body.clone()));
            }
        }

        if simulate.error {
            queue.push_back(Emission::Error);
        }
        if simulate.close {
            queue.push_back(Emission::Close);
        }
        if simulate.end {
            queue.push_back(Emission::End);
        }

        queue
    }

    fn pull(&self) -> Pulled {
        loop {
            let emission = {
                let mut state = self.inner.state.lock();

                if !state.done {
                    state.done = true;
                    state.queue = self.emissions();
                }

                if state.destroyed && !state.ended {
                    return Pulled::Destroyed;
                }

                match state.queue.pop_front() {
                    Some(Emission::End) => {
                        state.ended = true;
                        Emission::End
                    }
                    Some(e) => e,
                    None if state.ended => return Pulled::End,
                    None => return Pulled::Pending,
                }
            };

            match emission {
                Emission::Data(v) => {
                    trace!("Request chunk: {} bytes", v.len());
                    self.inner.on_data.emit(&v);
                    return Pulled::Chunk(v);
                }
                Emission::Error => {
                    self.inner.on_error.emit(&Error::Simulated);
                    return Pulled::Error;
                }
                Emission::Close => {
                    self.inner.on_close.emit(&());
                }
                Emission::End => {
                    trace!("Request end of body");
                    self.inner.on_end.emit(&());
                    return Pulled::End;
                }
            }
        }
    }
}

impl Pulled {
    fn into_io_error(self) -> io::Error {
        match self {
            Pulled::Pending => io::Error::new(io::ErrorKind::WouldBlock, "body has no end"),
            Pulled::Error => io::Error::new(io::ErrorKind::Other, Error::Simulated),
            Pulled::Destroyed => {
                io::Error::new(io::ErrorKind::ConnectionAborted, "request destroyed")
            }
            Pulled::Chunk(_) | Pulled::End => unreachable!("not an error"),
        }
    }
}

impl Read for Request {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        {
            let mut state = self.inner.state.lock();
            if let Some((chunk, pos)) = &mut state.partial {
                let n = (chunk.len() - *pos).min(buf.len());
                buf[..n].copy_from_slice(&chunk[*pos..*pos + n]);
                *pos += n;
                if *pos == chunk.len() {
                    state.partial = None;
                }
                return Ok(n);
            }
        }

        match self.pull() {
            Pulled::Chunk(v) => {
                let n = v.len().min(buf.len());
                buf[..n].copy_from_slice(&v[..n]);
                if n < v.len() {
                    self.inner.state.lock().partial = Some((v, n));
                }
                Ok(n)
            }
            Pulled::End => Ok(0),
            p => Err(p.into_io_error()),
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.inner.method)
            .field("url", &self.inner.url)
            .field("headers", &self.inner.headers)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::options::Simulate;
    use std::sync::atomic::AtomicUsize;

    fn build(options: InjectOptions) -> Result<Request, Error> {
        PendingRequest::new(options)?.prepare()
    }

    #[test]
    fn defaults() -> Result<(), Error> {
        let req = build("/hello".into())?;
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.url(), "/hello");
        assert_eq!(req.http_version(), "1.1");
        assert_eq!(req.header("user-agent"), Some(USER_AGENT_DEFAULT));
        assert_eq!(req.header("host"), Some("localhost:80"));
        assert_eq!(req.header("content-length"), None);
        assert_eq!(req.socket().remote_address(), "127.0.0.1");
        Ok(())
    }

    #[test]
    fn method_uppercased() -> Result<(), Error> {
        let req = build(InjectOptions::new("/").method("post"))?;
        assert_eq!(req.method(), Method::POST);
        Ok(())
    }

    #[test]
    fn headers_lowercased() -> Result<(), Error> {
        let req = build(InjectOptions::new("/").header("X-Custom", 42))?;
        assert_eq!(req.header("x-custom"), Some("42"));
        assert!(req.raw_headers().contains(&("x-custom".into(), "42".into())));
        Ok(())
    }

    #[test]
    fn suppressed_user_agent() -> Result<(), Error> {
        let req = build(InjectOptions::new("/").unset_header("User-Agent"))?;
        assert_eq!(req.header("user-agent"), None);
        Ok(())
    }

    #[test]
    fn undefined_header_rejected() {
        let r = PendingRequest::new(InjectOptions::new("/").unset_header("x-foo"));
        assert!(matches!(r, Err(Error::UndefinedHeader(_))));
    }

    #[test]
    fn host_from_authority_and_header() -> Result<(), Error> {
        let req = build(InjectOptions::new("/").authority("something"))?;
        assert_eq!(req.header("host"), Some("something"));

        let req = build(
            InjectOptions::new("/")
                .authority("something")
                .header("host", "explicit"),
        )?;
        assert_eq!(req.header("host"), Some("explicit"));
        Ok(())
    }

    #[test]
    fn cookies_appended_to_existing() -> Result<(), Error> {
        let req = build(
            InjectOptions::new("/")
                .header("cookie", "custom=one")
                .cookie("foo", "bar")
                .cookie("grass", "àìùòlé"),
        )?;
        assert_eq!(
            req.header("cookie"),
            Some("custom=one; foo=bar; grass=%C3%A0%C3%AC%C3%B9%C3%B2l%C3%A9")
        );
        Ok(())
    }

    #[test]
    fn json_payload_sets_content_type() -> Result<(), Error> {
        let req = build(InjectOptions::new("/").payload(serde_json::json!({"a": 1})))?;
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("content-length"), Some("7"));

        let req = build(
            InjectOptions::new("/")
                .header("content-type", "text/plain")
                .payload(serde_json::json!({})),
        )?;
        assert_eq!(req.header("content-type"), Some("text/plain"));

        let req = build(
            InjectOptions::new("/")
                .unset_header("content-type")
                .payload(serde_json::json!({})),
        )?;
        assert_eq!(req.header("content-type"), None);
        Ok(())
    }

    #[test]
    fn read_whole_body() -> Result<(), Error> {
        let mut req = build(InjectOptions::new("/").payload("hello world"))?;
        let mut s = String::new();
        req.read_to_string(&mut s)?;
        assert_eq!(s, "hello world");
        assert!(req.is_complete());
        Ok(())
    }

    #[test]
    fn read_small_buffer() -> Result<(), Error> {
        let mut req = build(InjectOptions::new("/").payload("abcdef"))?;
        let mut buf = [0; 4];
        assert_eq!(req.read(&mut buf)?, 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(req.read(&mut buf)?, 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(req.read(&mut buf)?, 0);
        Ok(())
    }

    #[test]
    fn split_chunks() -> Result<(), Error> {
        let req = build(
            InjectOptions::new("/")
                .payload("something special just for you")
                .simulate(Simulate {
                    split: true,
                    ..Default::default()
                }),
        )?;

        assert_eq!(req.next_chunk()?, Some(b"s".to_vec()));
        assert_eq!(
            req.next_chunk()?,
            Some(b"omething special just for you".to_vec())
        );
        assert_eq!(req.next_chunk()?, None);
        // End marker again after completion.
        assert_eq!(req.next_chunk()?, None);
        Ok(())
    }

    #[test]
    fn no_end_would_block() -> Result<(), Error> {
        let req = build(InjectOptions::new("/").payload("x").simulate(Simulate {
            end: false,
            ..Default::default()
        }))?;

        assert_eq!(req.next_chunk()?, Some(b"x".to_vec()));
        let err = req.next_chunk().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert!(!req.is_complete());
        Ok(())
    }

    #[test]
    fn simulated_error_and_close() -> Result<(), Error> {
        let req = build(InjectOptions::new("/").payload("x").simulate(Simulate {
            error: true,
            close: true,
            ..Default::default()
        }))?;

        let errors = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let (e, c) = (errors.clone(), closes.clone());
        req.on_error(move |err| {
            assert_eq!(err.to_string(), "Simulated");
            e.fetch_add(1, Ordering::SeqCst);
        });
        req.on_close(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(req.next_chunk()?, Some(b"x".to_vec()));
        let err = req.next_chunk().unwrap_err();
        assert_eq!(err.to_string(), "Simulated");
        assert_eq!(req.next_chunk()?, None);

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn resume_feeds_data_listeners() -> Result<(), Error> {
        let req = build(InjectOptions::new("/").payload("abc").simulate(Simulate {
            split: true,
            ..Default::default()
        }))?;

        let seen = Arc::new(Mutex::new(vec![]));
        let ended = Arc::new(AtomicBool::new(false));
        let (s, e) = (seen.clone(), ended.clone());
        req.on_data(move |chunk| s.lock().push(chunk.to_vec()))
            .on_end(move || e.store(true, Ordering::SeqCst));

        req.resume();

        assert_eq!(*seen.lock(), vec![b"a".to_vec(), b"bc".to_vec()]);
        assert!(ended.load(Ordering::SeqCst));
        Ok(())
    }

    #[test]
    fn stream_payload_is_drained() -> Result<(), Error> {
        let req = build(InjectOptions::new("/").payload(Payload::stream(io::Cursor::new(
            b"streamed".to_vec(),
        ))))?;
        assert_eq!(req.header("content-length"), Some("8"));
        assert_eq!(req.payload_len(), 8);
        assert_eq!(req.next_chunk()?, Some(b"streamed".to_vec()));
        Ok(())
    }

    #[test]
    fn declared_length_kept_for_stream() -> Result<(), Error> {
        let opts = InjectOptions::new("/")
            .header("content-length", 3)
            .payload(Payload::stream(io::Cursor::new(b"abc".to_vec())));
        let req = build(opts)?;
        assert_eq!(req.header("content-length"), Some("3"));
        Ok(())
    }

    #[test]
    fn declared_length_too_large() {
        let opts = InjectOptions::new("/")
            .header("content-length", 100)
            .payload(Payload::stream(io::Cursor::new(b"abc".to_vec())));
        let r = build(opts);
        assert!(matches!(
            r,
            Err(Error::ContentLengthMismatch {
                declared: 100,
                actual: 3
            })
        ));

        let opts = InjectOptions::new("/")
            .header("content-length", 10)
            .payload("abc");
        assert!(matches!(
            build(opts),
            Err(Error::ContentLengthMismatch { .. })
        ));
    }

    #[test]
    fn declared_length_too_small_truncates() -> Result<(), Error> {
        let opts = InjectOptions::new("/")
            .header("content-length", 2)
            .payload("abc");
        let req = build(opts)?;
        assert_eq!(req.next_chunk()?, Some(b"ab".to_vec()));
        Ok(())
    }

    #[test]
    fn declared_length_not_a_number() {
        let opts = InjectOptions::new("/")
            .header("content-length", "lots")
            .payload("abc");
        assert!(matches!(build(opts), Err(Error::BadContentLength)));
    }

    #[test]
    fn destroy_once() -> Result<(), Error> {
        let req = build(InjectOptions::new("/").payload("abc"))?;

        let closes = Arc::new(AtomicUsize::new(0));
        let hooks = Arc::new(AtomicUsize::new(0));
        let (c, h) = (closes.clone(), hooks.clone());
        req.on_close(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        req.set_on_destroy(move |err| {
            assert!(matches!(err, Some(Error::Other(_))));
            h.fetch_add(1, Ordering::SeqCst);
        });

        req.destroy(Some(Error::other("boom")));
        req.destroy(Some(Error::other("again")));
        req.destroy(None);

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.load(Ordering::SeqCst), 1);

        let err = req.next_chunk().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
        Ok(())
    }

    #[test]
    fn destroy_after_end_skips_error() -> Result<(), Error> {
        let req = build(InjectOptions::new("/").payload("abc"))?;
        req.resume();

        let errors = Arc::new(AtomicBool::new(false));
        let e = errors.clone();
        req.on_error(move |_| e.store(true, Ordering::SeqCst));

        let closed = Arc::new(AtomicBool::new(false));
        let c = closed.clone();
        req.on_close(move || c.store(true, Ordering::SeqCst));

        let hooked = Arc::new(AtomicBool::new(false));
        let h = hooked.clone();
        req.set_on_destroy(move |_| h.store(true, Ordering::SeqCst));

        req.destroy(Some(Error::other("late")));
        assert!(!errors.load(Ordering::SeqCst));
        assert!(closed.load(Ordering::SeqCst));
        assert!(hooked.load(Ordering::SeqCst));
        Ok(())
    }

    #[test]
    #[allow(deprecated)]
    fn deprecated_connection() -> Result<(), Error> {
        let req = build(InjectOptions::new("/").remote_address("10.0.0.1"))?;
        assert_eq!(req.connection().remote_address(), "10.0.0.1");
        assert_eq!(req.connection().remote_address(), "10.0.0.1");
        Ok(())
    }

    #[test]
    fn into_http_request() -> Result<(), Error> {
        let req = build(InjectOptions::new("/a?b=c").method("put").payload("x"))?;
        let mut http_req = req.into_http()?;
        assert_eq!(http_req.method(), Method::PUT);
        assert_eq!(http_req.uri(), "/a?b=c");
        assert_eq!(http_req.headers()["content-length"], "1");

        let mut s = String::new();
        http_req.body_mut().read_to_string(&mut s)?;
        assert_eq!(s, "x");
        Ok(())
    }
}
