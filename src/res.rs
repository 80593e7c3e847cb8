//! The response side of a dispatch.

use std::fmt;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, SystemTime};

use http::header::{CONNECTION, CONTENT_LENGTH, DATE, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use parking_lot::Mutex;

use crate::body::BodyMode;
use crate::completion::Completion;
use crate::event::Listeners;
use crate::out::{scan_head, serialize_head, DiscardSink};
use crate::reply::Reply;
use crate::req::Request;
use crate::util::http_date;
use crate::Error;

/// The simulated outgoing response handed to the handler.
///
/// Everything written is captured. The dispatch completes once, on the first of
/// [`Response::end`], [`Response::destroy`] or the socket being destroyed.
#[derive(Clone)]
pub struct Response {
    inner: Arc<Inner>,
}

struct Inner {
    request: Request,
    completion: Completion,
    state: Mutex<State>,
    on_finish: Listeners<()>,
    on_close: Listeners<()>,
    on_error: Listeners<Error>,
    on_timeout: Listeners<()>,
}

struct State {
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderMap,
    sent: Option<Sent>,
    chunks: Vec<Vec<u8>>,
    written: u64,
    trailers: Vec<(String, String)>,
    sink: DiscardSink,
    ended: bool,
    destroyed: bool,
    closed: bool,
}

/// The head as it was flushed.
struct Sent {
    snapshot: HeaderMap,
    mode: BodyMode,
}

pub(crate) struct WeakResponse(Weak<Inner>);

impl WeakResponse {
    pub fn upgrade(&self) -> Option<Response> {
        self.0.upgrade().map(|inner| Response { inner })
    }
}

/// The transport under a [`Response`].
#[derive(Clone)]
pub struct NullSocket {
    response: Response,
}

impl Response {
    pub(crate) fn new(request: Request, completion: Completion) -> Self {
        Response {
            inner: Arc::new(Inner {
                request,
                completion,
                state: Mutex::new(State {
                    status: StatusCode::OK,
                    reason: None,
                    headers: HeaderMap::new(),
                    sent: None,
                    chunks: vec![],
                    written: 0,
                    trailers: vec![],
                    sink: DiscardSink::default(),
                    ended: false,
                    destroyed: false,
                    closed: false,
                }),
                on_finish: Listeners::new(),
                on_close: Listeners::new(),
                on_error: Listeners::new(),
                on_timeout: Listeners::new(),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakResponse {
        WeakResponse(Arc::downgrade(&self.inner))
    }

    /// The request this response answers.
    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    pub fn socket(&self) -> NullSocket {
        NullSocket {
            response: self.clone(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.inner.state.lock().status
    }

    pub fn status_code(&self) -> u16 {
        self.status().as_u16()
    }

    pub fn set_status(&self, status: StatusCode) {
        self.inner.state.lock().status = status;
    }

    pub fn set_status_code(&self, code: u16) -> Result<(), Error> {
        let status = StatusCode::from_u16(code).map_err(http::Error::from)?;
        self.set_status(status);
        Ok(())
    }

    /// The reason phrase, canonical for the status unless set.
    pub fn status_message(&self) -> String {
        let state = self.inner.state.lock();
        reason_of(&state)
    }

    pub fn set_status_message(&self, message: impl Into<String>) -> Result<(), Error> {
        let message = message.into();
        check_reason(&message)?;
        self.inner.state.lock().reason = Some(message);
        Ok(())
    }

    /// Replace any values of the header.
    pub fn set_header(&self, name: &str, value: impl fmt::Display) -> Result<(), Error> {
        self.set_header_values(name, [value])
    }

    /// Replace any values of the header with several, like `set-cookie`.
    pub fn set_header_values<I, V>(&self, name: &str, values: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = V>,
        V: fmt::Display,
    {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let values = to_values(values)?;

        let mut state = self.unsent()?;
        state.headers.remove(&name);
        for v in values {
            state.headers.append(name.clone(), v);
        }

        Ok(())
    }

    pub fn append_header(&self, name: &str, value: impl fmt::Display) -> Result<(), Error> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(&value.to_string())?;
        self.unsent()?.headers.append(name, value);
        Ok(())
    }

    /// First value of the header.
    pub fn header(&self, name: &str) -> Option<String> {
        let state = self.inner.state.lock();
        state.headers.get(name).map(lossy)
    }

    pub fn header_values(&self, name: &str) -> Vec<String> {
        let state = self.inner.state.lock();
        state.headers.get_all(name).iter().map(lossy).collect()
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.inner.state.lock().headers.contains_key(name)
    }

    pub fn header_names(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        state.headers.keys().map(|k| k.as_str().to_string()).collect()
    }

    /// Headers set so far, not including those added when the head is sent.
    pub fn headers(&self) -> HeaderMap {
        self.inner.state.lock().headers.clone()
    }

    pub fn remove_header(&self, name: &str) -> Result<(), Error> {
        self.unsent()?.headers.remove(name);
        Ok(())
    }

    pub fn headers_sent(&self) -> bool {
        self.inner.state.lock().sent.is_some()
    }

    /// Set status and headers, then send the head.
    pub fn write_head<I, K, V>(&self, status: u16, headers: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: fmt::Display,
    {
        self.write_head_inner(status, None, headers)
    }

    /// Like [`Response::write_head`] with a custom reason phrase.
    pub fn write_head_with_reason<I, K, V>(
        &self,
        status: u16,
        reason: &str,
        headers: I,
    ) -> Result<(), Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: fmt::Display,
    {
        self.write_head_inner(status, Some(reason), headers)
    }

    fn write_head_inner<I, K, V>(
        &self,
        status: u16,
        reason: Option<&str>,
        headers: I,
    ) -> Result<(), Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: fmt::Display,
    {
        let status = StatusCode::from_u16(status).map_err(http::Error::from)?;
        if let Some(r) = reason {
            check_reason(r)?;
        }

        let mut parsed = vec![];
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_ref().as_bytes())?;
            let value = HeaderValue::from_str(&value.to_string())?;
            parsed.push((name, value));
        }

        let mut state = self.unsent()?;

        state.status = status;
        if let Some(r) = reason {
            state.reason = Some(r.to_string());
        }

        for (name, _) in &parsed {
            state.headers.remove(name);
        }
        for (name, value) in parsed {
            state.headers.append(name, value);
        }

        self.flush_head(&mut state, None)
    }

    /// Send the head now, without any body.
    pub fn flush_headers(&self) -> Result<(), Error> {
        let mut state = self.inner.state.lock();
        if state.destroyed {
            return Err(Error::Destroyed);
        }
        self.flush_head(&mut state, None)
    }

    /// Write a body chunk. Always reports `true`, the sink is never full.
    pub fn write(&self, data: impl AsRef<[u8]>) -> Result<bool, Error> {
        let mut state = self.inner.state.lock();

        if state.destroyed {
            return Err(Error::Destroyed);
        }
        if state.ended {
            return Err(Error::WriteAfterEnd);
        }

        self.flush_head(&mut state, None)?;
        write_body(&mut state, data.as_ref())?;

        Ok(true)
    }

    /// Finish the response. Only the first call has any effect.
    pub fn end(&self) -> Result<(), Error> {
        self.end_with(b"")
    }

    /// Write a last chunk and finish the response.
    pub fn end_with(&self, data: impl AsRef<[u8]>) -> Result<(), Error> {
        let data = data.as_ref();

        {
            let mut state = self.inner.state.lock();

            if state.ended || state.destroyed {
                trace!("Ignore end of finished response");
                return Ok(());
            }

            let implicit = if state.sent.is_none() {
                Some(data.len() as u64)
            } else {
                None
            };

            self.flush_head(&mut state, implicit)?;
            write_body(&mut state, data)?;

            let mode = sent_mode(&state);
            let trailers = state.trailers.clone();
            mode.finish(&trailers, &mut state.sink)?;

            if let BodyMode::Sized(declared) = mode {
                if declared != state.written {
                    debug!(
                        "Response content-length {} but wrote {}",
                        declared, state.written
                    );
                }
            }

            state.ended = true;
        }

        trace!("Response finished");

        self.inner.on_finish.emit(&());
        self.inner.completion.fire_with(|| Ok(self.reply()));
        self.emit_close();

        Ok(())
    }

    /// Record trailers. Names are lowercased and trimmed, values trimmed.
    pub fn add_trailers<I, K, V>(&self, trailers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: fmt::Display,
    {
        let mut state = self.inner.state.lock();

        for (name, value) in trailers {
            let name = name.as_ref().trim().to_ascii_lowercase();
            let value = value.to_string().trim().to_string();

            match state.trailers.iter_mut().find(|(n, _)| *n == name) {
                Some(entry) => entry.1 = value,
                None => state.trailers.push((name, value)),
            }
        }
    }

    /// Tear down the response. Only the first call has any effect.
    ///
    /// Unless the response already finished, the dispatch completes with the
    /// error, or with [`Error::SocketHangUp`] if there is none.
    pub fn destroy(&self, error: Option<Error>) {
        {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.sink.destroy();
        }

        debug!("Response destroyed: {:?}", error);

        if let Some(e) = &error {
            self.inner.on_error.emit(e);
        }

        let error = error.unwrap_or(Error::SocketHangUp);
        self.inner.completion.fire_with(|| Err(error));

        self.emit_close();
    }

    /// Emit a timeout after `timeout`.
    ///
    /// The timer plays no part in completing the dispatch. The handler decides
    /// what a timeout means, typically by ending the response.
    pub fn set_timeout(&self, timeout: Duration, f: impl FnMut() + Send + 'static) -> &Self {
        self.on_timeout(f);

        let response = self.clone();
        let spawned = thread::Builder::new()
            .name("hootinject-timeout".into())
            .spawn(move || {
                thread::sleep(timeout);
                trace!("Response timeout");
                response.inner.on_timeout.emit(&());
            });

        if let Err(e) = spawned {
            warn!("Failed to start response timer: {}", e);
        }

        self
    }

    pub fn on_timeout(&self, mut f: impl FnMut() + Send + 'static) -> &Self {
        self.inner.on_timeout.add(move |_| f());
        self
    }

    pub fn on_finish(&self, mut f: impl FnMut() + Send + 'static) -> &Self {
        self.inner.on_finish.add(move |_| f());
        self
    }

    pub fn on_close(&self, mut f: impl FnMut() + Send + 'static) -> &Self {
        self.inner.on_close.add(move |_| f());
        self
    }

    pub fn on_error(&self, f: impl FnMut(&Error) + Send + 'static) -> &Self {
        self.inner.on_error.add(f);
        self
    }

    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().ended
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// Send a complete `http::Response`: status, headers, body, end.
    pub fn send<B: AsRef<[u8]>>(&self, response: http::Response<B>) -> Result<(), Error> {
        let (parts, body) = response.into_parts();

        {
            let mut state = self.unsent()?;
            state.status = parts.status;
            for name in parts.headers.keys() {
                state.headers.remove(name);
            }
            for (name, value) in &parts.headers {
                state.headers.append(name.clone(), value.clone());
            }
        }

        self.end_with(body)
    }

    fn unsent(&self) -> Result<parking_lot::MutexGuard<'_, State>, Error> {
        let state = self.inner.state.lock();
        if state.sent.is_some() {
            return Err(Error::HeadersSent);
        }
        Ok(state)
    }

    fn flush_head(&self, state: &mut State, implicit_len: Option<u64>) -> Result<(), Error> {
        if state.sent.is_some() {
            return Ok(());
        }

        let request = &self.inner.request;
        let mode = BodyMode::for_response(request.method(), state.status, &state.headers, implicit_len);

        let mut extra: Vec<(&str, String)> = vec![];

        if !state.headers.contains_key(DATE) {
            extra.push(("Date", http_date(SystemTime::now())));
        }

        if !state.headers.contains_key(CONNECTION) {
            let v = if request.wants_close() { "close" } else { "keep-alive" };
            extra.push(("Connection", v.to_string()));
        }

        if let (BodyMode::Sized(len), Some(_)) = (mode, implicit_len) {
            if !state.headers.contains_key(CONTENT_LENGTH) {
                extra.push(("Content-Length", len.to_string()));
            }
        }

        if mode.is_chunked() && !state.headers.contains_key(TRANSFER_ENCODING) {
            extra.push(("Transfer-Encoding", "chunked".to_string()));
        }

        let reason = reason_of(state);
        let head = serialize_head(state.status, &reason, &state.headers, &extra);
        std::io::Write::write_all(&mut state.sink, &head)?;

        let mut snapshot = state.headers.clone();
        for (name, value) in scan_head(&head)? {
            if !snapshot.contains_key(&name) {
                snapshot.insert(name, value);
            }
        }

        trace!("Flushed head: {} {:?}", state.status, mode);

        state.sent = Some(Sent { snapshot, mode });

        Ok(())
    }

    fn emit_close(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.inner.on_close.emit(&());
    }

    fn reply(&self) -> Reply {
        let state = self.inner.state.lock();

        let headers = match &state.sent {
            Some(s) => s.snapshot.clone(),
            None => state.headers.clone(),
        };

        Reply::new(
            state.status,
            reason_of(&state),
            headers,
            state.chunks.clone(),
            state.trailers.iter().cloned().collect(),
            self.inner.request.clone(),
            self.clone(),
        )
    }

    fn destroy_socket(&self, error: Option<Error>) {
        let first = {
            let mut state = self.inner.state.lock();
            state.destroyed = true;
            state.sink.destroy()
        };

        if !first {
            return;
        }

        if let Some(e) = error {
            debug!("Socket destroyed: {}", e);
        }

        self.inner.completion.fire_with(|| Err(Error::SocketHangUp));
        self.emit_close();
    }
}

fn write_body(state: &mut State, data: &[u8]) -> Result<(), Error> {
    if data.is_empty() {
        return Ok(());
    }

    let mode = sent_mode(state);

    if !mode.has_body() {
        debug!("Ignore {} bytes of body for response without body", data.len());
        return Ok(());
    }

    state.chunks.push(data.to_vec());
    state.written += data.len() as u64;
    mode.write(data, &mut state.sink)?;

    Ok(())
}

fn sent_mode(state: &State) -> BodyMode {
    state.sent.as_ref().map(|s| s.mode).unwrap_or(BodyMode::NoBody)
}

fn reason_of(state: &State) -> String {
    match &state.reason {
        Some(r) => r.clone(),
        None => state.status.canonical_reason().unwrap_or("").to_string(),
    }
}

fn check_reason(reason: &str) -> Result<(), Error> {
    if reason.contains(['\r', '\n']) {
        return Err(Error::InvalidHeader(format!("status message: {:?}", reason)));
    }
    Ok(())
}

fn to_values<I, V>(values: I) -> Result<Vec<HeaderValue>, Error>
where
    I: IntoIterator<Item = V>,
    V: fmt::Display,
{
    values
        .into_iter()
        .map(|v| HeaderValue::from_str(&v.to_string()).map_err(Error::from))
        .collect()
}

fn lossy(v: &HeaderValue) -> String {
    String::from_utf8_lossy(v.as_bytes()).into_owned()
}

impl NullSocket {
    /// Bytes the response wrote, head and framing included.
    pub fn bytes_written(&self) -> u64 {
        self.response.inner.state.lock().sink.written()
    }

    pub fn is_destroyed(&self) -> bool {
        self.response.inner.state.lock().sink.is_destroyed()
    }

    /// Break the transport. Unless the response already finished, the dispatch
    /// completes with [`Error::SocketHangUp`].
    pub fn destroy(&self, error: Option<Error>) {
        self.response.destroy_socket(error);
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Response")
            .field("status", &state.status)
            .field("headers", &state.headers)
            .field("ended", &state.ended)
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

impl fmt::Debug for NullSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NullSocket")
            .field("bytes_written", &self.bytes_written())
            .finish()
    }
}
