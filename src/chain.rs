//! Building a dispatch step by step.

use std::fmt;
use std::future::IntoFuture;

use crate::abort::AbortSignal;
use crate::completion::ReplyFuture;
use crate::dispatch::{inject, inject_with, Dispatch};
use crate::options::{InjectOptions, Payload, Simulate};
use crate::reply::Reply;
use crate::target::{Query, UrlInput};
use crate::Error;

/// Options built up one call at a time, dispatched by [`Chain::end`],
/// [`Chain::send`] or by awaiting the chain.
///
/// A chain that is dropped without being dispatched dispatches anyway, unless
/// auto start was turned off. The outcome of such a dispatch is only logged.
///
/// ```
/// use hootinject::{chain, Request, Response};
///
/// let handler = |req: Request, res: Response| {
///     res.end_with(req.method().as_str()).unwrap();
/// };
///
/// let reply = chain(handler).post("/").body("x").send().unwrap().wait().unwrap();
/// assert_eq!(reply.payload(), "POST");
/// ```
pub struct Chain<D: Dispatch> {
    handler: D,
    options: Option<InjectOptions>,
    auto_start: bool,
}

/// Start a [`Chain`] for `handler`.
pub fn chain<D: Dispatch>(handler: D) -> Chain<D> {
    Chain {
        handler,
        options: Some(InjectOptions::default()),
        auto_start: true,
    }
}

impl<D: Dispatch> Chain<D> {
    /// Start from existing options.
    pub fn with_options(handler: D, options: InjectOptions) -> Self {
        Chain {
            handler,
            options: Some(options),
            auto_start: true,
        }
    }

    fn map(mut self, f: impl FnOnce(InjectOptions) -> InjectOptions) -> Self {
        let options = self.options.take().unwrap_or_default();
        self.options = Some(f(options));
        self
    }

    fn verb(self, method: &str, url: impl Into<UrlInput>) -> Self {
        let method = method.to_string();
        self.map(|o| o.method(method).url(url))
    }

    pub fn get(self, url: impl Into<UrlInput>) -> Self {
        self.verb("GET", url)
    }

    pub fn post(self, url: impl Into<UrlInput>) -> Self {
        self.verb("POST", url)
    }

    pub fn put(self, url: impl Into<UrlInput>) -> Self {
        self.verb("PUT", url)
    }

    pub fn delete(self, url: impl Into<UrlInput>) -> Self {
        self.verb("DELETE", url)
    }

    pub fn patch(self, url: impl Into<UrlInput>) -> Self {
        self.verb("PATCH", url)
    }

    pub fn head(self, url: impl Into<UrlInput>) -> Self {
        self.verb("HEAD", url)
    }

    pub fn options(self, url: impl Into<UrlInput>) -> Self {
        self.verb("OPTIONS", url)
    }

    pub fn trace(self, url: impl Into<UrlInput>) -> Self {
        self.verb("TRACE", url)
    }

    pub fn url(self, url: impl Into<UrlInput>) -> Self {
        self.map(|o| o.url(url))
    }

    pub fn method(self, method: impl Into<String>) -> Self {
        self.map(|o| o.method(method))
    }

    pub fn header(self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.map(|o| o.header(name, value))
    }

    pub fn headers<I, K, V>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: fmt::Display,
    {
        self.map(|o| headers.into_iter().fold(o, |o, (k, v)| o.header(k, v)))
    }

    pub fn payload(self, payload: impl Into<Payload>) -> Self {
        self.map(|o| o.payload(payload))
    }

    pub fn body(self, payload: impl Into<Payload>) -> Self {
        self.payload(payload)
    }

    pub fn query(self, query: impl Into<Query>) -> Self {
        self.map(|o| o.query(query))
    }

    pub fn cookie(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.map(|o| o.cookie(name, value))
    }

    pub fn cookies<I, K, V>(self, cookies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.map(|o| cookies.into_iter().fold(o, |o, (k, v)| o.cookie(k, v)))
    }

    pub fn simulate(self, simulate: Simulate) -> Self {
        self.map(|o| o.simulate(simulate))
    }

    pub fn remote_address(self, addr: impl Into<String>) -> Self {
        self.map(|o| o.remote_address(addr))
    }

    pub fn authority(self, authority: impl Into<String>) -> Self {
        self.map(|o| o.authority(authority))
    }

    pub fn signal(self, signal: AbortSignal) -> Self {
        self.map(|o| o.signal(signal))
    }

    pub fn validate(self, validate: bool) -> Self {
        self.map(|o| o.validate(validate))
    }

    /// Whether a chain dropped without dispatching still dispatches.
    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Dispatch, the outcome goes to `callback`.
    pub fn end<F>(mut self, callback: F) -> Result<(), Error>
    where
        F: FnOnce(Result<Reply, Error>) + Send + 'static,
    {
        let options = self.options.take().unwrap_or_default();
        inject_with(&self.handler, options, callback)
    }

    /// Dispatch and get a future of the reply.
    pub fn send(mut self) -> Result<ReplyFuture, Error> {
        let options = self.options.take().unwrap_or_default();
        inject(&self.handler, options)
    }
}

impl<D: Dispatch> IntoFuture for Chain<D> {
    type Output = Result<Reply, Error>;
    type IntoFuture = ReplyFuture;

    /// Dispatches. Invalid options settle the future with the error.
    fn into_future(self) -> Self::IntoFuture {
        match self.send() {
            Ok(v) => v,
            Err(e) => ReplyFuture::ready(Err(e)),
        }
    }
}

impl<D: Dispatch> Drop for Chain<D> {
    fn drop(&mut self) {
        let Some(options) = self.options.take() else {
            return;
        };

        if !self.auto_start {
            return;
        }

        trace!("Auto start dropped chain");

        let r = inject_with(&self.handler, options, |r| {
            if let Err(e) = r {
                debug!("Auto started dispatch failed: {}", e);
            }
        });

        if let Err(e) = r {
            warn!("Auto started dispatch has invalid options: {}", e);
        }
    }
}

impl<D: Dispatch> fmt::Debug for Chain<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("options", &self.options)
            .field("auto_start", &self.auto_start)
            .finish()
    }
}
