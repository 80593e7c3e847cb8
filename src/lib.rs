//! Inject fake http requests into a handler without a socket.
//!
//! A handler is anything implementing [`Dispatch`], which includes every
//! `Fn(Request, Response)`. [`inject`] builds a [`Request`] from
//! [`InjectOptions`], hands it to the handler together with a [`Response`],
//! and captures whatever the handler writes into a [`Reply`].
//!
//! ```
//! use hootinject::{inject, InjectOptions, Request, Response};
//!
//! let handler = |req: Request, res: Response| {
//!     res.set_header("content-type", "text/plain").unwrap();
//!     res.end_with(format!("{} {}", req.method(), req.url())).unwrap();
//! };
//!
//! let opts = InjectOptions::new("/hello").method("post").payload("hi");
//! let reply = inject(&handler, opts).unwrap().wait().unwrap();
//!
//! assert_eq!(reply.status_code(), 200);
//! assert_eq!(reply.payload(), "POST /hello");
//! assert_eq!(reply.header("content-length"), Some("11"));
//! ```
//!
//! Nothing is parsed from a wire. The request is never sent over a network and
//! the response is written to a sink that only counts bytes, but the head of the
//! response is serialized the way it would be on a socket, so framing headers
//! such as `content-length` and `transfer-encoding` show up in the reply.
//!
//! The reply can also be awaited, see [`ReplyFuture`], or delivered to a
//! callback with [`inject_with`]. A [`Chain`] builds the options one call at a
//! time.

#[macro_use]
extern crate log;

// Re-export this
pub use http;

mod error;
pub use error::Error;

mod abort;
mod body;
mod chain;
mod completion;
mod cookie;
mod dispatch;
mod event;
mod options;
mod out;
mod reply;
mod req;
mod res;
mod service;
mod target;
mod util;

pub use abort::{AbortController, AbortSignal};
pub use chain::{chain, Chain};
pub use completion::ReplyFuture;
pub use cookie::Cookie;
pub use dispatch::{inject, inject_with, is_injection, Dispatch};
pub use options::{InjectOptions, Payload, Simulate};
pub use reply::Reply;
pub use req::{Request, Socket};
pub use res::{NullSocket, Response};
pub use service::{service_fn, ServiceFn};
pub use target::{Query, QueryValue, UrlInput, UrlParts};

#[cfg(test)]
mod test;
