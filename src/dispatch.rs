use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::completion::{Completion, ReplyFuture};
use crate::options::InjectOptions;
use crate::reply::Reply;
use crate::req::{PendingRequest, Request};
use crate::res::Response;
use crate::Error;

/// A request handler.
///
/// Implemented for any `Fn(Request, Response)`. A server type implements it
/// directly and finds its own state in `&self`.
///
/// The handler is called once per dispatch. It may finish the response before
/// returning, or hand the request and response to another thread and finish
/// later.
pub trait Dispatch {
    fn dispatch(&self, request: Request, response: Response);
}

impl<F> Dispatch for F
where
    F: Fn(Request, Response),
{
    fn dispatch(&self, request: Request, response: Response) {
        (self)(request, response)
    }
}

/// Dispatch a request to `handler` and get a future of the reply.
///
/// Invalid options give an error right away, before the handler is involved.
/// Anything that goes wrong after that settles the future.
///
/// ```
/// use hootinject::{inject, Request, Response};
///
/// let handler = |req: Request, res: Response| {
///     res.set_header("content-type", "text/plain").unwrap();
///     res.end_with(format!("hello {}", req.url())).unwrap();
/// };
///
/// let reply = inject(&handler, "/world").unwrap().wait().unwrap();
/// assert_eq!(reply.payload(), "hello /world");
/// ```
pub fn inject<D, O>(handler: &D, options: O) -> Result<ReplyFuture, Error>
where
    D: Dispatch + ?Sized,
    O: Into<InjectOptions>,
{
    let (future, settler) = ReplyFuture::pending();
    inject_with(handler, options, move |r| settler.settle(r))?;
    Ok(future)
}

/// Dispatch a request to `handler`, the outcome goes to `callback`.
///
/// The callback is called exactly once, unless the request simulates no end and
/// the handler never finishes the response.
pub fn inject_with<D, O, F>(handler: &D, options: O, callback: F) -> Result<(), Error>
where
    D: Dispatch + ?Sized,
    O: Into<InjectOptions>,
    F: FnOnce(Result<Reply, Error>) + Send + 'static,
{
    let mut options = options.into();
    options.check()?;

    let signal = options.signal.take();
    let pending = PendingRequest::new(options)?;

    let completion = Completion::new(callback);

    let request = match pending.prepare() {
        Ok(v) => v,
        Err(e) => {
            debug!("Failed to prepare payload: {}", e);
            completion.fire_with(|| Err(e));
            return Ok(());
        }
    };

    let response = Response::new(request.clone(), completion);

    let weak = response.downgrade();
    request.set_on_destroy(move |error| {
        if let Some(response) = weak.upgrade() {
            response.destroy(error);
        }
    });

    if let Some(signal) = signal {
        if signal.is_aborted() {
            debug!("Aborted before dispatch");
            response.destroy(Some(Error::Aborted));
            return Ok(());
        }

        let weak = response.downgrade();
        signal.on_abort(move || {
            if let Some(response) = weak.upgrade() {
                response.destroy(Some(Error::Aborted));
            }
        });
    }

    trace!("Dispatch {} {}", request.method(), request.url());

    let res = response.clone();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.dispatch(request, res)));

    if let Err(payload) = outcome {
        let message = panic_message(&*payload);
        warn!("Handler panicked: {}", message);
        response.destroy(Some(Error::HandlerPanic(message)));
    }

    Ok(())
}

/// Tell whether a value is a request or response made by this crate.
pub fn is_injection(value: &dyn Any) -> bool {
    value.is::<Request>() || value.is::<Response>() || value.is::<http::Request<Request>>()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
