use crate::dispatch::Dispatch;
use crate::req::Request;
use crate::res::Response;

/// Adapts a function over `http` types into a [`Dispatch`].
///
/// For handlers written against `http::Request` / `http::Response`. The request
/// body is the injected [`Request`] itself, read it with `std::io::Read`.
///
/// ```
/// use std::io::Read;
/// use hootinject::{http, inject, service_fn, InjectOptions, Request};
///
/// let svc = service_fn(|mut req: http::Request<Request>| {
///     let mut body = String::new();
///     req.body_mut().read_to_string(&mut body).unwrap();
///     http::Response::builder().status(201).body(body).unwrap()
/// });
///
/// let opts = InjectOptions::new("/").method("POST").payload("echo");
/// let reply = inject(&svc, opts).unwrap().wait().unwrap();
/// assert_eq!(reply.status_code(), 201);
/// assert_eq!(reply.payload(), "echo");
/// ```
#[derive(Debug, Clone)]
pub struct ServiceFn<F>(F);

pub fn service_fn<F, B>(f: F) -> ServiceFn<F>
where
    F: Fn(http::Request<Request>) -> http::Response<B>,
    B: AsRef<[u8]>,
{
    ServiceFn(f)
}

impl<F, B> Dispatch for ServiceFn<F>
where
    F: Fn(http::Request<Request>) -> http::Response<B>,
    B: AsRef<[u8]>,
{
    fn dispatch(&self, request: Request, response: Response) {
        let request = match request.into_http() {
            Ok(v) => v,
            Err(e) => {
                response.destroy(Some(e));
                return;
            }
        };

        let reply = (self.0)(request);

        if let Err(e) = response.send(reply) {
            debug!("Failed to send response: {}", e);
            response.destroy(Some(e));
        }
    }
}
