//! Dispatches driven end to end, from options to reply.

use crate::{Request, Response};

mod abort;
mod completion;

/// Handler that answers with the request body once it ends.
///
/// With a request that never ends, the response is never finished.
pub(crate) fn echo(req: Request, res: Response) {
    let mut body = vec![];
    loop {
        match req.next_chunk() {
            Ok(Some(chunk)) => body.extend(chunk),
            Ok(None) => break,
            Err(e) if e.kind() == std::io::ErrorKind::Other => continue,
            Err(_) => return,
        }
    }
    res.end_with(body).unwrap();
}
