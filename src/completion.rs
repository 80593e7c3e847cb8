use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::reply::Reply;
use crate::Error;

type Callback = Box<dyn FnOnce(Result<Reply, Error>) + Send>;

/// The single-fire channel of one dispatch.
pub(crate) struct Completion {
    slot: Mutex<Option<Callback>>,
}

impl Completion {
    pub fn new(callback: impl FnOnce(Result<Reply, Error>) + Send + 'static) -> Self {
        Completion {
            slot: Mutex::new(Some(Box::new(callback))),
        }
    }

    /// Deliver the outcome produced by `f`. Only the first call has any effect,
    /// later calls don't run `f`.
    pub fn fire_with(&self, f: impl FnOnce() -> Result<Reply, Error>) -> bool {
        let Some(callback) = self.slot.lock().take() else {
            return false;
        };

        let result = f();

        match &result {
            Ok(r) => trace!("Complete with status {}", r.status_code()),
            Err(e) => trace!("Complete with error: {}", e),
        }

        callback(result);

        true
    }

    pub fn is_fired(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("fired", &self.is_fired())
            .finish()
    }
}

/// The outcome of a dispatch, for callers that don't pass a callback.
///
/// Await it, or block with [`ReplyFuture::wait`].
pub struct ReplyFuture {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
}

#[derive(Default)]
struct State {
    settled: bool,
    result: Option<Result<Reply, Error>>,
    waker: Option<Waker>,
}

/// Settles the paired [`ReplyFuture`].
pub(crate) struct Settler {
    shared: Arc<Shared>,
}

impl ReplyFuture {
    pub(crate) fn pending() -> (ReplyFuture, Settler) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            cond: Condvar::new(),
        });

        let settler = Settler {
            shared: shared.clone(),
        };

        (ReplyFuture { shared }, settler)
    }

    pub(crate) fn ready(result: Result<Reply, Error>) -> ReplyFuture {
        let (fut, settler) = Self::pending();
        settler.settle(result);
        fut
    }

    pub fn is_settled(&self) -> bool {
        self.shared.state.lock().settled
    }

    /// Block the current thread until the dispatch completes.
    ///
    /// Never returns for a request simulating no end, unless the handler ends
    /// the response anyway.
    pub fn wait(self) -> Result<Reply, Error> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(result) = state.result.take() {
                return result;
            }
            self.shared.cond.wait(&mut state);
        }
    }

    /// Block up to `timeout`. `None` if the dispatch did not complete in time.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<Result<Reply, Error>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if let Some(result) = state.result.take() {
                return Some(result);
            }
            if self.shared.cond.wait_until(&mut state, deadline).timed_out() {
                return state.result.take();
            }
        }
    }
}

impl Future for ReplyFuture {
    type Output = Result<Reply, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.state.lock();

        if let Some(result) = state.result.take() {
            return Poll::Ready(result);
        }

        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl fmt::Debug for ReplyFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyFuture")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl Settler {
    pub fn settle(self, result: Result<Reply, Error>) {
        let waker = {
            let mut state = self.shared.state.lock();
            state.settled = true;
            state.result = Some(result);
            state.waker.take()
        };

        self.shared.cond.notify_all();

        if let Some(waker) = waker {
            waker.wake();
        }
    }
}
