//! Cancelling a dispatch from the outside.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type OnAbort = Box<dyn FnOnce() + Send>;

/// Owner side of an [`AbortSignal`].
#[derive(Debug, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

/// Passed in the options of a dispatch. Aborting before the dispatch completes
/// makes it complete with [`Error::Aborted`][crate::Error::Aborted].
#[derive(Clone, Default)]
pub struct AbortSignal {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    aborted: AtomicBool,
    listeners: Mutex<Vec<OnAbort>>,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Abort. Only the first call has any effect.
    pub fn abort(&self) {
        if self.signal.inner.aborted.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("Abort signalled");

        let listeners = std::mem::take(&mut *self.signal.inner.listeners.lock());
        for f in listeners {
            f();
        }
    }
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Run `f` on abort. Runs immediately if already aborted.
    pub(crate) fn on_abort(&self, f: impl FnOnce() + Send + 'static) {
        {
            let mut lock = self.inner.listeners.lock();
            if !self.is_aborted() {
                lock.push(Box::new(f));
                return;
            }
        }
        f();
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn abort_runs_listeners_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = AbortController::new();
        let s = c.signal();

        let c2 = count.clone();
        s.on_abort(move || {
            c2.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!s.is_aborted());
        c.abort();
        c.abort();
        assert!(s.is_aborted());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_after_abort_runs_immediately() {
        let c = AbortController::new();
        c.abort();

        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        c.signal().on_abort(move || r.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
    }
}
