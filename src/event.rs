use std::mem;

use parking_lot::Mutex;

type Listener<A> = Box<dyn FnMut(&A) + Send>;

/// Callbacks registered for one event.
///
/// Emitting runs with the lock released, a listener may register further
/// listeners or cause the same event to be emitted again.
pub(crate) struct Listeners<A: ?Sized> {
    inner: Mutex<Vec<Listener<A>>>,
}

impl<A: ?Sized> Listeners<A> {
    pub fn new() -> Self {
        Listeners {
            inner: Mutex::new(vec![]),
        }
    }

    pub fn add(&self, f: impl FnMut(&A) + Send + 'static) {
        self.inner.lock().push(Box::new(f));
    }

    pub fn emit(&self, arg: &A) {
        let mut running = mem::take(&mut *self.inner.lock());

        for f in &mut running {
            f(arg);
        }

        let mut lock = self.inner.lock();
        running.append(&mut lock);
        *lock = running;
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn emit_calls_all() {
        let count = Arc::new(AtomicUsize::new(0));
        let l: Listeners<u32> = Listeners::new();

        for _ in 0..3 {
            let c = count.clone();
            l.add(move |v| {
                c.fetch_add(*v as usize, Ordering::SeqCst);
            });
        }

        l.emit(&2);
        assert_eq!(count.load(Ordering::SeqCst), 6);
        assert_eq!(l.len(), 3);
    }

    #[test]
    fn add_during_emit() {
        let l: Arc<Listeners<()>> = Arc::new(Listeners::new());
        let l2 = l.clone();
        l.add(move |_| l2.add(|_| {}));

        l.emit(&());
        assert_eq!(l.len(), 2);
    }
}
