use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::{inject, AbortController, Error, InjectOptions, Request, Response};

#[test]
fn aborted_before_dispatch() -> Result<(), Error> {
    let called = Arc::new(Mutex::new(false));
    let c = called.clone();
    let handler = move |_req: Request, res: Response| {
        *c.lock() = true;
        res.end().unwrap();
    };

    let controller = AbortController::new();
    controller.abort();

    let opts = InjectOptions::new("/").signal(controller.signal());
    let r = inject(&handler, opts)?.wait();

    let e = r.unwrap_err();
    assert!(matches!(e, Error::Aborted));
    assert_eq!(e.code(), Some("ABORT_ERR"));
    assert!(!*called.lock());
    Ok(())
}

#[test]
fn aborted_while_handling() -> Result<(), Error> {
    let parked = Arc::new(Mutex::new(None));
    let p = parked.clone();
    let handler = move |_req: Request, res: Response| {
        *p.lock() = Some(res);
    };

    let controller = AbortController::new();
    let opts = InjectOptions::new("/").signal(controller.signal());
    let mut fut = inject(&handler, opts)?;

    assert!(fut.wait_timeout(Duration::from_millis(10)).is_none());

    controller.abort();

    let r = fut.wait();
    assert!(matches!(r, Err(Error::Aborted)));

    let res = parked.lock().take().unwrap();
    assert!(res.is_destroyed());
    Ok(())
}

#[test]
fn abort_after_completion_is_ignored() -> Result<(), Error> {
    let handler = |_req: Request, res: Response| {
        res.end_with("done").unwrap();
    };

    let controller = AbortController::new();
    let opts = InjectOptions::new("/").signal(controller.signal());
    let reply = inject(&handler, opts)?.wait()?;

    controller.abort();

    assert_eq!(reply.payload(), "done");
    assert!(reply.raw_response().is_finished());
    Ok(())
}

#[test]
fn shared_signal_does_not_keep_responses() -> Result<(), Error> {
    let handler = |_req: Request, res: Response| {
        res.end_with("x").unwrap();
    };

    let controller = AbortController::new();

    let mut weak = vec![];
    for _ in 0..3 {
        let opts = InjectOptions::new("/").signal(controller.signal());
        let reply = inject(&handler, opts)?.wait()?;
        weak.push(reply.raw_response().downgrade());
    }

    assert!(weak.iter().all(|w| w.upgrade().is_none()));

    controller.abort();
    Ok(())
}
