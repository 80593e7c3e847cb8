use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::echo;
use crate::{inject, inject_with, Error, InjectOptions, Request, Response, Simulate};

fn counted(count: &Arc<AtomicUsize>) -> impl FnOnce(Result<crate::Reply, Error>) + Send {
    let count = count.clone();
    move |_| {
        count.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn body_without_end_never_completes() -> Result<(), Error> {
    let opts = InjectOptions::new("/")
        .method("POST")
        .payload("never ending")
        .simulate(Simulate {
            end: false,
            ..Default::default()
        });

    let mut fut = inject(&echo, opts)?;
    assert!(fut.wait_timeout(Duration::from_millis(50)).is_none());
    assert!(!fut.is_settled());
    Ok(())
}

#[test]
fn end_twice_completes_once() -> Result<(), Error> {
    let count = Arc::new(AtomicUsize::new(0));

    let handler = |_req: Request, res: Response| {
        res.end_with("one").unwrap();
        res.end_with("two").unwrap();
        res.destroy(None);
        res.socket().destroy(None);
    };

    inject_with(&handler, "/", counted(&count))?;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    let reply = inject(&handler, "/")?.wait()?;
    assert_eq!(reply.payload(), "one");
    Ok(())
}

#[test]
fn destroy_twice_completes_once() -> Result<(), Error> {
    let count = Arc::new(AtomicUsize::new(0));

    let handler = |_req: Request, res: Response| {
        res.destroy(None);
        res.destroy(Some(Error::other("late")));
        res.end().unwrap();
    };

    inject_with(&handler, "/", counted(&count))?;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    let r = inject(&handler, "/")?.wait();
    assert!(matches!(r, Err(Error::SocketHangUp)));
    Ok(())
}

#[test]
fn finished_on_another_thread() -> Result<(), Error> {
    let handler = |req: Request, res: Response| {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            res.end_with(req.url()).unwrap();
        });
    };

    let reply = inject(&handler, "/later")?.wait()?;
    assert_eq!(reply.payload(), "/later");
    Ok(())
}

#[test]
fn request_destroy_delivers_error() -> Result<(), Error> {
    #[derive(Debug)]
    struct Kaboom;

    impl std::fmt::Display for Kaboom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "kaboom")
        }
    }

    impl std::error::Error for Kaboom {}

    let handler = |req: Request, _res: Response| {
        req.destroy(Some(Error::other(Kaboom)));
    };

    match inject(&handler, "/")?.wait() {
        Err(Error::Other(e)) => assert!(e.downcast_ref::<Kaboom>().is_some()),
        other => panic!("unexpected: {:?}", other),
    }
    Ok(())
}

#[test]
fn request_destroy_without_error_hangs_up() -> Result<(), Error> {
    let handler = |req: Request, _res: Response| {
        req.destroy(None);
    };

    let r = inject(&handler, "/")?.wait();
    let e = r.unwrap_err();
    assert!(matches!(e, Error::SocketHangUp));
    assert_eq!(e.code(), Some("ECONNRESET"));
    Ok(())
}

#[test]
fn destroy_after_body_read_completes() -> Result<(), Error> {
    let handler = |req: Request, _res: Response| {
        while let Ok(Some(_)) = req.next_chunk() {}
        req.destroy(Some(Error::other("kaboom")));
    };

    let opts = InjectOptions::new("/").method("POST").payload("body");
    let mut fut = inject(&handler, opts)?;

    match fut.wait_timeout(Duration::from_millis(200)) {
        Some(Err(Error::Other(e))) => assert_eq!(e.to_string(), "kaboom"),
        other => panic!("unexpected: {:?}", other),
    }
    Ok(())
}

#[test]
fn destroy_after_empty_body_resumed_completes() -> Result<(), Error> {
    let handler = |req: Request, _res: Response| {
        req.resume();
        req.destroy(None);
    };

    let mut fut = inject(&handler, "/")?;
    let r = fut.wait_timeout(Duration::from_millis(200));
    assert!(matches!(r, Some(Err(Error::SocketHangUp))));
    Ok(())
}

#[test]
fn destroy_after_response_finished_keeps_reply() -> Result<(), Error> {
    let handler = |req: Request, res: Response| {
        req.resume();
        res.end_with("fine").unwrap();
        req.destroy(Some(Error::other("late")));
    };

    let reply = inject(&handler, "/")?.wait()?;
    assert_eq!(reply.payload(), "fine");
    Ok(())
}

#[test]
fn socket_destroy_hangs_up() -> Result<(), Error> {
    let handler = |_req: Request, res: Response| {
        res.write("partial").unwrap();
        res.socket().destroy(Some(Error::other("gone")));
    };

    let r = inject(&handler, "/")?.wait();
    assert!(matches!(r, Err(Error::SocketHangUp)));
    Ok(())
}

#[test]
fn timeout_lets_handler_answer() -> Result<(), Error> {
    let handler = |_req: Request, res: Response| {
        let r = res.clone();
        res.set_timeout(Duration::from_millis(10), move || {
            r.set_status_code(408).unwrap();
            r.end_with("too slow").unwrap();
        });
    };

    let reply = inject(&handler, "/")?.wait()?;
    assert_eq!(reply.status_code(), 408);
    assert_eq!(reply.payload(), "too slow");
    Ok(())
}

#[test]
fn timeout_fires_after_completion() -> Result<(), Error> {
    let (tx, rx) = std::sync::mpsc::channel();

    let handler = move |_req: Request, res: Response| {
        let tx = tx.clone();
        res.set_timeout(Duration::from_millis(10), move || {
            let _ = tx.send(());
        });
        res.end().unwrap();
    };

    let reply = inject(&handler, "/")?.wait()?;
    assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    assert!(reply.raw_response().is_finished());
    Ok(())
}

#[test]
fn listeners_see_finish_then_close() -> Result<(), Error> {
    let seen = Arc::new(parking_lot::Mutex::new(vec![]));
    let s = seen.clone();

    let handler = move |_req: Request, res: Response| {
        let a = s.clone();
        let b = s.clone();
        res.on_finish(move || a.lock().push("finish"))
            .on_close(move || b.lock().push("close"));
        res.end().unwrap();
    };

    inject(&handler, "/")?.wait()?;
    assert_eq!(*seen.lock(), vec!["finish", "close"]);
    Ok(())
}
