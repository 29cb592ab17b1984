use super::Next;
use crate::error::HttpError;
use crate::params::ParamValue;
use crate::router::Router;
use crate::runtime_config::RouterConfig;
use crate::server::{Request, Response};
use http::Method;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn router() -> Router {
    Router::with_config(RouterConfig::default())
}

fn run(router: &Router, method: Method, path: &str) -> Response {
    let res = Response::new();
    router.handle(&Request::new(method, path), &res, None);
    res
}

fn trace() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

#[test]
fn test_empty_stack_is_404() {
    let res = run(&router(), Method::GET, "/missing");
    let snap = res.snapshot();
    assert!(snap.ended);
    assert_eq!(snap.status, 404);
    assert_eq!(snap.body_str(), "GET /missing Not Found");
    assert_eq!(
        snap.header("content-type"),
        Some("text/plain; charset=utf-8")
    );
}

#[test]
fn test_handlers_run_in_registration_order() {
    let r = router();
    let seen = trace();
    for name in ["a", "b", "c"] {
        let seen = Arc::clone(&seen);
        r.use_handler(move |_req: &Request, _res: &Response, next: Next| {
            seen.lock().push(name.to_string());
            next.call();
            Ok(())
        })
        .unwrap();
    }
    run(&r, Method::GET, "/");
    assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
}

#[test]
fn test_handler_not_calling_next_stops_walk() {
    let r = router();
    let hits = Arc::new(AtomicUsize::new(0));
    r.use_handler(|_req: &Request, res: &Response, _next: Next| {
        res.send("stopped");
        Ok(())
    })
    .unwrap();
    let h = Arc::clone(&hits);
    r.use_handler(move |_req: &Request, _res: &Response, next: Next| {
        h.fetch_add(1, Ordering::SeqCst);
        next.call();
        Ok(())
    })
    .unwrap();

    let res = run(&r, Method::GET, "/");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(res.snapshot().body_str(), "stopped");
}

#[test]
fn test_next_is_single_use() {
    let r = router();
    let hits = Arc::new(AtomicUsize::new(0));
    let results = trace();
    let rs = Arc::clone(&results);
    r.use_handler(move |_req: &Request, _res: &Response, next: Next| {
        let again = next.clone();
        rs.lock().push(next.call().to_string());
        rs.lock().push(again.call().to_string());
        rs.lock().push(again.is_spent().to_string());
        Ok(())
    })
    .unwrap();
    let h = Arc::clone(&hits);
    r.use_handler(move |_req: &Request, _res: &Response, next: Next| {
        h.fetch_add(1, Ordering::SeqCst);
        next.call();
        Ok(())
    })
    .unwrap();

    run(&r, Method::GET, "/");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(*results.lock(), vec!["true", "false", "true"]);
}

#[test]
fn test_stale_continuation_is_ignored() {
    let r = router();
    let stash: Arc<Mutex<Option<Next>>> = Arc::new(Mutex::new(None));
    let s = Arc::clone(&stash);
    r.use_handler(move |_req: &Request, _res: &Response, next: Next| {
        *s.lock() = Some(next.clone());
        next.call();
        Ok(())
    })
    .unwrap();
    r.use_handler(|_req: &Request, res: &Response, _next: Next| {
        res.send("done");
        Ok(())
    })
    .unwrap();

    let res = run(&r, Method::GET, "/");
    let old = stash.lock().take().unwrap();
    assert!(!old.fail("late"));
    assert_eq!(res.snapshot().status, 200);
}

#[test]
fn test_long_chain_does_not_grow_stack() {
    let r = router();
    for _ in 0..2_000 {
        r.use_handler(|_req: &Request, _res: &Response, next: Next| {
            next.call();
            Ok(())
        })
        .unwrap();
    }
    r.use_handler(|_req: &Request, res: &Response, _next: Next| {
        res.send("end");
        Ok(())
    })
    .unwrap();

    let res = run(&r, Method::GET, "/");
    assert_eq!(res.snapshot().body_str(), "end");
}

#[test]
fn test_error_skips_normal_handlers_until_error_handler() {
    let r = router();
    let seen = trace();
    r.use_handler(|_req: &Request, _res: &Response, next: Next| {
        next.fail(HttpError::new(400, "bad"));
        Ok(())
    })
    .unwrap();
    let s = Arc::clone(&seen);
    r.use_handler(move |_req: &Request, _res: &Response, next: Next| {
        s.lock().push("normal".to_string());
        next.call();
        Ok(())
    })
    .unwrap();
    let s = Arc::clone(&seen);
    r.use_error(move |err: HttpError, _req: &Request, res: &Response, _next: Next| {
        s.lock().push(format!("error {}", err.status()));
        res.set_status(err.status());
        res.send(err.message());
        Ok(())
    })
    .unwrap();

    let res = run(&r, Method::GET, "/");
    assert_eq!(*seen.lock(), vec!["error 400"]);
    assert_eq!(res.snapshot().status, 400);
    assert_eq!(res.snapshot().body_str(), "bad");
}

#[test]
fn test_error_handler_consumes_error() {
    let r = router();
    r.use_handler(|_req: &Request, _res: &Response, _next: Next| {
        Err(HttpError::new(409, "conflict"))
    })
    .unwrap();
    r.use_error(|_err: HttpError, _req: &Request, _res: &Response, next: Next| {
        next.call();
        Ok(())
    })
    .unwrap();
    r.use_handler(|_req: &Request, res: &Response, _next: Next| {
        res.send("recovered");
        Ok(())
    })
    .unwrap();

    let res = run(&r, Method::GET, "/");
    assert_eq!(res.snapshot().body_str(), "recovered");
}

#[test]
fn test_unhandled_error_uses_status_and_message() {
    let r = router();
    r.use_handler(|_req: &Request, _res: &Response, next: Next| {
        next.fail_status(403);
        Ok(())
    })
    .unwrap();
    let snap = run(&r, Method::DELETE, "/x").snapshot();
    assert_eq!(snap.status, 403);
    assert_eq!(snap.body_str(), "DELETE /x Forbidden");
}

#[test]
fn test_string_error_is_500() {
    let r = router();
    r.use_handler(|_req: &Request, _res: &Response, next: Next| {
        next.fail("plain string");
        Ok(())
    })
    .unwrap();
    let snap = run(&r, Method::GET, "/").snapshot();
    assert_eq!(snap.status, 500);
    assert_eq!(snap.body_str(), "plain string");
}

#[test]
fn test_panic_becomes_500() {
    let r = router();
    r.use_handler(|_req: &Request, _res: &Response, _next: Next| -> crate::handler::HandlerResult {
        panic!("kaboom");
    })
    .unwrap();
    let snap = run(&r, Method::GET, "/").snapshot();
    assert_eq!(snap.status, 500);
}

#[test]
fn test_err_after_next_is_ignored() {
    let r = router();
    r.use_handler(|_req: &Request, _res: &Response, next: Next| {
        next.call();
        Err(HttpError::new(500, "too late"))
    })
    .unwrap();
    r.use_handler(|_req: &Request, res: &Response, _next: Next| {
        res.send("ok");
        Ok(())
    })
    .unwrap();
    let snap = run(&r, Method::GET, "/").snapshot();
    assert_eq!(snap.status, 200);
    assert_eq!(snap.body_str(), "ok");
}

#[test]
fn test_method_filter() {
    let r = router();
    r.post("/items", |_req: &Request, res: &Response, _next: Next| {
        res.send("posted");
        Ok(())
    })
    .unwrap();
    assert_eq!(run(&r, Method::GET, "/items").snapshot().status, 404);
    assert_eq!(
        run(&r, Method::POST, "/items").snapshot().body_str(),
        "posted"
    );
}

#[test]
fn test_pointer_skipped_when_canonical_misses() {
    let r = router();
    let hits = Arc::new(AtomicUsize::new(0));
    for _ in 0..2 {
        let h = Arc::clone(&hits);
        r.get("/p/:id", move |_req: &Request, _res: &Response, next: Next| {
            h.fetch_add(1, Ordering::SeqCst);
            next.call();
            Ok(())
        })
        .unwrap();
    }
    assert!(r.stack().get(1).unwrap().is_pointer());

    run(&r, Method::GET, "/q/1");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    run(&r, Method::GET, "/p/1");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn test_pointer_sees_params() {
    let r = router();
    r.get("/p/:id", |_req: &Request, _res: &Response, next: Next| {
        next.call();
        Ok(())
    })
    .unwrap();
    r.get("/p/:id", |req: &Request, res: &Response, _next: Next| {
        res.send(req.param("id").unwrap().as_str().unwrap());
        Ok(())
    })
    .unwrap();
    assert_eq!(run(&r, Method::GET, "/p/7").snapshot().body_str(), "7");
}

#[test]
fn test_hook_fires_once_per_value() {
    let r = router();
    let fired = trace();
    let f = Arc::clone(&fired);
    r.param(
        "id",
        move |_req: &Request, _res: &Response, next: Next, value: &ParamValue| {
            f.lock().push(value.to_string());
            next.call();
            Ok(())
        },
    )
    .unwrap();
    for _ in 0..3 {
        r.get("/u/:id", |_req: &Request, _res: &Response, next: Next| {
            next.call();
            Ok(())
        })
        .unwrap();
    }

    run(&r, Method::GET, "/u/5");
    assert_eq!(*fired.lock(), vec!["5"]);
}

#[test]
fn test_hook_failure_skips_its_record() {
    let r = router();
    r.param(
        "id",
        |_req: &Request, _res: &Response, next: Next, _value: &ParamValue| {
            next.fail(HttpError::new(422, "bad id"));
            Ok(())
        },
    )
    .unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    r.get("/u/:id", move |_req: &Request, _res: &Response, next: Next| {
        h.fetch_add(1, Ordering::SeqCst);
        next.call();
        Ok(())
    })
    .unwrap();

    let snap = run(&r, Method::GET, "/u/x").snapshot();
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(snap.status, 422);
    assert_eq!(snap.body_str(), "bad id");
}

#[test]
fn test_hook_failure_reaches_error_handler_on_same_record() {
    let r = router();
    r.param(
        "id",
        |_req: &Request, _res: &Response, next: Next, _value: &ParamValue| {
            next.fail(HttpError::new(422, "hook says no"));
            Ok(())
        },
    )
    .unwrap();
    r.use_handler(|_req: &Request, _res: &Response, _next: Next| {
        Err(HttpError::new(400, "first"))
    })
    .unwrap();
    let seen = trace();
    let s = Arc::clone(&seen);
    r.use_error_at(
        "/u/:id",
        move |err: HttpError, _req: &Request, res: &Response, _next: Next| {
            s.lock().push(err.message().to_string());
            res.set_status(err.status());
            res.send("handled");
            Ok(())
        },
    )
    .unwrap();

    let snap = run(&r, Method::GET, "/u/7").snapshot();
    assert_eq!(*seen.lock(), vec!["hook says no"]);
    assert_eq!(snap.status, 422);
    assert_eq!(snap.body_str(), "handled");
}

#[test]
fn test_terminal_receives_pending_error() {
    let r = router();
    r.use_handler(|_req: &Request, _res: &Response, next: Next| {
        next.fail(HttpError::new(401, "who"));
        Ok(())
    })
    .unwrap();

    let got: Arc<Mutex<Option<Option<HttpError>>>> = Arc::new(Mutex::new(None));
    let g = Arc::clone(&got);
    let res = Response::new();
    r.handle(
        &Request::new(Method::GET, "/"),
        &res,
        Some(Box::new(move |err: Option<HttpError>| {
            *g.lock() = Some(err);
        })),
    );

    let err = got.lock().take().unwrap().unwrap();
    assert_eq!(err.status(), 401);
    assert!(!res.is_ended());
}

#[test]
fn test_resume_from_other_thread() {
    let r = router();
    r.use_handler(|_req: &Request, _res: &Response, next: Next| {
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            next.call();
        });
        Ok(())
    })
    .unwrap();
    r.use_handler(|_req: &Request, res: &Response, _next: Next| {
        res.send("async");
        Ok(())
    })
    .unwrap();

    let (res, done) = Response::with_completion();
    r.handle(&Request::new(Method::GET, "/"), &res, None);
    drop(res);
    let snap = done.recv().unwrap();
    assert_eq!(snap.body_str(), "async");
}

#[test]
fn test_ended_response_not_overwritten() {
    let r = router();
    r.use_handler(|_req: &Request, res: &Response, next: Next| {
        res.send("early");
        next.call();
        Ok(())
    })
    .unwrap();
    let snap = run(&r, Method::GET, "/").snapshot();
    assert_eq!(snap.status, 200);
    assert_eq!(snap.body_str(), "early");
}

#[test]
fn test_phase_tracks_state_machine() {
    let r = router();
    let phases = trace();
    let p = Arc::clone(&phases);
    r.param(
        "id",
        move |_req: &Request, _res: &Response, next: Next, _value: &ParamValue| {
            p.lock().push(format!("{:?}", next.phase()));
            next.call();
            Ok(())
        },
    )
    .unwrap();
    let stash: Arc<Mutex<Option<Next>>> = Arc::new(Mutex::new(None));
    let s = Arc::clone(&stash);
    let p = Arc::clone(&phases);
    r.get("/t/:id", move |_req: &Request, _res: &Response, next: Next| {
        p.lock().push(format!("{:?}", next.phase()));
        *s.lock() = Some(next.clone());
        next.call();
        Ok(())
    })
    .unwrap();

    run(&r, Method::GET, "/t/1");
    let next = stash.lock().take().unwrap();
    assert_eq!(next.phase(), super::Phase::Done);
    assert_eq!(*phases.lock(), vec!["ParamPending", "HandlerRunning"]);
}
