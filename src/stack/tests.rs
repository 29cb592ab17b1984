use super::{HandlerStack, Layer};
use crate::dispatcher::Next;
use crate::handler::{Callback, HandlerKind};
use crate::pattern::{CompileOptions, PathPattern, PathSpec};
use crate::router::Router;
use crate::runtime_config::RouterConfig;
use crate::server::{Request, Response};
use http::Method;
use std::sync::Arc;

fn exact(path: &str) -> Arc<PathPattern> {
    Arc::new(PathPattern::compile(&PathSpec::from(path), CompileOptions::default()).unwrap())
}

fn noop() -> Callback {
    Callback::handler(|_req: &Request, _res: &Response, next: Next| {
        next.call();
        Ok(())
    })
}

fn error_noop() -> Callback {
    Callback::error_handler(
        |err: crate::error::HttpError, _req: &Request, _res: &Response, next: Next| {
            next.fail(err);
            Ok(())
        },
    )
}

#[test]
fn test_push_assigns_increasing_ids() {
    let mut stack = HandlerStack::new();
    let a = stack.push(exact("/a"), None, noop());
    let b = stack.push(exact("/b"), Some(Method::GET), noop());
    let c = stack.push(exact("/c"), None, error_noop());
    assert!(a < b && b < c);
    assert_eq!(stack.len(), 3);
    assert_eq!(stack.next_id(), c + 1);
    assert_eq!(stack.matcher_slots(), 3);
    assert_eq!(stack.get(2).unwrap().kind(), HandlerKind::ErrorHandler);
    assert_eq!(stack.get(1).unwrap().method(), Some(&Method::GET));
}

#[test]
fn test_optimize_rewrites_duplicate_pattern() {
    let mut stack = HandlerStack::new();
    let first = stack.push(exact("/users/:id"), None, noop());
    stack.push(exact("/other"), None, noop());
    let start = stack.len();
    let dup = stack.push(exact("/users/:id"), Some(Method::POST), noop());

    assert_eq!(stack.optimize(start), 1);

    match stack.get(2).unwrap() {
        Layer::Pointer(p) => {
            assert_eq!(p.id, dup);
            assert_eq!(p.canonical, first);
            assert_eq!(p.matcher, 0);
            assert_eq!(p.method, Some(Method::POST));
        }
        Layer::Record(_) => panic!("expected a pointer"),
    }
    assert_eq!(stack.matcher_slots(), 3);
    assert_eq!(stack.live_matchers(), 2);
    assert!(stack.pattern(2).is_none());
}

#[test]
fn test_optimize_keeps_distinct_param_names_apart() {
    let mut stack = HandlerStack::new();
    stack.push(exact("/a/:x"), None, noop());
    stack.push(exact("/a/:y"), None, noop());
    assert_eq!(stack.optimize(1), 0);
    assert!(!stack.get(1).unwrap().is_pointer());
}

#[test]
fn test_optimize_respects_flags() {
    let mut stack = HandlerStack::new();
    stack.push(exact("/a"), None, noop());
    let prefix = PathPattern::compile(
        &PathSpec::from("/a"),
        CompileOptions {
            prefix_only: true,
            case_sensitive: false,
        },
    )
    .unwrap();
    stack.push(Arc::new(prefix), None, noop());
    let sensitive = PathPattern::compile(
        &PathSpec::from("/a"),
        CompileOptions {
            prefix_only: false,
            case_sensitive: true,
        },
    )
    .unwrap();
    stack.push(Arc::new(sensitive), None, noop());
    assert_eq!(stack.optimize(1), 0);
    assert_eq!(stack.live_matchers(), 3);
}

#[test]
fn test_optimize_points_at_first_record_not_pointer() {
    let mut stack = HandlerStack::new();
    let first = stack.push(exact("/x"), None, noop());
    stack.push(exact("/x"), None, noop());
    stack.optimize(1);
    stack.push(exact("/x"), None, error_noop());
    stack.optimize(2);

    for layer in &stack.layers()[1..] {
        match layer {
            Layer::Pointer(p) => assert_eq!(p.canonical, first),
            Layer::Record(_) => panic!("expected a pointer"),
        }
    }
    assert_eq!(stack.live_matchers(), 1);
}

#[test]
fn test_optimize_only_touches_new_records() {
    let mut stack = HandlerStack::new();
    stack.push(exact("/x"), None, noop());
    stack.push(exact("/x"), None, noop());
    // Already-present duplicates are left alone when start is past them.
    assert_eq!(stack.optimize(2), 0);
    assert!(!stack.get(1).unwrap().is_pointer());
}

#[test]
fn test_describe_reports_pointers_and_mounts() {
    let child = Router::with_config(RouterConfig::default());
    let parent = Router::with_config(RouterConfig::default());
    parent.mount("/api", &child).unwrap();
    parent
        .get("/h", |_req: &Request, _res: &Response, _next: Next| Ok(()))
        .unwrap()
        .head("/h", |_req: &Request, _res: &Response, _next: Next| Ok(()))
        .unwrap();

    let info = parent.dump_stack();
    assert_eq!(info.len(), 3);
    assert_eq!(info[0].kind, "router");
    assert_eq!(info[0].mount.as_deref(), Some("/api"));
    assert_eq!(info[1].method.as_deref(), Some("GET"));
    assert_eq!(info[2].pointer_to, Some(info[1].id));
    assert!(info[2].to_string().contains("-> #"));
}

#[test]
fn test_contains_router_is_transitive() {
    let grandchild = Router::with_config(RouterConfig::default());
    let child = Router::with_config(RouterConfig::default());
    let parent = Router::with_config(RouterConfig::default());
    child.mount("/c", &grandchild).unwrap();
    parent.mount("/p", &child).unwrap();

    assert!(parent.stack().contains_router(&child));
    assert!(parent.stack().contains_router(&grandchild));
    assert!(!child.stack().contains_router(&parent));
}
