//! # Router Module
//!
//! The registration surface and entry point of brrtstack.
//!
//! A [`Router`] owns an ordered handler stack, a param hook registry and a
//! configuration. Handlers are appended in registration order and that order
//! is their priority: at dispatch the stack is walked front to back and every
//! applicable record runs until one of them stops calling its continuation.
//!
//! ## Example
//!
//! ```rust
//! use brrtstack::{Next, Request, Response, Router};
//! use http::Method;
//!
//! let router = Router::new();
//! router
//!     .use_handler(|_req: &Request, res: &Response, next: Next| {
//!         res.set_header("x-powered-by", "brrtstack");
//!         next.call();
//!         Ok(())
//!     })
//!     .unwrap()
//!     .get("/users/:id", |req: &Request, res: &Response, _next: Next| {
//!         let id = req.param("id").unwrap();
//!         res.send(&format!("user {id}"));
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let res = Response::new();
//! router.handle(&Request::new(Method::GET, "/users/42"), &res, None);
//! assert_eq!(res.snapshot().body_str(), "user 42");
//! ```
//!
//! ## Mounting
//!
//! A router can be mounted inside another at a path prefix. The prefix is
//! stripped before the child matches, so the child's own registrations are
//! relative to its mount point. A router can only be mounted once, and never
//! inside itself.
//!
//! ```rust
//! use brrtstack::{Next, Request, Response, Router};
//!
//! let app = Router::new();
//! let api = app.route("/api").unwrap();
//! api.get("/widgets", |_req: &Request, res: &Response, _next: Next| {
//!     res.send("widgets");
//!     Ok(())
//! })
//! .unwrap();
//! assert!(app.mount("/v2", &api).is_err());
//! ```

mod core;

pub use core::{IntoPathSpecs, Router};
