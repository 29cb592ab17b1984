//! # brrtstack
//!
//! **brrtstack** is an ordered, continuation-driven middleware dispatch engine
//! built for the `may` coroutine runtime.
//!
//! ## Overview
//!
//! Handlers are registered against path patterns and appended to a stack in
//! registration order. A request walks that stack front to back; every
//! applicable handler receives a single-use [`Next`] continuation and decides
//! whether (and when) the walk goes on. Handlers may call it synchronously,
//! hand it to another coroutine, or drop it after ending the response.
//!
//! Errors travel through the same stack: once an error is pending only error
//! handlers run, until one of them consumes it. Routers can be mounted inside
//! other routers at a path prefix, and named path parameters can carry hooks
//! that run once per value before the first handler that binds them.
//!
//! ## Architecture
//!
//! - **[`pattern`]** - Express-style path compilation (`/users/:id`) and raw regex patterns
//! - **[`stack`]** - Ordered handler records, the matcher arena and the pointer optimizer
//! - **[`params`]** - Parameter decoding and the param hook registry
//! - **[`router`]** - Registration surface, mounting and the dispatch entry point
//! - **[`dispatcher`]** - The per-request state machine and [`Next`] continuations
//! - **[`server`]** - Request/response handles and the `may_minihttp` adapter
//! - **[`runtime_config`]** - YAML and environment configuration
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`cli`]** - The `brrtstack` binary
//!
//! ## Quick Start
//!
//! ```rust
//! use brrtstack::{HttpError, Next, Request, Response, Router};
//! use http::Method;
//!
//! let app = Router::new();
//! app.get("/boom", |_req: &Request, _res: &Response, _next: Next| {
//!     Err(HttpError::new(418, "short and stout"))
//! })
//! .unwrap();
//! app.use_error(|err: HttpError, _req: &Request, res: &Response, _next: Next| {
//!     res.set_status(err.status());
//!     res.send(err.message());
//!     Ok(())
//! })
//! .unwrap();
//!
//! let res = Response::new();
//! app.handle(&Request::new(Method::GET, "/boom"), &res, None);
//! assert_eq!(res.status(), 418);
//! ```

pub mod cli;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod logging;
pub mod params;
pub mod pattern;
pub mod router;
pub mod runtime_config;
pub mod server;
pub mod stack;

pub use dispatcher::{Next, Phase};
pub use error::{HttpError, MountConflictReason, RouterError};
pub use handler::{Callback, HandlerKind, HandlerResult};
pub use params::ParamValue;
pub use pattern::PathSpec;
pub use router::Router;
pub use runtime_config::RouterConfig;
pub use server::{serve, Request, Response, ServerHandle};
