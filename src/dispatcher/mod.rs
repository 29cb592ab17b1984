//! # Dispatcher Module
//!
//! Per-request traversal of a router's handler stack.
//!
//! ## Overview
//!
//! Each call to [`Router::handle`](crate::router::Router::handle) creates a
//! dispatch: a cursor over an immutable snapshot of the stack plus the
//! per-request state (pending error, match cache, fired hooks). The dispatch
//! is an explicit state machine:
//!
//! - **Scanning**: advance the cursor to the next applicable record
//! - **ParamPending**: a param hook for the record is running
//! - **HandlerRunning**: the record's callback is running
//! - **Done**: the end of the stack was reached
//!
//! A record is applicable when its matcher matched the request path, its
//! method filter (if any) equals the request method, and its kind agrees with
//! whether an error is pending: normal handlers run while none is, error
//! handlers only while one is.
//!
//! ## Continuations
//!
//! Every hook and handler receives a [`Next`] token. Invoking it resumes the
//! scan. A token is single-use and bound to the step that issued it: a
//! second or stale invocation does nothing and returns `false`.
//!
//! Tokens may be invoked synchronously before the callback returns, or later
//! from any thread or `may` coroutine:
//!
//! ```rust,ignore
//! router.get("/slow", |req, res, next| {
//!     let (res, next) = (res.clone(), next.clone());
//!     may::go!(move || {
//!         may::coroutine::sleep(std::time::Duration::from_millis(5));
//!         res.set_header("x-slow", "1");
//!         next.call();
//!     });
//!     Ok(())
//! })?;
//! ```
//!
//! Synchronous invocations are trampolined: the callback only records that
//! the dispatch may continue and the loop that invoked it picks the scan back
//! up after it returns, so a long chain of middleware does not grow the stack.
//!
//! ## Error Handling
//!
//! - `next.fail(err)` or returning `Err(err)` makes `err` the pending error
//! - a panic in a hook or handler is caught and becomes a 500 pending error
//! - an error handler consumes the pending error; it stays cleared unless the
//!   handler passes one on
//! - a hook failure skips the record the hook ran for
//!
//! ## Logging Codes
//!
//! | Code | Level | Event |
//! |---|---|---|
//! | D1 | debug | dispatch start |
//! | D2 | debug | record matched |
//! | D3 | debug | param hook invoked |
//! | D4 | debug | handler invoked |
//! | D5 | error | callback panicked |
//! | D6 | warn | continuation ignored |
//! | D7 | info | dispatch complete |

mod core;
#[cfg(test)]
mod tests;

pub(crate) use core::Dispatch;
pub use core::{Next, Phase};
