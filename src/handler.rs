//! Callback contracts for everything a router can invoke.
//!
//! The kind of a callback is an explicit tag on the registration
//! ([`HandlerKind`]) rather than something inferred from its signature: a
//! [`Handler`] runs while no error is pending, an [`ErrorHandler`] runs only
//! while one is.
//!
//! Every callback receives a single-use [`Next`] continuation. Invoking it
//! (now, or later from another thread or coroutine) resumes the dispatch
//! loop. Returning `Err` is shorthand for `next.fail(err)`.

use crate::dispatcher::Next;
use crate::error::HttpError;
use crate::params::ParamValue;
use crate::router::Router;
use crate::server::{Request, Response};
use std::fmt;
use std::sync::Arc;

/// Outcome of running a callback synchronously.
pub type HandlerResult = Result<(), HttpError>;

/// Called at the end of a stack instead of the default response policy.
///
/// Receives the pending error, if any. Used by mounted routers to hand control
/// back to their parent.
pub type Terminal = Box<dyn FnOnce(Option<HttpError>) + Send + 'static>;

/// Regular middleware or route handler.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: &Request, res: &Response, next: Next) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&Request, &Response, Next) -> HandlerResult + Send + Sync + 'static,
{
    fn call(&self, req: &Request, res: &Response, next: Next) -> HandlerResult {
        self(req, res, next)
    }
}

/// Error-aware handler; receives (and thereby consumes) the pending error.
pub trait ErrorHandler: Send + Sync + 'static {
    fn call(&self, err: HttpError, req: &Request, res: &Response, next: Next) -> HandlerResult;
}

impl<F> ErrorHandler for F
where
    F: Fn(HttpError, &Request, &Response, Next) -> HandlerResult + Send + Sync + 'static,
{
    fn call(&self, err: HttpError, req: &Request, res: &Response, next: Next) -> HandlerResult {
        self(err, req, res, next)
    }
}

/// Interceptor for a named path parameter.
pub trait ParamHook: Send + Sync + 'static {
    fn call(&self, req: &Request, res: &Response, next: Next, value: &ParamValue) -> HandlerResult;
}

impl<F> ParamHook for F
where
    F: Fn(&Request, &Response, Next, &ParamValue) -> HandlerResult + Send + Sync + 'static,
{
    fn call(&self, req: &Request, res: &Response, next: Next, value: &ParamValue) -> HandlerResult {
        self(req, res, next, value)
    }
}

/// Whether a record applies while no error is pending or while one is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Normal,
    ErrorHandler,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Normal => f.write_str("handler"),
            HandlerKind::ErrorHandler => f.write_str("error"),
        }
    }
}

/// What a stack record invokes.
#[derive(Clone)]
pub enum Callback {
    Handler(Arc<dyn Handler>),
    ErrorHandler(Arc<dyn ErrorHandler>),
    /// A mounted router; always [`HandlerKind::Normal`]
    Mount(Router),
}

impl Callback {
    #[must_use]
    pub fn kind(&self) -> HandlerKind {
        match self {
            Callback::Handler(_) | Callback::Mount(_) => HandlerKind::Normal,
            Callback::ErrorHandler(_) => HandlerKind::ErrorHandler,
        }
    }

    #[must_use]
    pub fn handler(h: impl Handler) -> Self {
        Callback::Handler(Arc::new(h))
    }

    #[must_use]
    pub fn error_handler(h: impl ErrorHandler) -> Self {
        Callback::ErrorHandler(Arc::new(h))
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Handler(_) => f.write_str("Handler"),
            Callback::ErrorHandler(_) => f.write_str("ErrorHandler"),
            Callback::Mount(r) => write!(f, "Mount({})", r.mount_path().unwrap_or_default()),
        }
    }
}
