//! # Error Module
//!
//! Two families of errors flow through brrtstack:
//!
//! - [`RouterError`] is returned by the registration surface (compiling a
//!   pattern, mounting a nested router, registering a param hook).
//! - [`HttpError`] is the *pending error* of a dispatch. Handlers and param
//!   hooks produce it by returning `Err`, by panicking, or by handing it to
//!   their continuation. Once pending it routes scanning to error handlers
//!   until one of them clears or replaces it.

use http::{Method, StatusCode};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Status used for errors that carry no status of their own (plain messages,
/// panics, status codes outside the error range).
pub const DEFAULT_ERROR_STATUS: u16 = 500;

/// Standard reason phrase for `status`, or `"Unknown Error"`.
#[must_use]
pub fn status_reason(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Error")
}

/// Registration-time failure.
///
/// Returned by [`Router`](crate::router::Router) registration methods. A
/// failing registration batch leaves the handler stack untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// A nested router could not be mounted. See [`MountConflictReason`].
    MountConflict {
        /// Path of the attempted mount
        path: String,
        /// Why the mount was refused
        reason: MountConflictReason,
    },
    /// A path pattern could not be compiled.
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// What is wrong with it
        reason: String,
    },
    /// A param hook name is empty or not a word.
    InvalidParamName {
        /// The offending name
        name: String,
    },
    /// The param hook registry is frozen because the router already served a
    /// request.
    RegistryFrozen {
        /// Name of the hook that could not be registered
        name: String,
    },
}

/// Why a [`RouterError::MountConflict`] was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountConflictReason {
    /// The router is already mounted somewhere
    AlreadyMounted,
    /// The same batch mounts the router more than once
    DuplicateInBatch,
    /// The batch names more than one path
    MultiplePaths,
    /// The target is a raw regex rather than a string path
    NotPathQualified,
    /// The router would (transitively) contain itself
    Cycle,
}

impl fmt::Display for MountConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MountConflictReason::AlreadyMounted => {
                "a router can only be mounted in one place"
            }
            MountConflictReason::DuplicateInBatch => "the router appears twice in one batch",
            MountConflictReason::MultiplePaths => "a router can only be mounted at one path",
            MountConflictReason::NotPathQualified => "a string path is required",
            MountConflictReason::Cycle => "the router would contain itself",
        };
        f.write_str(text)
    }
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::MountConflict { path, reason } => {
                write!(f, "Cannot mount router at '{path}': {reason}")
            }
            RouterError::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid path pattern '{pattern}': {reason}")
            }
            RouterError::InvalidParamName { name } => write!(
                f,
                "Invalid param name '{name}': expected one or more word characters"
            ),
            RouterError::RegistryFrozen { name } => write!(
                f,
                "Cannot register param hook '{name}': the router is already serving requests"
            ),
        }
    }
}

impl std::error::Error for RouterError {}

/// An error travelling through the dispatch stack.
///
/// Carries the HTTP status the default end-of-stack policy responds with, the
/// message used as the response body, and optionally the underlying cause.
/// Cloning is cheap: the source is shared.
#[derive(Clone)]
pub struct HttpError {
    status: u16,
    message: String,
    source: Option<Arc<anyhow::Error>>,
}

impl HttpError {
    /// Create an error with an explicit status and message
    #[must_use]
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            source: None,
        }
    }

    /// Create an error with [`DEFAULT_ERROR_STATUS`]
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(DEFAULT_ERROR_STATUS, message)
    }

    /// Synthesize an error from a bare status code, the way a handler calling
    /// `next` with a number is interpreted.
    ///
    /// Codes in `400..=599` keep their status and get the message
    /// `"{METHOD} {path} {reason}"`; anything else becomes a
    /// [`DEFAULT_ERROR_STATUS`] error with the reason `"Unknown Error"`.
    #[must_use]
    pub fn from_status(status: u16, method: &Method, path: &str) -> Self {
        if (400..600).contains(&status) {
            Self::new(status, format!("{method} {path} {}", status_reason(status)))
        } else {
            Self::new(
                DEFAULT_ERROR_STATUS,
                format!("{method} {path} Unknown Error"),
            )
        }
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::internal(format!("Handler panicked: {detail}"))
    }

    /// Attach an underlying cause
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// HTTP status code
    #[inline]
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Message, used as the response body when the error reaches the end of
    /// the stack unhandled
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Underlying cause, if one was attached
    #[must_use]
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.source.as_deref()
    }
}

impl fmt::Debug for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpError")
            .field("status", &self.status)
            .field("message", &self.message)
            .field("source", &self.source.as_ref().map(|s| s.to_string()))
            .finish()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for HttpError {}

impl From<&str> for HttpError {
    fn from(message: &str) -> Self {
        Self::internal(message)
    }
}

impl From<String> for HttpError {
    fn from(message: String) -> Self {
        Self::internal(message)
    }
}

impl From<anyhow::Error> for HttpError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string()).with_source(err)
    }
}
