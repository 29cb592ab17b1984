//! # Params Module
//!
//! Path parameter values and the named-parameter hook registry.
//!
//! Values captured by a `:name` segment are percent-decoded when the path is
//! matched. Malformed encodings never fail the request: the value becomes
//! [`ParamValue::Undecodable`] and dispatch carries on.
//!
//! A [`ParamHookRegistry`] maps parameter names to hooks. Before a handler
//! whose pattern captures `:name` runs, the hook registered for `name` runs
//! once per distinct value per request:
//!
//! ```rust,ignore
//! router.param("user_id", |req, _res, next, value| {
//!     let user = load_user(value.as_str())?;
//!     req.insert_data(user);
//!     next.call();
//!     Ok(())
//! })?;
//! ```

mod core;

pub use core::{decode_param, ParamHookRegistry, ParamValue, ParamVec, Params};
