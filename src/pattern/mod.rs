//! # Pattern Module
//!
//! Compiles registration paths into regex matchers with ordered parameter
//! descriptors.
//!
//! ## Syntax
//!
//! - Paths are `/`-separated segments; the leading `/` is implied.
//! - A `:name` segment captures one run of non-`/` characters.
//! - Any other segment matches literally (regex metacharacters are escaped).
//! - A trailing `/` on the request path is tolerated.
//! - A raw [`regex::Regex`] is accepted verbatim and captures no parameters.
//!
//! Mount points and "all paths" registrations compile with `prefix_only`,
//! which anchors at the start only and stops at a segment boundary:
//!
//! ```rust
//! use brrtstack::pattern::{CompileOptions, PathPattern, PathSpec};
//!
//! let opts = CompileOptions { prefix_only: true, case_sensitive: false };
//! let api = PathPattern::compile(&PathSpec::from("/api"), opts).unwrap();
//! assert_eq!(api.matches("/api/widgets").unwrap().consumed, 4);
//! assert!(api.matches("/apix").is_none());
//! ```
//!
//! Two patterns are structurally equal when their compiled source, flags and
//! parameter names are identical; the stack optimizer relies on this to share
//! one matcher between duplicate registrations.

mod core;

pub use core::{CompileOptions, ParamKey, PathMatch, PathPattern, PathSpec};
