//! # CLI Module
//!
//! Command-line entry points for the `brrtstack` binary.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Run the demo application behind the HTTP adapter until SIGINT/SIGTERM:
//!
//! ```bash
//! brrtstack serve --addr 127.0.0.1:8080 --config router.yaml
//! ```
//!
//! ### `routes`
//!
//! Print the demo application's handler stack, including the pointer records
//! produced by the optimizer:
//!
//! ```bash
//! brrtstack routes
//! ```
//!
//! Both commands read an optional YAML [`RouterConfig`](crate::runtime_config::RouterConfig)
//! and then apply `BRRTS_*` environment overrides.

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{demo_router, run, run_cli, Cli, Commands};
