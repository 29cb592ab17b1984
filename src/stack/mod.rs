//! # Stack Module
//!
//! The ordered handler stack of a router.
//!
//! Each registration appends one [`HandlerRecord`] per (pattern × callback)
//! with a fresh, strictly increasing [`RecordId`]. Compiled patterns live in a
//! matcher arena indexed by [`MatcherId`]; records refer to their matcher by
//! index.
//!
//! ## Optimizer
//!
//! After every registration batch the newly appended records are compared with
//! the earlier ones. A record whose pattern is structurally equal to an earlier
//! non-pointer record is rewritten into a [`PointerRecord`]: it keeps its own
//! callback, kind and method filter but reuses the earlier record's matcher,
//! and its own arena slot is released. At dispatch a pointer never runs a
//! regex; it reuses the match its canonical record already produced for the
//! request, or is skipped if that record did not match.
//!
//! Stacks are cloned and swapped as a whole when a batch is applied, so a
//! dispatch in flight keeps the snapshot it started with.

mod core;
mod optimize;
#[cfg(test)]
mod tests;

pub use core::{HandlerRecord, HandlerStack, Layer, LayerInfo, MatcherId, PointerRecord, RecordId};
