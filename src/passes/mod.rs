//! Transformation passes over method graphs.
//!
//! Passes mutate a [`Method`](crate::ir::Method)'s body in place and are
//! expected to re-establish every structural invariant the
//! [verifier](crate::ir::verifier) checks before they return. Like the
//! verifier, a pass instance is reusable across a whole-program sweep: any
//! per-method scratch state is cleared on every exit path.

mod merge_returns;

pub use merge_returns::{MergeReturns, SignatureMismatch};
