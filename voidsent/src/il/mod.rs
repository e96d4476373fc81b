//! Method body patching
//!
//! - `core`: instructions, streams, labels and the listing format
//! - `analysis`: pattern matching, cursors and stream validation
//! - `modification`: patch specs and the label-preserving applier
//! - `io`: host loaders
//! - `exec`: a small evaluator for checking patched streams

pub mod analysis;
pub mod core;
pub mod debug;
pub mod error;
pub mod exec;
pub mod io;
pub mod modification;

pub use error::{Direction, PatchError};
