//! Modification modules for splicing override code into a method body
//!
//! A [`PatchSpec`] describes one call site; the applier searches for it and
//! performs the label-preserving insertion, one spec or a sequence of specs
//! at a time.

pub mod applier;
pub mod spec;

// Re-export commonly used modification functionality
pub use applier::{apply, AppliedPatch, PatchFailure, PatchStage, Patcher};
pub use spec::{InsertionSearch, KeyExpr, OverrideBlock, PatchSpec};
