//! Input/output modules for method bodies
//!
//! This module contains the host loader abstraction, the in-memory and
//! listing-directory hosts, and the batch driver that patches a set of sites.

pub mod loader;

// Re-export commonly used I/O functionality
pub use loader::{
    listing_file_name, patch_all, read_listing, HostError, HostLoader, ListingDirectory,
    MemoryHost,
};
