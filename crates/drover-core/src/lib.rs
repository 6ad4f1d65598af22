//! drover-core: Shared library for the drover control plane.
//!
//! This crate provides:
//! - Error types shared across the workspace
//! - Logging setup (tracing)
//! - Protocol and editor constants
//! - The insert-only prefix index used for autocomplete
//! - Collaborator traits for the SSH transport layer

pub mod constants;
pub mod error;
pub mod logging;
pub mod ssh;
pub mod trie;

pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat};
pub use trie::Trie;
