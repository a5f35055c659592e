//! Shared plumbing: result and error types, plus the path helpers every other module leans on.

pub mod error;
pub mod utils;

pub use error::{VfsError, VfsResult};

/// Result type of the container backends and other internal plumbing.
pub type Result<T> = std::result::Result<T, anyhow::Error>;
