//! Error types for reachability analysis

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReachabilityError>;

/// Per-file failures are recoverable: the propagator turns them into
/// `hasUnknownImports` and keeps scanning.
#[derive(Error, Debug)]
pub enum ReachabilityError {
    #[error("Failed to parse {file}: {message}")]
    Parse { file: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file path: {0}")]
    InvalidPath(String),
}
