mod executor;
mod files;
mod testing;

pub use executor::{ExecutionResult, run_files};
pub use files::{
    FileDescriptor, MAX_FILE_BYTES, MAX_FILE_COUNT, RawFile, clean_relative_path, resanitize,
    sanitize_files,
};
pub use testing::{Comparison, TestCase, TestCaseResult, output_matches, run_test_cases};

use thiserror::Error;

/// Errors produced by the execution sandbox.
///
/// A student program that crashes, exits nonzero, or hits the time limit is
/// NOT an error: that outcome is reported inside [`ExecutionResult`] so the
/// caller can grade it. `Err` is reserved for rejected input and for failures
/// of the sandbox itself.
#[derive(Debug, Error)]
pub enum CodingError {
    /// The submitted manifest, entrypoint, or test definition is unusable.
    #[error("{0}")]
    InvalidInput(String),

    /// The sandbox infrastructure failed (temp directory, file write, spawn).
    #[error("Sandbox failure: {0}")]
    Sandbox(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CodingError>;
