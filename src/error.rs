//! Error types surfaced by the generation engine and the model client.

use thiserror::Error;

/// Errors callers of `Engine::generate` can receive.
///
/// Shortfalls are not errors; they are reported in the generation summary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
  #[error("content too short: {actual} characters after trimming, at least {min} required")]
  EmptyContent { min: usize, actual: usize },

  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("generation backend failed: {0}")]
  Backend(String),
}

/// Failures talking to the remote model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
  #[error("transport error: {0}")]
  Transport(String),

  #[error("model HTTP {status}: {message}")]
  Status { status: u16, message: String },

  #[error("model call timed out after {0}s")]
  Timeout(u64),

  #[error("malformed model output: {0}")]
  Malformed(String),
}

/// Failures of the question store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
  #[error("question not found: {0}")]
  NotFound(String),

  #[error("storage error: {0}")]
  Storage(String),
}

/// Everything a request handler can fail with.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
  #[error(transparent)]
  Generation(#[from] GenerationError),

  #[error(transparent)]
  Repository(#[from] RepositoryError),
}
