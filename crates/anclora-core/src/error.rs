//! Error conditions raised by the
//! notification subsystem.
//!
//! Plumbing code (config, data store,
//! CLI) keeps using `anyhow`; these are
//! the conditions callers match on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
  /// The runtime lacks a display
  /// primitive or a background worker
  /// facility.
  #[error(
    "notifications are not supported \
     in this runtime"
  )]
  PermissionUnsupported,

  #[error(
    "notification permission not \
     granted"
  )]
  PermissionDenied,

  /// An operation needed a signed-in
  /// user and there was none.
  #[error("no user signed in")]
  NotSignedIn,

  #[error("network failure: {0}")]
  NetworkFailure(String),

  #[error(
    "background worker registration \
     failed: {0}"
  )]
  RegistrationFailure(String),

  /// A display surface refused the
  /// record.
  #[error(
    "notification surface error: {0}"
  )]
  Surface(String)
}

impl From<reqwest::Error>
  for NotifyError
{
  fn from(err: reqwest::Error) -> Self {
    Self::NetworkFailure(err.to_string())
  }
}
