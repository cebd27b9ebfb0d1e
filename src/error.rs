//! Error type shared by the billing client, its backend adapter and the stores.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
  /// Required identity or endpoint settings are missing or malformed.
  #[error("configuration error: {0}")]
  Config(String),

  /// The HTTP request could not be completed.
  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),

  /// The backend answered with a non-success HTTP status.
  #[error("backend returned HTTP {status}: {message}")]
  Status { status: u16, message: String },

  /// The backend answered `ok: false`.
  #[error("backend rejected request: {0}")]
  Rejected(String),

  /// The response body did not match the expected shape.
  #[error("failed to decode backend response: {0}")]
  Decode(#[from] serde_json::Error),

  /// An operation needed an access token but none is stored.
  #[error("no access token stored; complete a checkout or fetch purchases first")]
  NotSignedIn,

  #[error("storage error: {0}")]
  Storage(String),
}

impl From<rusqlite::Error> for BillingError {
  fn from(e: rusqlite::Error) -> Self {
    BillingError::Storage(e.to_string())
  }
}
