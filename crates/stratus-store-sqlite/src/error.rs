//! Error type for `stratus-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Domain errors, including the typed invariant violations.
  #[error("core error: {0}")]
  Core(#[from] stratus_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown enum value in column: {0:?}")]
  UnknownEnum(String),

  #[error("invalid content hash: {0:?}")]
  InvalidHash(String),

  #[error("evidence payload i/o error: {0}")]
  Io(#[from] std::io::Error),
}

impl Error {
  /// Whether this error carries one of the three store invariants.
  pub fn is_invariant_violation(&self) -> bool {
    matches!(self, Self::Core(stratus_core::Error::Invariant(_)))
  }
}

impl From<stratus_core::error::InvariantViolation> for Error {
  fn from(v: stratus_core::error::InvariantViolation) -> Self {
    Self::Core(stratus_core::Error::Invariant(v))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
