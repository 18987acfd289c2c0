//! SQLite implementation of the Stratus store traits.
//!
//! One [`SqliteStore`] implements all three traits
//! ([`stratus_core::store::EvidenceStore`],
//! [`stratus_core::store::GraphStore`],
//! [`stratus_core::store::CaseStore`]) over a single database file plus a
//! content-addressed payload directory. The binding invariants are enforced
//! here, inside the write paths, not in callers.

mod cases;
mod encode;
mod error;
mod evidence;
mod graph;
mod schema;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

pub use error::{Error, Result};

/// A Stratus store backed by a single SQLite file and an evidence payload
/// directory.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:          tokio_rusqlite::Connection,
  evidence_root: PathBuf,
}

impl SqliteStore {
  /// Open (or create) a store at `db_path`, keeping raw evidence bytes under
  /// `evidence_root`, and run schema initialisation.
  pub async fn open(
    db_path: impl AsRef<Path>,
    evidence_root: impl Into<PathBuf>,
  ) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(db_path).await?;
    let store = Self { conn, evidence_root: evidence_root.into() };
    store.init().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory(
    evidence_root: impl Into<PathBuf>,
  ) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, evidence_root: evidence_root.into() };
    store.init().await?;
    Ok(store)
  }

  async fn init(&self) -> Result<()> {
    std::fs::create_dir_all(&self.evidence_root)?;
    self
      .conn
      .call(|conn| {
        conn.execute_batch(schema::SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
