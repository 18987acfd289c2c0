//! [`EvidenceStore`] implementation: content-addressed payload files plus
//! append-only index rows.
//!
//! Identity is `(source_system, source_ref, content_sha256)`; a duplicate put
//! returns the existing row. Raw bytes land at `<root>/<sha256>.bin` and are
//! never rewritten. Excerpts are PII-redacted before they touch the database.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use rusqlite::OptionalExtension as _;
use sha2::{Digest, Sha256};
use stratus_core::{
  evidence::{EvidenceRecord, NewEvidence},
  store::EvidenceStore,
};
use uuid::Uuid;

use crate::{
  encode::{encode_dt, encode_json, encode_opt_dt, encode_uuid, RawEvidence},
  Error, Result, SqliteStore,
};

pub(crate) const EXCERPT_MAX_LEN: usize = 500;

// ─── Hashing ─────────────────────────────────────────────────────────────────

/// Lowercase hex SHA-256 over the payload bytes.
pub fn content_sha256(payload: &[u8]) -> String {
  hex::encode(Sha256::digest(payload))
}

/// The payload path for a hash. The hash format is validated before any path
/// join so a corrupted column can never escape the store root.
fn payload_path(
  root: &std::path::Path,
  sha256: &str,
) -> Result<std::path::PathBuf> {
  let valid = sha256.len() == 64
    && sha256.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase());
  if !valid {
    return Err(Error::InvalidHash(sha256.to_owned()));
  }
  Ok(root.join(format!("{sha256}.bin")))
}

// ─── Redaction ───────────────────────────────────────────────────────────────

fn pii_patterns() -> &'static [(Regex, &'static str)] {
  static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
  PATTERNS.get_or_init(|| {
    vec![
      // SSN-like digit groups first; the phone pattern would also match.
      (
        Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(),
        "[SSN_REDACTED]",
      ),
      (
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
          .unwrap(),
        "[EMAIL_REDACTED]",
      ),
      (
        Regex::new(r"(?:\(\d{3}\)\s*\d{3}[-.]?\d{4}|\b\d{3}[-.]\d{3}[-.]\d{4}\b)")
          .unwrap(),
        "[PHONE_REDACTED]",
      ),
    ]
  })
}

/// Strip obvious PII (emails, US phone numbers, SSN-like digits).
pub fn redact_pii(text: &str) -> String {
  let mut out = text.to_owned();
  for (pattern, replacement) in pii_patterns() {
    out = pattern.replace_all(&out, *replacement).into_owned();
  }
  out
}

/// Build the redacted excerpt stored alongside the index row.
pub fn extract_excerpt(payload: &[u8]) -> String {
  let text = String::from_utf8_lossy(payload);
  let truncated: String = if text.chars().count() > EXCERPT_MAX_LEN {
    let cut: String = text.chars().take(EXCERPT_MAX_LEN - 3).collect();
    format!("{cut}...")
  } else {
    text.into_owned()
  };
  redact_pii(&truncated)
}

// ─── EvidenceStore impl ──────────────────────────────────────────────────────

impl EvidenceStore for SqliteStore {
  type Error = Error;

  async fn put_evidence(&self, input: NewEvidence) -> Result<EvidenceRecord> {
    let sha256 = content_sha256(&input.payload);
    let path = payload_path(&self.evidence_root, &sha256)?;

    // Write-once: identical content already on disk is left untouched.
    if !path.exists() {
      std::fs::write(&path, &input.payload)?;
    }

    let excerpt = extract_excerpt(&input.payload);
    let row_id = encode_uuid(Uuid::new_v4());
    let source_system = input.source_system.clone();
    let source_ref = input.source_ref.clone();
    let sha_for_insert = sha256.clone();
    let content_type = input.content_type.clone();
    let retrieved_at = encode_dt(Utc::now());
    let event_start = encode_opt_dt(input.event_time_start);
    let event_end = encode_opt_dt(input.event_time_end);
    let meta = encode_json(&input.meta);

    let raw: RawEvidence = self
      .conn
      .call(move |conn| {
        // Idempotent on the identity triple; the reselect below returns
        // whichever row won.
        conn.execute(
          "INSERT INTO evidence (
             evidence_id, source_system, source_ref, content_sha256,
             content_type, retrieved_at, event_time_start, event_time_end,
             excerpt, meta
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
           ON CONFLICT (source_system, source_ref, content_sha256)
           DO NOTHING",
          rusqlite::params![
            row_id,
            source_system,
            source_ref,
            sha_for_insert,
            content_type,
            retrieved_at,
            event_start,
            event_end,
            excerpt,
            meta,
          ],
        )?;

        let raw = conn.query_row(
          "SELECT evidence_id, source_system, source_ref, content_sha256,
                  content_type, retrieved_at, event_time_start,
                  event_time_end, excerpt, meta
           FROM evidence
           WHERE source_system = ?1 AND source_ref = ?2
             AND content_sha256 = ?3",
          rusqlite::params![source_system, source_ref, sha_for_insert],
          |row| {
            Ok(RawEvidence {
              evidence_id:      row.get(0)?,
              source_system:    row.get(1)?,
              source_ref:       row.get(2)?,
              content_sha256:   row.get(3)?,
              content_type:     row.get(4)?,
              retrieved_at:     row.get(5)?,
              event_time_start: row.get(6)?,
              event_time_end:   row.get(7)?,
              excerpt:          row.get(8)?,
              meta:             row.get(9)?,
            })
          },
        )?;
        Ok(raw)
      })
      .await?;

    raw.into_record()
  }

  async fn get_evidence(
    &self,
    evidence_id: Uuid,
  ) -> Result<Option<(EvidenceRecord, Vec<u8>)>> {
    let id_str = encode_uuid(evidence_id);

    let raw: Option<RawEvidence> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT evidence_id, source_system, source_ref,
                      content_sha256, content_type, retrieved_at,
                      event_time_start, event_time_end, excerpt, meta
               FROM evidence WHERE evidence_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawEvidence {
                  evidence_id:      row.get(0)?,
                  source_system:    row.get(1)?,
                  source_ref:       row.get(2)?,
                  content_sha256:   row.get(3)?,
                  content_type:     row.get(4)?,
                  retrieved_at:     row.get(5)?,
                  event_time_start: row.get(6)?,
                  event_time_end:   row.get(7)?,
                  excerpt:          row.get(8)?,
                  meta:             row.get(9)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    let Some(raw) = raw else { return Ok(None) };
    let record = raw.into_record()?;
    let path = payload_path(&self.evidence_root, &record.content_sha256)?;
    let bytes = std::fs::read(path)?;
    Ok(Some((record, bytes)))
  }

  async fn evidence_by_source(
    &self,
    source_system: &str,
    source_ref: Option<&str>,
  ) -> Result<Vec<EvidenceRecord>> {
    let system = source_system.to_owned();
    let reference = source_ref.map(str::to_owned);

    let raws: Vec<RawEvidence> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT evidence_id, source_system, source_ref, content_sha256,
                  content_type, retrieved_at, event_time_start,
                  event_time_end, excerpt, meta
           FROM evidence
           WHERE source_system = ?1 {}
           ORDER BY retrieved_at DESC",
          if reference.is_some() { "AND source_ref = ?2" } else { "" }
        );
        let mut stmt = conn.prepare(&sql)?;
        let map = |row: &rusqlite::Row<'_>| {
          Ok(RawEvidence {
            evidence_id:      row.get(0)?,
            source_system:    row.get(1)?,
            source_ref:       row.get(2)?,
            content_sha256:   row.get(3)?,
            content_type:     row.get(4)?,
            retrieved_at:     row.get(5)?,
            event_time_start: row.get(6)?,
            event_time_end:   row.get(7)?,
            excerpt:          row.get(8)?,
            meta:             row.get(9)?,
          })
        };
        let rows = if let Some(r) = reference {
          stmt
            .query_map(rusqlite::params![system, r], map)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          stmt
            .query_map(rusqlite::params![system], map)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvidence::into_record).collect()
  }
}
