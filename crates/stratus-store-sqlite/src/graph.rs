//! [`GraphStore`] implementation: append-only nodes, versioned attributes,
//! bi-temporal edges and claims, and contradiction rows.
//!
//! The evidence-binding and node-immutability invariants live here. A FACT
//! insert binds its evidence inside the same transaction and fails the whole
//! transaction when the binding set is empty; promotion re-checks at the
//! moment of the status flip.

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use stratus_core::{
  error::InvariantViolation,
  graph::{
    Claim, ClaimStatus, Contradiction, ContradictionStatus, Direction, Edge,
    EdgeStatus, GraphSubset, GraphView, NewClaim, NewEdge, Node, NodeVersion,
  },
  store::GraphStore,
};
use uuid::Uuid;

use crate::{
  encode::{
    decode_uuid, encode_claim_status, encode_contradiction_status,
    encode_dt, encode_edge_status, encode_json, encode_opt_dt, encode_uuid,
    RawClaim, RawContradiction, RawEdge, RawNode, RawNodeVersion,
  },
  Error, Result, SqliteStore,
};

type CoreResult<T> = std::result::Result<T, stratus_core::Error>;

/// The canonical bi-temporal visibility predicate for edges: event-time
/// window contains the query event time, ingested by the query ingest time,
/// and not superseded by anything ingested by then. Reused verbatim by every
/// audit read; do not fork variations of it.
const EDGE_VISIBLE: &str = "
  (e.event_time_start IS NULL OR e.event_time_start <= :event_time)
  AND (e.event_time_end IS NULL OR e.event_time_end > :event_time)
  AND e.ingested_at <= :ingest_time
  AND e.status != 'RETRACTED'
  AND NOT EXISTS (
    SELECT 1 FROM edge newer
    WHERE newer.supersedes = e.edge_id
      AND newer.ingested_at <= :ingest_time
  )";

/// Claim counterpart of [`EDGE_VISIBLE`].
const CLAIM_VISIBLE: &str = "
  (c.event_time_start IS NULL OR c.event_time_start <= :event_time)
  AND (c.event_time_end IS NULL OR c.event_time_end > :event_time)
  AND c.ingested_at <= :ingest_time
  AND c.status != 'RETRACTED'
  AND NOT EXISTS (
    SELECT 1 FROM claim newer
    WHERE newer.supersedes = c.claim_id
      AND newer.ingested_at <= :ingest_time
  )";

impl GraphStore for SqliteStore {
  type Error = Error;

  // ── Nodes ─────────────────────────────────────────────────────────────────

  async fn upsert_node(
    &self,
    node_type: &str,
    identifier: &str,
  ) -> Result<Node> {
    let ty = node_type.to_owned();
    let ident = identifier.to_owned();
    let id_str = encode_uuid(Uuid::new_v4());
    let at_str = encode_dt(Utc::now());

    let raw: RawNode = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO node (node_id, node_type, identifier, created_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (node_type, identifier) DO NOTHING",
          rusqlite::params![id_str, ty, ident, at_str],
        )?;
        let raw = conn.query_row(
          "SELECT node_id, node_type, identifier, created_at
           FROM node WHERE node_type = ?1 AND identifier = ?2",
          rusqlite::params![ty, ident],
          |row| {
            Ok(RawNode {
              node_id:    row.get(0)?,
              node_type:  row.get(1)?,
              identifier: row.get(2)?,
              created_at: row.get(3)?,
            })
          },
        )?;
        Ok(raw)
      })
      .await?;

    raw.into_node()
  }

  async fn get_node(
    &self,
    node_type: &str,
    identifier: &str,
  ) -> Result<Option<Node>> {
    let ty = node_type.to_owned();
    let ident = identifier.to_owned();

    let raw: Option<RawNode> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT node_id, node_type, identifier, created_at
               FROM node WHERE node_type = ?1 AND identifier = ?2",
              rusqlite::params![ty, ident],
              |row| {
                Ok(RawNode {
                  node_id:    row.get(0)?,
                  node_type:  row.get(1)?,
                  identifier: row.get(2)?,
                  created_at: row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawNode::into_node).transpose()
  }

  async fn new_node_version(
    &self,
    node_id: Uuid,
    attrs: serde_json::Value,
  ) -> Result<NodeVersion> {
    let node_str = encode_uuid(node_id);
    let version_str = encode_uuid(Uuid::new_v4());
    let attrs_str = encode_json(&attrs);
    let now_str = encode_dt(Utc::now());

    let out: CoreResult<RawNodeVersion> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists: bool = tx
          .query_row(
            "SELECT 1 FROM node WHERE node_id = ?1",
            rusqlite::params![node_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(Err(stratus_core::Error::NodeNotFound(
            Uuid::parse_str(&node_str).unwrap_or_default(),
          )));
        }

        // Close the current version's window and chain from it.
        let previous: Option<String> = tx
          .query_row(
            "SELECT version_id FROM node_version
             WHERE node_id = ?1 AND valid_to IS NULL",
            rusqlite::params![node_str],
            |row| row.get(0),
          )
          .optional()?;

        if previous.is_some() {
          tx.execute(
            "UPDATE node_version SET valid_to = ?1
             WHERE node_id = ?2 AND valid_to IS NULL",
            rusqlite::params![now_str, node_str],
          )?;
        }

        tx.execute(
          "INSERT INTO node_version
             (version_id, node_id, attrs, valid_from, valid_to, supersedes,
              created_at)
           VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?4)",
          rusqlite::params![version_str, node_str, attrs_str, now_str, previous],
        )?;

        let raw = tx.query_row(
          "SELECT version_id, node_id, attrs, valid_from, valid_to,
                  supersedes, created_at
           FROM node_version WHERE version_id = ?1",
          rusqlite::params![version_str],
          |row| {
            Ok(RawNodeVersion {
              version_id: row.get(0)?,
              node_id:    row.get(1)?,
              attrs:      row.get(2)?,
              valid_from: row.get(3)?,
              valid_to:   row.get(4)?,
              supersedes: row.get(5)?,
              created_at: row.get(6)?,
            })
          },
        )?;

        tx.commit()?;
        Ok(Ok(raw))
      })
      .await?;

    out.map_err(Error::Core)?.into_version()
  }

  async fn current_node_version(
    &self,
    node_id: Uuid,
  ) -> Result<Option<NodeVersion>> {
    let node_str = encode_uuid(node_id);

    let raw: Option<RawNodeVersion> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT version_id, node_id, attrs, valid_from, valid_to,
                      supersedes, created_at
               FROM node_version
               WHERE node_id = ?1 AND valid_to IS NULL",
              rusqlite::params![node_str],
              |row| {
                Ok(RawNodeVersion {
                  version_id: row.get(0)?,
                  node_id:    row.get(1)?,
                  attrs:      row.get(2)?,
                  valid_from: row.get(3)?,
                  valid_to:   row.get(4)?,
                  supersedes: row.get(5)?,
                  created_at: row.get(6)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawNodeVersion::into_version).transpose()
  }

  // ── Edges ─────────────────────────────────────────────────────────────────

  async fn insert_edge(&self, input: NewEdge) -> Result<Edge> {
    let edge_id = Uuid::new_v4();
    let edge_str = encode_uuid(edge_id);
    let src_str = encode_uuid(input.src);
    let dst_str = encode_uuid(input.dst);
    let edge_type = input.edge_type.clone();
    let attrs_str = encode_json(&input.attrs);
    let status_str = encode_edge_status(input.status).to_owned();
    let supersedes_str = input.supersedes.map(encode_uuid);
    let ets = encode_opt_dt(input.event_time_start);
    let ete = encode_opt_dt(input.event_time_end);
    let ingested_str = encode_dt(Utc::now());
    let vf = encode_opt_dt(input.valid_from);
    let vt = encode_opt_dt(input.valid_to);
    let source_system = input.source_system.clone();
    let confidence = input.confidence;
    let evidence: Vec<String> =
      input.evidence.iter().copied().map(encode_uuid).collect();
    let is_fact = input.status == EdgeStatus::Fact;

    let out: CoreResult<RawEdge> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // FACT with no evidence is rejected before the row ever commits.
        if is_fact && evidence.is_empty() {
          return Ok(Err(
            InvariantViolation::EvidenceBindingRequired {
              row_kind: "edge",
              id:       Uuid::parse_str(&edge_str).unwrap_or_default(),
            }
            .into(),
          ));
        }

        tx.execute(
          "INSERT INTO edge (
             edge_id, src, dst, edge_type, attrs, status, supersedes,
             event_time_start, event_time_end, ingested_at, valid_from,
             valid_to, source_system, confidence
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                     ?13, ?14)",
          rusqlite::params![
            edge_str,
            src_str,
            dst_str,
            edge_type,
            attrs_str,
            status_str,
            supersedes_str,
            ets,
            ete,
            ingested_str,
            vf,
            vt,
            source_system,
            confidence,
          ],
        )?;

        for evidence_id in &evidence {
          tx.execute(
            "INSERT INTO edge_evidence (edge_id, evidence_id)
             VALUES (?1, ?2)
             ON CONFLICT (edge_id, evidence_id) DO NOTHING",
            rusqlite::params![edge_str, evidence_id],
          )?;
        }

        let raw = tx.query_row(
          &format!("SELECT {} FROM edge e WHERE edge_id = ?1", RawEdge::COLUMNS),
          rusqlite::params![edge_str],
          RawEdge::from_row,
        )?;

        tx.commit()?;
        Ok(Ok(raw))
      })
      .await?;

    out.map_err(Error::Core)?.into_edge()
  }

  async fn bind_edge_evidence(
    &self,
    edge_id: Uuid,
    evidence_id: Uuid,
  ) -> Result<()> {
    let edge_str = encode_uuid(edge_id);
    let evidence_str = encode_uuid(evidence_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO edge_evidence (edge_id, evidence_id)
           VALUES (?1, ?2)
           ON CONFLICT (edge_id, evidence_id) DO NOTHING",
          rusqlite::params![edge_str, evidence_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn promote_edge(&self, edge_id: Uuid) -> Result<Edge> {
    let edge_str = encode_uuid(edge_id);

    let out: CoreResult<RawEdge> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let id = Uuid::parse_str(&edge_str).unwrap_or_default();

        let exists: bool = tx
          .query_row(
            "SELECT 1 FROM edge WHERE edge_id = ?1",
            rusqlite::params![edge_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(Err(stratus_core::Error::EdgeNotFound(id)));
        }

        let bindings: i64 = tx.query_row(
          "SELECT COUNT(*) FROM edge_evidence WHERE edge_id = ?1",
          rusqlite::params![edge_str],
          |row| row.get(0),
        )?;
        if bindings == 0 {
          return Ok(Err(
            InvariantViolation::EvidenceBindingRequired {
              row_kind: "edge",
              id,
            }
            .into(),
          ));
        }

        tx.execute(
          "UPDATE edge SET status = 'FACT' WHERE edge_id = ?1",
          rusqlite::params![edge_str],
        )?;

        let raw = tx.query_row(
          &format!("SELECT {} FROM edge e WHERE edge_id = ?1", RawEdge::COLUMNS),
          rusqlite::params![edge_str],
          RawEdge::from_row,
        )?;

        tx.commit()?;
        Ok(Ok(raw))
      })
      .await?;

    out.map_err(Error::Core)?.into_edge()
  }

  async fn retract_edge(&self, edge_id: Uuid) -> Result<()> {
    let edge_str = encode_uuid(edge_id);

    let out: CoreResult<()> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE edge SET status = 'RETRACTED' WHERE edge_id = ?1",
          rusqlite::params![edge_str],
        )?;
        if changed == 0 {
          return Ok(Err(stratus_core::Error::EdgeNotFound(
            Uuid::parse_str(&edge_str).unwrap_or_default(),
          )));
        }
        Ok(Ok(()))
      })
      .await?;

    out.map_err(Error::Core)
  }

  async fn edge_evidence(&self, edge_id: Uuid) -> Result<Vec<Uuid>> {
    let edge_str = encode_uuid(edge_id);

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT evidence_id FROM edge_evidence WHERE edge_id = ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![edge_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  // ── Claims ────────────────────────────────────────────────────────────────

  async fn insert_claim(&self, input: NewClaim) -> Result<Claim> {
    let claim_id = Uuid::new_v4();
    let claim_str = encode_uuid(claim_id);
    let subject_str = encode_uuid(input.subject_node_id);
    let text = input.text.clone();
    let status_str = encode_claim_status(input.status).to_owned();
    let confidence = input.confidence;
    let supersedes_str = input.supersedes.map(encode_uuid);
    let ets = encode_opt_dt(input.event_time_start);
    let ete = encode_opt_dt(input.event_time_end);
    let ingested_str = encode_dt(Utc::now());
    let evidence: Vec<String> =
      input.evidence.iter().copied().map(encode_uuid).collect();
    let is_fact = input.status == ClaimStatus::Fact;

    let out: CoreResult<RawClaim> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if is_fact && evidence.is_empty() {
          return Ok(Err(
            InvariantViolation::EvidenceBindingRequired {
              row_kind: "claim",
              id:       Uuid::parse_str(&claim_str).unwrap_or_default(),
            }
            .into(),
          ));
        }

        tx.execute(
          "INSERT INTO claim (
             claim_id, subject_node_id, text, status, confidence,
             supersedes, event_time_start, event_time_end, ingested_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            claim_str,
            subject_str,
            text,
            status_str,
            confidence,
            supersedes_str,
            ets,
            ete,
            ingested_str,
          ],
        )?;

        for evidence_id in &evidence {
          tx.execute(
            "INSERT INTO claim_evidence (claim_id, evidence_id)
             VALUES (?1, ?2)
             ON CONFLICT (claim_id, evidence_id) DO NOTHING",
            rusqlite::params![claim_str, evidence_id],
          )?;
        }

        let raw = tx.query_row(
          &format!(
            "SELECT {} FROM claim c WHERE claim_id = ?1",
            RawClaim::COLUMNS
          ),
          rusqlite::params![claim_str],
          RawClaim::from_row,
        )?;

        tx.commit()?;
        Ok(Ok(raw))
      })
      .await?;

    out.map_err(Error::Core)?.into_claim()
  }

  async fn bind_claim_evidence(
    &self,
    claim_id: Uuid,
    evidence_id: Uuid,
  ) -> Result<()> {
    let claim_str = encode_uuid(claim_id);
    let evidence_str = encode_uuid(evidence_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO claim_evidence (claim_id, evidence_id)
           VALUES (?1, ?2)
           ON CONFLICT (claim_id, evidence_id) DO NOTHING",
          rusqlite::params![claim_str, evidence_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn promote_claim(&self, claim_id: Uuid) -> Result<Claim> {
    let claim_str = encode_uuid(claim_id);

    let out: CoreResult<RawClaim> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let id = Uuid::parse_str(&claim_str).unwrap_or_default();

        let exists: bool = tx
          .query_row(
            "SELECT 1 FROM claim WHERE claim_id = ?1",
            rusqlite::params![claim_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(Err(stratus_core::Error::ClaimNotFound(id)));
        }

        let bindings: i64 = tx.query_row(
          "SELECT COUNT(*) FROM claim_evidence WHERE claim_id = ?1",
          rusqlite::params![claim_str],
          |row| row.get(0),
        )?;
        if bindings == 0 {
          return Ok(Err(
            InvariantViolation::EvidenceBindingRequired {
              row_kind: "claim",
              id,
            }
            .into(),
          ));
        }

        tx.execute(
          "UPDATE claim SET status = 'FACT' WHERE claim_id = ?1",
          rusqlite::params![claim_str],
        )?;

        let raw = tx.query_row(
          &format!(
            "SELECT {} FROM claim c WHERE claim_id = ?1",
            RawClaim::COLUMNS
          ),
          rusqlite::params![claim_str],
          RawClaim::from_row,
        )?;

        tx.commit()?;
        Ok(Ok(raw))
      })
      .await?;

    out.map_err(Error::Core)?.into_claim()
  }

  async fn supersede_claim(
    &self,
    old_claim_id: Uuid,
    mut replacement: NewClaim,
  ) -> Result<Claim> {
    let old_str = encode_uuid(old_claim_id);

    let already: Option<bool> = self
      .conn
      .call(move |conn| {
        let exists: bool = conn
          .query_row(
            "SELECT 1 FROM claim WHERE claim_id = ?1",
            rusqlite::params![old_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(None);
        }
        let superseded: bool = conn
          .query_row(
            "SELECT 1 FROM claim WHERE supersedes = ?1",
            rusqlite::params![old_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        Ok(Some(superseded))
      })
      .await?;

    match already {
      None => {
        return Err(Error::Core(stratus_core::Error::ClaimNotFound(
          old_claim_id,
        )))
      }
      Some(true) => {
        return Err(Error::Core(stratus_core::Error::AlreadySuperseded(
          old_claim_id,
        )))
      }
      Some(false) => {}
    }

    replacement.supersedes = Some(old_claim_id);
    self.insert_claim(replacement).await
  }

  async fn claim_evidence(&self, claim_id: Uuid) -> Result<Vec<Uuid>> {
    let claim_str = encode_uuid(claim_id);

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT evidence_id FROM claim_evidence WHERE claim_id = ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![claim_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  async fn claims_for_subject(
    &self,
    subject_node_id: Uuid,
  ) -> Result<Vec<Claim>> {
    let subject_str = encode_uuid(subject_node_id);

    let raws: Vec<RawClaim> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM claim c WHERE subject_node_id = ?1
           ORDER BY ingested_at",
          RawClaim::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![subject_str], RawClaim::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawClaim::into_claim).collect()
  }

  // ── Contradictions ────────────────────────────────────────────────────────

  async fn insert_contradiction(
    &self,
    left_ref: Uuid,
    right_ref: Uuid,
    kind: &str,
    explanation: &str,
  ) -> Result<Contradiction> {
    let id_str = encode_uuid(Uuid::new_v4());
    let left_str = encode_uuid(left_ref);
    let right_str = encode_uuid(right_ref);
    let kind = kind.to_owned();
    let explanation = explanation.to_owned();
    let at_str = encode_dt(Utc::now());

    let raw: RawContradiction = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO contradiction (
             contradiction_id, left_ref, right_ref, kind, explanation,
             detected_at, status
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'OPEN')",
          rusqlite::params![id_str, left_str, right_str, kind, explanation, at_str],
        )?;
        let raw = conn.query_row(
          "SELECT contradiction_id, left_ref, right_ref, kind, explanation,
                  detected_at, status, resolved_by_claim
           FROM contradiction WHERE contradiction_id = ?1",
          rusqlite::params![id_str],
          |row| {
            Ok(RawContradiction {
              contradiction_id:  row.get(0)?,
              left_ref:          row.get(1)?,
              right_ref:         row.get(2)?,
              kind:              row.get(3)?,
              explanation:       row.get(4)?,
              detected_at:       row.get(5)?,
              status:            row.get(6)?,
              resolved_by_claim: row.get(7)?,
            })
          },
        )?;
        Ok(raw)
      })
      .await?;

    raw.into_contradiction()
  }

  async fn contradictions_involving(
    &self,
    refs: &[Uuid],
  ) -> Result<Vec<Contradiction>> {
    if refs.is_empty() {
      return Ok(Vec::new());
    }
    let ref_strs: Vec<String> = refs.iter().copied().map(encode_uuid).collect();

    let raws: Vec<RawContradiction> = self
      .conn
      .call(move |conn| {
        let placeholders = vec!["?"; ref_strs.len()].join(", ");
        let sql = format!(
          "SELECT contradiction_id, left_ref, right_ref, kind, explanation,
                  detected_at, status, resolved_by_claim
           FROM contradiction
           WHERE left_ref IN ({placeholders})
              OR right_ref IN ({placeholders})
           ORDER BY detected_at"
        );
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> = ref_strs
          .iter()
          .chain(ref_strs.iter())
          .map(|s| s as &dyn rusqlite::ToSql)
          .collect();
        let rows = stmt
          .query_map(params.as_slice(), |row| {
            Ok(RawContradiction {
              contradiction_id:  row.get(0)?,
              left_ref:          row.get(1)?,
              right_ref:         row.get(2)?,
              kind:              row.get(3)?,
              explanation:       row.get(4)?,
              detected_at:       row.get(5)?,
              status:            row.get(6)?,
              resolved_by_claim: row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawContradiction::into_contradiction)
      .collect()
  }

  async fn resolve_contradiction(
    &self,
    contradiction_id: Uuid,
    status: ContradictionStatus,
    resolved_by_claim: Option<Uuid>,
  ) -> Result<()> {
    let id_str = encode_uuid(contradiction_id);
    let status_str = encode_contradiction_status(status).to_owned();
    let claim_str = resolved_by_claim.map(encode_uuid);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE contradiction
           SET status = ?1, resolved_by_claim = ?2
           WHERE contradiction_id = ?3",
          rusqlite::params![status_str, claim_str, id_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn neighbors(
    &self,
    node_id: Uuid,
    edge_type: Option<&str>,
    direction: Direction,
  ) -> Result<Vec<Edge>> {
    let node_str = encode_uuid(node_id);
    let type_filter = edge_type.map(str::to_owned);
    let now_str = encode_dt(Utc::now());

    let raws: Vec<RawEdge> = self
      .conn
      .call(move |conn| {
        let direction_clause = match direction {
          Direction::Out => "e.src = ?1",
          Direction::In => "e.dst = ?1",
          Direction::Both => "(e.src = ?1 OR e.dst = ?1)",
        };
        let sql = format!(
          "SELECT {} FROM edge e
           WHERE {direction_clause}
             AND e.status != 'RETRACTED'
             AND (e.valid_from IS NULL OR e.valid_from <= ?2)
             AND (e.valid_to IS NULL OR e.valid_to > ?2)
             {}
           ORDER BY e.ingested_at",
          RawEdge::COLUMNS,
          if type_filter.is_some() { "AND e.edge_type = ?3" } else { "" },
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = if let Some(t) = type_filter {
          stmt
            .query_map(
              rusqlite::params![node_str, now_str, t],
              RawEdge::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          stmt
            .query_map(rusqlite::params![node_str, now_str], RawEdge::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEdge::into_edge).collect()
  }

  async fn traverse(
    &self,
    root: Uuid,
    edge_types: &[String],
    max_depth: u32,
  ) -> Result<GraphSubset> {
    let root_str = encode_uuid(root);
    let types = edge_types.to_vec();

    let (raw_nodes, raw_edges): (Vec<RawNode>, Vec<RawEdge>) = self
      .conn
      .call(move |conn| {
        let mut visited: std::collections::HashSet<String> =
          std::collections::HashSet::new();
        let mut frontier = vec![root_str.clone()];
        visited.insert(root_str);

        let mut edges: Vec<RawEdge> = Vec::new();
        let mut seen_edges: std::collections::HashSet<String> =
          std::collections::HashSet::new();

        let placeholders = vec!["?"; types.len()].join(", ");
        let sql = format!(
          "SELECT {} FROM edge e
           WHERE e.src = ?1 AND e.status != 'RETRACTED'
             AND e.edge_type IN ({placeholders})",
          RawEdge::COLUMNS
        );

        for _ in 0..max_depth {
          if frontier.is_empty() {
            break;
          }
          let mut next = Vec::new();
          for node in frontier.drain(..) {
            let mut stmt = conn.prepare(&sql)?;
            let mut params: Vec<&dyn rusqlite::ToSql> = vec![&node];
            for t in &types {
              params.push(t);
            }
            let found = stmt
              .query_map(params.as_slice(), RawEdge::from_row)?
              .collect::<rusqlite::Result<Vec<_>>>()?;
            for edge in found {
              if !seen_edges.insert(edge.edge_id.clone()) {
                continue;
              }
              if visited.insert(edge.dst.clone()) {
                next.push(edge.dst.clone());
              }
              edges.push(edge);
            }
          }
          frontier = next;
        }

        let mut nodes = Vec::new();
        for node_id in &visited {
          let raw = conn
            .query_row(
              "SELECT node_id, node_type, identifier, created_at
               FROM node WHERE node_id = ?1",
              rusqlite::params![node_id],
              |row| {
                Ok(RawNode {
                  node_id:    row.get(0)?,
                  node_type:  row.get(1)?,
                  identifier: row.get(2)?,
                  created_at: row.get(3)?,
                })
              },
            )
            .optional()?;
          if let Some(raw) = raw {
            nodes.push(raw);
          }
        }

        Ok((nodes, edges))
      })
      .await?;

    Ok(GraphSubset {
      nodes: raw_nodes
        .into_iter()
        .map(RawNode::into_node)
        .collect::<Result<_>>()?,
      edges: raw_edges
        .into_iter()
        .map(RawEdge::into_edge)
        .collect::<Result<_>>()?,
    })
  }

  async fn as_of(
    &self,
    event_time: DateTime<Utc>,
    ingest_time: DateTime<Utc>,
  ) -> Result<GraphView> {
    let event_str = encode_dt(event_time);
    let ingest_str = encode_dt(ingest_time);

    let (raw_edges, raw_claims): (Vec<RawEdge>, Vec<RawClaim>) = self
      .conn
      .call(move |conn| {
        let edge_sql = format!(
          "SELECT {} FROM edge e WHERE {EDGE_VISIBLE} ORDER BY e.ingested_at",
          RawEdge::COLUMNS
        );
        let mut stmt = conn.prepare(&edge_sql)?;
        let edges = stmt
          .query_map(
            rusqlite::named_params! {
              ":event_time": event_str,
              ":ingest_time": ingest_str,
            },
            RawEdge::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let claim_sql = format!(
          "SELECT {} FROM claim c WHERE {CLAIM_VISIBLE} ORDER BY c.ingested_at",
          RawClaim::COLUMNS
        );
        let mut stmt = conn.prepare(&claim_sql)?;
        let claims = stmt
          .query_map(
            rusqlite::named_params! {
              ":event_time": event_str,
              ":ingest_time": ingest_str,
            },
            RawClaim::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((edges, claims))
      })
      .await?;

    Ok(GraphView {
      event_time:  Some(event_time),
      ingest_time: Some(ingest_time),
      edges:       raw_edges
        .into_iter()
        .map(RawEdge::into_edge)
        .collect::<Result<_>>()?,
      claims:      raw_claims
        .into_iter()
        .map(RawClaim::into_claim)
        .collect::<Result<_>>()?,
    })
  }

  async fn purge_airport_subgraph(&self, icao: &str) -> Result<(usize, usize)> {
    let ident = icao.to_owned();

    let counts: (usize, usize) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let root: Option<String> = tx
          .query_row(
            "SELECT node_id FROM node
             WHERE node_type = 'AIRPORT' AND identifier = ?1",
            rusqlite::params![ident],
            |row| row.get(0),
          )
          .optional()?;
        let Some(root) = root else {
          return Ok((0, 0));
        };

        // Everything reachable from the airport, any edge type.
        let mut reachable: std::collections::HashSet<String> =
          std::collections::HashSet::new();
        reachable.insert(root.clone());
        let mut frontier = vec![root.clone()];
        while let Some(node) = frontier.pop() {
          let mut stmt =
            tx.prepare("SELECT dst FROM edge WHERE src = ?1")?;
          let dsts = stmt
            .query_map(rusqlite::params![node], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          for dst in dsts {
            if reachable.insert(dst.clone()) {
              frontier.push(dst);
            }
          }
        }

        let mut edges_deleted = 0usize;
        let mut nodes_deleted = 0usize;
        for node in &reachable {
          tx.execute(
            "DELETE FROM edge_evidence WHERE edge_id IN
               (SELECT edge_id FROM edge WHERE src = ?1 OR dst = ?1)",
            rusqlite::params![node],
          )?;
          edges_deleted += tx.execute(
            "DELETE FROM edge WHERE src = ?1 OR dst = ?1",
            rusqlite::params![node],
          )?;
          tx.execute(
            "DELETE FROM claim_evidence WHERE claim_id IN
               (SELECT claim_id FROM claim WHERE subject_node_id = ?1)",
            rusqlite::params![node],
          )?;
          tx.execute(
            "DELETE FROM claim WHERE subject_node_id = ?1",
            rusqlite::params![node],
          )?;
          tx.execute(
            "DELETE FROM node_version WHERE node_id = ?1",
            rusqlite::params![node],
          )?;
          nodes_deleted += tx.execute(
            "DELETE FROM node WHERE node_id = ?1",
            rusqlite::params![node],
          )?;
        }

        tx.commit()?;
        Ok((edges_deleted, nodes_deleted))
      })
      .await?;

    Ok(counts)
  }
}
