//! [`CaseStore`] implementation: cases, actions, traces, missing evidence,
//! policies, playbooks, packets, and webhook registrations.
//!
//! The action-governance invariants are enforced in `insert_action` and
//! `transition_action`: HIGH risk must require approval, and EXECUTING is
//! rejected while approval is required but absent.

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use stratus_core::{
  action::{Action, ActionState, NewAction, Outcome, RiskLevel},
  case::{
    Case, CaseScope, CaseStatus, CaseType, MissingEvidenceRequest,
    NewTraceEvent, TraceEvent,
  },
  error::InvariantViolation,
  playbook::Playbook,
  policy::{Policy, PolicySeed},
  store::{CaseStore, NewMissingEvidence, NewPlaybook},
  webhook::{WebhookDelivery, WebhookEndpoint, WebhookEventType},
};
use uuid::Uuid;

use crate::{
  encode::{
    decode_action_state, encode_case_status, encode_case_type,
    encode_criticality, encode_dt, encode_json, encode_trace_kind,
    encode_uuid, RawAction, RawCase, RawMissing, RawOutcome, RawPlaybook,
    RawPolicy, RawTrace, RawEndpoint,
  },
  Error, Result, SqliteStore,
};

type CoreResult<T> = std::result::Result<T, stratus_core::Error>;

fn case_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCase> {
  Ok(RawCase {
    case_id:     row.get(0)?,
    case_type:   row.get(1)?,
    scope:       row.get(2)?,
    status:      row.get(3)?,
    created_at:  row.get(4)?,
    resolved_at: row.get(5)?,
  })
}

impl CaseStore for SqliteStore {
  type Error = Error;

  // ── Cases ─────────────────────────────────────────────────────────────────

  async fn create_case(
    &self,
    case_type: CaseType,
    scope: CaseScope,
  ) -> Result<Case> {
    let case = Case {
      case_id: Uuid::new_v4(),
      case_type,
      scope,
      status: CaseStatus::Open,
      created_at: Utc::now(),
      resolved_at: None,
    };

    let id_str = encode_uuid(case.case_id);
    let type_str = encode_case_type(case.case_type).to_owned();
    let scope_str = serde_json::to_string(&case.scope)?;
    let status_str = encode_case_status(case.status).to_owned();
    let at_str = encode_dt(case.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO cases (case_id, case_type, scope, status, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, type_str, scope_str, status_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(case)
  }

  async fn get_case(&self, case_id: Uuid) -> Result<Option<Case>> {
    let id_str = encode_uuid(case_id);

    let raw: Option<RawCase> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT case_id, case_type, scope, status, created_at,
                      resolved_at
               FROM cases WHERE case_id = ?1",
              rusqlite::params![id_str],
              case_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCase::into_case).transpose()
  }

  async fn set_case_status(
    &self,
    case_id: Uuid,
    status: CaseStatus,
  ) -> Result<()> {
    let id_str = encode_uuid(case_id);
    let status_str = encode_case_status(status).to_owned();
    let resolved_str =
      (status == CaseStatus::Resolved).then(|| encode_dt(Utc::now()));

    let out: CoreResult<()> = self
      .conn
      .call(move |conn| {
        let id = Uuid::parse_str(&id_str).unwrap_or_default();
        let current: Option<String> = conn
          .query_row(
            "SELECT status FROM cases WHERE case_id = ?1",
            rusqlite::params![id_str],
            |row| row.get(0),
          )
          .optional()?;

        match current.as_deref() {
          None => return Ok(Err(stratus_core::Error::CaseNotFound(id))),
          // Resolved cases are append-only.
          Some("RESOLVED") => {
            return Ok(Err(stratus_core::Error::CaseClosed(id)))
          }
          Some(_) => {}
        }

        conn.execute(
          "UPDATE cases SET status = ?1,
             resolved_at = COALESCE(?2, resolved_at)
           WHERE case_id = ?3",
          rusqlite::params![status_str, resolved_str, id_str],
        )?;
        Ok(Ok(()))
      })
      .await?;

    out.map_err(Error::Core)
  }

  async fn recent_resolved_cases(&self, limit: usize) -> Result<Vec<Case>> {
    let limit = limit as i64;

    let raws: Vec<RawCase> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT case_id, case_type, scope, status, created_at, resolved_at
           FROM cases WHERE status = 'RESOLVED'
           ORDER BY resolved_at DESC LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit], case_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCase::into_case).collect()
  }

  // ── Trace ─────────────────────────────────────────────────────────────────

  async fn record_trace(&self, input: NewTraceEvent) -> Result<TraceEvent> {
    let trace_str = encode_uuid(Uuid::new_v4());
    let case_str = encode_uuid(input.case_id);
    let kind_str = encode_trace_kind(input.kind).to_owned();
    let ref_type = input.ref_type.clone();
    let ref_id_str = input.ref_id.map(encode_uuid);
    let meta_str = encode_json(&input.meta);
    let at_str = encode_dt(Utc::now());

    let raw: RawTrace = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Strictly increasing per-case sequence.
        let seq: i64 = tx.query_row(
          "SELECT COALESCE(MAX(seq), 0) + 1 FROM trace_event
           WHERE case_id = ?1",
          rusqlite::params![case_str],
          |row| row.get(0),
        )?;

        tx.execute(
          "INSERT INTO trace_event
             (trace_id, case_id, seq, kind, ref_type, ref_id, meta,
              created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            trace_str, case_str, seq, kind_str, ref_type, ref_id_str,
            meta_str, at_str,
          ],
        )?;

        let raw = tx.query_row(
          "SELECT trace_id, case_id, seq, kind, ref_type, ref_id, meta,
                  created_at
           FROM trace_event WHERE trace_id = ?1",
          rusqlite::params![trace_str],
          |row| {
            Ok(RawTrace {
              trace_id:   row.get(0)?,
              case_id:    row.get(1)?,
              seq:        row.get(2)?,
              kind:       row.get(3)?,
              ref_type:   row.get(4)?,
              ref_id:     row.get(5)?,
              meta:       row.get(6)?,
              created_at: row.get(7)?,
            })
          },
        )?;

        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.into_trace()
  }

  async fn trace_for_case(&self, case_id: Uuid) -> Result<Vec<TraceEvent>> {
    let case_str = encode_uuid(case_id);

    let raws: Vec<RawTrace> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT trace_id, case_id, seq, kind, ref_type, ref_id, meta,
                  created_at
           FROM trace_event WHERE case_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![case_str], |row| {
            Ok(RawTrace {
              trace_id:   row.get(0)?,
              case_id:    row.get(1)?,
              seq:        row.get(2)?,
              kind:       row.get(3)?,
              ref_type:   row.get(4)?,
              ref_id:     row.get(5)?,
              meta:       row.get(6)?,
              created_at: row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTrace::into_trace).collect()
  }

  // ── Actions ───────────────────────────────────────────────────────────────

  async fn insert_action(&self, input: NewAction) -> Result<Action> {
    let action_id = Uuid::new_v4();

    // Governance invariant: HIGH or worse must require approval.
    if input.risk >= RiskLevel::High && !input.requires_approval {
      return Err(InvariantViolation::ApprovalRequired(action_id).into());
    }

    let action = Action {
      action_id,
      case_id: input.case_id,
      action_type: input.action_type,
      args: input.args,
      risk: input.risk,
      requires_approval: input.requires_approval,
      state: ActionState::Proposed,
      approved_by: None,
      approved_at: None,
      failure_reason: None,
      created_at: Utc::now(),
    };

    let id_str = encode_uuid(action.action_id);
    let case_str = encode_uuid(action.case_id);
    let type_str = action.action_type.as_str().to_owned();
    let args_str = encode_json(&action.args);
    let risk_str = action.risk.as_str().to_owned();
    let requires = action.requires_approval;
    let state_str = action.state.as_str().to_owned();
    let at_str = encode_dt(action.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO action (
             action_id, case_id, action_type, args, risk,
             requires_approval, state, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str, case_str, type_str, args_str, risk_str, requires,
            state_str, at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(action)
  }

  async fn get_action(&self, action_id: Uuid) -> Result<Option<Action>> {
    let id_str = encode_uuid(action_id);

    let raw: Option<RawAction> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM action WHERE action_id = ?1",
                RawAction::COLUMNS
              ),
              rusqlite::params![id_str],
              RawAction::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAction::into_action).transpose()
  }

  async fn actions_for_case(&self, case_id: Uuid) -> Result<Vec<Action>> {
    let case_str = encode_uuid(case_id);

    let raws: Vec<RawAction> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM action WHERE case_id = ?1 ORDER BY created_at",
          RawAction::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![case_str], RawAction::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAction::into_action).collect()
  }

  async fn transition_action(
    &self,
    action_id: Uuid,
    to: ActionState,
    actor: Option<&str>,
    reason: Option<&str>,
  ) -> Result<Action> {
    let id_str = encode_uuid(action_id);
    let actor = actor.map(str::to_owned);
    let reason = reason.map(str::to_owned);
    let now_str = encode_dt(Utc::now());

    let out: CoreResult<RawAction> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let id = Uuid::parse_str(&id_str).unwrap_or_default();

        let row: Option<(String, bool, Option<String>)> = tx
          .query_row(
            "SELECT state, requires_approval, approved_at
             FROM action WHERE action_id = ?1",
            rusqlite::params![id_str],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
          )
          .optional()?;

        let Some((state_str, requires_approval, approved_at)) = row else {
          return Ok(Err(stratus_core::Error::ActionNotFound(id)));
        };
        let from = match decode_action_state(&state_str) {
          Ok(s) => s,
          Err(_) => return Ok(Err(stratus_core::Error::ActionNotFound(id))),
        };

        // Idempotent re-delivery: re-applying the current state is a no-op.
        if from == to {
          let raw = tx.query_row(
            &format!(
              "SELECT {} FROM action WHERE action_id = ?1",
              RawAction::COLUMNS
            ),
            rusqlite::params![id_str],
            RawAction::from_row,
          )?;
          tx.commit()?;
          return Ok(Ok(raw));
        }

        if !from.can_transition_to(to) {
          return Ok(Err(stratus_core::Error::IllegalTransition {
            action: id,
            from,
            to,
          }));
        }

        // Governance invariant: no execution before approval.
        if to == ActionState::Executing
          && requires_approval
          && approved_at.is_none()
        {
          return Ok(Err(
            InvariantViolation::UnapprovedExecution(id).into(),
          ));
        }

        match to {
          ActionState::Approved => {
            tx.execute(
              "UPDATE action
               SET state = ?1, approved_by = ?2, approved_at = ?3
               WHERE action_id = ?4",
              rusqlite::params![
                to.as_str(),
                actor.as_deref().unwrap_or("SYSTEM"),
                now_str,
                id_str,
              ],
            )?;
          }
          ActionState::Failed => {
            tx.execute(
              "UPDATE action SET state = ?1, failure_reason = ?2
               WHERE action_id = ?3",
              rusqlite::params![to.as_str(), reason, id_str],
            )?;
          }
          _ => {
            tx.execute(
              "UPDATE action SET state = ?1 WHERE action_id = ?2",
              rusqlite::params![to.as_str(), id_str],
            )?;
          }
        }

        let raw = tx.query_row(
          &format!(
            "SELECT {} FROM action WHERE action_id = ?1",
            RawAction::COLUMNS
          ),
          rusqlite::params![id_str],
          RawAction::from_row,
        )?;

        tx.commit()?;
        Ok(Ok(raw))
      })
      .await?;

    out.map_err(Error::Core)?.into_action()
  }

  async fn record_outcome(
    &self,
    action_id: Uuid,
    success: bool,
    payload: serde_json::Value,
  ) -> Result<Outcome> {
    let outcome = Outcome {
      outcome_id: Uuid::new_v4(),
      action_id,
      success,
      payload,
      recorded_at: Utc::now(),
    };

    let id_str = encode_uuid(outcome.outcome_id);
    let action_str = encode_uuid(action_id);
    let payload_str = encode_json(&outcome.payload);
    let at_str = encode_dt(outcome.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO outcome
             (outcome_id, action_id, success, payload, recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, action_str, success, payload_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(outcome)
  }

  async fn outcomes_for_case(&self, case_id: Uuid) -> Result<Vec<Outcome>> {
    let case_str = encode_uuid(case_id);

    let raws: Vec<RawOutcome> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT o.outcome_id, o.action_id, o.success, o.payload,
                  o.recorded_at
           FROM outcome o
           JOIN action a ON a.action_id = o.action_id
           WHERE a.case_id = ?1
           ORDER BY o.recorded_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![case_str], |row| {
            Ok(RawOutcome {
              outcome_id:  row.get(0)?,
              action_id:   row.get(1)?,
              success:     row.get(2)?,
              payload:     row.get(3)?,
              recorded_at: row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawOutcome::into_outcome).collect()
  }

  // ── Missing evidence ──────────────────────────────────────────────────────

  async fn record_missing_evidence(
    &self,
    input: NewMissingEvidence,
  ) -> Result<MissingEvidenceRequest> {
    let request = MissingEvidenceRequest {
      request_id: Uuid::new_v4(),
      case_id: input.case_id,
      source_system: input.source_system,
      request_type: input.request_type,
      params: input.params,
      reason: input.reason,
      criticality: input.criticality,
      created_at: Utc::now(),
      resolved_by_evidence: None,
    };

    let id_str = encode_uuid(request.request_id);
    let case_str = encode_uuid(request.case_id);
    let source = request.source_system.clone();
    let request_type = request.request_type.clone();
    let params_str = encode_json(&request.params);
    let reason = request.reason.clone();
    let criticality_str = encode_criticality(request.criticality).to_owned();
    let at_str = encode_dt(request.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO missing_evidence_request (
             request_id, case_id, source_system, request_type, params,
             reason, criticality, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str, case_str, source, request_type, params_str, reason,
            criticality_str, at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(request)
  }

  async fn resolve_missing_evidence(
    &self,
    request_id: Uuid,
    evidence_id: Uuid,
  ) -> Result<()> {
    let request_str = encode_uuid(request_id);
    let evidence_str = encode_uuid(evidence_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE missing_evidence_request
           SET resolved_by_evidence = ?1
           WHERE request_id = ?2 AND resolved_by_evidence IS NULL",
          rusqlite::params![evidence_str, request_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn missing_for_case(
    &self,
    case_id: Uuid,
    open_only: bool,
  ) -> Result<Vec<MissingEvidenceRequest>> {
    let case_str = encode_uuid(case_id);

    let raws: Vec<RawMissing> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT request_id, case_id, source_system, request_type, params,
                  reason, criticality, created_at, resolved_by_evidence
           FROM missing_evidence_request
           WHERE case_id = ?1 {}
           ORDER BY created_at",
          if open_only { "AND resolved_by_evidence IS NULL" } else { "" }
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![case_str], |row| {
            Ok(RawMissing {
              request_id:           row.get(0)?,
              case_id:              row.get(1)?,
              source_system:        row.get(2)?,
              request_type:         row.get(3)?,
              params:               row.get(4)?,
              reason:               row.get(5)?,
              criticality:          row.get(6)?,
              created_at:           row.get(7)?,
              resolved_by_evidence: row.get(8)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMissing::into_request).collect()
  }

  // ── Policies ──────────────────────────────────────────────────────────────

  async fn seed_policies(&self, seeds: &[PolicySeed]) -> Result<usize> {
    let rows: Vec<(String, String, String, String, String)> = seeds
      .iter()
      .map(|seed| {
        (
          encode_uuid(Uuid::new_v4()),
          seed.policy_type.to_owned(),
          seed.text.to_owned(),
          seed.conditions.to_string(),
          seed.effects.to_string(),
        )
      })
      .collect();
    let now_str = encode_dt(Utc::now());

    let inserted: usize = self
      .conn
      .call(move |conn| {
        let mut count = 0usize;
        for (id, policy_type, text, conditions, effects) in &rows {
          // Keyed by the unique policy text; existing rows win.
          count += conn.execute(
            "INSERT INTO policy
               (policy_id, policy_type, text, conditions, effects,
                effective_from)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (text) DO NOTHING",
            rusqlite::params![id, policy_type, text, conditions, effects, now_str],
          )?;
        }
        Ok(count)
      })
      .await?;

    Ok(inserted)
  }

  async fn active_policies(&self, at: DateTime<Utc>) -> Result<Vec<Policy>> {
    let at_str = encode_dt(at);

    let raws: Vec<RawPolicy> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT policy_id, policy_type, text, conditions, effects,
                  effective_from, effective_to
           FROM policy
           WHERE effective_from <= ?1
             AND (effective_to IS NULL OR effective_to > ?1)
           ORDER BY text",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![at_str], |row| {
            Ok(RawPolicy {
              policy_id:      row.get(0)?,
              policy_type:    row.get(1)?,
              text:           row.get(2)?,
              conditions:     row.get(3)?,
              effects:        row.get(4)?,
              effective_from: row.get(5)?,
              effective_to:   row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPolicy::into_policy).collect()
  }

  // ── Playbooks ─────────────────────────────────────────────────────────────

  async fn insert_playbook(&self, input: NewPlaybook) -> Result<Playbook> {
    let id_str = encode_uuid(Uuid::new_v4());
    let name = input.name.clone();
    let pattern_str = encode_json(&input.pattern);
    let template_str = encode_json(&input.action_template);
    let snapshot_str = serde_json::to_string(&input.policy_snapshot)?;
    let domain_str = input.domain.as_str().to_owned();
    let at_str = encode_dt(Utc::now());

    let raw: RawPlaybook = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO playbook (
             playbook_id, name, pattern, action_template, policy_snapshot,
             domain, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str, name, pattern_str, template_str, snapshot_str,
            domain_str, at_str,
          ],
        )?;
        let raw = conn.query_row(
          "SELECT playbook_id, name, pattern, action_template, use_count,
                  success_count, policy_snapshot, domain, created_at,
                  last_used_at
           FROM playbook WHERE playbook_id = ?1",
          rusqlite::params![id_str],
          |row| {
            Ok(RawPlaybook {
              playbook_id:     row.get(0)?,
              name:            row.get(1)?,
              pattern:         row.get(2)?,
              action_template: row.get(3)?,
              use_count:       row.get(4)?,
              success_count:   row.get(5)?,
              policy_snapshot: row.get(6)?,
              domain:          row.get(7)?,
              created_at:      row.get(8)?,
              last_used_at:    row.get(9)?,
            })
          },
        )?;
        Ok(raw)
      })
      .await?;

    raw.into_playbook()
  }

  async fn list_playbooks(&self) -> Result<Vec<Playbook>> {
    let raws: Vec<RawPlaybook> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT playbook_id, name, pattern, action_template, use_count,
                  success_count, policy_snapshot, domain, created_at,
                  last_used_at
           FROM playbook ORDER BY created_at DESC",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawPlaybook {
              playbook_id:     row.get(0)?,
              name:            row.get(1)?,
              pattern:         row.get(2)?,
              action_template: row.get(3)?,
              use_count:       row.get(4)?,
              success_count:   row.get(5)?,
              policy_snapshot: row.get(6)?,
              domain:          row.get(7)?,
              created_at:      row.get(8)?,
              last_used_at:    row.get(9)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPlaybook::into_playbook).collect()
  }

  async fn record_playbook_use(
    &self,
    playbook_id: Uuid,
    success: bool,
  ) -> Result<()> {
    let id_str = encode_uuid(playbook_id);
    let now_str = encode_dt(Utc::now());
    let success_bump = i64::from(success);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE playbook
           SET use_count = use_count + 1,
               success_count = success_count + ?1,
               last_used_at = ?2
           WHERE playbook_id = ?3",
          rusqlite::params![success_bump, now_str, id_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn link_playbook_case(
    &self,
    playbook_id: Uuid,
    case_id: Uuid,
  ) -> Result<()> {
    let playbook_str = encode_uuid(playbook_id);
    let case_str = encode_uuid(case_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO playbook_case (playbook_id, case_id)
           VALUES (?1, ?2)
           ON CONFLICT (playbook_id, case_id) DO NOTHING",
          rusqlite::params![playbook_str, case_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Packets ───────────────────────────────────────────────────────────────

  async fn put_packet(
    &self,
    case_id: Uuid,
    packet: serde_json::Value,
  ) -> Result<()> {
    let case_str = encode_uuid(case_id);
    let packet_str = encode_json(&packet);
    let at_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        // Write-once: the first sealed packet for a case wins.
        conn.execute(
          "INSERT INTO decision_packet (case_id, packet, created_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (case_id) DO NOTHING",
          rusqlite::params![case_str, packet_str, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_packet(
    &self,
    case_id: Uuid,
  ) -> Result<Option<serde_json::Value>> {
    let case_str = encode_uuid(case_id);

    let packet: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT packet FROM decision_packet WHERE case_id = ?1",
              rusqlite::params![case_str],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    packet.map(|s| Ok(serde_json::from_str(&s)?)).transpose()
  }

  // ── Webhooks ──────────────────────────────────────────────────────────────

  async fn register_webhook(
    &self,
    name: &str,
    url: &str,
    events: &[WebhookEventType],
  ) -> Result<WebhookEndpoint> {
    let endpoint = WebhookEndpoint {
      webhook_id: Uuid::new_v4(),
      name:       name.to_owned(),
      url:        url.to_owned(),
      events:     events.to_vec(),
      enabled:    true,
      created_at: Utc::now(),
    };

    let id_str = encode_uuid(endpoint.webhook_id);
    let name = endpoint.name.clone();
    let url = endpoint.url.clone();
    let tags: Vec<&str> = events.iter().map(|e| e.as_str()).collect();
    let events_str = serde_json::to_string(&tags)?;
    let at_str = encode_dt(endpoint.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO webhook_endpoint
             (webhook_id, name, url, events, enabled, created_at)
           VALUES (?1, ?2, ?3, ?4, 1, ?5)",
          rusqlite::params![id_str, name, url, events_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(endpoint)
  }

  async fn webhooks_for_event(
    &self,
    event: WebhookEventType,
  ) -> Result<Vec<WebhookEndpoint>> {
    let tag = format!("%\"{}\"%", event.as_str());

    let raws: Vec<RawEndpoint> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT webhook_id, name, url, events, enabled, created_at
           FROM webhook_endpoint
           WHERE enabled = 1 AND events LIKE ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tag], |row| {
            Ok(RawEndpoint {
              webhook_id: row.get(0)?,
              name:       row.get(1)?,
              url:        row.get(2)?,
              events:     row.get(3)?,
              enabled:    row.get(4)?,
              created_at: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEndpoint::into_endpoint).collect()
  }

  async fn log_webhook_delivery(
    &self,
    delivery: WebhookDelivery,
  ) -> Result<()> {
    let id_str = encode_uuid(delivery.delivery_id);
    let webhook_str = encode_uuid(delivery.webhook_id);
    let event_str = delivery.event_type.as_str().to_owned();
    let case_str = delivery.case_id.map(encode_uuid);
    let payload_str = encode_json(&delivery.payload);
    let attempts = i64::from(delivery.attempts);
    let last_status = delivery.last_status.map(i64::from);
    let last_error = delivery.last_error.clone();
    let success = delivery.success;
    let at_str = encode_dt(delivery.delivered_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO webhook_delivery (
             delivery_id, webhook_id, event_type, case_id, payload,
             attempts, last_status, last_error, success, delivered_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            id_str, webhook_str, event_str, case_str, payload_str, attempts,
            last_status, last_error, success, at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
