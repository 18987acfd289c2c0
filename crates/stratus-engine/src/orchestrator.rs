//! The orchestration state machine.
//!
//! ```text
//! INIT → INVESTIGATE → QUANTIFY_RISK → CRITIQUE
//!                                        ↓
//!                                  EVALUATE_POLICY
//!                                        ↓
//!                                  PLAN_ACTIONS → (DRAFT_COMMS) → EXECUTE → COMPLETE
//! CRITIQUE ──(insufficient evidence)──→ INVESTIGATE   (bounded retries)
//! ```
//!
//! The handler sequence, retry count, and planning are deterministic
//! functions of the inputs. The only non-deterministic call is the external
//! risk assessor, whose output is captured as a structured record and never
//! drives control flow on its own. Every state change emits a trace event;
//! this is what makes runs replayable.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::{sync::mpsc, task::JoinSet};
use uuid::Uuid;

use stratus_core::{
  case::{Case, CaseStatus, NewTraceEvent, Posture, TraceEventKind},
  evidence::{EvidenceRecord, NewEvidence},
  graph::Contradiction,
  packet::DecisionPacket,
  policy::{BeliefState, PolicyResult, Verdict},
  signal::{RiskAssessor, RiskRecord, SignalKind, SignalSource, SourceError},
  store::{CaseStore, EvidenceStore},
  webhook::WebhookEventType,
};

use crate::{
  comms, contradiction,
  derive::{self, DerivedSignals, IngestedSignal},
  governance::{self, ActionGovernor},
  guardrails::{self, GateOutcome},
  missing, packet,
  planner::{self, PlannedAction},
  playbooks, policy,
  risk::degraded_fallback,
  webhooks::{payloads, WebhookDispatcher},
  DecisionStore, EngineConfig, EngineError, Result,
};

// ─── States ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
  Init,
  Investigate,
  QuantifyRisk,
  Critique,
  EvaluatePolicy,
  PlanActions,
  DraftComms,
  Execute,
  Complete,
}

impl OrchestratorState {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Init => "INIT",
      Self::Investigate => "INVESTIGATE",
      Self::QuantifyRisk => "QUANTIFY_RISK",
      Self::Critique => "CRITIQUE",
      Self::EvaluatePolicy => "EVALUATE_POLICY",
      Self::PlanActions => "PLAN_ACTIONS",
      Self::DraftComms => "DRAFT_COMMS",
      Self::Execute => "EXECUTE",
      Self::Complete => "COMPLETE",
    }
  }
}

// ─── Streaming events ────────────────────────────────────────────────────────

/// Progress events for the SSE run stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
  Started,
  StateTransition {
    to_state:    String,
    handler:     String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    condition:   Option<String>,
  },
  Progress {
    state:             String,
    description:       String,
    evidence_count:    usize,
    claim_count:       usize,
    uncertainty_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    risk_level:          Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recommended_posture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence:          Option<f64>,
  },
  Completed {
    final_state:      String,
    status:           String,
    actions_executed: usize,
    actions_proposed: usize,
  },
  Error {
    error: String,
  },
}

/// Result of one full orchestration run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
  pub packet:       DecisionPacket,
  pub final_status: CaseStatus,
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

pub struct Orchestrator<S, Src, Ra> {
  store:      Arc<S>,
  source:     Arc<Src>,
  assessor:   Arc<Ra>,
  dispatcher: WebhookDispatcher,
  config:     EngineConfig,
  progress:   Option<mpsc::Sender<ProgressEvent>>,
}

/// Mutable run context threaded through the handlers.
struct RunContext {
  case:               Case,
  icao:               String,
  evidence:           Vec<EvidenceRecord>,
  derived:            Option<DerivedSignals>,
  contradictions:     Vec<Contradiction>,
  risk:               Option<RiskRecord>,
  policy:             Option<PolicyResult>,
  planned:            Vec<PlannedAction>,
  first_signal_at:    Option<DateTime<Utc>>,
  investigate_passes: u32,
  prior_posture:      Posture,
}

impl<S, Src, Ra> Orchestrator<S, Src, Ra>
where
  S: DecisionStore + 'static,
  Src: SignalSource + 'static,
  Ra: RiskAssessor,
{
  pub fn new(
    store: Arc<S>,
    source: Arc<Src>,
    assessor: Arc<Ra>,
    config: EngineConfig,
  ) -> Self {
    let dispatcher = WebhookDispatcher::new(config.webhook_timeout_secs);
    Self { store, source, assessor, dispatcher, config, progress: None }
  }

  /// Attach a progress channel for the SSE stream.
  pub fn with_progress(mut self, tx: mpsc::Sender<ProgressEvent>) -> Self {
    self.progress = Some(tx);
    self
  }

  async fn emit(&self, event: ProgressEvent) {
    if let Some(tx) = &self.progress {
      let _ = tx.send(event).await;
    }
  }

  async fn enter_state(
    &self,
    case_id: Uuid,
    state: OrchestratorState,
    context: serde_json::Value,
  ) -> Result<()> {
    let mut meta = json!({"state": state.as_str()});
    if let (Some(meta_map), Some(extra)) =
      (meta.as_object_mut(), context.as_object())
    {
      for (k, v) in extra {
        meta_map.insert(k.clone(), v.clone());
      }
    }
    self
      .store
      .record_trace(NewTraceEvent::new(
        case_id,
        TraceEventKind::StateEnter,
        meta,
      ))
      .await
      .map_err(EngineError::store)?;
    Ok(())
  }

  async fn exit_state(
    &self,
    case_id: Uuid,
    state: OrchestratorState,
    to: OrchestratorState,
    condition: &str,
  ) -> Result<()> {
    self
      .store
      .record_trace(NewTraceEvent::new(
        case_id,
        TraceEventKind::StateExit,
        json!({
          "state": state.as_str(),
          "transition_to": to.as_str(),
          "condition": condition,
        }),
      ))
      .await
      .map_err(EngineError::store)?;
    self
      .emit(ProgressEvent::StateTransition {
        to_state:    to.as_str().to_owned(),
        handler:     to.as_str().to_lowercase(),
        description: state_description(to).to_owned(),
        condition:   Some(condition.to_owned()),
      })
      .await;
    Ok(())
  }

  /// Run the case to COMPLETE (resolved or blocked). Any unexpected error
  /// is recorded in the trace and blocks the case; no partial packet is
  /// emitted on that path.
  pub async fn run(&self, case_id: Uuid) -> Result<RunOutcome> {
    match self.run_inner(case_id).await {
      Ok(outcome) => Ok(outcome),
      Err(error) => {
        let _ = self
          .store
          .record_trace(NewTraceEvent::new(
            case_id,
            TraceEventKind::Blocked,
            json!({"error": error.to_string()}),
          ))
          .await;
        let _ = self.store.set_case_status(case_id, CaseStatus::Blocked).await;
        self
          .emit(ProgressEvent::Error { error: error.to_string() })
          .await;
        Err(error)
      }
    }
  }

  async fn run_inner(&self, case_id: Uuid) -> Result<RunOutcome> {
    let case = self
      .store
      .get_case(case_id)
      .await
      .map_err(EngineError::store)?
      .ok_or(EngineError::CaseNotFound(case_id))?;
    if case.status == CaseStatus::Resolved {
      return Err(EngineError::Internal(format!(
        "case {case_id} is already resolved"
      )));
    }

    let icao = case
      .scope
      .airport
      .clone()
      .or_else(|| {
        case.scope.lane.as_ref().map(|l| {
          l.split('-').next().unwrap_or(l).to_owned()
        })
      })
      .ok_or_else(|| {
        EngineError::Internal("case scope names no airport".into())
      })?;

    self.emit(ProgressEvent::Started).await;
    tracing::info!(case_id = %case_id, airport = %icao, "orchestrator started");

    let mut ctx = RunContext {
      case,
      icao,
      evidence: Vec::new(),
      derived: None,
      contradictions: Vec::new(),
      risk: None,
      policy: None,
      planned: Vec::new(),
      first_signal_at: None,
      investigate_passes: 0,
      prior_posture: Posture::Accept,
    };

    // ── INIT ────────────────────────────────────────────────────────────
    self.enter_state(case_id, OrchestratorState::Init, json!({})).await?;
    missing::resolve_open_requests(
      self.store.as_ref(),
      case_id,
      Some(ctx.icao.as_str()),
    )
    .await?;
    self
      .exit_state(
        case_id,
        OrchestratorState::Init,
        OrchestratorState::Investigate,
        "always",
      )
      .await?;

    // ── INVESTIGATE / QUANTIFY_RISK / CRITIQUE loop ─────────────────────
    loop {
      ctx.investigate_passes += 1;
      if let Some(outcome) = self.investigate(&mut ctx).await? {
        return Ok(outcome);
      }
      self
        .exit_state(
          case_id,
          OrchestratorState::Investigate,
          OrchestratorState::QuantifyRisk,
          "evidence gathered, no blocking gaps",
        )
        .await?;

      self.quantify_risk(&mut ctx).await?;
      self
        .exit_state(
          case_id,
          OrchestratorState::QuantifyRisk,
          OrchestratorState::Critique,
          "risk assessment complete",
        )
        .await?;

      if self.critique(&mut ctx).await? {
        break;
      }
      // The critic demanded another pass; bounded by the retry budget.
      self
        .exit_state(
          case_id,
          OrchestratorState::Critique,
          OrchestratorState::Investigate,
          "insufficient evidence",
        )
        .await?;
    }
    self
      .exit_state(
        case_id,
        OrchestratorState::Critique,
        OrchestratorState::EvaluatePolicy,
        "evidence acceptable",
      )
      .await?;

    // ── EVALUATE_POLICY ─────────────────────────────────────────────────
    if let Some(outcome) = self.evaluate_policy(&mut ctx).await? {
      return Ok(outcome);
    }
    self
      .exit_state(
        case_id,
        OrchestratorState::EvaluatePolicy,
        OrchestratorState::PlanActions,
        "policy verdict permits planning",
      )
      .await?;

    // ── PLAN_ACTIONS ────────────────────────────────────────────────────
    if let Some(outcome) = self.plan_actions(&mut ctx).await? {
      return Ok(outcome);
    }

    // ── DRAFT_COMMS (optional) ──────────────────────────────────────────
    if ctx.planned.iter().any(|a| a.requires_notification) {
      self
        .exit_state(
          case_id,
          OrchestratorState::PlanActions,
          OrchestratorState::DraftComms,
          "plan requires notifications",
        )
        .await?;
      self
        .enter_state(case_id, OrchestratorState::DraftComms, json!({}))
        .await?;
      let risk = ctx.risk.as_ref().ok_or_else(|| {
        EngineError::Internal("risk record missing before DRAFT_COMMS".into())
      })?;
      let belief = self.assemble_belief(&ctx).await?;
      let drafted =
        comms::draft_communications(&belief, risk, &mut ctx.planned);
      self
        .exit_state(
          case_id,
          OrchestratorState::DraftComms,
          OrchestratorState::Execute,
          &format!("{drafted} communication(s) drafted"),
        )
        .await?;
    } else {
      self
        .exit_state(
          case_id,
          OrchestratorState::PlanActions,
          OrchestratorState::Execute,
          "no notifications required",
        )
        .await?;
    }

    // ── EXECUTE ─────────────────────────────────────────────────────────
    self.execute(&mut ctx).await?;
    self
      .exit_state(
        case_id,
        OrchestratorState::Execute,
        OrchestratorState::Complete,
        "all proposed actions driven to a stable state",
      )
      .await?;

    // ── COMPLETE ────────────────────────────────────────────────────────
    self.complete(ctx).await
  }

  // ── INVESTIGATE ───────────────────────────────────────────────────────

  /// Fetch every required source, persist and derive. Returns a final
  /// outcome early when a BLOCKING gap or guardrail failure ends the case.
  async fn investigate(
    &self,
    ctx: &mut RunContext,
  ) -> Result<Option<RunOutcome>> {
    let case_id = ctx.case.case_id;
    self
      .enter_state(
        case_id,
        OrchestratorState::Investigate,
        json!({"pass": ctx.investigate_passes}),
      )
      .await?;

    let fetches = self.fetch_all(&ctx.icao).await;

    let mut ingested = Vec::new();
    for (kind, result) in fetches {
      match result {
        Ok(fetch) => {
          self
            .store
            .record_trace(NewTraceEvent::new(
              case_id,
              TraceEventKind::ToolCall,
              json!({"tool": kind.source_system(), "icao": ctx.icao}),
            ))
            .await
            .map_err(EngineError::store)?;

          let record = self
            .store
            .put_evidence(NewEvidence {
              source_system: kind.source_system().into(),
              source_ref: ctx.icao.clone(),
              content_type: fetch.content_type.clone(),
              payload: fetch.bytes.clone(),
              event_time_start: fetch.event_time_start,
              event_time_end: fetch.event_time_end,
              meta: json!({"retrieved_at": fetch.retrieved_at}),
            })
            .await
            .map_err(EngineError::store)?;

          self
            .store
            .record_trace(
              NewTraceEvent::new(
                case_id,
                TraceEventKind::ToolResult,
                json!({"tool": kind.source_system(), "ok": true}),
              )
              .with_ref("evidence", record.evidence_id),
            )
            .await
            .map_err(EngineError::store)?;

          if ctx.first_signal_at.is_none() {
            ctx.first_signal_at = Some(record.retrieved_at);
          }
          if !ctx
            .evidence
            .iter()
            .any(|e| e.evidence_id == record.evidence_id)
          {
            ctx.evidence.push(record.clone());
          }
          ingested.push(IngestedSignal {
            kind,
            evidence: record,
            bytes: fetch.bytes,
          });
        }
        Err(error) => {
          let request = missing::record_failed_fetch(
            self.store.as_ref(),
            case_id,
            kind,
            &ctx.icao,
            &error,
          )
          .await?;
          self
            .store
            .record_trace(
              NewTraceEvent::new(
                case_id,
                TraceEventKind::ToolResult,
                json!({
                  "tool": kind.source_system(),
                  "ok": false,
                  "error": error.to_string(),
                }),
              )
              .with_ref("missing_evidence", request.request_id),
            )
            .await
            .map_err(EngineError::store)?;
        }
      }
    }

    let derived =
      derive::derive_for_airport(self.store.as_ref(), &ctx.icao, &ingested)
        .await?;

    let new_contradictions = contradiction::detect_and_persist(
      self.store.as_ref(),
      &derived,
      Utc::now(),
    )
    .await?;
    ctx.contradictions.extend(new_contradictions);

    // Evidence-binding guardrail before the case moves on.
    let gate = guardrails::evidence_binding_gate(
      self.store.as_ref(),
      case_id,
      &derived.claims,
      &derived.edges,
    )
    .await?;
    if let GateOutcome::Blocked { reason, .. } = gate {
      ctx.derived = Some(derived);
      return Ok(Some(self.block_case(ctx, reason).await?));
    }

    self
      .emit(ProgressEvent::Progress {
        state:             OrchestratorState::Investigate.as_str().to_owned(),
        description:       format!(
          "{} evidence row(s), {} claim(s), {} contradiction(s)",
          ctx.evidence.len(),
          derived.claims.len(),
          ctx.contradictions.len(),
        ),
        evidence_count:    ctx.evidence.len(),
        claim_count:       derived.claims.len(),
        uncertainty_count: self.open_missing_count(case_id).await?,
        risk_level:          None,
        recommended_posture: None,
        confidence:          None,
      })
      .await;

    ctx.derived = Some(derived);

    // A BLOCKING gap means no posture guess: the case blocks instead.
    let open = self
      .store
      .missing_for_case(case_id, true)
      .await
      .map_err(EngineError::store)?;
    if missing::has_blocking(&open) {
      let reason = format!(
        "blocking evidence missing: {}",
        open
          .iter()
          .filter(|r| {
            r.criticality == stratus_core::case::Criticality::Blocking
          })
          .map(|r| r.source_system.as_str())
          .collect::<Vec<_>>()
          .join(", ")
      );
      return Ok(Some(self.block_case(ctx, reason).await?));
    }

    Ok(None)
  }

  /// One bounded fan-out: every source fetched concurrently under the
  /// per-call timeout. No state transition happens until all are back.
  async fn fetch_all(
    &self,
    icao: &str,
  ) -> Vec<(SignalKind, std::result::Result<stratus_core::signal::SignalFetch, SourceError>)>
  {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(
      self.config.fetch_concurrency.max(1),
    ));
    let timeout = std::time::Duration::from_secs(self.config.signal_timeout_secs);
    let mut join_set = JoinSet::new();

    for kind in SignalKind::ALL {
      let source = Arc::clone(&self.source);
      let semaphore = Arc::clone(&semaphore);
      let icao = icao.to_owned();
      join_set.spawn(async move {
        let _permit = semaphore.acquire().await;
        let result = match tokio::time::timeout(
          timeout,
          source.fetch(kind, &icao),
        )
        .await
        {
          Ok(inner) => inner,
          Err(_) => Err(SourceError::Timeout(timeout.as_secs())),
        };
        (kind, result)
      });
    }

    let mut results = Vec::with_capacity(SignalKind::ALL.len());
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok(entry) => results.push(entry),
        Err(e) => {
          tracing::error!(error = %e, "signal fetch task panicked");
        }
      }
    }
    // Stable order regardless of completion order.
    results.sort_by_key(|(kind, _)| *kind as u8);
    results
  }

  // ── QUANTIFY_RISK ─────────────────────────────────────────────────────

  async fn quantify_risk(&self, ctx: &mut RunContext) -> Result<()> {
    let case_id = ctx.case.case_id;
    self
      .enter_state(case_id, OrchestratorState::QuantifyRisk, json!({}))
      .await?;

    let belief = self.assemble_belief(ctx).await?;
    let timeout =
      std::time::Duration::from_secs(self.config.assessor_timeout_secs);

    let record =
      match tokio::time::timeout(timeout, self.assessor.assess(&belief)).await
      {
        Ok(Ok(record)) => record,
        Ok(Err(error)) => {
          tracing::warn!(case_id = %case_id, error = %error, "assessor failed");
          degraded_fallback(&belief, &error.to_string())
        }
        Err(_) => degraded_fallback(
          &belief,
          &format!("timed out after {}s", timeout.as_secs()),
        ),
      };

    self
      .emit(ProgressEvent::Progress {
        state:             OrchestratorState::QuantifyRisk.as_str().to_owned(),
        description:       "risk quantified".to_owned(),
        evidence_count:    ctx.evidence.len(),
        claim_count:       ctx
          .derived
          .as_ref()
          .map(|d| d.claims.len())
          .unwrap_or(0),
        uncertainty_count: self.open_missing_count(case_id).await?,
        risk_level:          Some(record.risk_level.as_str().to_owned()),
        recommended_posture: Some(
          record.recommended_posture.as_str().to_owned(),
        ),
        confidence:          Some(record.breakdown.confidence),
      })
      .await;

    ctx.risk = Some(record);
    Ok(())
  }

  // ── CRITIQUE ──────────────────────────────────────────────────────────

  /// Deterministic evidence-quality challenge. Returns `true` when the
  /// belief is good enough to proceed.
  async fn critique(&self, ctx: &mut RunContext) -> Result<bool> {
    let case_id = ctx.case.case_id;
    self
      .enter_state(
        case_id,
        OrchestratorState::Critique,
        json!({"pass": ctx.investigate_passes}),
      )
      .await?;

    let distinct_sources: std::collections::HashSet<&str> =
      ctx.evidence.iter().map(|e| e.source_system.as_str()).collect();
    let sufficient =
      !ctx.evidence.is_empty() && distinct_sources.len() >= 2;

    // Beyond the retry budget the case proceeds on the current belief.
    let budget_left =
      ctx.investigate_passes <= self.config.max_investigate_retries;
    Ok(sufficient || !budget_left)
  }

  // ── EVALUATE_POLICY ───────────────────────────────────────────────────

  async fn evaluate_policy(
    &self,
    ctx: &mut RunContext,
  ) -> Result<Option<RunOutcome>> {
    let case_id = ctx.case.case_id;
    self
      .enter_state(case_id, OrchestratorState::EvaluatePolicy, json!({}))
      .await?;

    let mut belief = self.assemble_belief(ctx).await?;
    let mut result =
      policy::evaluate(self.store.as_ref(), &belief, Utc::now()).await?;

    if result.verdict == Verdict::Block {
      // A blocked ACCEPT proposal is demoted once before the case blocks.
      if let Some(demoted) = policy::demoted_posture(belief.proposed_posture)
      {
        belief.proposed_posture = demoted;
        if let Some(risk) = ctx.risk.as_mut() {
          risk.recommended_posture = demoted;
        }
        result =
          policy::evaluate(self.store.as_ref(), &belief, Utc::now()).await?;
        self
          .store
          .record_trace(NewTraceEvent::new(
            case_id,
            TraceEventKind::Handoff,
            json!({
              "note": "proposed posture demoted after policy block",
              "posture": demoted.as_str(),
            }),
          ))
          .await
          .map_err(EngineError::store)?;
      }
    }

    if result.verdict == Verdict::Block {
      let reason = format!("policy block: {}", result.block_reasons.join("; "));
      ctx.policy = Some(result);
      return Ok(Some(self.block_case(ctx, reason).await?));
    }

    ctx.policy = Some(result);
    Ok(None)
  }

  // ── PLAN_ACTIONS ──────────────────────────────────────────────────────

  async fn plan_actions(
    &self,
    ctx: &mut RunContext,
  ) -> Result<Option<RunOutcome>> {
    let case_id = ctx.case.case_id;
    self
      .enter_state(case_id, OrchestratorState::PlanActions, json!({}))
      .await?;

    let belief = self.assemble_belief(ctx).await?;
    let risk = ctx.risk.as_ref().ok_or_else(|| {
      EngineError::Internal("risk record missing before PLAN_ACTIONS".into())
    })?;
    ctx.planned = planner::plan_actions(&belief, risk);

    // Action-scoped rules (shipment booking, cost exposure, premium SLA)
    // can only match once the plan exists; re-evaluate against it. This
    // result replaces the pre-plan verdict for the rest of the run.
    let belief = self.assemble_belief(ctx).await?;
    let result =
      policy::evaluate(self.store.as_ref(), &belief, Utc::now()).await?;
    let verdict = result.verdict;
    let block_reasons = result.block_reasons.clone();
    ctx.policy = Some(result);

    // Booking-required guardrail: a booking-less shipment plan becomes a
    // BLOCKING missing-evidence request.
    let gate = guardrails::booking_required_gate(
      self.store.as_ref(),
      case_id,
      &ctx.planned,
    )
    .await?;
    if let GateOutcome::Blocked { reason, .. } = gate {
      return Ok(Some(self.block_case(ctx, reason).await?));
    }
    if verdict == Verdict::Block {
      let reason =
        format!("policy block: {}", block_reasons.join("; "));
      return Ok(Some(self.block_case(ctx, reason).await?));
    }

    self
      .store
      .record_trace(NewTraceEvent::new(
        case_id,
        TraceEventKind::Handoff,
        json!({
          "planned": ctx
            .planned
            .iter()
            .map(|a| a.action_type.as_str())
            .collect::<Vec<_>>(),
        }),
      ))
      .await
      .map_err(EngineError::store)?;

    Ok(None)
  }

  // ── EXECUTE ───────────────────────────────────────────────────────────

  async fn execute(&self, ctx: &mut RunContext) -> Result<()> {
    let case_id = ctx.case.case_id;
    self
      .enter_state(case_id, OrchestratorState::Execute, json!({}))
      .await?;

    let governor = ActionGovernor::new(self.store.as_ref());
    let policy_result = ctx.policy.as_ref().ok_or_else(|| {
      EngineError::Internal("policy result missing before EXECUTE".into())
    })?;
    let risk = ctx.risk.as_ref().ok_or_else(|| {
      EngineError::Internal("risk record missing before EXECUTE".into())
    })?;

    for planned in &ctx.planned {
      let action =
        governor.propose(case_id, planned, policy_result).await?;

      if action.requires_approval {
        governor.request_approval(action.action_id).await?;
        continue;
      }

      governor.approve(action.action_id, "SYSTEM").await?;
      let outcome = governor.execute(action.action_id).await?;

      self
        .dispatcher
        .dispatch(
          self.store.as_ref(),
          WebhookEventType::ActionExecuted,
          Some(case_id),
          payloads::action_executed(
            action.action_id,
            action.action_type.as_str(),
            outcome.success,
            &outcome.payload,
          ),
        )
        .await?;

      if action.action_type == stratus_core::action::ActionType::SetPosture
        && outcome.success
      {
        self
          .dispatcher
          .dispatch(
            self.store.as_ref(),
            WebhookEventType::PostureChange,
            Some(case_id),
            payloads::posture_change(
              ctx.case.scope.airport.as_deref(),
              risk.recommended_posture.as_str(),
              Some(ctx.prior_posture.as_str()),
              risk.risk_level.as_str(),
              risk.breakdown.confidence,
              ctx.evidence.len(),
            ),
          )
          .await?;
      }
    }

    Ok(())
  }

  // ── COMPLETE ──────────────────────────────────────────────────────────

  async fn complete(&self, ctx: RunContext) -> Result<RunOutcome> {
    let case_id = ctx.case.case_id;
    self
      .enter_state(case_id, OrchestratorState::Complete, json!({}))
      .await?;

    let final_status =
      governance::auto_resolve_status(self.store.as_ref(), case_id)
        .await?
        .unwrap_or(CaseStatus::Open);
    if final_status != ctx.case.status {
      self
        .store
        .set_case_status(case_id, final_status)
        .await
        .map_err(EngineError::store)?;
    }

    let risk = ctx.risk.clone().ok_or_else(|| {
      EngineError::Internal("risk record missing before COMPLETE".into())
    })?;
    let policy_result = ctx.policy.clone().unwrap_or(PolicyResult {
      verdict:       Verdict::Allow,
      effects:       Vec::new(),
      citations:     Vec::new(),
      block_reasons: Vec::new(),
    });

    let rationale = format!(
      "{} risk at {} with confidence {:.2}; {} policy rule(s) applied",
      risk.risk_level.as_str(),
      ctx.icao,
      risk.breakdown.confidence,
      policy_result.effects.len(),
    );

    let derived = ctx.derived.as_ref();
    let packet = packet::build_and_seal(self.store.as_ref(), packet::PacketInputs {
      case:               &ctx.case,
      posture:            risk.recommended_posture,
      rationale,
      risk:               &risk,
      policy:             &policy_result,
      evidence:           &ctx.evidence,
      claims:             derived.map(|d| d.claims.as_slice()).unwrap_or(&[]),
      contradictions:     &ctx.contradictions,
      blocked_reason:     None,
      first_signal_at:    ctx.first_signal_at,
      investigate_passes: ctx.investigate_passes,
    })
    .await?;

    // Anti-replay sanity check over the finished trace.
    let trace = self
      .store
      .trace_for_case(case_id)
      .await
      .map_err(EngineError::store)?;
    let signature = guardrails::trace_path_signature(&trace);
    guardrails::non_workflow_check(self.store.as_ref(), &ctx.case, &signature)
      .await?;

    if final_status == CaseStatus::Resolved {
      let belief = self.assemble_belief(&ctx).await?;
      let kinds: Vec<String> =
        ctx.contradictions.iter().map(|c| c.kind.clone()).collect();
      playbooks::mine_case(
        self.store.as_ref(),
        &ctx.case,
        &belief,
        &risk,
        &kinds,
      )
      .await?;

      self
        .dispatcher
        .dispatch(
          self.store.as_ref(),
          WebhookEventType::CaseResolved,
          Some(case_id),
          payloads::case_resolved(
            risk.recommended_posture.as_str(),
            "RESOLVED",
            packet.metrics.pdl_seconds,
            ctx.evidence.len(),
          ),
        )
        .await?;
    }

    let executed = packet.actions_executed.len();
    let proposed = packet.actions_proposed.len();
    self
      .emit(ProgressEvent::Completed {
        final_state:      OrchestratorState::Complete.as_str().to_owned(),
        status:           match final_status {
          CaseStatus::Resolved => "RESOLVED".to_owned(),
          CaseStatus::Blocked => "BLOCKED".to_owned(),
          CaseStatus::Open => "OPEN".to_owned(),
        },
        actions_executed: executed,
        actions_proposed: proposed,
      })
      .await;

    tracing::info!(
      case_id = %case_id,
      status = ?final_status,
      posture = risk.recommended_posture.as_str(),
      evidence = ctx.evidence.len(),
      passes = ctx.investigate_passes,
      "orchestrator completed"
    );

    Ok(RunOutcome { packet, final_status })
  }

  /// Terminal path for guardrail failures, blocking gaps, and policy
  /// blocks: mark the case BLOCKED and seal a packet whose blocked section
  /// says why.
  async fn block_case(
    &self,
    ctx: &mut RunContext,
    reason: String,
  ) -> Result<RunOutcome> {
    let case_id = ctx.case.case_id;
    self
      .store
      .record_trace(NewTraceEvent::new(
        case_id,
        TraceEventKind::Blocked,
        json!({"reason": reason}),
      ))
      .await
      .map_err(EngineError::store)?;
    self
      .store
      .set_case_status(case_id, CaseStatus::Blocked)
      .await
      .map_err(EngineError::store)?;

    let belief = self.assemble_belief(ctx).await?;
    let risk = match &ctx.risk {
      Some(risk) => risk.clone(),
      None => degraded_fallback(&belief, "case blocked before assessment"),
    };
    let policy_result = ctx.policy.clone().unwrap_or(PolicyResult {
      verdict:       Verdict::Block,
      effects:       Vec::new(),
      citations:     Vec::new(),
      block_reasons: vec![reason.clone()],
    });

    let derived = ctx.derived.as_ref();
    let packet = packet::build_and_seal(self.store.as_ref(), packet::PacketInputs {
      case:               &ctx.case,
      posture:            Posture::Hold,
      rationale:          format!("case blocked: {reason}"),
      risk:               &risk,
      policy:             &policy_result,
      evidence:           &ctx.evidence,
      claims:             derived.map(|d| d.claims.as_slice()).unwrap_or(&[]),
      contradictions:     &ctx.contradictions,
      blocked_reason:     Some(reason),
      first_signal_at:    ctx.first_signal_at,
      investigate_passes: ctx.investigate_passes,
    })
    .await?;

    self
      .emit(ProgressEvent::Completed {
        final_state:      OrchestratorState::Complete.as_str().to_owned(),
        status:           "BLOCKED".to_owned(),
        actions_executed: 0,
        actions_proposed: packet.actions_proposed.len(),
      })
      .await;

    Ok(RunOutcome { packet, final_status: CaseStatus::Blocked })
  }

  // ── Belief assembly ───────────────────────────────────────────────────

  /// Build the structured belief from graph reads and missing-evidence
  /// state. This is the only input the policy engine and planner see.
  async fn assemble_belief(&self, ctx: &RunContext) -> Result<BeliefState> {
    let case_id = ctx.case.case_id;
    let mut belief = BeliefState::new(case_id);
    belief.airport = Some(ctx.icao.clone());

    let mut sources: Vec<String> = ctx
      .evidence
      .iter()
      .map(|e| e.source_system.clone())
      .collect();
    sources.sort();
    sources.dedup();
    belief.evidence_sources = sources;
    belief.evidence_count = ctx.evidence.len();

    if let Some(derived) = &ctx.derived {
      belief.flight_category =
        derived.metar.as_ref().map(|m| m.observation.category());
      belief.faa_disruption_kind =
        derived.faa.as_ref().map(|f| f.status.kind().to_owned());
      belief.severe_alert_count =
        derived.alerts.iter().filter(|(_, severe)| *severe).count();
      belief.movement_collapsed =
        derived.movement.as_ref().is_some_and(|m| m.collapsed);
    }

    let open_contradictions = ctx
      .contradictions
      .iter()
      .filter(|c| {
        c.status == stratus_core::graph::ContradictionStatus::Open
      })
      .count();
    belief.open_contradictions = open_contradictions;
    belief.has_contradictions = open_contradictions > 0;
    belief.has_stale_evidence = ctx
      .contradictions
      .iter()
      .any(|c| c.kind == contradiction::STALE_FAA_DATA);

    let open = self
      .store
      .missing_for_case(case_id, true)
      .await
      .map_err(EngineError::store)?;
    for request in &open {
      match request.criticality {
        stratus_core::case::Criticality::Blocking => {
          belief.missing_blocking += 1
        }
        stratus_core::case::Criticality::Degraded => {
          belief.missing_degraded += 1
        }
        stratus_core::case::Criticality::Informational => {
          belief.missing_informational += 1
        }
      }
    }

    if let Some(risk) = &ctx.risk {
      belief.risk_level = risk.risk_level;
      belief.proposed_posture = risk.recommended_posture;
    }
    belief.proposed_actions =
      ctx.planned.iter().map(|a| a.action_type).collect();

    // Cost exposure is a property of the plan; tier exposure comes from the
    // downstream cascade.
    belief.estimated_cost = ctx
      .planned
      .iter()
      .map(|a| planner::nominal_cost_usd(a.action_type))
      .sum();
    let cascade =
      packet::cascade_impact(self.store.as_ref(), &ctx.icao).await?;
    if cascade.premium_shipments > 0 {
      belief.service_tier = Some("PREMIUM".to_owned());
    }

    belief.at_risk_shipments =
      packet::premium_shipments_at_risk(self.store.as_ref(), &ctx.icao)
        .await?;

    // Booking evidence is scoped to the shipments the plan touches, the
    // same way the booking guardrail scopes it.
    let shipment_refs: Vec<Option<String>> = ctx
      .planned
      .iter()
      .filter(|a| a.action_type.is_shipment_level())
      .map(|a| {
        a.args
          .get("shipment")
          .and_then(|s| s.as_str())
          .map(str::to_owned)
      })
      .collect();
    let mut has_booking = !shipment_refs.is_empty();
    for shipment_ref in &shipment_refs {
      let bookings = self
        .store
        .evidence_by_source("BOOKING", shipment_ref.as_deref())
        .await
        .map_err(EngineError::store)?;
      if bookings.is_empty() {
        has_booking = false;
        break;
      }
    }
    belief.has_booking_evidence = has_booking;

    Ok(belief)
  }

  async fn open_missing_count(&self, case_id: Uuid) -> Result<usize> {
    Ok(
      self
        .store
        .missing_for_case(case_id, true)
        .await
        .map_err(EngineError::store)?
        .len(),
    )
  }

  /// Cancellation entry point: in-flight actions fail with reason
  /// CANCELLED and the case blocks rather than silently disappearing.
  pub async fn cancel(&self, case_id: Uuid) -> Result<()> {
    let governor = ActionGovernor::new(self.store.as_ref());
    let actions = self
      .store
      .actions_for_case(case_id)
      .await
      .map_err(EngineError::store)?;
    for action in actions
      .iter()
      .filter(|a| a.state == stratus_core::action::ActionState::Executing)
    {
      governor.fail_cancelled(action.action_id).await?;
    }
    self
      .store
      .set_case_status(case_id, CaseStatus::Blocked)
      .await
      .map_err(EngineError::store)?;
    Ok(())
  }
}

fn state_description(state: OrchestratorState) -> &'static str {
  match state {
    OrchestratorState::Init => "loading case scope and prior posture",
    OrchestratorState::Investigate => "fetching and deriving signals",
    OrchestratorState::QuantifyRisk => "quantifying risk from the belief",
    OrchestratorState::Critique => "challenging evidence quality",
    OrchestratorState::EvaluatePolicy => "evaluating governance policies",
    OrchestratorState::PlanActions => "planning interventions",
    OrchestratorState::DraftComms => "drafting notifications",
    OrchestratorState::Execute => "driving actions through governance",
    OrchestratorState::Complete => "sealing the decision packet",
  }
}
