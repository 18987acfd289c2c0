//! SQL schema for the Stratus SQLite store.
//!
//! Executed once at connection startup; idempotent thanks to
//! `CREATE TABLE IF NOT EXISTS`. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Evidence index rows are strictly append-only; the raw bytes live on disk
-- under <evidence_root>/<content_sha256>.bin and are never rewritten.
CREATE TABLE IF NOT EXISTS evidence (
    evidence_id      TEXT PRIMARY KEY,
    source_system    TEXT NOT NULL,
    source_ref       TEXT NOT NULL,
    content_sha256   TEXT NOT NULL,   -- lowercase hex, 64 chars
    content_type     TEXT NOT NULL,
    retrieved_at     TEXT NOT NULL,   -- RFC 3339 UTC
    event_time_start TEXT,
    event_time_end   TEXT,
    excerpt          TEXT NOT NULL,   -- PII-redacted, <= 500 chars
    meta             TEXT NOT NULL DEFAULT 'null',
    UNIQUE (source_system, source_ref, content_sha256)
);

-- Nodes are immutable; attribute changes append node_version rows.
CREATE TABLE IF NOT EXISTS node (
    node_id    TEXT PRIMARY KEY,
    node_type  TEXT NOT NULL,
    identifier TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (node_type, identifier)
);

CREATE TABLE IF NOT EXISTS node_version (
    version_id TEXT PRIMARY KEY,
    node_id    TEXT NOT NULL REFERENCES node(node_id),
    attrs      TEXT NOT NULL,
    valid_from TEXT NOT NULL,
    valid_to   TEXT,             -- NULL = current
    supersedes TEXT REFERENCES node_version(version_id),
    created_at TEXT NOT NULL
);

-- Bi-temporal edges. No UPDATE ever touches attrs; status may only move
-- DRAFT -> FACT (with evidence bound) or -> RETRACTED.
CREATE TABLE IF NOT EXISTS edge (
    edge_id          TEXT PRIMARY KEY,
    src              TEXT NOT NULL REFERENCES node(node_id),
    dst              TEXT NOT NULL REFERENCES node(node_id),
    edge_type        TEXT NOT NULL,
    attrs            TEXT NOT NULL DEFAULT 'null',
    status           TEXT NOT NULL,   -- 'DRAFT' | 'FACT' | 'RETRACTED'
    supersedes       TEXT REFERENCES edge(edge_id),
    event_time_start TEXT,
    event_time_end   TEXT,
    ingested_at      TEXT NOT NULL,
    valid_from       TEXT,
    valid_to         TEXT,
    source_system    TEXT NOT NULL,
    confidence       REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS edge_evidence (
    edge_id     TEXT NOT NULL REFERENCES edge(edge_id),
    evidence_id TEXT NOT NULL REFERENCES evidence(evidence_id),
    UNIQUE (edge_id, evidence_id)
);

CREATE TABLE IF NOT EXISTS claim (
    claim_id         TEXT PRIMARY KEY,
    subject_node_id  TEXT NOT NULL REFERENCES node(node_id),
    text             TEXT NOT NULL,
    status           TEXT NOT NULL,   -- 'DRAFT' | 'HYPOTHESIS' | 'FACT' | 'RETRACTED'
    confidence       REAL NOT NULL,
    supersedes       TEXT REFERENCES claim(claim_id),
    event_time_start TEXT,
    event_time_end   TEXT,
    ingested_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS claim_evidence (
    claim_id    TEXT NOT NULL REFERENCES claim(claim_id),
    evidence_id TEXT NOT NULL REFERENCES evidence(evidence_id),
    UNIQUE (claim_id, evidence_id)
);

CREATE TABLE IF NOT EXISTS contradiction (
    contradiction_id  TEXT PRIMARY KEY,
    left_ref          TEXT NOT NULL,
    right_ref         TEXT NOT NULL,
    kind              TEXT NOT NULL,
    explanation       TEXT NOT NULL,
    detected_at       TEXT NOT NULL,
    status            TEXT NOT NULL DEFAULT 'OPEN',
    resolved_by_claim TEXT REFERENCES claim(claim_id)
);

CREATE TABLE IF NOT EXISTS cases (
    case_id     TEXT PRIMARY KEY,
    case_type   TEXT NOT NULL,
    scope       TEXT NOT NULL,      -- JSON
    status      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    resolved_at TEXT
);

CREATE TABLE IF NOT EXISTS trace_event (
    trace_id   TEXT PRIMARY KEY,
    case_id    TEXT NOT NULL REFERENCES cases(case_id),
    seq        INTEGER NOT NULL,
    kind       TEXT NOT NULL,
    ref_type   TEXT,
    ref_id     TEXT,
    meta       TEXT NOT NULL DEFAULT 'null',
    created_at TEXT NOT NULL,
    UNIQUE (case_id, seq)
);

CREATE TABLE IF NOT EXISTS action (
    action_id         TEXT PRIMARY KEY,
    case_id           TEXT NOT NULL REFERENCES cases(case_id),
    action_type       TEXT NOT NULL,
    args              TEXT NOT NULL DEFAULT 'null',
    risk              TEXT NOT NULL,
    requires_approval INTEGER NOT NULL,
    state             TEXT NOT NULL,
    approved_by       TEXT,
    approved_at       TEXT,
    failure_reason    TEXT,
    created_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS outcome (
    outcome_id  TEXT PRIMARY KEY,
    action_id   TEXT NOT NULL REFERENCES action(action_id),
    success     INTEGER NOT NULL,
    payload     TEXT NOT NULL DEFAULT 'null',
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS missing_evidence_request (
    request_id           TEXT PRIMARY KEY,
    case_id              TEXT NOT NULL REFERENCES cases(case_id),
    source_system        TEXT NOT NULL,
    request_type         TEXT NOT NULL,
    params               TEXT NOT NULL DEFAULT 'null',
    reason               TEXT NOT NULL,
    criticality          TEXT NOT NULL,
    created_at           TEXT NOT NULL,
    resolved_by_evidence TEXT REFERENCES evidence(evidence_id)
);

CREATE TABLE IF NOT EXISTS policy (
    policy_id      TEXT PRIMARY KEY,
    policy_type    TEXT NOT NULL,
    text           TEXT NOT NULL UNIQUE,
    conditions     TEXT NOT NULL,
    effects        TEXT NOT NULL,
    effective_from TEXT NOT NULL,
    effective_to   TEXT
);

CREATE TABLE IF NOT EXISTS playbook (
    playbook_id     TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    pattern         TEXT NOT NULL,
    action_template TEXT NOT NULL,
    use_count       INTEGER NOT NULL DEFAULT 0,
    success_count   INTEGER NOT NULL DEFAULT 0,
    policy_snapshot TEXT NOT NULL DEFAULT '[]',
    domain          TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    last_used_at    TEXT
);

CREATE TABLE IF NOT EXISTS playbook_case (
    playbook_id TEXT NOT NULL REFERENCES playbook(playbook_id),
    case_id     TEXT NOT NULL REFERENCES cases(case_id),
    UNIQUE (playbook_id, case_id)
);

-- Sealed audit artifacts; write-once by case id.
CREATE TABLE IF NOT EXISTS decision_packet (
    case_id    TEXT PRIMARY KEY REFERENCES cases(case_id),
    packet     TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS webhook_endpoint (
    webhook_id TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    url        TEXT NOT NULL,
    events     TEXT NOT NULL,     -- JSON array of event type strings
    enabled    INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS webhook_delivery (
    delivery_id  TEXT PRIMARY KEY,
    webhook_id   TEXT NOT NULL REFERENCES webhook_endpoint(webhook_id),
    event_type   TEXT NOT NULL,
    case_id      TEXT,
    payload      TEXT NOT NULL,
    attempts     INTEGER NOT NULL,
    last_status  INTEGER,
    last_error   TEXT,
    success      INTEGER NOT NULL,
    delivered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS evidence_source_idx ON evidence(source_system, source_ref);
CREATE INDEX IF NOT EXISTS edge_src_idx        ON edge(src);
CREATE INDEX IF NOT EXISTS edge_type_idx       ON edge(edge_type);
CREATE INDEX IF NOT EXISTS edge_temporal_idx   ON edge(event_time_start, ingested_at);
CREATE INDEX IF NOT EXISTS claim_subject_idx   ON claim(subject_node_id);
CREATE INDEX IF NOT EXISTS trace_case_idx      ON trace_event(case_id);
CREATE INDEX IF NOT EXISTS action_case_idx     ON action(case_id);
CREATE INDEX IF NOT EXISTS missing_case_idx    ON missing_evidence_request(case_id);

PRAGMA user_version = 1;
";
