//! SQL schema for the validation store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS questions (
    cq_id               TEXT PRIMARY KEY,
    project_id          TEXT NOT NULL,
    name                TEXT NOT NULL,
    statement           TEXT NOT NULL DEFAULT '',
    params              TEXT NOT NULL DEFAULT '[]',  -- JSON array of ParamSpec
    template            TEXT NOT NULL,
    default_microtheory TEXT,                        -- id or IRI, unresolved
    contract            TEXT NOT NULL,               -- JSON Contract
    status              TEXT NOT NULL DEFAULT 'draft',
    version             INTEGER NOT NULL DEFAULT 1,
    created_by          TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    UNIQUE (project_id, name)
);

CREATE TABLE IF NOT EXISTS microtheories (
    mt_id       TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL,
    label       TEXT NOT NULL,
    iri         TEXT NOT NULL UNIQUE,
    parent_iri  TEXT,                                -- lineage only, no FK
    is_default  INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    UNIQUE (project_id, label)
);

-- At most one default per project, whatever the write path.
CREATE UNIQUE INDEX IF NOT EXISTS microtheories_one_default
    ON microtheories(project_id) WHERE is_default = 1;

-- Runs are strictly append-only and name their microtheory by IRI so that
-- deleting a microtheory never touches history.
CREATE TABLE IF NOT EXISTS runs (
    run_id          TEXT PRIMARY KEY,
    cq_id           TEXT NOT NULL REFERENCES questions(cq_id),
    cq_version      INTEGER NOT NULL,
    project_id      TEXT NOT NULL,
    microtheory_iri TEXT NOT NULL,
    params          TEXT NOT NULL,                   -- JSON object
    bound_query     TEXT,
    query_hash      TEXT,
    pass            INTEGER NOT NULL,
    reason          TEXT,
    detail          TEXT,                            -- JSON FailureDetail
    warnings        TEXT NOT NULL DEFAULT '[]',
    row_count       INTEGER,
    columns         TEXT NOT NULL DEFAULT '[]',
    preview         TEXT NOT NULL DEFAULT '[]',
    latency_ms      INTEGER,
    touched         TEXT NOT NULL DEFAULT '[]',      -- JSON array of ElementRef
    executed_by     TEXT NOT NULL,
    executed_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dependencies (
    microtheory_iri   TEXT NOT NULL,
    element_iri       TEXT NOT NULL,
    element_kind      TEXT NOT NULL,
    first_seen_at     TEXT NOT NULL,
    last_validated_at TEXT NOT NULL,
    is_valid          INTEGER NOT NULL DEFAULT 1,
    invalidated_at    TEXT,
    invalidated_by    TEXT,                          -- 'altered' | 'renamed' | 'removed'
    PRIMARY KEY (microtheory_iri, element_iri)
);

CREATE INDEX IF NOT EXISTS runs_cq_idx          ON runs(cq_id, executed_at);
CREATE INDEX IF NOT EXISTS runs_mt_pass_idx     ON runs(microtheory_iri, pass);
CREATE INDEX IF NOT EXISTS dependencies_elt_idx ON dependencies(element_iri);

PRAGMA user_version = 1;
";
