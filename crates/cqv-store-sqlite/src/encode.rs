//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are fixed-width RFC 3339 UTC strings so that lexical order is
//! chronological. Structured fields (parameters, contracts, run details) are
//! compact JSON. UUIDs are hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use cqv_core::{
  contract::Contract,
  dependency::{ChangeKind, ElementKind, OntologyDependency},
  microtheory::Microtheory,
  question::{CompetencyQuestion, CqStatus},
  run::{CqRun, ReasonCode},
};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_json<T: Serialize + ?Sized>(v: &T) -> Result<String> { Ok(serde_json::to_string(v)?) }

pub fn decode_json<T: DeserializeOwned>(s: &str) -> Result<T> { Ok(serde_json::from_str(s)?) }

pub fn encode_u64(n: u64) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

fn decode_u64(n: i64) -> u64 { u64::try_from(n).unwrap_or(0) }

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_status(s: &str) -> Result<CqStatus> {
  match s {
    "draft" => Ok(CqStatus::Draft),
    "active" => Ok(CqStatus::Active),
    "deprecated" => Ok(CqStatus::Deprecated),
    other => Err(unknown("question status", other)),
  }
}

fn decode_reason(s: &str) -> Result<ReasonCode> {
  ReasonCode::parse(s).ok_or_else(|| unknown("reason code", s))
}

fn decode_element_kind(s: &str) -> Result<ElementKind> {
  ElementKind::parse(s).ok_or_else(|| unknown("element kind", s))
}

fn decode_change_kind(s: &str) -> Result<ChangeKind> {
  ChangeKind::parse(s).ok_or_else(|| unknown("change kind", s))
}

fn unknown(kind: &'static str, value: &str) -> Error {
  Error::UnknownValue { kind, value: value.to_owned() }
}

// ─── Questions ───────────────────────────────────────────────────────────────

pub const QUESTION_COLUMNS: &str = "cq_id, project_id, name, statement, params, template, \
                                    default_microtheory, contract, status, version, created_by, \
                                    created_at, updated_at";

/// Raw strings read directly from a `questions` row.
pub struct RawQuestion {
  pub cq_id:               String,
  pub project_id:          String,
  pub name:                String,
  pub statement:           String,
  pub params:              String,
  pub template:            String,
  pub default_microtheory: Option<String>,
  pub contract:            String,
  pub status:              String,
  pub version:             i64,
  pub created_by:          String,
  pub created_at:          String,
  pub updated_at:          String,
}

impl RawQuestion {
  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      cq_id:               row.get(0)?,
      project_id:          row.get(1)?,
      name:                row.get(2)?,
      statement:           row.get(3)?,
      params:              row.get(4)?,
      template:            row.get(5)?,
      default_microtheory: row.get(6)?,
      contract:            row.get(7)?,
      status:              row.get(8)?,
      version:             row.get(9)?,
      created_by:          row.get(10)?,
      created_at:          row.get(11)?,
      updated_at:          row.get(12)?,
    })
  }

  pub fn into_question(self) -> Result<CompetencyQuestion> {
    let contract: Contract = decode_json(&self.contract)?;
    Ok(CompetencyQuestion {
      cq_id: decode_uuid(&self.cq_id)?,
      project_id: self.project_id,
      name: self.name,
      statement: self.statement,
      params: decode_json(&self.params)?,
      template: self.template,
      default_microtheory: self.default_microtheory,
      contract,
      status: decode_status(&self.status)?,
      version: u32::try_from(self.version).unwrap_or(u32::MAX),
      created_by: self.created_by,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Microtheories ───────────────────────────────────────────────────────────

pub const MICROTHEORY_COLUMNS: &str =
  "mt_id, project_id, label, iri, parent_iri, is_default, created_at";

/// Raw strings read directly from a `microtheories` row.
pub struct RawMicrotheory {
  pub mt_id:      String,
  pub project_id: String,
  pub label:      String,
  pub iri:        String,
  pub parent_iri: Option<String>,
  pub is_default: bool,
  pub created_at: String,
}

impl RawMicrotheory {
  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      mt_id:      row.get(0)?,
      project_id: row.get(1)?,
      label:      row.get(2)?,
      iri:        row.get(3)?,
      parent_iri: row.get(4)?,
      is_default: row.get(5)?,
      created_at: row.get(6)?,
    })
  }

  pub fn into_microtheory(self) -> Result<Microtheory> {
    Ok(Microtheory {
      mt_id:      decode_uuid(&self.mt_id)?,
      project_id: self.project_id,
      label:      self.label,
      iri:        self.iri,
      parent_iri: self.parent_iri,
      is_default: self.is_default,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

// ─── Runs ────────────────────────────────────────────────────────────────────

pub const RUN_COLUMNS: &str = "run_id, cq_id, cq_version, project_id, microtheory_iri, params, \
                               bound_query, query_hash, pass, reason, detail, warnings, \
                               row_count, columns, preview, latency_ms, touched, executed_by, \
                               executed_at";

/// Raw values read directly from a `runs` row.
pub struct RawRun {
  pub run_id:          String,
  pub cq_id:           String,
  pub cq_version:      i64,
  pub project_id:      String,
  pub microtheory_iri: String,
  pub params:          String,
  pub bound_query:     Option<String>,
  pub query_hash:      Option<String>,
  pub pass:            bool,
  pub reason:          Option<String>,
  pub detail:          Option<String>,
  pub warnings:        String,
  pub row_count:       Option<i64>,
  pub columns:         String,
  pub preview:         String,
  pub latency_ms:      Option<i64>,
  pub touched:         String,
  pub executed_by:     String,
  pub executed_at:     String,
}

impl RawRun {
  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      run_id:          row.get(0)?,
      cq_id:           row.get(1)?,
      cq_version:      row.get(2)?,
      project_id:      row.get(3)?,
      microtheory_iri: row.get(4)?,
      params:          row.get(5)?,
      bound_query:     row.get(6)?,
      query_hash:      row.get(7)?,
      pass:            row.get(8)?,
      reason:          row.get(9)?,
      detail:          row.get(10)?,
      warnings:        row.get(11)?,
      row_count:       row.get(12)?,
      columns:         row.get(13)?,
      preview:         row.get(14)?,
      latency_ms:      row.get(15)?,
      touched:         row.get(16)?,
      executed_by:     row.get(17)?,
      executed_at:     row.get(18)?,
    })
  }

  pub fn into_run(self) -> Result<CqRun> {
    Ok(CqRun {
      run_id:          decode_uuid(&self.run_id)?,
      cq_id:           decode_uuid(&self.cq_id)?,
      cq_version:      u32::try_from(self.cq_version).unwrap_or(u32::MAX),
      project_id:      self.project_id,
      microtheory_iri: self.microtheory_iri,
      params:          decode_json(&self.params)?,
      bound_query:     self.bound_query,
      query_hash:      self.query_hash,
      pass:            self.pass,
      reason:          self.reason.as_deref().map(decode_reason).transpose()?,
      detail:          self.detail.as_deref().map(decode_json).transpose()?,
      warnings:        decode_json(&self.warnings)?,
      row_count:       self.row_count.map(decode_u64),
      columns:         decode_json(&self.columns)?,
      preview:         decode_json(&self.preview)?,
      latency_ms:      self.latency_ms.map(decode_u64),
      touched:         decode_json(&self.touched)?,
      executed_by:     self.executed_by,
      executed_at:     decode_dt(&self.executed_at)?,
    })
  }
}

// ─── Dependencies ────────────────────────────────────────────────────────────

pub const DEPENDENCY_COLUMNS: &str = "microtheory_iri, element_iri, element_kind, first_seen_at, \
                                      last_validated_at, is_valid, invalidated_at, invalidated_by";

/// Raw strings read directly from a `dependencies` row.
pub struct RawDependency {
  pub microtheory_iri:   String,
  pub element_iri:       String,
  pub element_kind:      String,
  pub first_seen_at:     String,
  pub last_validated_at: String,
  pub is_valid:          bool,
  pub invalidated_at:    Option<String>,
  pub invalidated_by:    Option<String>,
}

impl RawDependency {
  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      microtheory_iri:   row.get(0)?,
      element_iri:       row.get(1)?,
      element_kind:      row.get(2)?,
      first_seen_at:     row.get(3)?,
      last_validated_at: row.get(4)?,
      is_valid:          row.get(5)?,
      invalidated_at:    row.get(6)?,
      invalidated_by:    row.get(7)?,
    })
  }

  pub fn into_dependency(self) -> Result<OntologyDependency> {
    Ok(OntologyDependency {
      microtheory_iri:   self.microtheory_iri,
      element_iri:       self.element_iri,
      element_kind:      decode_element_kind(&self.element_kind)?,
      first_seen_at:     decode_dt(&self.first_seen_at)?,
      last_validated_at: decode_dt(&self.last_validated_at)?,
      is_valid:          self.is_valid,
      invalidated_at:    self.invalidated_at.as_deref().map(decode_dt).transpose()?,
      invalidated_by:    self.invalidated_by.as_deref().map(decode_change_kind).transpose()?,
    })
  }
}
