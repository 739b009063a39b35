//! Run records: immutable, append-only history of every execution attempt.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{dependency::ElementRef, question::ParamValue};

// ─── Reason codes ────────────────────────────────────────────────────────────

/// Stable code explaining why a run did not pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
  BinderUnboundParameter,
  BinderInvalidParameter,
  CompileError,
  StoreUnreachable,
  Timeout,
  MissingRequiredColumns,
  MinRowsNotMet,
  LatencyBudgetExceeded,
}

impl ReasonCode {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::BinderUnboundParameter => "binder_unbound_parameter",
      Self::BinderInvalidParameter => "binder_invalid_parameter",
      Self::CompileError => "compile_error",
      Self::StoreUnreachable => "store_unreachable",
      Self::Timeout => "timeout",
      Self::MissingRequiredColumns => "missing_required_columns",
      Self::MinRowsNotMet => "min_rows_not_met",
      Self::LatencyBudgetExceeded => "latency_budget_exceeded",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Some(match s {
      "binder_unbound_parameter" => Self::BinderUnboundParameter,
      "binder_invalid_parameter" => Self::BinderInvalidParameter,
      "compile_error" => Self::CompileError,
      "store_unreachable" => Self::StoreUnreachable,
      "timeout" => Self::Timeout,
      "missing_required_columns" => Self::MissingRequiredColumns,
      "min_rows_not_met" => Self::MinRowsNotMet,
      "latency_budget_exceeded" => Self::LatencyBudgetExceeded,
      _ => return None,
    })
  }

  /// Judged outcomes are routine test results, not system faults.
  pub fn is_contract_failure(self) -> bool {
    matches!(
      self,
      Self::MissingRequiredColumns | Self::MinRowsNotMet | Self::LatencyBudgetExceeded
    )
  }

  /// Worth retrying with backoff.
  pub fn is_transient(self) -> bool { matches!(self, Self::StoreUnreachable) }
}

impl fmt::Display for ReasonCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Structured context for a [`ReasonCode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureDetail {
  UnboundParameters { names: Vec<String> },
  InvalidParameter { name: String, message: String },
  MissingColumns { missing: Vec<String> },
  RowCount { actual: u64, required: u64 },
  Latency { actual_ms: u64, budget_ms: u64 },
  Timeout { timeout_ms: u64 },
  Store { message: String },
}

// ─── Run ─────────────────────────────────────────────────────────────────────

/// One preview row: column name → compact term display.
pub type PreviewRow = BTreeMap<String, String>;

/// An immutable execution record. Runs reference their microtheory by IRI,
/// not by foreign key, so history outlives the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CqRun {
  pub run_id:          Uuid,
  pub cq_id:           Uuid,
  pub cq_version:      u32,
  pub project_id:      String,
  pub microtheory_iri: String,
  pub params:          BTreeMap<String, ParamValue>,
  /// Absent when binding failed.
  pub bound_query:     Option<String>,
  /// SHA-256 hex of `bound_query`.
  pub query_hash:      Option<String>,
  pub pass:            bool,
  pub reason:          Option<ReasonCode>,
  pub detail:          Option<FailureDetail>,
  /// Non-fatal binder warnings (e.g. unused parameters).
  pub warnings:        Vec<String>,
  pub row_count:       Option<u64>,
  pub columns:         Vec<String>,
  pub preview:         Vec<PreviewRow>,
  pub latency_ms:      Option<u64>,
  /// Ontology elements extracted from a passing run.
  pub touched:         Vec<ElementRef>,
  pub executed_by:     String,
  pub executed_at:     DateTime<Utc>,
}

/// Pagination window for run history, newest first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
  pub limit:  usize,
  pub offset: usize,
}

impl Default for Page {
  fn default() -> Self { Self { limit: 50, offset: 0 } }
}
