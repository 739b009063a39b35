//! Run recording: exactly one immutable row per execution attempt.
//!
//! The write is retried a bounded number of times. A run that still cannot be
//! written is the one operator-fatal condition in the engine: it is logged at
//! `error` and surfaced as [`Error::RunNotRecorded`].

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::{
  Error, Result,
  graph::QueryResult,
  retry::RetryPolicy,
  run::{CqRun, PreviewRow},
  store::ValidationStore,
};

/// SHA-256 hex digest of a bound query.
pub fn query_hash(query: &str) -> String { hex::encode(Sha256::digest(query.as_bytes())) }

/// The first `limit` rows of `result`, keyed by column. Unbound cells are
/// omitted from their row.
pub fn preview(result: &QueryResult, limit: usize) -> Vec<PreviewRow> {
  result
    .rows
    .iter()
    .take(limit)
    .map(|row| {
      result
        .columns
        .iter()
        .zip(row)
        .filter_map(|(col, cell)| cell.as_ref().map(|t| (col.clone(), t.display())))
        .collect()
    })
    .collect()
}

pub struct RunRecorder<S> {
  store: Arc<S>,
  retry: RetryPolicy,
}

impl<S> Clone for RunRecorder<S> {
  fn clone(&self) -> Self { Self { store: self.store.clone(), retry: self.retry } }
}

impl<S: ValidationStore> RunRecorder<S> {
  pub fn new(store: Arc<S>, retry: RetryPolicy) -> Self { Self { store, retry } }

  /// Persist `run`; returns it once it is durably in history.
  pub async fn record(&self, run: CqRun) -> Result<CqRun> {
    let written = self
      .retry
      .run(|| self.store.record_run(run.clone()), |_| true)
      .await;

    match written {
      Ok(()) => {
        tracing::debug!(run_id = %run.run_id, cq_id = %run.cq_id, pass = run.pass, "run recorded");
        Ok(run)
      }
      Err(e) => {
        tracing::error!(
          run_id = %run.run_id,
          cq_id = %run.cq_id,
          microtheory = %run.microtheory_iri,
          error = %e,
          "run could not be recorded; audit trail incomplete"
        );
        Err(Error::RunNotRecorded(Box::new(e)))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::Term;

  #[test]
  fn hash_is_stable_hex() {
    let h = query_hash("SELECT * WHERE { ?s ?p ?o }");
    assert_eq!(h.len(), 64);
    assert_eq!(h, query_hash("SELECT * WHERE { ?s ?p ?o }"));
    assert_ne!(h, query_hash("SELECT * WHERE { ?s ?p ?o } "));
  }

  #[test]
  fn preview_is_capped_and_skips_unbound_cells() {
    let result = QueryResult {
      columns: vec!["x".into(), "y".into()],
      rows:    (0..25)
        .map(|i| vec![Some(Term::iri(format!("urn:x{i}"))), None])
        .collect(),
    };
    let rows = preview(&result, 10);
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0].get("x").map(String::as_str), Some("<urn:x0>"));
    assert!(!rows[0].contains_key("y"));
  }
}
