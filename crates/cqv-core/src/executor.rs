//! Query execution against a single microtheory, under an explicit timeout.
//!
//! The executor never retries. A hung graph store surfaces as
//! [`ExecError::Timeout`]; the caller is never left waiting.
//!
//! On timeout the store's future is dropped. Whether the store stops working
//! at that point is up to the [`GraphStore`]: an HTTP request is aborted, the
//! embedded store stops at its next result row.

use std::{
  sync::Arc,
  time::{Duration, Instant},
};

use thiserror::Error;

use crate::{
  graph::{GraphError, GraphStore, QueryResult},
  run::{FailureDetail, ReasonCode},
};

/// A materialised result and the wall-clock time it took to produce.
#[derive(Debug, Clone)]
pub struct Execution {
  pub result:  QueryResult,
  pub latency: Duration,
}

impl Execution {
  pub fn latency_ms(&self) -> u64 { duration_ms(self.latency) }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error("query exceeded timeout of {}ms", .0.as_millis())]
  Timeout(Duration),
}

impl ExecError {
  pub fn reason(&self) -> ReasonCode {
    match self {
      Self::Graph(e) => e.reason(),
      Self::Timeout(_) => ReasonCode::Timeout,
    }
  }

  pub fn detail(&self) -> FailureDetail {
    match self {
      Self::Graph(e) => FailureDetail::Store { message: e.to_string() },
      Self::Timeout(t) => FailureDetail::Timeout { timeout_ms: duration_ms(*t) },
    }
  }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
  u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Dispatches bound queries to the graph store.
pub struct QueryExecutor<G> {
  graph: Arc<G>,
}

impl<G> Clone for QueryExecutor<G> {
  fn clone(&self) -> Self { Self { graph: self.graph.clone() } }
}

impl<G: GraphStore> QueryExecutor<G> {
  pub fn new(graph: Arc<G>) -> Self { Self { graph } }

  /// Evaluate `query` against `microtheory`. Latency is measured from
  /// dispatch until the full result is materialised.
  pub async fn execute(
    &self,
    microtheory: &str,
    query: &str,
    timeout: Duration,
  ) -> Result<Execution, ExecError> {
    let started = Instant::now();
    let result = tokio::time::timeout(timeout, self.graph.query(microtheory, query))
      .await
      .map_err(|_| ExecError::Timeout(timeout))??;
    let latency = started.elapsed();

    tracing::debug!(
      microtheory,
      rows = result.rows.len(),
      latency_ms = duration_ms(latency),
      "query executed"
    );
    Ok(Execution { result, latency })
  }
}
