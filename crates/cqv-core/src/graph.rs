//! The `GraphStore` trait: the external store that holds microtheory content
//! and evaluates bound queries against a single named graph.
//!
//! Implemented by `cqv-graph` (in-process oxigraph and SPARQL-over-HTTP).

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::run::ReasonCode;

// ─── Terms ───────────────────────────────────────────────────────────────────

/// A single bound value in a result row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Term {
  Iri {
    value: String,
  },
  Literal {
    value:    String,
    datatype: Option<String>,
    lang:     Option<String>,
  },
  BlankNode {
    value: String,
  },
}

impl Term {
  pub fn iri(value: impl Into<String>) -> Self { Self::Iri { value: value.into() } }

  pub fn literal(value: impl Into<String>) -> Self {
    Self::Literal { value: value.into(), datatype: None, lang: None }
  }

  pub fn as_iri(&self) -> Option<&str> {
    match self {
      Self::Iri { value } => Some(value),
      _ => None,
    }
  }

  pub fn is_literal(&self) -> bool { matches!(self, Self::Literal { .. }) }

  /// Compact display form used in run previews.
  pub fn display(&self) -> String {
    match self {
      Self::Iri { value } => format!("<{value}>"),
      Self::BlankNode { value } => format!("_:{value}"),
      Self::Literal { value, lang: Some(lang), .. } => format!("{value:?}@{lang}"),
      Self::Literal { value, datatype: Some(dt), .. } => format!("{value:?}^^<{dt}>"),
      Self::Literal { value, .. } => format!("{value:?}"),
    }
  }
}

// ─── Results ─────────────────────────────────────────────────────────────────

/// Tabular query output: an ordered column list and rows aligned to it.
/// Unbound cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
  pub columns: Vec<String>,
  pub rows:    Vec<Vec<Option<Term>>>,
}

impl QueryResult {
  pub fn row_count(&self) -> u64 { self.rows.len() as u64 }

  pub fn column_index(&self, name: &str) -> Option<usize> {
    self.columns.iter().position(|c| c == name)
  }

  /// Every bound value in column `name`.
  pub fn column_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Term> + 'a {
    let idx = self.column_index(name);
    self
      .rows
      .iter()
      .filter_map(move |row| idx.and_then(|i| row.get(i)).and_then(Option::as_ref))
  }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// A structured failure from the graph store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
  /// Transport or connection failure; transient.
  #[error("graph store unreachable: {0}")]
  Unreachable(String),

  /// The store rejected the query text itself.
  #[error("query rejected by graph store: {0}")]
  Compile(String),

  #[error("named graph not found: {0}")]
  GraphNotFound(String),

  /// The store accepted the request but failed while serving it.
  #[error("graph storage failure: {0}")]
  Storage(String),

  /// Seed or load content could not be parsed.
  #[error("invalid graph content: {0}")]
  InvalidContent(String),
}

impl GraphError {
  pub fn reason(&self) -> ReasonCode {
    match self {
      Self::Compile(_) => ReasonCode::CompileError,
      Self::Unreachable(_)
      | Self::GraphNotFound(_)
      | Self::Storage(_)
      | Self::InvalidContent(_) => ReasonCode::StoreUnreachable,
    }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the external graph store.
///
/// Graph identities are absolute IRIs. Every query is evaluated with exactly
/// one named graph as its default graph.
pub trait GraphStore: Send + Sync {
  /// Evaluate `query` with `graph` as the default graph.
  fn query<'a>(
    &'a self,
    graph: &'a str,
    query: &'a str,
  ) -> impl Future<Output = Result<QueryResult, GraphError>> + Send + 'a;

  /// Create an empty named graph. Creating an existing graph is a no-op.
  fn create_graph<'a>(
    &'a self,
    graph: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a;

  /// Parse `turtle` and add its triples to `graph`.
  fn load_turtle<'a>(
    &'a self,
    graph: &'a str,
    turtle: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a;

  /// Replace the content of `target` with a snapshot of `source`.
  fn copy_graph<'a>(
    &'a self,
    source: &'a str,
    target: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a;

  /// Remove `graph` and all of its content. Dropping a missing graph is a
  /// no-op.
  fn drop_graph<'a>(
    &'a self,
    graph: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a;
}
