//! Contracts: the pass/fail oracle attached to a competency question.
//!
//! A contract is a closed set of rule kinds. Each is optional; the validator
//! walks them through [`Contract::rules`], which always yields them in the
//! fixed evaluation order regardless of how the contract was written.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contract {
  /// Column names that must appear in the result's column list.
  #[serde(default)]
  pub required_columns: Vec<String>,
  pub min_rows:         Option<u64>,
  pub max_latency_ms:   Option<u64>,
}

/// A single declared rule, borrowed from a [`Contract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractRule<'a> {
  RequiredColumns(&'a [String]),
  MinRows(u64),
  MaxLatencyMs(u64),
}

impl Contract {
  pub fn new(required_columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
    Self {
      required_columns: required_columns.into_iter().map(Into::into).collect(),
      min_rows:         None,
      max_latency_ms:   None,
    }
  }

  pub fn with_min_rows(mut self, n: u64) -> Self {
    self.min_rows = Some(n);
    self
  }

  pub fn with_max_latency_ms(mut self, ms: u64) -> Self {
    self.max_latency_ms = Some(ms);
    self
  }

  /// Declared rules in evaluation order: columns, then rows, then latency.
  pub fn rules(&self) -> impl Iterator<Item = ContractRule<'_>> {
    let columns = (!self.required_columns.is_empty())
      .then_some(ContractRule::RequiredColumns(&self.required_columns));
    columns
      .into_iter()
      .chain(self.min_rows.map(ContractRule::MinRows))
      .chain(self.max_latency_ms.map(ContractRule::MaxLatencyMs))
  }
}
