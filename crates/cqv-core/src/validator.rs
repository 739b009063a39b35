//! Contract validation: a total, deterministic judgement over an execution
//! outcome.
//!
//! Evaluation order is fixed and observable:
//!
//! 1. execution failure (`compile_error`, `store_unreachable`, `timeout`)
//! 2. `required_columns` → `missing_required_columns`
//! 3. `min_rows` → `min_rows_not_met`
//! 4. `max_latency_ms` → `latency_budget_exceeded`
//!
//! The first failing step wins.

use serde::{Deserialize, Serialize};

use crate::{
  contract::{Contract, ContractRule},
  executor::{ExecError, Execution},
  run::{FailureDetail, ReasonCode},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
  pub pass:   bool,
  pub reason: Option<ReasonCode>,
  pub detail: Option<FailureDetail>,
}

impl Verdict {
  pub fn passed() -> Self { Self { pass: true, reason: None, detail: None } }

  pub fn failed(reason: ReasonCode, detail: FailureDetail) -> Self {
    Self { pass: false, reason: Some(reason), detail: Some(detail) }
  }
}

/// Judge `outcome` against `contract`.
pub fn validate(outcome: &Result<Execution, ExecError>, contract: &Contract) -> Verdict {
  let exec = match outcome {
    Ok(exec) => exec,
    Err(e) => return Verdict::failed(e.reason(), e.detail()),
  };

  for rule in contract.rules() {
    match rule {
      ContractRule::RequiredColumns(required) => {
        let missing: Vec<String> = required
          .iter()
          .filter(|c| !exec.result.columns.contains(c))
          .cloned()
          .collect();
        if !missing.is_empty() {
          return Verdict::failed(
            ReasonCode::MissingRequiredColumns,
            FailureDetail::MissingColumns { missing },
          );
        }
      }
      ContractRule::MinRows(required) => {
        let actual = exec.result.row_count();
        if actual < required {
          return Verdict::failed(
            ReasonCode::MinRowsNotMet,
            FailureDetail::RowCount { actual, required },
          );
        }
      }
      ContractRule::MaxLatencyMs(budget_ms) => {
        let actual_ms = exec.latency_ms();
        if actual_ms > budget_ms {
          return Verdict::failed(
            ReasonCode::LatencyBudgetExceeded,
            FailureDetail::Latency { actual_ms, budget_ms },
          );
        }
      }
    }
  }

  Verdict::passed()
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::graph::{GraphError, QueryResult, Term};

  fn exec(columns: &[&str], rows: usize, latency_ms: u64) -> Result<Execution, ExecError> {
    Ok(Execution {
      result:  QueryResult {
        columns: columns.iter().map(|c| (*c).to_owned()).collect(),
        rows:    (0..rows)
          .map(|i| columns.iter().map(|_| Some(Term::literal(i.to_string()))).collect())
          .collect(),
      },
      latency: Duration::from_millis(latency_ms),
    })
  }

  fn full_contract() -> Contract {
    Contract::new(["x", "y"]).with_min_rows(2).with_max_latency_ms(100)
  }

  #[test]
  fn passes_when_every_rule_holds() {
    assert_eq!(validate(&exec(&["x", "y"], 2, 10), &full_contract()), Verdict::passed());
  }

  #[test]
  fn missing_column_wins_over_latency() {
    let v = validate(&exec(&["x"], 5, 10_000), &full_contract());
    assert_eq!(v.reason, Some(ReasonCode::MissingRequiredColumns));
    assert_eq!(
      v.detail,
      Some(FailureDetail::MissingColumns { missing: vec!["y".into()] })
    );
  }

  #[test]
  fn missing_column_wins_over_row_count() {
    let v = validate(&exec(&["y"], 0, 1), &full_contract());
    assert_eq!(v.reason, Some(ReasonCode::MissingRequiredColumns));
  }

  #[test]
  fn row_count_wins_over_latency() {
    let v = validate(&exec(&["x", "y"], 1, 10_000), &full_contract());
    assert_eq!(v.reason, Some(ReasonCode::MinRowsNotMet));
    assert_eq!(v.detail, Some(FailureDetail::RowCount { actual: 1, required: 2 }));
  }

  #[test]
  fn slow_but_complete_result_exceeds_budget() {
    let v = validate(&exec(&["x", "y"], 3, 250), &full_contract());
    assert_eq!(v.reason, Some(ReasonCode::LatencyBudgetExceeded));
    assert_eq!(
      v.detail,
      Some(FailureDetail::Latency { actual_ms: 250, budget_ms: 100 })
    );
  }

  #[test]
  fn columns_only_contract_accepts_zero_rows() {
    let v = validate(&exec(&["x"], 0, 1), &Contract::new(["x"]));
    assert!(v.pass);
  }

  #[test]
  fn execution_errors_short_circuit() {
    let compile = Err(ExecError::Graph(GraphError::Compile("syntax".into())));
    assert_eq!(validate(&compile, &full_contract()).reason, Some(ReasonCode::CompileError));

    let down = Err(ExecError::Graph(GraphError::Unreachable("refused".into())));
    assert_eq!(validate(&down, &full_contract()).reason, Some(ReasonCode::StoreUnreachable));

    let slow = Err(ExecError::Timeout(Duration::from_secs(1)));
    assert_eq!(validate(&slow, &Contract::default()).reason, Some(ReasonCode::Timeout));
  }
}
