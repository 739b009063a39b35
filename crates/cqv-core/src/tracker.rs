//! Dependency tracking: records what passing runs touched and flags it stale
//! when the ontology changes.
//!
//! The tracker only detects staleness. It never re-executes questions; that
//! is left to [`crate::engine::Engine::revalidate`] or an external scheduler.

use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
  Error, Result,
  dependency::{ChangeNotification, ElementRef, OntologyDependency},
  store::ValidationStore,
};

/// A question whose last passing run against a microtheory relied on an
/// element that has since changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleQuestion {
  pub cq_id:           Uuid,
  /// The passing run that is no longer trustworthy.
  pub last_pass_run:   Uuid,
  pub microtheory_iri: String,
  pub changed:         Vec<String>,
}

pub struct DependencyTracker<S> {
  store: Arc<S>,
}

impl<S> Clone for DependencyTracker<S> {
  fn clone(&self) -> Self { Self { store: self.store.clone() } }
}

impl<S: ValidationStore> DependencyTracker<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Upsert one row per element for a passing run.
  pub async fn record_pass(
    &self,
    microtheory_iri: &str,
    elements: &[ElementRef],
    at: DateTime<Utc>,
  ) -> Result<()> {
    if elements.is_empty() {
      return Ok(());
    }
    self
      .store
      .upsert_dependencies(microtheory_iri, elements, at)
      .await
      .map_err(Error::store)?;
    tracing::debug!(microtheory = microtheory_iri, elements = elements.len(), "dependencies refreshed");
    Ok(())
  }

  /// Flip matching rows to invalid. Returns how many rows changed.
  pub async fn apply(&self, n: &ChangeNotification) -> Result<u64> {
    let changed = self
      .store
      .invalidate_dependencies(n.graph_iri.as_deref(), &n.element_iri, n.change_kind, Utc::now())
      .await
      .map_err(Error::store)?;
    tracing::info!(
      graph = n.graph_iri.as_deref().unwrap_or("*"),
      element = %n.element_iri,
      change = n.change_kind.as_str(),
      invalidated = changed,
      "ontology change applied"
    );
    Ok(changed)
  }

  /// Drain a change feed until every sender is dropped.
  pub async fn run(self, mut rx: mpsc::Receiver<ChangeNotification>) {
    while let Some(n) = rx.recv().await {
      if let Err(e) = self.apply(&n).await {
        tracing::warn!(element = %n.element_iri, error = %e, "failed to apply change notification");
      }
    }
    tracing::debug!("change feed closed");
  }

  pub async fn dependencies(
    &self,
    microtheory_iri: &str,
    stale_only: bool,
  ) -> Result<Vec<OntologyDependency>> {
    self
      .store
      .list_dependencies(microtheory_iri, stale_only)
      .await
      .map_err(Error::store)
  }

  pub async fn for_element(&self, element_iri: &str) -> Result<Vec<OntologyDependency>> {
    self.store.dependencies_for_element(element_iri).await.map_err(Error::store)
  }

  /// Questions whose latest passing run against `microtheory_iri` touched an
  /// element invalidated after that run.
  pub async fn stale_questions(&self, microtheory_iri: &str) -> Result<Vec<StaleQuestion>> {
    let deps = self.dependencies(microtheory_iri, false).await?;
    let mut out = Vec::new();

    let cq_ids = self
      .store
      .questions_passing_in(microtheory_iri)
      .await
      .map_err(Error::store)?;
    for cq_id in cq_ids {
      let Some(run) = self
        .store
        .latest_passing_run(cq_id, microtheory_iri)
        .await
        .map_err(Error::store)?
      else {
        continue;
      };
      let touched: BTreeSet<&str> = run.touched.iter().map(|e| e.iri.as_str()).collect();
      let changed: Vec<String> = deps
        .iter()
        .filter(|d| touched.contains(d.element_iri.as_str()))
        .filter(|d| d.invalidated_at.is_some_and(|at| at >= run.executed_at))
        .map(|d| d.element_iri.clone())
        .collect();
      if !changed.is_empty() {
        out.push(StaleQuestion {
          cq_id,
          last_pass_run: run.run_id,
          microtheory_iri: microtheory_iri.to_owned(),
          changed,
        });
      }
    }
    Ok(out)
  }
}
