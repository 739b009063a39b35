//! The engine facade: wires binder, executor, validator, recorder, manager
//! and tracker into the operations the service surface exposes.

use std::{
  collections::BTreeMap,
  sync::{Arc, OnceLock},
  time::Duration,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use crate::{
  Error, Result, binder,
  dependency::ChangeNotification,
  executor::{ExecError, QueryExecutor},
  extract,
  graph::GraphStore,
  manager::MicrotheoryManager,
  microtheory::{Microtheory, MicrotheoryRef},
  question::{CompetencyQuestion, CqStatus, NewQuestion, ParamValue, QuestionPatch},
  recorder::{self, RunRecorder},
  retry::RetryPolicy,
  run::{CqRun, Page},
  store::{StoreConflict, ValidationStore},
  tracker::{DependencyTracker, StaleQuestion},
  validator::{self, Verdict},
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub query_timeout_ms: u64,
  /// Maximum rows kept in a run preview.
  pub preview_rows:     usize,
  /// Applied to run writes and to re-validation on `store_unreachable`.
  pub retry:            RetryPolicy,
  /// Namespace bound to the empty prefix (`:`) in every query whose template
  /// does not declare one.
  pub ontology_base:    Option<String>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      query_timeout_ms: 30_000,
      preview_rows:     10,
      retry:            RetryPolicy::default(),
      ontology_base:    None,
    }
  }
}

impl EngineConfig {
  pub fn query_timeout(&self) -> Duration { Duration::from_millis(self.query_timeout_ms) }
}

// ─── Request / response types ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
  #[serde(default)]
  pub params:      BTreeMap<String, ParamValue>,
  /// Microtheory id or IRI overriding the question's target.
  pub microtheory: Option<String>,
  #[serde(default = "anonymous")]
  pub executed_by: String,
}

impl Default for ExecuteRequest {
  fn default() -> Self {
    Self { params: BTreeMap::new(), microtheory: None, executed_by: anonymous() }
  }
}

fn anonymous() -> String { "anonymous".to_owned() }

/// A saved question plus authoring-time lint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authored {
  pub question: CompetencyQuestion,
  pub warnings: Vec<String>,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine<S, G> {
  store:    Arc<S>,
  config:   EngineConfig,
  executor: QueryExecutor<G>,
  recorder: RunRecorder<S>,
  manager:  MicrotheoryManager<S, G>,
  tracker:  DependencyTracker<S>,
  feed:     OnceLock<mpsc::Sender<ChangeNotification>>,
}

impl<S: ValidationStore, G: GraphStore> Engine<S, G> {
  pub fn new(store: Arc<S>, graph: Arc<G>, config: EngineConfig) -> Self {
    Self {
      executor: QueryExecutor::new(graph.clone()),
      recorder: RunRecorder::new(store.clone(), config.retry),
      manager: MicrotheoryManager::new(store.clone(), graph),
      tracker: DependencyTracker::new(store.clone()),
      feed: OnceLock::new(),
      store,
      config,
    }
  }

  pub fn config(&self) -> &EngineConfig { &self.config }

  pub fn microtheories(&self) -> &MicrotheoryManager<S, G> { &self.manager }

  pub fn tracker(&self) -> &DependencyTracker<S> { &self.tracker }

  // ── Questions ─────────────────────────────────────────────────────────

  pub async fn create_question(&self, input: NewQuestion) -> Result<Authored> {
    binder::check_template(&input.template).map_err(Error::InvalidTemplate)?;
    binder::validate_schema(&input.params).map_err(Error::InvalidParameterSchema)?;

    let now = Utc::now();
    let question = CompetencyQuestion {
      cq_id:               Uuid::new_v4(),
      project_id:          input.project_id,
      name:                input.name,
      statement:           input.statement,
      params:              input.params,
      template:            input.template,
      default_microtheory: input.default_microtheory,
      contract:            input.contract,
      status:              input.status,
      version:             1,
      created_by:          input.created_by,
      created_at:          now,
      updated_at:          now,
    };

    if let Err(e) = self.store.create_question(question.clone()).await {
      return Err(self.question_conflict(e, &question));
    }
    tracing::info!(cq_id = %question.cq_id, name = %question.name, "question created");

    let warnings = binder::lint(&question.template, &question.params);
    Ok(Authored { question, warnings })
  }

  pub async fn get_question(&self, cq_id: Uuid) -> Result<CompetencyQuestion> {
    self
      .store
      .get_question(cq_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::QuestionNotFound(cq_id))
  }

  pub async fn list_questions(&self, project_id: Option<&str>) -> Result<Vec<CompetencyQuestion>> {
    self.store.list_questions(project_id).await.map_err(Error::store)
  }

  /// Patch a question. Template, schema and contract edits bump its version.
  pub async fn update_question(&self, cq_id: Uuid, patch: QuestionPatch) -> Result<Authored> {
    let mut question = self.get_question(cq_id).await?;
    if question.status == CqStatus::Deprecated {
      return Err(Error::QuestionDeprecated(cq_id));
    }
    if let Some(template) = &patch.template {
      binder::check_template(template).map_err(Error::InvalidTemplate)?;
    }
    if let Some(params) = &patch.params {
      binder::validate_schema(params).map_err(Error::InvalidParameterSchema)?;
    }

    let bumped = patch.apply(&mut question, Utc::now());
    if let Err(e) = self.store.update_question(question.clone()).await {
      return Err(self.question_conflict(e, &question));
    }
    tracing::info!(cq_id = %cq_id, version = question.version, bumped, "question updated");

    let warnings = binder::lint(&question.template, &question.params);
    Ok(Authored { question, warnings })
  }

  pub async fn set_status(&self, cq_id: Uuid, status: CqStatus) -> Result<CompetencyQuestion> {
    let mut question = self.get_question(cq_id).await?;
    if question.status == status {
      return Ok(question);
    }
    if !question.status.can_transition_to(status) {
      return Err(Error::InvalidStatusTransition { from: question.status, to: status });
    }

    let now = Utc::now();
    self.store.set_question_status(cq_id, status, now).await.map_err(Error::store)?;
    tracing::info!(cq_id = %cq_id, from = %question.status, to = %status, "question status changed");
    question.status = status;
    question.updated_at = now;
    Ok(question)
  }

  pub async fn deprecate(&self, cq_id: Uuid) -> Result<CompetencyQuestion> {
    self.set_status(cq_id, CqStatus::Deprecated).await
  }

  /// Hard delete, allowed only while the question has no history.
  pub async fn delete_question(&self, cq_id: Uuid) -> Result<()> {
    self.get_question(cq_id).await?;
    if self.store.count_runs(cq_id).await.map_err(Error::store)? > 0 {
      return Err(Error::QuestionHasRuns(cq_id));
    }
    self.store.delete_question(cq_id).await.map_err(Error::store)?;
    tracing::info!(cq_id = %cq_id, "question deleted");
    Ok(())
  }

  fn question_conflict(&self, e: S::Error, cq: &CompetencyQuestion) -> Error {
    if e.is_conflict() {
      Error::DuplicateQuestionName { project_id: cq.project_id.clone(), name: cq.name.clone() }
    } else {
      Error::store(e)
    }
  }

  // ── Execution ─────────────────────────────────────────────────────────

  /// Bind, execute, judge and record one run.
  ///
  /// Requests rejected before binding (unknown or deprecated question, no
  /// resolvable target, a target from another project) produce no run. Every other outcome produces exactly
  /// one, returned once it is durably recorded.
  pub async fn execute(&self, cq_id: Uuid, req: ExecuteRequest) -> Result<CqRun> {
    let question = self.get_question(cq_id).await?;
    if question.status == CqStatus::Deprecated {
      return Err(Error::QuestionDeprecated(cq_id));
    }
    let target = self.resolve_target(&question, req.microtheory.as_deref()).await?;
    self
      .run_once(&question, &target, &req.params, req.executed_by, RetryPolicy::no_retry())
      .await
  }

  /// Override, then the question's default, then the project's default. The
  /// target must belong to the question's project.
  async fn resolve_target(
    &self,
    question: &CompetencyQuestion,
    override_ref: Option<&str>,
  ) -> Result<Microtheory> {
    if let Some(r) = override_ref.or(question.default_microtheory.as_deref()) {
      let mt = self.manager.resolve(&MicrotheoryRef::parse(r)).await?;
      if mt.project_id != question.project_id {
        return Err(Error::MicrotheoryOutsideProject {
          microtheory: mt.iri,
          expected:    question.project_id.clone(),
          actual:      mt.project_id,
        });
      }
      return Ok(mt);
    }
    self
      .manager
      .project_default(&question.project_id)
      .await?
      .ok_or(Error::NoTargetMicrotheory)
  }

  async fn run_once(
    &self,
    question: &CompetencyQuestion,
    target: &Microtheory,
    supplied: &BTreeMap<String, ParamValue>,
    executed_by: String,
    retry: RetryPolicy,
  ) -> Result<CqRun> {
    let params = binder::effective_params(&question.params, supplied);
    let mut run = CqRun {
      run_id: Uuid::new_v4(),
      cq_id: question.cq_id,
      cq_version: question.version,
      project_id: question.project_id.clone(),
      microtheory_iri: target.iri.clone(),
      params,
      bound_query: None,
      query_hash: None,
      pass: false,
      reason: None,
      detail: None,
      warnings: Vec::new(),
      row_count: None,
      columns: Vec::new(),
      preview: Vec::new(),
      latency_ms: None,
      touched: Vec::new(),
      executed_by,
      executed_at: Utc::now(),
    };

    let verdict = match binder::bind(&question.template, &question.params, &run.params) {
      Err(e) => Verdict::failed(e.reason(), e.detail()),
      Ok(mut bound) => {
        if let Some(base) = &self.config.ontology_base {
          bound.query = binder::with_default_prefix(bound.query, base);
        }
        let timeout = self.config.query_timeout();
        let outcome = retry
          .run(
            || self.executor.execute(&target.iri, &bound.query, timeout),
            |e: &ExecError| e.reason().is_transient(),
          )
          .await;
        let verdict = validator::validate(&outcome, &question.contract);

        if let Ok(exec) = &outcome {
          run.row_count = Some(exec.result.row_count());
          run.columns = exec.result.columns.clone();
          run.preview = recorder::preview(&exec.result, self.config.preview_rows);
          run.latency_ms = Some(exec.latency_ms());
          if verdict.pass {
            run.touched = extract::extract(&bound.query, &exec.result);
          }
        }
        run.query_hash = Some(recorder::query_hash(&bound.query));
        run.bound_query = Some(bound.query);
        run.warnings = bound.warnings;
        verdict
      }
    };
    run.pass = verdict.pass;
    run.reason = verdict.reason;
    run.detail = verdict.detail;
    run.executed_at = Utc::now();

    let run = self.recorder.record(run).await?;
    log_outcome(&run);

    if run.pass
      && let Err(e) = self
        .tracker
        .record_pass(&run.microtheory_iri, &run.touched, run.executed_at)
        .await
    {
      tracing::warn!(run_id = %run.run_id, error = %e, "dependencies not refreshed");
    }
    Ok(run)
  }

  // ── History ───────────────────────────────────────────────────────────

  /// Runs of a question, newest first.
  pub async fn list_runs(&self, cq_id: Uuid, page: Page) -> Result<Vec<CqRun>> {
    self.get_question(cq_id).await?;
    self.store.list_runs(cq_id, page).await.map_err(Error::store)
  }

  pub async fn get_run(&self, run_id: Uuid) -> Result<CqRun> {
    self
      .store
      .get_run(run_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::RunNotFound(run_id))
  }

  pub async fn latest_run(&self, cq_id: Uuid) -> Result<Option<CqRun>> {
    let runs = self.list_runs(cq_id, Page { limit: 1, offset: 0 }).await?;
    Ok(runs.into_iter().next())
  }

  // ── Staleness ─────────────────────────────────────────────────────────

  pub async fn notify(&self, n: &ChangeNotification) -> Result<u64> { self.tracker.apply(n).await }

  pub async fn stale_questions(&self, mt: &MicrotheoryRef) -> Result<Vec<StaleQuestion>> {
    let mt = self.manager.resolve(mt).await?;
    self.tracker.stale_questions(&mt.iri).await
  }

  /// Re-execute every stale question against `mt` with the parameters of its
  /// last passing run. Only `store_unreachable` is retried.
  pub async fn revalidate(&self, mt: &MicrotheoryRef) -> Result<Vec<CqRun>> {
    let mt = self.manager.resolve(mt).await?;
    let stale = self.tracker.stale_questions(&mt.iri).await?;
    tracing::info!(microtheory = %mt.iri, stale = stale.len(), "revalidating");

    let mut runs = Vec::with_capacity(stale.len());
    for s in stale {
      let question = match self.get_question(s.cq_id).await {
        Ok(q) if q.status != CqStatus::Deprecated => q,
        Ok(_) => continue,
        Err(Error::QuestionNotFound(_)) => continue,
        Err(e) => return Err(e),
      };
      let last_pass = self.get_run(s.last_pass_run).await?;
      let run = self
        .run_once(&question, &mt, &last_pass.params, "revalidation".to_owned(), self.config.retry)
        .await?;
      runs.push(run);
    }
    Ok(runs)
  }
}

// ─── Change feed ─────────────────────────────────────────────────────────────

impl<S: ValidationStore + 'static, G: GraphStore> Engine<S, G> {
  /// Spawn the change-feed consumer. Returns `None` if one is already running.
  pub fn start_change_feed(&self, capacity: usize) -> Option<JoinHandle<()>> {
    let (tx, rx) = mpsc::channel(capacity);
    self.feed.set(tx).ok()?;
    tracing::info!(capacity, "change feed started");
    Some(tokio::spawn(self.tracker.clone().run(rx)))
  }

  /// Queue notifications on the change feed, or apply them inline when no
  /// feed is running. Returns how many were accepted.
  pub async fn enqueue(&self, batch: Vec<ChangeNotification>) -> Result<usize> {
    let accepted = batch.len();
    match self.feed.get() {
      Some(tx) => {
        for n in batch {
          tx.send(n).await.map_err(|_| Error::ChangeFeedClosed)?;
        }
      }
      None => {
        for n in &batch {
          self.tracker.apply(n).await?;
        }
      }
    }
    Ok(accepted)
  }
}

fn log_outcome(run: &CqRun) {
  match run.reason {
    None => tracing::info!(
      cq_id = %run.cq_id,
      microtheory = %run.microtheory_iri,
      latency_ms = run.latency_ms,
      "question passed"
    ),
    Some(reason) if reason.is_contract_failure() => tracing::info!(
      cq_id = %run.cq_id,
      microtheory = %run.microtheory_iri,
      reason = %reason,
      "question failed its contract"
    ),
    Some(reason) => tracing::warn!(
      cq_id = %run.cq_id,
      microtheory = %run.microtheory_iri,
      reason = %reason,
      "question did not execute"
    ),
  }
}
