//! Router tests against an in-memory SQLite store and oxigraph store.

use std::{
  collections::VecDeque,
  future::Future,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use cqv_core::{
  dependency::{ChangeKind, ChangeNotification},
  engine::{Engine, EngineConfig},
  graph::{GraphError, GraphStore, QueryResult},
  retry::RetryPolicy,
};
use cqv_graph::OxigraphStore;
use cqv_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::api_router;

const VEHICLE: &str = "http://example.org/Vehicle";

async fn app() -> Router { app_with(EngineConfig::default()).await }

async fn app_with(config: EngineConfig) -> Router {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let graph = Arc::new(OxigraphStore::in_memory().unwrap());
  api_router(Arc::new(Engine::new(store, graph, config)))
}

// ── Fault injection ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Fault {
  Unreachable,
  Compile,
  Hang,
}

/// An oxigraph store whose next queries fail in scripted ways.
struct Scripted {
  inner:      OxigraphStore,
  faults:     Mutex<VecDeque<Fault>>,
  fail_drops: AtomicBool,
}

impl Scripted {
  fn inject(&self, faults: &[Fault]) { self.faults.lock().unwrap().extend(faults); }

  fn pending(&self) -> usize { self.faults.lock().unwrap().len() }
}

impl GraphStore for Scripted {
  fn query<'a>(
    &'a self,
    graph: &'a str,
    query: &'a str,
  ) -> impl Future<Output = Result<QueryResult, GraphError>> + Send + 'a {
    async move {
      let fault = self.faults.lock().unwrap().pop_front();
      match fault {
        Some(Fault::Unreachable) => Err(GraphError::Unreachable("connection refused".into())),
        Some(Fault::Compile) => Err(GraphError::Compile("parse error".into())),
        Some(Fault::Hang) => {
          tokio::time::sleep(Duration::from_secs(3600)).await;
          Ok(QueryResult::default())
        }
        None => self.inner.query(graph, query).await,
      }
    }
  }

  fn create_graph<'a>(
    &'a self,
    graph: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a {
    self.inner.create_graph(graph)
  }

  fn load_turtle<'a>(
    &'a self,
    graph: &'a str,
    turtle: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a {
    self.inner.load_turtle(graph, turtle)
  }

  fn copy_graph<'a>(
    &'a self,
    source: &'a str,
    target: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a {
    self.inner.copy_graph(source, target)
  }

  fn drop_graph<'a>(
    &'a self,
    graph: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a {
    async move {
      if self.fail_drops.load(Ordering::SeqCst) {
        return Err(GraphError::Unreachable("connection reset".into()));
      }
      self.inner.drop_graph(graph).await
    }
  }
}

type ScriptedEngine = Engine<SqliteStore, Scripted>;

async fn scripted_app() -> (Router, Arc<ScriptedEngine>, Arc<Scripted>) {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let graph = Arc::new(Scripted {
    inner:      OxigraphStore::in_memory().unwrap(),
    faults:     Mutex::new(VecDeque::new()),
    fail_drops: AtomicBool::new(false),
  });
  let config = EngineConfig {
    query_timeout_ms: 50,
    preview_rows:     10,
    retry:            RetryPolicy { max_attempts: 3, initial_backoff_ms: 1, max_backoff_ms: 5 },
    ontology_base:    None,
  };
  let engine = Arc::new(Engine::new(store, graph.clone(), config));
  (api_router(engine.clone()), engine, graph)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
  let resp = app.clone().oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
  (status, body)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let builder = Request::builder().method(method).uri(uri);
  let req = match body {
    Some(v) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(v.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };
  send(app, req).await
}

async fn load(app: &Router, mt: &str, turtle: &str) -> StatusCode {
  let req = Request::builder()
    .method("POST")
    .uri(format!("/microtheories/{mt}/load"))
    .header(header::CONTENT_TYPE, "text/turtle")
    .body(Body::from(turtle.to_owned()))
    .unwrap();
  send(app, req).await.0
}

async fn microtheory(app: &Router, project: &str, label: &str, make_default: bool) -> Value {
  let (status, mt) = call(
    app,
    "POST",
    "/microtheories",
    Some(json!({ "project_id": project, "label": label, "make_default": make_default })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{mt}");
  mt
}

/// "Which vehicles exist?": at least one row with an `x` column.
async fn vehicle_question(app: &Router, project: &str) -> String {
  let (status, body) = call(
    app,
    "POST",
    "/questions",
    Some(json!({
      "project_id": project,
      "name": "vehicles-exist",
      "statement": "Which vehicles exist?",
      "params": [{ "name": "type", "kind": "iri" }],
      "template": "PREFIX : <http://example.org/> SELECT ?x WHERE { ?x a {{type}} }",
      "contract": { "required_columns": ["x"], "min_rows": 1 },
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  body["question"]["cq_id"].as_str().unwrap().to_owned()
}

async fn execute(app: &Router, cq: &str) -> Value {
  let (status, run) = call(
    app,
    "POST",
    &format!("/questions/{cq}/execute"),
    Some(json!({ "params": { "type": "Vehicle" } })),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{run}");
  run
}

// ── Questions ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_reports_lint_and_rejects_duplicates() {
  let app = app().await;
  let (status, body) = call(
    &app,
    "POST",
    "/questions",
    Some(json!({
      "project_id": "p1",
      "name": "q",
      "params": [{ "name": "unused", "kind": "string" }],
      "template": "SELECT ?x WHERE { ?x ?p ?o }",
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["question"]["status"], "draft");
  assert_eq!(body["question"]["version"], 1);
  assert!(!body["warnings"].as_array().unwrap().is_empty(), "{body}");

  let (status, body) = call(
    &app,
    "POST",
    "/questions",
    Some(json!({ "project_id": "p1", "name": "q", "template": "SELECT * WHERE { ?s ?p ?o }" })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["code"], "duplicate_question_name");
}

#[tokio::test]
async fn unbalanced_template_is_rejected() {
  let app = app().await;
  let (status, body) = call(
    &app,
    "POST",
    "/questions",
    Some(json!({ "project_id": "p1", "name": "q", "template": "SELECT ?x WHERE { ?x a {{type }" })),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["code"], "invalid_template");
}

#[tokio::test]
async fn status_lifecycle_and_deprecation() {
  let app = app().await;
  microtheory(&app, "p1", "main", true).await;
  let cq = vehicle_question(&app, "p1").await;

  let (status, q) =
    call(&app, "POST", &format!("/questions/{cq}/status"), Some(json!({ "status": "active" }))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(q["status"], "active");

  let (status, body) =
    call(&app, "POST", &format!("/questions/{cq}/status"), Some(json!({ "status": "draft" }))).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["code"], "invalid_status_transition");

  let (status, q) = call(&app, "POST", &format!("/questions/{cq}/deprecate"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(q["status"], "deprecated");

  let (status, body) = call(
    &app,
    "POST",
    &format!("/questions/{cq}/execute"),
    Some(json!({ "params": { "type": "Vehicle" } })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["code"], "question_deprecated");

  // Rejected before binding: no run exists.
  let (_, runs) = call(&app, "GET", &format!("/questions/{cq}/runs"), None).await;
  assert_eq!(runs, json!([]));
}

#[tokio::test]
async fn editing_the_template_bumps_the_version() {
  let app = app().await;
  let cq = vehicle_question(&app, "p1").await;

  let (_, body) =
    call(&app, "PATCH", &format!("/questions/{cq}"), Some(json!({ "statement": "Vehicles?" }))).await;
  assert_eq!(body["question"]["version"], 1);

  let (status, body) = call(
    &app,
    "PATCH",
    &format!("/questions/{cq}"),
    Some(json!({ "contract": { "required_columns": ["x"], "min_rows": 2 } })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["question"]["version"], 2);
  assert_eq!(body["question"]["statement"], "Vehicles?");
}

#[tokio::test]
async fn questions_with_runs_cannot_be_deleted() {
  let app = app().await;
  microtheory(&app, "p1", "main", true).await;
  let cq = vehicle_question(&app, "p1").await;
  execute(&app, &cq).await;

  let (status, body) = call(&app, "DELETE", &format!("/questions/{cq}"), None).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["code"], "question_has_runs");

  let other = {
    let (_, body) = call(
      &app,
      "POST",
      "/questions",
      Some(json!({ "project_id": "p1", "name": "unused", "template": "ASK { ?s ?p ?o }" })),
    )
    .await;
    body["question"]["cq_id"].as_str().unwrap().to_owned()
  };
  let (status, _) = call(&app, "DELETE", &format!("/questions/{other}"), None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);
  let (status, body) = call(&app, "GET", &format!("/questions/{other}"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["code"], "question_not_found");
}

// ── Execution ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn vehicle_question_fails_then_passes_once_data_exists() {
  let app = app().await;
  let mt = microtheory(&app, "p1", "main", true).await;
  let mt_id = mt["mt_id"].as_str().unwrap();
  let cq = vehicle_question(&app, "p1").await;

  let run = execute(&app, &cq).await;
  assert_eq!(run["pass"], false);
  assert_eq!(run["reason"], "min_rows_not_met");
  assert_eq!(run["row_count"], 0);
  assert_eq!(run["microtheory_iri"], mt["iri"]);
  assert_eq!(run["touched"], json!([]));

  let turtle = "<http://example.org/car1> a <http://example.org/Vehicle> .";
  assert_eq!(load(&app, mt_id, turtle).await, StatusCode::OK);

  let run = execute(&app, &cq).await;
  assert_eq!(run["pass"], true, "{run}");
  assert_eq!(run["reason"], Value::Null);
  assert_eq!(run["row_count"], 1);
  assert_eq!(run["columns"], json!(["x"]));
  assert_eq!(run["cq_version"], 1);
  assert_eq!(run["query_hash"].as_str().unwrap().len(), 64);
  assert!(run["touched"].as_array().unwrap().contains(&json!({ "iri": VEHICLE, "kind": "class" })));

  let (_, deps) = call(&app, "GET", &format!("/microtheories/{mt_id}/dependencies"), None).await;
  let vehicle = deps.as_array().unwrap().iter().find(|d| d["element_iri"] == VEHICLE).unwrap();
  assert_eq!(vehicle["element_kind"], "class");
  assert_eq!(vehicle["is_valid"], true);

  let (status, runs) = call(&app, "GET", &format!("/questions/{cq}/runs"), None).await;
  assert_eq!(status, StatusCode::OK);
  let runs = runs.as_array().unwrap();
  assert_eq!(runs.len(), 2);
  assert_eq!(runs[0]["pass"], true);
  assert_eq!(runs[1]["pass"], false);

  let (_, latest) = call(&app, "GET", &format!("/questions/{cq}/runs/latest"), None).await;
  assert_eq!(latest["run_id"], runs[0]["run_id"]);

  let (_, page) = call(&app, "GET", &format!("/questions/{cq}/runs?limit=1&offset=1"), None).await;
  assert_eq!(page.as_array().unwrap().len(), 1);
  assert_eq!(page[0]["run_id"], runs[1]["run_id"]);
}

#[tokio::test]
async fn no_target_is_rejected_before_any_run() {
  let app = app().await;
  let cq = vehicle_question(&app, "p1").await;

  let (status, body) = call(
    &app,
    "POST",
    &format!("/questions/{cq}/execute"),
    Some(json!({ "params": { "type": "Vehicle" } })),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["code"], "no_target_microtheory");

  let (_, latest) = call(&app, "GET", &format!("/questions/{cq}/runs/latest"), None).await;
  assert_eq!(latest, Value::Null);
}

#[tokio::test]
async fn missing_parameter_is_a_recorded_binder_failure() {
  let app = app().await;
  microtheory(&app, "p1", "main", true).await;
  let cq = vehicle_question(&app, "p1").await;

  let (status, run) =
    call(&app, "POST", &format!("/questions/{cq}/execute"), Some(json!({}))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(run["pass"], false);
  assert_eq!(run["reason"], "binder_unbound_parameter");
  assert_eq!(run["bound_query"], Value::Null);

  let (status, fetched) =
    call(&app, "GET", &format!("/runs/{}", run["run_id"].as_str().unwrap()), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(fetched["reason"], "binder_unbound_parameter");
}

#[tokio::test]
async fn override_targets_a_named_microtheory() {
  let app = app().await;
  microtheory(&app, "p1", "empty", true).await;
  let full = microtheory(&app, "p1", "full", false).await;
  load(
    &app,
    full["mt_id"].as_str().unwrap(),
    "<http://example.org/car1> a <http://example.org/Vehicle> .",
  )
  .await;
  let cq = vehicle_question(&app, "p1").await;

  let run = execute(&app, &cq).await;
  assert_eq!(run["pass"], false);

  let (_, run) = call(
    &app,
    "POST",
    &format!("/questions/{cq}/execute"),
    Some(json!({ "params": { "type": "Vehicle" }, "microtheory": full["iri"] })),
  )
  .await;
  assert_eq!(run["pass"], true, "{run}");
  assert_eq!(run["microtheory_iri"], full["iri"]);
}

#[tokio::test]
async fn targets_from_another_project_are_rejected() {
  let app = app().await;
  microtheory(&app, "p1", "main", true).await;
  let foreign = microtheory(&app, "p2", "main", true).await;
  load(
    &app,
    foreign["mt_id"].as_str().unwrap(),
    "<http://example.org/car1> a <http://example.org/Vehicle> .",
  )
  .await;
  let cq = vehicle_question(&app, "p1").await;

  let (status, body) = call(
    &app,
    "POST",
    &format!("/questions/{cq}/execute"),
    Some(json!({ "params": { "type": "Vehicle" }, "microtheory": foreign["iri"] })),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["code"], "microtheory_outside_project");

  let (_, latest) = call(&app, "GET", &format!("/questions/{cq}/runs/latest"), None).await;
  assert_eq!(latest, Value::Null);
}

#[tokio::test]
async fn bare_names_resolve_against_the_ontology_base() {
  const ONTO_VEHICLE: &str = "http://example.org/onto#Vehicle";
  let app = app_with(EngineConfig {
    ontology_base: Some("http://example.org/onto#".into()),
    ..EngineConfig::default()
  })
  .await;
  let mt = microtheory(&app, "p1", "main", true).await;
  let mt_id = mt["mt_id"].as_str().unwrap();
  let (status, body) = call(
    &app,
    "POST",
    "/questions",
    Some(json!({
      "project_id": "p1",
      "name": "vehicles-exist",
      "params": [{ "name": "type", "kind": "iri" }],
      "template": "SELECT ?x WHERE { ?x a {{type}} }",
      "contract": { "required_columns": ["x"], "min_rows": 1 },
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  let cq = body["question"]["cq_id"].as_str().unwrap().to_owned();

  let run = execute(&app, &cq).await;
  assert_eq!(run["pass"], false);
  assert_eq!(run["reason"], "min_rows_not_met");

  let turtle = "<http://example.org/onto#car1> a <http://example.org/onto#Vehicle> .";
  assert_eq!(load(&app, mt_id, turtle).await, StatusCode::OK);
  let passing = execute(&app, &cq).await;
  assert_eq!(passing["pass"], true, "{passing}");
  assert_eq!(passing["row_count"], 1);

  let (_, deps) = call(&app, "GET", &format!("/microtheories/{mt_id}/dependencies"), None).await;
  let vehicle = deps.as_array().unwrap().iter().find(|d| d["element_iri"] == ONTO_VEHICLE).unwrap();
  assert_eq!(vehicle["element_kind"], "class");
  assert_eq!(vehicle["is_valid"], true);

  let (status, _) = call(
    &app,
    "POST",
    "/notifications",
    Some(json!({ "element_iri": ONTO_VEHICLE, "change_kind": "removed" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let (_, stale) =
    call(&app, "GET", &format!("/microtheories/{mt_id}/dependencies?stale_only=true"), None).await;
  assert_eq!(stale[0]["element_iri"], ONTO_VEHICLE);
  assert_eq!(stale[0]["is_valid"], false);

  let (_, runs) = call(&app, "GET", &format!("/questions/{cq}/runs"), None).await;
  let runs = runs.as_array().unwrap();
  assert_eq!(runs.len(), 2);
  assert_eq!(runs[0]["run_id"], passing["run_id"]);
  assert_eq!(runs[0]["pass"], true);
}

#[tokio::test]
async fn unknown_run_is_404() {
  let app = app().await;
  let (status, body) =
    call(&app, "GET", "/runs/00000000-0000-4000-8000-000000000000", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["code"], "run_not_found");
}

// ── Microtheories ────────────────────────────────────────────────────────────

#[tokio::test]
async fn default_moves_and_labels_are_unique() {
  let app = app().await;
  let a = microtheory(&app, "p1", "a", true).await;
  let b = microtheory(&app, "p1", "b", false).await;
  assert_eq!(a["is_default"], true);

  let (status, _) = call(
    &app,
    "POST",
    "/microtheories",
    Some(json!({ "project_id": "p1", "label": "a" })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);

  let (status, b) =
    call(&app, "POST", &format!("/microtheories/{}/default", b["mt_id"].as_str().unwrap()), None)
      .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(b["is_default"], true);

  let (_, list) = call(&app, "GET", "/microtheories?project_id=p1", None).await;
  let defaults: Vec<_> =
    list.as_array().unwrap().iter().filter(|m| m["is_default"] == true).collect();
  assert_eq!(defaults.len(), 1);
  assert_eq!(defaults[0]["label"], "b");
}

#[tokio::test]
async fn clone_is_independent_of_its_parent() {
  let app = app().await;
  let base = microtheory(&app, "p1", "base", true).await;
  let base_id = base["mt_id"].as_str().unwrap();
  load(&app, base_id, "<http://example.org/car1> a <http://example.org/Vehicle> .").await;

  let (status, copy) = call(
    &app,
    "POST",
    &format!("/microtheories/{base_id}/clone"),
    Some(json!({ "label": "experiment" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(copy["parent_iri"], base["iri"]);
  assert_eq!(copy["is_default"], false);

  let cq = vehicle_question(&app, "p1").await;
  let (status, _) =
    call(&app, "DELETE", &format!("/microtheories/{base_id}"), None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);

  let (_, run) = call(
    &app,
    "POST",
    &format!("/questions/{cq}/execute"),
    Some(json!({ "params": { "type": "Vehicle" }, "microtheory": copy["mt_id"] })),
  )
  .await;
  assert_eq!(run["pass"], true, "{run}");

  let (status, _) = call(&app, "GET", &format!("/microtheories/{base_id}"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_turtle_is_a_bad_request() {
  let app = app().await;
  let mt = microtheory(&app, "p1", "main", true).await;
  let req = Request::builder()
    .method("POST")
    .uri(format!("/microtheories/{}/load", mt["mt_id"].as_str().unwrap()))
    .body(Body::from("this is not turtle"))
    .unwrap();
  let (status, body) = send(&app, req).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["code"], "invalid_graph_content");
}

#[tokio::test]
async fn deleting_survives_a_failed_graph_drop() {
  let (app, _, graph) = scripted_app().await;
  let mt = microtheory(&app, "p1", "main", true).await;
  let mt_id = mt["mt_id"].as_str().unwrap();

  graph.fail_drops.store(true, Ordering::SeqCst);
  let (status, _) = call(&app, "DELETE", &format!("/microtheories/{mt_id}"), None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);

  let (status, _) = call(&app, "GET", &format!("/microtheories/{mt_id}"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  let (_, list) = call(&app, "GET", "/microtheories?project_id=p1", None).await;
  assert_eq!(list, json!([]));
}

// ── Dependencies ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn notifications_invalidate_without_touching_runs() {
  let app = app().await;
  let mt = microtheory(&app, "p1", "main", true).await;
  let mt_id = mt["mt_id"].as_str().unwrap();
  load(&app, mt_id, "<http://example.org/car1> a <http://example.org/Vehicle> .").await;
  let cq = vehicle_question(&app, "p1").await;
  let passing = execute(&app, &cq).await;
  assert_eq!(passing["pass"], true);

  let (status, body) = call(
    &app,
    "POST",
    "/notifications",
    Some(json!({ "graph_iri": null, "element_iri": VEHICLE, "change_kind": "altered" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["invalidated"], 1);

  let (_, stale) =
    call(&app, "GET", &format!("/microtheories/{mt_id}/dependencies?stale_only=true"), None).await;
  let stale = stale.as_array().unwrap();
  assert_eq!(stale.len(), 1);
  assert_eq!(stale[0]["element_iri"], VEHICLE);
  assert_eq!(stale[0]["invalidated_by"], "altered");

  let (_, across) =
    call(&app, "GET", &format!("/dependencies?element_iri={VEHICLE}"), None).await;
  assert_eq!(across[0]["is_valid"], false);

  // History is immutable.
  let (_, run) = call(
    &app,
    "GET",
    &format!("/runs/{}", passing["run_id"].as_str().unwrap()),
    None,
  )
  .await;
  assert_eq!(run["pass"], true);
}

#[tokio::test]
async fn revalidation_clears_stale_questions() {
  let app = app().await;
  let mt = microtheory(&app, "p1", "main", true).await;
  let mt_id = mt["mt_id"].as_str().unwrap();
  load(&app, mt_id, "<http://example.org/car1> a <http://example.org/Vehicle> .").await;
  let cq = vehicle_question(&app, "p1").await;
  let passing = execute(&app, &cq).await;

  let (_, fresh) = call(&app, "GET", &format!("/microtheories/{mt_id}/stale-questions"), None).await;
  assert_eq!(fresh, json!([]));

  call(
    &app,
    "POST",
    "/notifications",
    Some(json!({ "graph_iri": mt["iri"], "element_iri": VEHICLE, "change_kind": "renamed" })),
  )
  .await;

  let (_, stale) = call(&app, "GET", &format!("/microtheories/{mt_id}/stale-questions"), None).await;
  let stale = stale.as_array().unwrap();
  assert_eq!(stale.len(), 1);
  assert_eq!(stale[0]["cq_id"], cq.as_str());
  assert_eq!(stale[0]["last_pass_run"], passing["run_id"]);
  assert_eq!(stale[0]["changed"], json!([VEHICLE]));

  let (status, runs) =
    call(&app, "POST", &format!("/microtheories/{mt_id}/revalidate"), None).await;
  assert_eq!(status, StatusCode::OK);
  let runs = runs.as_array().unwrap();
  assert_eq!(runs.len(), 1);
  assert_eq!(runs[0]["pass"], true);
  assert_eq!(runs[0]["executed_by"], "revalidation");
  assert_eq!(runs[0]["params"], json!({ "type": "Vehicle" }));

  let (_, after) = call(&app, "GET", &format!("/microtheories/{mt_id}/stale-questions"), None).await;
  assert_eq!(after, json!([]));
}

// ── Failure handling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn hung_store_is_a_recorded_timeout() {
  let (app, _, graph) = scripted_app().await;
  microtheory(&app, "p1", "main", true).await;
  let cq = vehicle_question(&app, "p1").await;

  graph.inject(&[Fault::Hang]);
  let run = execute(&app, &cq).await;
  assert_eq!(run["pass"], false);
  assert_eq!(run["reason"], "timeout");
  assert_eq!(run["detail"]["timeout_ms"], 50);
  assert!(run["bound_query"].as_str().unwrap().contains(":Vehicle"));
  assert_eq!(run["row_count"], Value::Null);
}

#[tokio::test]
async fn direct_execution_is_never_retried() {
  let (app, _, graph) = scripted_app().await;
  microtheory(&app, "p1", "main", true).await;
  let cq = vehicle_question(&app, "p1").await;

  graph.inject(&[Fault::Unreachable, Fault::Unreachable]);
  let run = execute(&app, &cq).await;
  assert_eq!(run["pass"], false);
  assert_eq!(run["reason"], "store_unreachable");
  assert_eq!(graph.pending(), 1);
}

async fn stale_setup(app: &Router) -> (String, Value) {
  let mt = microtheory(app, "p1", "main", true).await;
  let mt_id = mt["mt_id"].as_str().unwrap().to_owned();
  load(app, &mt_id, "<http://example.org/car1> a <http://example.org/Vehicle> .").await;
  let cq = vehicle_question(app, "p1").await;
  assert_eq!(execute(app, &cq).await["pass"], true);
  call(
    app,
    "POST",
    "/notifications",
    Some(json!({ "element_iri": VEHICLE, "change_kind": "removed" })),
  )
  .await;
  (mt_id, mt)
}

#[tokio::test]
async fn revalidation_retries_unreachable_stores() {
  let (app, _, graph) = scripted_app().await;
  let (mt_id, _) = stale_setup(&app).await;

  graph.inject(&[Fault::Unreachable, Fault::Unreachable]);
  let (status, runs) =
    call(&app, "POST", &format!("/microtheories/{mt_id}/revalidate"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(runs.as_array().unwrap().len(), 1);
  assert_eq!(runs[0]["pass"], true, "{runs}");
  assert_eq!(graph.pending(), 0);
}

#[tokio::test]
async fn revalidation_does_not_retry_compile_errors() {
  let (app, _, graph) = scripted_app().await;
  let (mt_id, _) = stale_setup(&app).await;

  graph.inject(&[Fault::Compile, Fault::Unreachable]);
  let (_, runs) = call(&app, "POST", &format!("/microtheories/{mt_id}/revalidate"), None).await;
  assert_eq!(runs[0]["pass"], false);
  assert_eq!(runs[0]["reason"], "compile_error");
  assert_eq!(graph.pending(), 1);

  // Still stale: the failed re-run is not a passing run.
  let (_, stale) = call(&app, "GET", &format!("/microtheories/{mt_id}/stale-questions"), None).await;
  assert_eq!(stale.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn change_feed_task_applies_notifications() {
  let (app, engine, _) = scripted_app().await;
  let mt = microtheory(&app, "p1", "main", true).await;
  let mt_id = mt["mt_id"].as_str().unwrap();
  load(&app, mt_id, "<http://example.org/car1> a <http://example.org/Vehicle> .").await;
  let cq = vehicle_question(&app, "p1").await;
  execute(&app, &cq).await;

  let (tx, rx) = tokio::sync::mpsc::channel(8);
  let feed = tokio::spawn(engine.tracker().clone().run(rx));
  tx.send(ChangeNotification {
    graph_iri:   Some("urn:cqv:mt:some-other-graph".into()),
    element_iri: VEHICLE.into(),
    change_kind: ChangeKind::Altered,
  })
  .await
  .unwrap();
  tx.send(ChangeNotification {
    graph_iri:   mt["iri"].as_str().map(str::to_owned),
    element_iri: "http://example.org/car1".into(),
    change_kind: ChangeKind::Renamed,
  })
  .await
  .unwrap();
  drop(tx);
  feed.await.unwrap();

  let (_, stale) =
    call(&app, "GET", &format!("/microtheories/{mt_id}/dependencies?stale_only=true"), None).await;
  let stale = stale.as_array().unwrap();
  assert_eq!(stale.len(), 1);
  assert_eq!(stale[0]["element_iri"], "http://example.org/car1");
  assert_eq!(stale[0]["element_kind"], "individual");
}

#[tokio::test]
async fn batch_notifications_flow_through_the_change_feed() {
  let (app, engine, _) = scripted_app().await;
  let mt = microtheory(&app, "p1", "main", true).await;
  let mt_id = mt["mt_id"].as_str().unwrap();
  load(&app, mt_id, "<http://example.org/car1> a <http://example.org/Vehicle> .").await;
  let cq = vehicle_question(&app, "p1").await;
  assert_eq!(execute(&app, &cq).await["pass"], true);

  let feed = engine.start_change_feed(8).unwrap();
  assert!(engine.start_change_feed(8).is_none());

  let (status, body) = call(
    &app,
    "POST",
    "/notifications/batch",
    Some(json!([
      { "element_iri": VEHICLE, "change_kind": "altered" },
      { "element_iri": "http://example.org/unused", "change_kind": "removed" },
    ])),
  )
  .await;
  assert_eq!(status, StatusCode::ACCEPTED);
  assert_eq!(body["queued"], 2);

  let uri = format!("/microtheories/{mt_id}/dependencies?stale_only=true");
  let mut stale = Value::Null;
  for _ in 0..100 {
    stale = call(&app, "GET", &uri, None).await.1;
    if !stale.as_array().unwrap().is_empty() {
      break;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  assert_eq!(stale[0]["element_iri"], VEHICLE);
  assert_eq!(stale[0]["invalidated_by"], "altered");
  feed.abort();
}

#[tokio::test]
async fn batch_notifications_apply_inline_without_a_feed() {
  let app = app().await;
  let mt = microtheory(&app, "p1", "main", true).await;
  let mt_id = mt["mt_id"].as_str().unwrap();
  load(&app, mt_id, "<http://example.org/car1> a <http://example.org/Vehicle> .").await;
  let cq = vehicle_question(&app, "p1").await;
  execute(&app, &cq).await;

  let (status, body) = call(
    &app,
    "POST",
    "/notifications/batch",
    Some(json!([{ "element_iri": "", "change_kind": "altered" }])),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

  let (status, body) = call(
    &app,
    "POST",
    "/notifications/batch",
    Some(json!([{ "element_iri": VEHICLE, "change_kind": "altered" }])),
  )
  .await;
  assert_eq!(status, StatusCode::ACCEPTED);
  assert_eq!(body["queued"], 1);

  // Applied before the response: visible immediately.
  let (_, stale) =
    call(&app, "GET", &format!("/microtheories/{mt_id}/dependencies?stale_only=true"), None).await;
  assert_eq!(stale[0]["element_iri"], VEHICLE);
}
