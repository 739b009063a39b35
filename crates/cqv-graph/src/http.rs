//! [`SparqlHttpStore`]: a remote store spoken to over the SPARQL 1.1
//! Protocol and the Graph Store HTTP Protocol.
//!
//! Each query names the target graph as both `default-graph-uri` and
//! `named-graph-uri`, so the endpoint evaluates it against that graph alone.

use std::future::Future;

use cqv_core::graph::{GraphError, GraphStore, QueryResult};
use reqwest::{Client, RequestBuilder, StatusCode, header};
use serde::Deserialize;

use crate::{Result, check_iri, results::decode_json};

const RESULTS_JSON: &str = "application/sparql-results+json";

/// Endpoint settings for a SPARQL server.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
  /// SPARQL query endpoint.
  pub query_url:  String,
  /// SPARQL update endpoint.
  pub update_url: String,
  /// Graph Store Protocol endpoint, used for Turtle loads.
  pub store_url:  String,
  #[serde(default)]
  pub username:   Option<String>,
  #[serde(default)]
  pub password:   Option<String>,
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct SparqlHttpStore {
  client: Client,
  config: HttpConfig,
}

impl SparqlHttpStore {
  pub fn new(config: HttpConfig) -> Result<Self> {
    let client = Client::builder().build()?;
    Ok(Self { client, config })
  }

  fn auth(&self, req: RequestBuilder) -> RequestBuilder {
    match &self.config.username {
      Some(user) => req.basic_auth(user, self.config.password.as_ref()),
      None => req,
    }
  }

  async fn update(&self, update: String) -> Result<(), GraphError> {
    tracing::debug!(%update, "sparql update");
    let resp = self
      .auth(self.client.post(&self.config.update_url))
      .form(&[("update", update.as_str())])
      .send()
      .await
      .map_err(unreachable)?;
    check(resp, GraphError::Storage).await.map(drop)
  }
}

fn unreachable(e: reqwest::Error) -> GraphError { GraphError::Unreachable(e.to_string()) }

/// Map a non-success status onto a [`GraphError`]. `bad_request` decides what
/// a 400 means for the call site.
async fn check(
  resp: reqwest::Response,
  bad_request: fn(String) -> GraphError,
) -> Result<reqwest::Response, GraphError> {
  let status = resp.status();
  if status.is_success() {
    return Ok(resp);
  }
  let body = resp.text().await.unwrap_or_default();
  let msg = format!("{status}: {}", body.trim());
  Err(match status {
    StatusCode::BAD_REQUEST => bad_request(msg),
    StatusCode::NOT_FOUND => GraphError::GraphNotFound(msg),
    s if s.is_server_error() => GraphError::Unreachable(msg),
    _ => GraphError::Storage(msg),
  })
}

fn copy_update(source: &str, target: &str) -> String {
  format!(
    "DROP SILENT GRAPH <{target}> ;\nCREATE SILENT GRAPH <{target}> ;\nINSERT {{ GRAPH <{target}> {{ ?s ?p ?o }} }} WHERE {{ GRAPH <{source}> {{ ?s ?p ?o }} }}"
  )
}

// ─── GraphStore impl ─────────────────────────────────────────────────────────

impl GraphStore for SparqlHttpStore {
  fn query<'a>(
    &'a self,
    graph: &'a str,
    query: &'a str,
  ) -> impl Future<Output = Result<QueryResult, GraphError>> + Send + 'a {
    async move {
      let graph = check_iri(graph)?;
      let resp = self
        .auth(self.client.post(&self.config.query_url))
        .header(header::ACCEPT, RESULTS_JSON)
        .form(&[("query", query), ("default-graph-uri", graph), ("named-graph-uri", graph)])
        .send()
        .await
        .map_err(unreachable)?;
      let resp = check(resp, GraphError::Compile).await?;
      let body = resp.text().await.map_err(unreachable)?;
      decode_json(body)
    }
  }

  fn create_graph<'a>(
    &'a self,
    graph: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a {
    async move {
      let graph = check_iri(graph)?;
      self.update(format!("CREATE SILENT GRAPH <{graph}>")).await
    }
  }

  fn load_turtle<'a>(
    &'a self,
    graph: &'a str,
    turtle: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a {
    async move {
      let graph = check_iri(graph)?;
      let resp = self
        .auth(self.client.post(&self.config.store_url))
        .query(&[("graph", graph)])
        .header(header::CONTENT_TYPE, "text/turtle")
        .body(turtle.to_owned())
        .send()
        .await
        .map_err(unreachable)?;
      check(resp, GraphError::InvalidContent).await.map(drop)
    }
  }

  fn copy_graph<'a>(
    &'a self,
    source: &'a str,
    target: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a {
    async move {
      let source = check_iri(source)?;
      let target = check_iri(target)?;
      self.update(copy_update(source, target)).await
    }
  }

  fn drop_graph<'a>(
    &'a self,
    graph: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a {
    async move {
      let graph = check_iri(graph)?;
      self.update(format!("DROP SILENT GRAPH <{graph}>")).await
    }
  }
}
