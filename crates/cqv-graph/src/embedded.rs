//! [`OxigraphStore`]: an in-process oxigraph store.
//!
//! Every microtheory is a named graph. Queries are parsed here and evaluated
//! with the target graph as both the only default graph and the only named
//! graph, so a bound query cannot see any other microtheory, not even through
//! `GRAPH ?g`. Oxigraph calls are synchronous and run on the blocking pool.
//!
//! Dropping a query future (for instance on timeout) raises a flag that the
//! blocking task checks between result rows. Work before the first row, such
//! as a large sort, still runs to completion on its pool thread.

use std::{
  future::Future,
  path::Path,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

use cqv_core::graph::{GraphError, GraphStore, QueryResult};
use oxigraph::{
  io::{RdfFormat, RdfParser},
  model::{GraphName, GraphNameRef, NamedNode, Quad},
  sparql::Query,
  store::{LoaderError, Store},
};

use crate::{
  Result, check_iri,
  results::{collect, storage},
};

/// Cheap to clone; the inner [`Store`] is reference-counted.
#[derive(Clone)]
pub struct OxigraphStore {
  store: Store,
}

impl OxigraphStore {
  /// Create a store with no persistence.
  pub fn in_memory() -> Result<Self> { Ok(Self { store: Store::new()? }) }

  /// Open or create a persistent store at `path`.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    std::fs::create_dir_all(path)?;
    Ok(Self { store: Store::open(path)? })
  }

  async fn blocking<T, F>(&self, f: F) -> Result<T, GraphError>
  where
    T: Send + 'static,
    F: FnOnce(Store) -> Result<T, GraphError> + Send + 'static,
  {
    let store = self.store.clone();
    tokio::task::spawn_blocking(move || f(store))
      .await
      .map_err(|e| GraphError::Storage(format!("blocking task failed: {e}")))?
  }
}

impl std::fmt::Debug for OxigraphStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OxigraphStore").finish()
  }
}

fn graph_node(iri: &str) -> Result<NamedNode, GraphError> {
  NamedNode::new(check_iri(iri)?).map_err(|e| GraphError::GraphNotFound(format!("{iri}: {e}")))
}

/// Sets its flag when dropped.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
  fn drop(&mut self) { self.0.store(true, Ordering::Relaxed); }
}

fn require_graph(store: &Store, graph: &NamedNode) -> Result<(), GraphError> {
  if store.contains_named_graph(graph.as_ref()).map_err(storage)? {
    Ok(())
  } else {
    Err(GraphError::GraphNotFound(graph.as_str().to_owned()))
  }
}

// ─── GraphStore impl ─────────────────────────────────────────────────────────

impl GraphStore for OxigraphStore {
  fn query<'a>(
    &'a self,
    graph: &'a str,
    query: &'a str,
  ) -> impl Future<Output = Result<QueryResult, GraphError>> + Send + 'a {
    let text = query.to_owned();
    let graph = graph_node(graph);
    async move {
      let graph = graph?;
      let cancelled = Arc::new(AtomicBool::new(false));
      let _guard = CancelOnDrop(cancelled.clone());
      self
        .blocking(move |store| {
          require_graph(&store, &graph)?;
          let mut q = Query::parse(&text, None).map_err(|e| GraphError::Compile(e.to_string()))?;
          let dataset = q.dataset_mut();
          dataset.set_default_graph(vec![GraphName::NamedNode(graph.clone())]);
          dataset.set_available_named_graphs(vec![graph.into()]);
          let results = store.query(q).map_err(storage)?;
          collect(results, || cancelled.load(Ordering::Relaxed))
        })
        .await
    }
  }

  fn create_graph<'a>(
    &'a self,
    graph: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a {
    let graph = graph_node(graph);
    async move {
      let graph = graph?;
      self
        .blocking(move |store| {
          store.insert_named_graph(graph.as_ref()).map_err(storage)?;
          Ok(())
        })
        .await
    }
  }

  fn load_turtle<'a>(
    &'a self,
    graph: &'a str,
    turtle: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a {
    let text = turtle.to_owned();
    let graph = graph_node(graph);
    async move {
      let graph = graph?;
      self
        .blocking(move |store| {
          require_graph(&store, &graph)?;
          let parser = RdfParser::from_format(RdfFormat::Turtle).with_default_graph(graph);
          store.load_from_reader(parser, text.as_bytes()).map_err(|e| match e {
            LoaderError::Parsing(e) => GraphError::InvalidContent(e.to_string()),
            other => storage(other),
          })
        })
        .await
    }
  }

  fn copy_graph<'a>(
    &'a self,
    source: &'a str,
    target: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a {
    let nodes = graph_node(source).and_then(|s| Ok((s, graph_node(target)?)));
    async move {
      let (source, target) = nodes?;
      self
        .blocking(move |store| {
          require_graph(&store, &source)?;
          let snapshot = store
            .quads_for_pattern(None, None, None, Some(GraphNameRef::NamedNode(source.as_ref())))
            .map(|q| q.map(|q| Quad::new(q.subject, q.predicate, q.object, target.clone())))
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage)?;

          store.clear_graph(target.as_ref()).map_err(storage)?;
          store.insert_named_graph(target.as_ref()).map_err(storage)?;
          for quad in &snapshot {
            store.insert(quad).map_err(storage)?;
          }
          tracing::debug!(source = source.as_str(), target = target.as_str(), quads = snapshot.len(), "graph copied");
          Ok(())
        })
        .await
    }
  }

  fn drop_graph<'a>(
    &'a self,
    graph: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a {
    let graph = graph_node(graph);
    async move {
      let graph = graph?;
      self
        .blocking(move |store| {
          store.remove_named_graph(graph.as_ref()).map_err(storage)?;
          Ok(())
        })
        .await
    }
  }
}
