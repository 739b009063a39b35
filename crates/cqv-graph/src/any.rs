//! Runtime choice of graph backend.

use std::future::Future;

use cqv_core::graph::{GraphError, GraphStore, QueryResult};

use crate::{OxigraphStore, SparqlHttpStore};

#[derive(Debug, Clone)]
pub enum AnyGraphStore {
  Oxigraph(OxigraphStore),
  Http(SparqlHttpStore),
}

impl From<OxigraphStore> for AnyGraphStore {
  fn from(s: OxigraphStore) -> Self { Self::Oxigraph(s) }
}

impl From<SparqlHttpStore> for AnyGraphStore {
  fn from(s: SparqlHttpStore) -> Self { Self::Http(s) }
}

impl GraphStore for AnyGraphStore {
  fn query<'a>(
    &'a self,
    graph: &'a str,
    query: &'a str,
  ) -> impl Future<Output = Result<QueryResult, GraphError>> + Send + 'a {
    async move {
      match self {
        Self::Oxigraph(s) => s.query(graph, query).await,
        Self::Http(s) => s.query(graph, query).await,
      }
    }
  }

  fn create_graph<'a>(
    &'a self,
    graph: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a {
    async move {
      match self {
        Self::Oxigraph(s) => s.create_graph(graph).await,
        Self::Http(s) => s.create_graph(graph).await,
      }
    }
  }

  fn load_turtle<'a>(
    &'a self,
    graph: &'a str,
    turtle: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a {
    async move {
      match self {
        Self::Oxigraph(s) => s.load_turtle(graph, turtle).await,
        Self::Http(s) => s.load_turtle(graph, turtle).await,
      }
    }
  }

  fn copy_graph<'a>(
    &'a self,
    source: &'a str,
    target: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a {
    async move {
      match self {
        Self::Oxigraph(s) => s.copy_graph(source, target).await,
        Self::Http(s) => s.copy_graph(source, target).await,
      }
    }
  }

  fn drop_graph<'a>(
    &'a self,
    graph: &'a str,
  ) -> impl Future<Output = Result<(), GraphError>> + Send + 'a {
    async move {
      match self {
        Self::Oxigraph(s) => s.drop_graph(graph).await,
        Self::Http(s) => s.drop_graph(graph).await,
      }
    }
  }
}
