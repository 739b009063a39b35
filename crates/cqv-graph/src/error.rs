//! Error type for `cqv-graph` construction.
//!
//! Runtime failures surface as [`cqv_core::graph::GraphError`]; this type
//! only covers opening a store or building a client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("could not open oxigraph store: {0}")]
  Open(#[from] oxigraph::store::StorageError),

  #[error("could not create store directory: {0}")]
  Io(#[from] std::io::Error),

  #[error("could not build HTTP client: {0}")]
  Client(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
