//! Graph store adapters for microtheory content.
//!
//! - [`OxigraphStore`]: an in-process oxigraph store, in memory or on disk.
//! - [`SparqlHttpStore`]: any SPARQL 1.1 Protocol endpoint over HTTP.
//!
//! [`AnyGraphStore`] picks one at runtime from configuration.

mod any;
mod embedded;
mod http;
mod results;

pub mod error;

pub use any::AnyGraphStore;
pub use embedded::OxigraphStore;
pub use error::{Error, Result};
pub use http::{HttpConfig, SparqlHttpStore};

/// Characters that may not appear inside an IRIREF.
fn check_iri(iri: &str) -> std::result::Result<&str, cqv_core::graph::GraphError> {
  let bad = iri.is_empty()
    || iri
      .chars()
      .any(|c| c.is_whitespace() || c.is_control() || "<>\"{}|^`\\".contains(c));
  if bad {
    Err(cqv_core::graph::GraphError::GraphNotFound(format!("invalid graph IRI {iri:?}")))
  } else {
    Ok(iri)
  }
}
