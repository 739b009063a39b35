//! Microtheories: named, independently addressable graph scopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scheme under which microtheory graph IRIs are minted.
pub const MICROTHEORY_IRI_PREFIX: &str = "urn:cqv:mt:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Microtheory {
  pub mt_id:      Uuid,
  pub project_id: String,
  /// Unique within the project.
  pub label:      String,
  /// Globally unique graph identity.
  pub iri:        String,
  /// Source IRI when produced by cloning. A lineage pointer only: the parent
  /// may be deleted without affecting this microtheory.
  pub parent_iri: Option<String>,
  /// At most one microtheory per project is the default.
  pub is_default: bool,
  pub created_at: DateTime<Utc>,
}

impl Microtheory {
  pub fn mint_iri(mt_id: Uuid) -> String { format!("{MICROTHEORY_IRI_PREFIX}{mt_id}") }
}

/// Input to [`crate::manager::MicrotheoryManager::create`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMicrotheory {
  pub project_id:   String,
  pub label:        String,
  /// Turtle loaded into the fresh graph.
  pub seed:         Option<String>,
  #[serde(default)]
  pub make_default: bool,
}

/// How a caller names a microtheory: by id or by graph IRI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MicrotheoryRef {
  Id(Uuid),
  Iri(String),
}

impl MicrotheoryRef {
  /// Parse a UUID if possible, otherwise treat the string as an IRI.
  pub fn parse(s: &str) -> Self {
    match Uuid::parse_str(s) {
      Ok(id) => Self::Id(id),
      Err(_) => Self::Iri(s.to_owned()),
    }
  }
}

impl std::fmt::Display for MicrotheoryRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Id(id) => write!(f, "{id}"),
      Self::Iri(iri) => f.write_str(iri),
    }
  }
}
