//! Ontology dependencies: derived facts linking a microtheory to the ontology
//! elements its passing runs relied on.
//!
//! Rows are unique per `(microtheory, element)`. They are refreshed by passing
//! runs and flipped to invalid (never deleted) by change notifications, so the
//! audit trail "this used to depend on X, and X changed" survives.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
  Class,
  ObjectProperty,
  DatatypeProperty,
  /// A property whose object shape could not be determined.
  Property,
  Individual,
}

impl ElementKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Class => "class",
      Self::ObjectProperty => "object_property",
      Self::DatatypeProperty => "datatype_property",
      Self::Property => "property",
      Self::Individual => "individual",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Some(match s {
      "class" => Self::Class,
      "object_property" => Self::ObjectProperty,
      "datatype_property" => Self::DatatypeProperty,
      "property" => Self::Property,
      "individual" => Self::Individual,
      _ => return None,
    })
  }

  pub fn is_property(self) -> bool {
    matches!(self, Self::ObjectProperty | Self::DatatypeProperty | Self::Property)
  }
}

impl fmt::Display for ElementKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// An ontology element referenced by a query or its results.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementRef {
  pub iri:  String,
  pub kind: ElementKind,
}

impl ElementRef {
  pub fn new(iri: impl Into<String>, kind: ElementKind) -> Self {
    Self { iri: iri.into(), kind }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyDependency {
  pub microtheory_iri:   String,
  pub element_iri:       String,
  pub element_kind:      ElementKind,
  pub first_seen_at:     DateTime<Utc>,
  pub last_validated_at: DateTime<Utc>,
  pub is_valid:          bool,
  pub invalidated_at:    Option<DateTime<Utc>>,
  pub invalidated_by:    Option<ChangeKind>,
}

// ─── Change feed ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
  Altered,
  Renamed,
  Removed,
}

impl ChangeKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Altered => "altered",
      Self::Renamed => "renamed",
      Self::Removed => "removed",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Some(match s {
      "altered" => Self::Altered,
      "renamed" => Self::Renamed,
      "removed" => Self::Removed,
      _ => return None,
    })
  }
}

/// An ontology change emitted by the editor's change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
  /// The graph the change happened in; `None` applies to every graph.
  pub graph_iri:   Option<String>,
  pub element_iri: String,
  pub change_kind: ChangeKind,
}
