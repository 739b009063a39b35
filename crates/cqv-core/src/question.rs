//! Competency questions: named, parameterised query-plus-contract assertions.
//!
//! A question is scoped to a project and unique by `(project_id, name)`. Once
//! it has runs it is never hard-deleted; deprecation is terminal but retains
//! its history.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contract::Contract;

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CqStatus {
  #[default]
  Draft,
  Active,
  Deprecated,
}

impl CqStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Draft => "draft",
      Self::Active => "active",
      Self::Deprecated => "deprecated",
    }
  }

  /// `draft → active`, `draft|active → deprecated`. Deprecated is terminal.
  pub fn can_transition_to(self, next: CqStatus) -> bool {
    matches!(
      (self, next),
      (Self::Draft, Self::Active)
        | (Self::Draft, Self::Deprecated)
        | (Self::Active, Self::Deprecated)
    )
  }
}

impl fmt::Display for CqStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Parameters ──────────────────────────────────────────────────────────────

/// The declared scalar type of a template parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
  String,
  Number,
  Integer,
  Boolean,
  /// An IRI, prefixed name, or bare local name resolved against the
  /// template's default prefix.
  Iri,
}

/// One named, typed placeholder in a question's parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
  pub name:        String,
  pub kind:        ParamKind,
  /// Accept an array of `kind` values, expanded for `IN (...)` injection.
  #[serde(default)]
  pub multiple:    bool,
  pub default:     Option<ParamValue>,
  pub description: Option<String>,
}

impl ParamSpec {
  pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
    Self {
      name: name.into(),
      kind,
      multiple: false,
      default: None,
      description: None,
    }
  }
}

/// A parameter value as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
  Boolean(bool),
  Number(serde_json::Number),
  String(String),
  Array(Vec<ParamValue>),
}

impl From<&str> for ParamValue {
  fn from(s: &str) -> Self { Self::String(s.to_owned()) }
}

impl From<String> for ParamValue {
  fn from(s: String) -> Self { Self::String(s) }
}

impl From<bool> for ParamValue {
  fn from(b: bool) -> Self { Self::Boolean(b) }
}

impl From<i64> for ParamValue {
  fn from(n: i64) -> Self { Self::Number(n.into()) }
}

// ─── CompetencyQuestion ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetencyQuestion {
  pub cq_id:               Uuid,
  pub project_id:          String,
  /// Unique within the project.
  pub name:                String,
  pub statement:           String,
  pub params:              Vec<ParamSpec>,
  /// Query text with `{{name}}` placeholders.
  pub template:            String,
  /// IRI of the microtheory the question targets when no override is given.
  pub default_microtheory: Option<String>,
  pub contract:            Contract,
  pub status:              CqStatus,
  /// Bumped whenever the template, schema or contract changes.
  pub version:             u32,
  pub created_by:          String,
  pub created_at:          DateTime<Utc>,
  pub updated_at:          DateTime<Utc>,
}

impl CompetencyQuestion {
  pub fn param(&self, name: &str) -> Option<&ParamSpec> {
    self.params.iter().find(|p| p.name == name)
  }
}

/// Input to [`crate::engine::Engine::create_question`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuestion {
  pub project_id:          String,
  pub name:                String,
  #[serde(default)]
  pub statement:           String,
  #[serde(default)]
  pub params:              Vec<ParamSpec>,
  pub template:            String,
  pub default_microtheory: Option<String>,
  #[serde(default)]
  pub contract:            Contract,
  #[serde(default)]
  pub status:              CqStatus,
  #[serde(default = "anonymous")]
  pub created_by:          String,
}

fn anonymous() -> String { "anonymous".to_owned() }

/// A partial update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionPatch {
  pub name:                Option<String>,
  pub statement:           Option<String>,
  pub params:              Option<Vec<ParamSpec>>,
  pub template:            Option<String>,
  /// `Some(None)` clears the default microtheory.
  #[serde(default, with = "double_option")]
  pub default_microtheory: Option<Option<String>>,
  pub contract:            Option<Contract>,
}

impl QuestionPatch {
  /// Whether applying this patch produces a new logical version.
  pub fn is_versioning(&self) -> bool {
    self.params.is_some() || self.template.is_some() || self.contract.is_some()
  }

  /// Apply to `cq` in place; returns `true` if the version was bumped.
  pub fn apply(self, cq: &mut CompetencyQuestion, now: DateTime<Utc>) -> bool {
    let bump = self.is_versioning();
    if let Some(name) = self.name {
      cq.name = name;
    }
    if let Some(statement) = self.statement {
      cq.statement = statement;
    }
    if let Some(params) = self.params {
      cq.params = params;
    }
    if let Some(template) = self.template {
      cq.template = template;
    }
    if let Some(mt) = self.default_microtheory {
      cq.default_microtheory = mt;
    }
    if let Some(contract) = self.contract {
      cq.contract = contract;
    }
    if bump {
      cq.version += 1;
    }
    cq.updated_at = now;
    bump
  }
}

/// Distinguishes an absent field from an explicit `null`.
mod double_option {
  use serde::{Deserialize, Deserializer, Serialize, Serializer};

  pub fn serialize<S, T>(v: &Option<Option<T>>, s: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
    T: Serialize,
  {
    match v {
      Some(inner) => inner.serialize(s),
      None => s.serialize_none(),
    }
  }

  pub fn deserialize<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
  where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
  {
    Option::<T>::deserialize(d).map(Some)
  }
}
