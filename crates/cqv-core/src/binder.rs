//! Template binding: substitutes typed parameter values into `{{name}}`
//! placeholders.
//!
//! Every value is rendered through its declared type before substitution:
//! strings become escaped literals, numbers and booleans are parsed and
//! re-rendered canonically, IRIs are checked against a strict character set,
//! and arrays expand to a parenthesised list for `IN (...)`. A caller-supplied
//! value can therefore never change the structure of the surrounding query.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::{
  question::{ParamKind, ParamSpec, ParamValue},
  run::{FailureDetail, ReasonCode},
};

// ─── Template parsing ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
  Text(&'a str),
  Placeholder(&'a str),
}

/// Split a template into text and placeholder segments.
///
/// A placeholder is `{{`, optional whitespace, an identifier, optional
/// whitespace, `}}`. Any other `{{` is ordinary query text (nested groups such
/// as `{{ ?s ?p ?o } UNION { ... }}` are common).
pub fn segments(template: &str) -> Vec<Segment<'_>> {
  let mut out = Vec::new();
  let mut text_start = 0;
  let mut i = 0;
  let bytes = template.as_bytes();

  while i + 1 < bytes.len() {
    if bytes[i] == b'{' && bytes[i + 1] == b'{' {
      if let Some((name, end)) = match_placeholder(template, i + 2) {
        if text_start < i {
          out.push(Segment::Text(&template[text_start..i]));
        }
        out.push(Segment::Placeholder(name));
        i = end;
        text_start = end;
        continue;
      }
    }
    i += 1;
  }
  if text_start < template.len() {
    out.push(Segment::Text(&template[text_start..]));
  }
  out
}

/// Try to read `ws* ident ws* }}` starting at byte `from`. Returns the
/// identifier and the byte offset just past the closing braces.
fn match_placeholder(template: &str, from: usize) -> Option<(&str, usize)> {
  let rest = &template[from..];
  let trimmed = rest.trim_start();
  let lead = rest.len() - trimmed.len();

  let ident_len = trimmed
    .char_indices()
    .take_while(|(idx, c)| {
      c.is_ascii_alphanumeric() || *c == '_' || (*idx > 0 && *c == '-')
    })
    .count();
  if ident_len == 0 || trimmed.as_bytes()[0].is_ascii_digit() {
    return None;
  }
  let name = &trimmed[..ident_len];

  let after = &trimmed[ident_len..];
  let after_trimmed = after.trim_start();
  if !after_trimmed.starts_with("}}") {
    return None;
  }
  let end = from + lead + ident_len + (after.len() - after_trimmed.len()) + 2;
  Some((name, end))
}

/// Placeholder names in order of first appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
  let mut seen = BTreeSet::new();
  segments(template)
    .into_iter()
    .filter_map(|s| match s {
      Segment::Placeholder(name) if seen.insert(name) => Some(name),
      _ => None,
    })
    .collect()
}

/// Authoring-time lint: mismatches between a template and its schema.
/// Returns human-readable warnings; none of them block saving a question.
pub fn lint(template: &str, specs: &[ParamSpec]) -> Vec<String> {
  let used = placeholders(template);
  let mut warnings = Vec::new();
  for name in &used {
    if !specs.iter().any(|s| s.name == *name) {
      warnings.push(format!("placeholder `{name}` has no schema entry"));
    }
  }
  for spec in specs {
    if !used.contains(&spec.name.as_str()) {
      warnings.push(format!("parameter `{}` is not used by the template", spec.name));
    }
  }
  warnings
}

/// Reject templates that are empty or whose group braces do not balance once
/// placeholders are removed. Braces inside string literals are not counted.
pub fn check_template(template: &str) -> Result<(), String> {
  if template.trim().is_empty() {
    return Err("template is empty".to_owned());
  }
  let mut depth: i64 = 0;
  let mut quote: Option<char> = None;
  let mut escaped = false;
  for seg in segments(template) {
    let Segment::Text(text) = seg else { continue };
    for c in text.chars() {
      match (quote, c) {
        (Some(_), _) if escaped => escaped = false,
        (Some(_), '\\') => escaped = true,
        (Some(q), c) if c == q => quote = None,
        (Some(_), _) => {}
        (None, '"' | '\'') => quote = Some(c),
        (None, '{') => depth += 1,
        (None, '}') => {
          depth -= 1;
          if depth < 0 {
            return Err("unmatched `}`".to_owned());
          }
        }
        (None, _) => {}
      }
    }
  }
  match depth {
    0 => Ok(()),
    _ => Err("unclosed `{`".to_owned()),
  }
}

/// Reject schemas with duplicate names or defaults that do not render.
pub fn validate_schema(specs: &[ParamSpec]) -> Result<(), String> {
  let mut names = BTreeSet::new();
  for spec in specs {
    if !is_ident(&spec.name) {
      return Err(format!("invalid parameter name {:?}", spec.name));
    }
    if !names.insert(spec.name.as_str()) {
      return Err(format!("duplicate parameter {:?}", spec.name));
    }
    if let Some(default) = &spec.default {
      render(Some(spec), default)
        .map_err(|m| format!("default for `{}`: {m}", spec.name))?;
    }
  }
  Ok(())
}

fn is_ident(s: &str) -> bool {
  let mut chars = s.chars();
  matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// ─── Binding ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindError {
  #[error("unbound parameter(s): {}", .0.join(", "))]
  Unbound(Vec<String>),

  #[error("invalid value for parameter `{name}`: {message}")]
  Invalid { name: String, message: String },
}

impl BindError {
  pub fn reason(&self) -> ReasonCode {
    match self {
      Self::Unbound(_) => ReasonCode::BinderUnboundParameter,
      Self::Invalid { .. } => ReasonCode::BinderInvalidParameter,
    }
  }

  pub fn detail(&self) -> FailureDetail {
    match self {
      Self::Unbound(names) => FailureDetail::UnboundParameters { names: names.clone() },
      Self::Invalid { name, message } => FailureDetail::InvalidParameter {
        name:    name.clone(),
        message: message.clone(),
      },
    }
  }
}

/// A fully substituted query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundQuery {
  pub query:    String,
  /// Supplied parameters with no matching placeholder.
  pub warnings: Vec<String>,
}

/// Merge supplied values over schema defaults.
pub fn effective_params(
  specs: &[ParamSpec],
  supplied: &BTreeMap<String, ParamValue>,
) -> BTreeMap<String, ParamValue> {
  let mut params: BTreeMap<String, ParamValue> = specs
    .iter()
    .filter_map(|s| s.default.clone().map(|d| (s.name.clone(), d)))
    .collect();
  params.extend(supplied.iter().map(|(k, v)| (k.clone(), v.clone())));
  params
}

/// Substitute `params` into `template`.
///
/// Every placeholder must have a value (supplied or defaulted); all missing
/// names are reported together. Values are rendered by their schema entry if
/// one exists, otherwise by their JSON shape.
pub fn bind(
  template: &str,
  specs: &[ParamSpec],
  params: &BTreeMap<String, ParamValue>,
) -> Result<BoundQuery, BindError> {
  let segments = segments(template);

  let mut unbound: Vec<String> = Vec::new();
  for seg in &segments {
    if let Segment::Placeholder(name) = seg
      && !params.contains_key(*name)
      && !unbound.iter().any(|u| u == *name)
    {
      unbound.push((*name).to_owned());
    }
  }
  if !unbound.is_empty() {
    return Err(BindError::Unbound(unbound));
  }

  let mut rendered: BTreeMap<&str, String> = BTreeMap::new();
  let mut query = String::with_capacity(template.len());
  for seg in &segments {
    match seg {
      Segment::Text(t) => query.push_str(t),
      Segment::Placeholder(name) => {
        if !rendered.contains_key(name) {
          let spec = specs.iter().find(|s| s.name == *name);
          let value = &params[*name];
          let text = render(spec, value).map_err(|message| BindError::Invalid {
            name: (*name).to_owned(),
            message,
          })?;
          rendered.insert(*name, text);
        }
        query.push_str(&rendered[name]);
      }
    }
  }

  let used: BTreeSet<&str> = rendered.keys().copied().collect();
  let warnings = params
    .keys()
    .filter(|k| !used.contains(k.as_str()))
    .filter(|k| specs.iter().all(|s| &s.name != *k || s.default.is_none()))
    .map(|k| format!("parameter `{k}` is not used by the template"))
    .collect();

  Ok(BoundQuery { query, warnings })
}

/// Bind `base` to the empty prefix unless `query` already declares `PREFIX :`.
pub fn with_default_prefix(query: String, base: &str) -> String {
  if declares_default_prefix(&query) {
    query
  } else {
    format!("PREFIX : <{base}>\n{query}")
  }
}

fn declares_default_prefix(query: &str) -> bool {
  let lower = query.to_ascii_lowercase();
  lower.match_indices("prefix").any(|(i, _)| {
    let standalone = lower[..i]
      .chars()
      .next_back()
      .is_none_or(|c| c.is_whitespace() || matches!(c, '>' | '.' | '}'));
    let rest = &lower[i + "prefix".len()..];
    standalone
      && rest.starts_with(char::is_whitespace)
      && rest.trim_start().starts_with(':')
  })
}

// ─── Rendering ───────────────────────────────────────────────────────────────

fn render(spec: Option<&ParamSpec>, value: &ParamValue) -> Result<String, String> {
  match (spec, value) {
    (Some(spec), ParamValue::Array(items)) if spec.multiple => render_list(items, |v| {
      render_scalar(spec.kind, v)
    }),
    (Some(spec), _) if spec.multiple => Err("expected an array".to_owned()),
    (Some(_), ParamValue::Array(_)) => Err("arrays require `multiple: true`".to_owned()),
    (Some(spec), v) => render_scalar(spec.kind, v),
    (None, ParamValue::Array(items)) => render_list(items, |v| render_scalar(infer(v), v)),
    (None, v) => render_scalar(infer(v), v),
  }
}

fn render_list(
  items: &[ParamValue],
  each: impl Fn(&ParamValue) -> Result<String, String>,
) -> Result<String, String> {
  let parts = items
    .iter()
    .map(|v| match v {
      ParamValue::Array(_) => Err("nested arrays are not allowed".to_owned()),
      v => each(v),
    })
    .collect::<Result<Vec<_>, _>>()?;
  Ok(format!("({})", parts.join(", ")))
}

fn infer(value: &ParamValue) -> ParamKind {
  match value {
    ParamValue::Boolean(_) => ParamKind::Boolean,
    ParamValue::Number(_) => ParamKind::Number,
    ParamValue::String(_) | ParamValue::Array(_) => ParamKind::String,
  }
}

fn render_scalar(kind: ParamKind, value: &ParamValue) -> Result<String, String> {
  match kind {
    ParamKind::String => match value {
      ParamValue::String(s) => Ok(string_literal(s)),
      _ => Err("expected a string".to_owned()),
    },
    ParamKind::Number => {
      let n = match value {
        ParamValue::Number(n) => n.as_f64(),
        ParamValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
      }
      .ok_or_else(|| "expected a number".to_owned())?;
      if !n.is_finite() {
        return Err("number must be finite".to_owned());
      }
      Ok(number_literal(n))
    }
    ParamKind::Integer => {
      let n = match value {
        ParamValue::Number(n) => n.as_i64(),
        ParamValue::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
      }
      .ok_or_else(|| "expected an integer".to_owned())?;
      Ok(n.to_string())
    }
    ParamKind::Boolean => match value {
      ParamValue::Boolean(b) => Ok(b.to_string()),
      ParamValue::String(s) if s == "true" || s == "false" => Ok(s.clone()),
      _ => Err("expected a boolean".to_owned()),
    },
    ParamKind::Iri => match value {
      ParamValue::String(s) => iri_term(s),
      _ => Err("expected an IRI string".to_owned()),
    },
  }
}

/// A double-quoted literal with every structural character escaped.
pub fn string_literal(s: &str) -> String {
  let mut out = String::with_capacity(s.len() + 2);
  out.push('"');
  for c in s.chars() {
    match c {
      '\\' => out.push_str("\\\\"),
      '"' => out.push_str("\\\""),
      '\'' => out.push_str("\\'"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      '\t' => out.push_str("\\t"),
      '\u{8}' => out.push_str("\\b"),
      '\u{c}' => out.push_str("\\f"),
      c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
      c => out.push(c),
    }
  }
  out.push('"');
  out
}

fn number_literal(n: f64) -> String {
  if n.fract() == 0.0 && n.abs() < 1e15 {
    format!("{}", n as i64)
  } else {
    format!("{n}")
  }
}

/// Render an IRI parameter.
///
/// - `<http://...>` or anything with `://` or a `urn:` prefix → `<iri>`
/// - `prefix:local` → verbatim, after strict name validation
/// - `local` → `:local` (the template's default prefix)
pub fn iri_term(raw: &str) -> Result<String, String> {
  let raw = raw.trim();
  let absolute = raw
    .strip_prefix('<')
    .and_then(|r| r.strip_suffix('>'))
    .or_else(|| (raw.contains("://") || raw.starts_with("urn:")).then_some(raw));

  if let Some(iri) = absolute {
    if iri.is_empty() {
      return Err("empty IRI".to_owned());
    }
    if let Some(bad) = iri
      .chars()
      .find(|c| matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\') || *c <= ' ')
    {
      return Err(format!("character {bad:?} is not allowed in an IRI"));
    }
    return Ok(format!("<{iri}>"));
  }

  let (prefix, local) = raw.split_once(':').unwrap_or(("", raw));
  if !(prefix.is_empty() || is_pn_prefix(prefix)) {
    return Err(format!("invalid prefix {prefix:?}"));
  }
  if !is_pn_local(local) {
    return Err(format!("invalid local name {local:?}"));
  }
  Ok(format!("{prefix}:{local}"))
}

fn is_pn_prefix(s: &str) -> bool {
  let mut chars = s.chars();
  matches!(chars.next(), Some(c) if c.is_alphabetic())
    && s.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
    && !s.ends_with('.')
}

fn is_pn_local(s: &str) -> bool {
  let mut chars = s.chars();
  matches!(chars.next(), Some(c) if c.is_alphanumeric() || c == '_')
    && s.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
    && !s.ends_with('.')
}
