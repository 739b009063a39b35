//! Dependency extraction: which ontology elements a passing run touched.
//!
//! [`extract`] is a pure function of the bound query text and the result
//! bindings. The query is parsed into SPARQL algebra (prefixes and `BASE`
//! resolved, abbreviations and paths expanded) and each IRI in a triple
//! pattern is classified by position:
//!
//! | Position | Kind |
//! |----------|------|
//! | object of `a` / `rdf:type` | class |
//! | predicate with a literal object | datatype property |
//! | predicate with an IRI or blank object | object property |
//! | step of a property path | property |
//! | subject, or object of a non-type predicate | individual |
//!
//! Variables in those positions contribute the IRIs they were bound to in the
//! result. A variable predicate's object column decides between object and
//! datatype property. Expressions (`FILTER`, `BIND`, `VALUES`) and the
//! built-in rdf/rdfs/owl/xsd vocabularies are not recorded.

use std::collections::BTreeMap;

use spargebra::{
  Query,
  algebra::{GraphPattern, PropertyPathExpression},
  term::{NamedNodePattern, TermPattern, TriplePattern},
};

use crate::{
  dependency::{ElementKind, ElementRef},
  graph::QueryResult,
};

const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
const OWL: &str = "http://www.w3.org/2002/07/owl#";
const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

const BUILTIN_NAMESPACES: [&str; 4] = [RDF, RDFS, OWL, XSD];

/// Extract every ontology element referenced by `query` or bound in `result`.
/// Each IRI appears once; when positions disagree the strongest kind wins
/// (class, then typed property, then property, then individual).
///
/// A query that does not parse as SPARQL 1.1 yields nothing.
pub fn extract(query: &str, result: &QueryResult) -> Vec<ElementRef> {
  let query = match Query::parse(query, None) {
    Ok(q) => q,
    Err(e) => {
      tracing::debug!(error = %e, "bound query not parseable; no dependencies extracted");
      return Vec::new();
    }
  };

  let mut walk = Walk { result, found: Found::default() };
  match &query {
    Query::Select { pattern, .. } | Query::Ask { pattern, .. } | Query::Describe { pattern, .. } => {
      walk.pattern(pattern);
    }
    Query::Construct { template, pattern, .. } => {
      template.iter().for_each(|t| walk.triple(t));
      walk.pattern(pattern);
    }
  }

  walk
    .found
    .0
    .into_iter()
    .map(|(iri, kind)| ElementRef { iri, kind })
    .collect()
}

// ─── Classification ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Found(BTreeMap<String, ElementKind>);

impl Found {
  fn add(&mut self, iri: &str, kind: ElementKind) {
    if BUILTIN_NAMESPACES.iter().any(|ns| iri.starts_with(ns)) {
      return;
    }
    self
      .0
      .entry(iri.to_owned())
      .and_modify(|k| {
        if rank(kind) > rank(*k) {
          *k = kind;
        }
      })
      .or_insert(kind);
  }
}

fn rank(kind: ElementKind) -> u8 {
  match kind {
    ElementKind::Class => 4,
    ElementKind::ObjectProperty | ElementKind::DatatypeProperty => 3,
    ElementKind::Property => 2,
    ElementKind::Individual => 1,
  }
}

/// The kind a term takes from its position relative to a predicate.
fn roles(predicate: &str) -> (ElementKind, ElementKind) {
  use ElementKind::{Class, Individual, Property};
  let local = |ns: &str, name: &str| predicate.strip_prefix(ns) == Some(name);
  if local(RDF, "type") {
    (Individual, Class)
  } else if local(RDFS, "subClassOf") || local(OWL, "equivalentClass") || local(OWL, "disjointWith")
  {
    (Class, Class)
  } else if local(RDFS, "subPropertyOf") || local(OWL, "equivalentProperty") || local(OWL, "inverseOf")
  {
    (Property, Property)
  } else if local(RDFS, "domain") || local(RDFS, "range") {
    (Property, Class)
  } else {
    (Individual, Individual)
  }
}

// ─── Algebra walk ────────────────────────────────────────────────────────────

struct Walk<'r> {
  result: &'r QueryResult,
  found:  Found,
}

impl Walk<'_> {
  fn pattern(&mut self, pattern: &GraphPattern) {
    #[allow(unreachable_patterns)]
    match pattern {
      GraphPattern::Bgp { patterns } => patterns.iter().for_each(|t| self.triple(t)),
      GraphPattern::Path { subject, path, object } => {
        self.node(subject, ElementKind::Individual);
        self.node(object, ElementKind::Individual);
        self.path(path);
      }
      GraphPattern::Join { left, right }
      | GraphPattern::LeftJoin { left, right, .. }
      | GraphPattern::Union { left, right }
      | GraphPattern::Minus { left, right } => {
        self.pattern(left);
        self.pattern(right);
      }
      GraphPattern::Filter { inner, .. }
      | GraphPattern::Graph { inner, .. }
      | GraphPattern::Extend { inner, .. }
      | GraphPattern::OrderBy { inner, .. }
      | GraphPattern::Project { inner, .. }
      | GraphPattern::Distinct { inner }
      | GraphPattern::Reduced { inner }
      | GraphPattern::Slice { inner, .. }
      | GraphPattern::Group { inner, .. }
      | GraphPattern::Service { inner, .. } => self.pattern(inner),
      GraphPattern::Values { .. } => {}
      _ => {}
    }
  }

  fn triple(&mut self, triple: &TriplePattern) {
    let kind = self.property_kind(&triple.object);
    match &triple.predicate {
      NamedNodePattern::NamedNode(p) => {
        let (subject_kind, object_kind) = roles(p.as_str());
        self.node(&triple.subject, subject_kind);
        self.node(&triple.object, object_kind);
        self.found.add(p.as_str(), kind);
      }
      NamedNodePattern::Variable(v) => {
        self.node(&triple.subject, ElementKind::Individual);
        self.node(&triple.object, ElementKind::Individual);
        self.bound(v.as_str(), kind);
      }
    }
  }

  fn path(&mut self, path: &PropertyPathExpression) {
    match path {
      PropertyPathExpression::NamedNode(p) => self.found.add(p.as_str(), ElementKind::Property),
      PropertyPathExpression::Reverse(p)
      | PropertyPathExpression::ZeroOrMore(p)
      | PropertyPathExpression::OneOrMore(p)
      | PropertyPathExpression::ZeroOrOne(p) => self.path(p),
      PropertyPathExpression::Sequence(a, b) | PropertyPathExpression::Alternative(a, b) => {
        self.path(a);
        self.path(b);
      }
      PropertyPathExpression::NegatedPropertySet(ps) => {
        ps.iter().for_each(|p| self.found.add(p.as_str(), ElementKind::Property));
      }
    }
  }

  fn node(&mut self, term: &TermPattern, kind: ElementKind) {
    #[allow(unreachable_patterns)]
    match term {
      TermPattern::NamedNode(n) => self.found.add(n.as_str(), kind),
      TermPattern::Variable(v) => self.bound(v.as_str(), kind),
      _ => {}
    }
  }

  /// Record every IRI bound to `var` in the result.
  fn bound(&mut self, var: &str, kind: ElementKind) {
    let result = self.result;
    for iri in result.column_values(var).filter_map(|t| t.as_iri()) {
      self.found.add(iri, kind);
    }
  }

  fn property_kind(&self, object: &TermPattern) -> ElementKind {
    match object {
      TermPattern::Literal(_) => ElementKind::DatatypeProperty,
      TermPattern::Variable(v) => {
        let mut values = self.result.column_values(v.as_str()).peekable();
        if values.peek().is_none() {
          ElementKind::Property
        } else if values.any(|t| t.is_literal()) {
          ElementKind::DatatypeProperty
        } else {
          ElementKind::ObjectProperty
        }
      }
      _ => ElementKind::ObjectProperty,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::Term;

  const EX: &str = "http://example.org/onto#";

  fn ex(local: &str) -> String { format!("{EX}{local}") }

  fn result(columns: &[&str], rows: Vec<Vec<Option<Term>>>) -> QueryResult {
    QueryResult { columns: columns.iter().map(|c| (*c).to_owned()).collect(), rows }
  }

  fn kinds(found: &[ElementRef]) -> BTreeMap<String, ElementKind> {
    found.iter().map(|e| (e.iri.clone(), e.kind)).collect()
  }

  #[test]
  fn type_pattern_yields_class_and_bound_individuals() {
    let q = format!("PREFIX : <{EX}> SELECT ?x WHERE {{ ?x a :Vehicle }}");
    let r = result(&["x"], vec![vec![Some(Term::iri(ex("car1")))]]);
    let found = kinds(&extract(&q, &r));
    assert_eq!(found.get(&ex("Vehicle")), Some(&ElementKind::Class));
    assert_eq!(found.get(&ex("car1")), Some(&ElementKind::Individual));
    assert_eq!(found.len(), 2);
  }

  #[test]
  fn property_kind_follows_object_shape() {
    let q = format!(
      "PREFIX ex: <{EX}>
       SELECT * WHERE {{
         ?car ex:hasEngine ex:engine7 ;
              ex:name \"Civic\"@en ;
              ex:mass ?m .
       }}"
    );
    let r = result(&["car", "m"], vec![vec![
      Some(Term::iri(ex("car1"))),
      Some(Term::Literal {
        value:    "1200".into(),
        datatype: Some(format!("{XSD}integer")),
        lang:     None,
      }),
    ]]);
    let found = kinds(&extract(&q, &r));
    assert_eq!(found.get(&ex("hasEngine")), Some(&ElementKind::ObjectProperty));
    assert_eq!(found.get(&ex("name")), Some(&ElementKind::DatatypeProperty));
    assert_eq!(found.get(&ex("mass")), Some(&ElementKind::DatatypeProperty));
    assert_eq!(found.get(&ex("engine7")), Some(&ElementKind::Individual));
    assert_eq!(found.get(&ex("car1")), Some(&ElementKind::Individual));
  }

  #[test]
  fn unbound_variable_object_leaves_property_untyped() {
    let q = format!("SELECT * WHERE {{ ?s <{EX}partOf> ?o }}");
    let found = kinds(&extract(&q, &QueryResult::default()));
    assert_eq!(found.get(&ex("partOf")), Some(&ElementKind::Property));
  }

  #[test]
  fn object_lists_and_blank_node_property_lists() {
    let q = format!(
      "PREFIX ex: <{EX}>
       SELECT ?x WHERE {{
         ?x a ex:Car, ex:Vehicle ;
            ex:hasPart [ a ex:Wheel ; ex:radius 17 ] .
       }}"
    );
    let found = kinds(&extract(&q, &QueryResult::default()));
    assert_eq!(found.get(&ex("Car")), Some(&ElementKind::Class));
    assert_eq!(found.get(&ex("Vehicle")), Some(&ElementKind::Class));
    assert_eq!(found.get(&ex("Wheel")), Some(&ElementKind::Class));
    assert_eq!(found.get(&ex("hasPart")), Some(&ElementKind::ObjectProperty));
    assert_eq!(found.get(&ex("radius")), Some(&ElementKind::DatatypeProperty));
  }

  #[test]
  fn filters_values_and_builtins_are_ignored() {
    let q = format!(
      "PREFIX ex: <{EX}>
       PREFIX rdf: <{RDF}>
       PREFIX rdfs: <{RDFS}>
       SELECT ?x WHERE {{
         ?x rdf:type ex:Car .
         ?x rdfs:label ?l .
         FILTER(?x != ex:banned && regex(?l, \"^a{{2}}\"))
         VALUES ?y {{ ex:ignored }}
         OPTIONAL {{ ?x ex:color ?c }}
       }} ORDER BY ?x LIMIT 10"
    );
    let found = kinds(&extract(&q, &QueryResult::default()));
    assert!(found.contains_key(&ex("Car")));
    assert!(found.contains_key(&ex("color")));
    assert!(!found.contains_key(&ex("banned")));
    assert!(!found.contains_key(&ex("ignored")));
    assert!(found.keys().all(|k| k.starts_with(EX)));
  }

  #[test]
  fn schema_predicates_classify_their_terms() {
    let q = format!(
      "PREFIX ex: <{EX}> PREFIX rdfs: <{RDFS}>
       SELECT ?c WHERE {{ ?c rdfs:subClassOf ex:Vehicle . ex:drives rdfs:range ?r }}"
    );
    let r = result(&["c", "r"], vec![vec![
      Some(Term::iri(ex("Truck"))),
      Some(Term::iri(ex("Road"))),
    ]]);
    let found = kinds(&extract(&q, &r));
    assert_eq!(found.get(&ex("Vehicle")), Some(&ElementKind::Class));
    assert_eq!(found.get(&ex("Truck")), Some(&ElementKind::Class));
    assert_eq!(found.get(&ex("Road")), Some(&ElementKind::Class));
    assert_eq!(found.get(&ex("drives")), Some(&ElementKind::Property));
  }

  #[test]
  fn property_paths_record_every_step() {
    let q = format!("PREFIX ex: <{EX}> SELECT * WHERE {{ ?a ex:partOf+/^ex:owns ?b }}");
    let found = kinds(&extract(&q, &QueryResult::default()));
    assert_eq!(found.get(&ex("partOf")), Some(&ElementKind::Property));
    assert!(found.contains_key(&ex("owns")));
    assert!(found.keys().all(|k| k.starts_with(EX)));
  }

  #[test]
  fn nested_groups_graph_blocks_and_subselects() {
    let q = "BASE <http://example.org/fleet/>
       SELECT ?x WHERE {
         { ?x a <Car> } UNION { ?x a <Bus> }
         GRAPH ?g { ?x <operatedBy> ?op }
         { SELECT ?x (COUNT(?w) AS ?n) WHERE { ?x <hasWheel> ?w } GROUP BY ?x }
       }";
    let found = kinds(&extract(q, &QueryResult::default()));
    assert_eq!(found.get("http://example.org/fleet/Car"), Some(&ElementKind::Class));
    assert_eq!(found.get("http://example.org/fleet/Bus"), Some(&ElementKind::Class));
    assert!(found.contains_key("http://example.org/fleet/operatedBy"));
    assert!(found.contains_key("http://example.org/fleet/hasWheel"));
  }

  #[test]
  fn relative_iris_resolve_against_base_by_reference_rules() {
    let q = "BASE <http://example.org/onto/v1> SELECT ?x WHERE { ?x a <Vehicle> ; <../shared#owner> ?o }";
    let found = kinds(&extract(q, &QueryResult::default()));
    assert_eq!(found.get("http://example.org/onto/Vehicle"), Some(&ElementKind::Class));
    assert!(found.contains_key("http://example.org/shared#owner"));
    assert_eq!(found.len(), 2);
  }

  #[test]
  fn unparseable_queries_extract_nothing() {
    let r = result(&["x"], vec![vec![Some(Term::iri(ex("car1")))]]);
    assert!(extract("SELECT ?x WHERE { ?x a undeclared:Thing }", &r).is_empty());
  }

  #[test]
  fn class_usage_outranks_individual_usage() {
    let q = format!(
      "PREFIX ex: <{EX}> SELECT * WHERE {{ ex:Car ex:label ?l . ?x a ex:Car }}"
    );
    let found = kinds(&extract(&q, &QueryResult::default()));
    assert_eq!(found.get(&ex("Car")), Some(&ElementKind::Class));
  }

  #[test]
  fn comments_and_comparison_operators_are_not_elements() {
    let q = format!(
      "PREFIX ex: <{EX}>
       # ex:Commented a ex:Thing
       SELECT ?x WHERE {{ ?x ex:speed ?s . FILTER(?s < 10 && ?s >= 2) ?x a ex:Slow }}"
    );
    let found = kinds(&extract(&q, &QueryResult::default()));
    assert!(!found.contains_key(&ex("Commented")));
    assert_eq!(found.get(&ex("Slow")), Some(&ElementKind::Class));
  }
}
