//! Conversion from oxigraph query results to [`QueryResult`].
//!
//! Shared by both backends: the embedded store evaluates to [`QueryResults`]
//! directly, the HTTP store parses a SPARQL JSON document into the same type.

use std::io::Cursor;

use cqv_core::graph::{GraphError, QueryResult, Term};
use oxigraph::{
  model::Term as OxTerm,
  sparql::{QueryResults, results::QueryResultsFormat},
};

const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";

pub(crate) fn storage(e: impl std::fmt::Display) -> GraphError {
  GraphError::Storage(e.to_string())
}

pub(crate) fn convert(term: &OxTerm) -> Term {
  #[allow(unreachable_patterns)]
  match term {
    OxTerm::NamedNode(n) => Term::iri(n.as_str()),
    OxTerm::BlankNode(b) => Term::BlankNode { value: b.as_str().to_owned() },
    OxTerm::Literal(l) => {
      let lang = l.language().map(str::to_owned);
      let datatype = Some(l.datatype().as_str())
        .filter(|dt| lang.is_none() && *dt != XSD_STRING)
        .map(str::to_owned);
      Term::Literal { value: l.value().to_owned(), datatype, lang }
    }
    other => Term::literal(other.to_string()),
  }
}

/// Materialise `results`. `cancelled` is polled between rows; once it
/// returns true evaluation stops with a storage error.
pub(crate) fn collect(
  results: QueryResults,
  cancelled: impl Fn() -> bool,
) -> Result<QueryResult, GraphError> {
  let stop = || GraphError::Storage("query evaluation cancelled".into());
  match results {
    QueryResults::Solutions(solutions) => {
      let columns: Vec<String> =
        solutions.variables().iter().map(|v| v.as_str().to_owned()).collect();
      let mut rows = Vec::new();
      for solution in solutions {
        if cancelled() {
          return Err(stop());
        }
        let solution = solution.map_err(storage)?;
        rows.push((0..columns.len()).map(|i| solution.get(i).map(convert)).collect());
      }
      Ok(QueryResult { columns, rows })
    }
    // ASK: one row when true, none when false.
    QueryResults::Boolean(b) => Ok(QueryResult {
      columns: vec!["boolean".into()],
      rows:    if b {
        vec![vec![Some(Term::Literal {
          value:    "true".into(),
          datatype: Some(XSD_BOOLEAN.into()),
          lang:     None,
        })]]
      } else {
        Vec::new()
      },
    }),
    QueryResults::Graph(triples) => {
      let mut rows = Vec::new();
      for triple in triples {
        if cancelled() {
          return Err(stop());
        }
        let t = triple.map_err(storage)?;
        rows.push(vec![
          Some(convert(&OxTerm::from(t.subject))),
          Some(Term::iri(t.predicate.as_str())),
          Some(convert(&t.object)),
        ]);
      }
      Ok(QueryResult {
        columns: vec!["subject".into(), "predicate".into(), "object".into()],
        rows,
      })
    }
  }
}

/// Parse a `application/sparql-results+json` document.
pub(crate) fn decode_json(body: String) -> Result<QueryResult, GraphError> {
  let results = QueryResults::read(Cursor::new(body.into_bytes()), QueryResultsFormat::Json)
    .map_err(|e| GraphError::Storage(format!("malformed results document: {e}")))?;
  collect(results, || false)
}
