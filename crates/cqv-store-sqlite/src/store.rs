//! [`SqliteStore`]: the SQLite implementation of [`ValidationStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use cqv_core::{
  dependency::{ChangeKind, ElementRef, OntologyDependency},
  microtheory::Microtheory,
  question::{CompetencyQuestion, CqStatus},
  run::{CqRun, Page},
  store::ValidationStore,
};

use crate::{
  Result,
  encode::{
    DEPENDENCY_COLUMNS, MICROTHEORY_COLUMNS, QUESTION_COLUMNS, RUN_COLUMNS, RawDependency,
    RawMicrotheory, RawQuestion, RawRun, encode_dt, encode_json, encode_u64, encode_uuid,
    decode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A validation store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store; useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_questions(&self, sql: String, args: Vec<Option<String>>) -> Result<Vec<CompetencyQuestion>> {
    let raws: Vec<RawQuestion> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(args), RawQuestion::read)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawQuestion::into_question).collect()
  }

  async fn query_microtheories(&self, sql: String, args: Vec<String>) -> Result<Vec<Microtheory>> {
    let raws: Vec<RawMicrotheory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(args), RawMicrotheory::read)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawMicrotheory::into_microtheory).collect()
  }

  async fn query_runs(&self, sql: String, args: Vec<rusqlite::types::Value>) -> Result<Vec<CqRun>> {
    let raws: Vec<RawRun> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(args), RawRun::read)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawRun::into_run).collect()
  }

  async fn query_dependencies(
    &self,
    sql: String,
    args: Vec<rusqlite::types::Value>,
  ) -> Result<Vec<OntologyDependency>> {
    let raws: Vec<RawDependency> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(args), RawDependency::read)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawDependency::into_dependency).collect()
  }
}

// ─── ValidationStore impl ────────────────────────────────────────────────────

impl ValidationStore for SqliteStore {
  type Error = crate::Error;

  // ── Questions ─────────────────────────────────────────────────────────────

  async fn create_question(&self, cq: CompetencyQuestion) -> Result<()> {
    let id_str       = encode_uuid(cq.cq_id);
    let params_str   = encode_json(&cq.params)?;
    let contract_str = encode_json(&cq.contract)?;
    let status_str   = cq.status.as_str();
    let version      = i64::from(cq.version);
    let created_str  = encode_dt(cq.created_at);
    let updated_str  = encode_dt(cq.updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO questions (
             cq_id, project_id, name, statement, params, template,
             default_microtheory, contract, status, version, created_by,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
          rusqlite::params![
            id_str,
            cq.project_id,
            cq.name,
            cq.statement,
            params_str,
            cq.template,
            cq.default_microtheory,
            contract_str,
            status_str,
            version,
            cq.created_by,
            created_str,
            updated_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_question(&self, cq_id: Uuid) -> Result<Option<CompetencyQuestion>> {
    let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE cq_id = ?1");
    let mut rows = self.query_questions(sql, vec![Some(encode_uuid(cq_id))]).await?;
    Ok(rows.pop())
  }

  async fn get_question_by_name(
    &self,
    project_id: &str,
    name: &str,
  ) -> Result<Option<CompetencyQuestion>> {
    let sql =
      format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE project_id = ?1 AND name = ?2");
    let mut rows = self
      .query_questions(sql, vec![Some(project_id.to_owned()), Some(name.to_owned())])
      .await?;
    Ok(rows.pop())
  }

  async fn list_questions(&self, project_id: Option<&str>) -> Result<Vec<CompetencyQuestion>> {
    let sql = format!(
      "SELECT {QUESTION_COLUMNS} FROM questions
       WHERE (?1 IS NULL OR project_id = ?1)
       ORDER BY project_id, name"
    );
    self.query_questions(sql, vec![project_id.map(str::to_owned)]).await
  }

  async fn update_question(&self, cq: CompetencyQuestion) -> Result<()> {
    let id_str       = encode_uuid(cq.cq_id);
    let params_str   = encode_json(&cq.params)?;
    let contract_str = encode_json(&cq.contract)?;
    let status_str   = cq.status.as_str();
    let version      = i64::from(cq.version);
    let updated_str  = encode_dt(cq.updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE questions SET
             name = ?2, statement = ?3, params = ?4, template = ?5,
             default_microtheory = ?6, contract = ?7, status = ?8, version = ?9,
             updated_at = ?10
           WHERE cq_id = ?1",
          rusqlite::params![
            id_str,
            cq.name,
            cq.statement,
            params_str,
            cq.template,
            cq.default_microtheory,
            contract_str,
            status_str,
            version,
            updated_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn set_question_status(
    &self,
    cq_id: Uuid,
    status: CqStatus,
    at: DateTime<Utc>,
  ) -> Result<()> {
    let id_str     = encode_uuid(cq_id);
    let status_str = status.as_str();
    let at_str     = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE questions SET status = ?2, updated_at = ?3 WHERE cq_id = ?1",
          rusqlite::params![id_str, status_str, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn delete_question(&self, cq_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(cq_id);
    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM questions WHERE cq_id = ?1", rusqlite::params![id_str])?)
      })
      .await?;
    Ok(n > 0)
  }

  async fn count_runs(&self, cq_id: Uuid) -> Result<u64> {
    let id_str = encode_uuid(cq_id);
    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM runs WHERE cq_id = ?1",
          rusqlite::params![id_str],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(u64::try_from(n).unwrap_or(0))
  }

  // ── Microtheories ─────────────────────────────────────────────────────────

  async fn create_microtheory(&self, mt: Microtheory) -> Result<()> {
    let id_str = encode_uuid(mt.mt_id);
    let at_str = encode_dt(mt.created_at);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if mt.is_default {
          tx.execute(
            "UPDATE microtheories SET is_default = 0 WHERE project_id = ?1 AND is_default = 1",
            rusqlite::params![mt.project_id],
          )?;
        }
        tx.execute(
          "INSERT INTO microtheories (mt_id, project_id, label, iri, parent_iri, is_default, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str,
            mt.project_id,
            mt.label,
            mt.iri,
            mt.parent_iri,
            mt.is_default,
            at_str,
          ],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_microtheory(&self, mt_id: Uuid) -> Result<Option<Microtheory>> {
    let sql = format!("SELECT {MICROTHEORY_COLUMNS} FROM microtheories WHERE mt_id = ?1");
    Ok(self.query_microtheories(sql, vec![encode_uuid(mt_id)]).await?.pop())
  }

  async fn get_microtheory_by_iri(&self, iri: &str) -> Result<Option<Microtheory>> {
    let sql = format!("SELECT {MICROTHEORY_COLUMNS} FROM microtheories WHERE iri = ?1");
    Ok(self.query_microtheories(sql, vec![iri.to_owned()]).await?.pop())
  }

  async fn list_microtheories(&self, project_id: &str) -> Result<Vec<Microtheory>> {
    let sql = format!(
      "SELECT {MICROTHEORY_COLUMNS} FROM microtheories WHERE project_id = ?1 ORDER BY label"
    );
    self.query_microtheories(sql, vec![project_id.to_owned()]).await
  }

  async fn default_microtheory(&self, project_id: &str) -> Result<Option<Microtheory>> {
    let sql = format!(
      "SELECT {MICROTHEORY_COLUMNS} FROM microtheories WHERE project_id = ?1 AND is_default = 1"
    );
    Ok(self.query_microtheories(sql, vec![project_id.to_owned()]).await?.pop())
  }

  async fn set_default_microtheory(&self, mt_id: Uuid) -> Result<Option<Microtheory>> {
    let id_str = encode_uuid(mt_id);
    let select = format!("SELECT {MICROTHEORY_COLUMNS} FROM microtheories WHERE mt_id = ?1");

    // Clear and set inside one immediate transaction: no reader ever sees a
    // project with zero or two defaults.
    let raw: Option<RawMicrotheory> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let project: Option<String> = tx
          .query_row(
            "SELECT project_id FROM microtheories WHERE mt_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;
        let Some(project) = project else {
          return Ok(None);
        };

        tx.execute(
          "UPDATE microtheories SET is_default = 0
           WHERE project_id = ?1 AND is_default = 1 AND mt_id != ?2",
          rusqlite::params![project, id_str],
        )?;
        tx.execute(
          "UPDATE microtheories SET is_default = 1 WHERE mt_id = ?1",
          rusqlite::params![id_str],
        )?;
        let raw = tx.query_row(&select, rusqlite::params![id_str], RawMicrotheory::read)?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    raw.map(RawMicrotheory::into_microtheory).transpose()
  }

  async fn delete_microtheory(&self, mt_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(mt_id);
    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let iri: Option<String> = tx
          .query_row(
            "SELECT iri FROM microtheories WHERE mt_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;
        let Some(iri) = iri else {
          return Ok(false);
        };
        tx.execute(
          "DELETE FROM dependencies WHERE microtheory_iri = ?1",
          rusqlite::params![iri],
        )?;
        tx.execute("DELETE FROM microtheories WHERE mt_id = ?1", rusqlite::params![id_str])?;
        tx.commit()?;
        Ok(true)
      })
      .await?;
    Ok(deleted)
  }

  // ── Runs ──────────────────────────────────────────────────────────────────

  async fn record_run(&self, run: CqRun) -> Result<()> {
    let run_id_str   = encode_uuid(run.run_id);
    let cq_id_str    = encode_uuid(run.cq_id);
    let version      = i64::from(run.cq_version);
    let params_str   = encode_json(&run.params)?;
    let reason_str   = run.reason.map(|r| r.as_str());
    let detail_str   = run.detail.as_ref().map(encode_json).transpose()?;
    let warnings_str = encode_json(&run.warnings)?;
    let row_count    = run.row_count.map(encode_u64);
    let columns_str  = encode_json(&run.columns)?;
    let preview_str  = encode_json(&run.preview)?;
    let latency      = run.latency_ms.map(encode_u64);
    let touched_str  = encode_json(&run.touched)?;
    let at_str       = encode_dt(run.executed_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO runs (
             run_id, cq_id, cq_version, project_id, microtheory_iri, params,
             bound_query, query_hash, pass, reason, detail, warnings,
             row_count, columns, preview, latency_ms, touched, executed_by,
             executed_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19)",
          rusqlite::params![
            run_id_str,
            cq_id_str,
            version,
            run.project_id,
            run.microtheory_iri,
            params_str,
            run.bound_query,
            run.query_hash,
            run.pass,
            reason_str,
            detail_str,
            warnings_str,
            row_count,
            columns_str,
            preview_str,
            latency,
            touched_str,
            run.executed_by,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_run(&self, run_id: Uuid) -> Result<Option<CqRun>> {
    let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE run_id = ?1");
    Ok(self.query_runs(sql, vec![encode_uuid(run_id).into()]).await?.pop())
  }

  async fn list_runs(&self, cq_id: Uuid, page: Page) -> Result<Vec<CqRun>> {
    let sql = format!(
      "SELECT {RUN_COLUMNS} FROM runs WHERE cq_id = ?1
       ORDER BY executed_at DESC, rowid DESC
       LIMIT ?2 OFFSET ?3"
    );
    let limit = i64::try_from(page.limit).unwrap_or(i64::MAX);
    let offset = i64::try_from(page.offset).unwrap_or(i64::MAX);
    self
      .query_runs(sql, vec![encode_uuid(cq_id).into(), limit.into(), offset.into()])
      .await
  }

  async fn latest_passing_run(&self, cq_id: Uuid, microtheory_iri: &str) -> Result<Option<CqRun>> {
    let sql = format!(
      "SELECT {RUN_COLUMNS} FROM runs
       WHERE cq_id = ?1 AND microtheory_iri = ?2 AND pass = 1
       ORDER BY executed_at DESC, rowid DESC
       LIMIT 1"
    );
    let args = vec![encode_uuid(cq_id).into(), microtheory_iri.to_owned().into()];
    Ok(self.query_runs(sql, args).await?.pop())
  }

  async fn questions_passing_in(&self, microtheory_iri: &str) -> Result<Vec<Uuid>> {
    let iri = microtheory_iri.to_owned();
    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT cq_id FROM runs WHERE microtheory_iri = ?1 AND pass = 1 ORDER BY cq_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![iri], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  // ── Dependencies ──────────────────────────────────────────────────────────

  async fn upsert_dependencies(
    &self,
    microtheory_iri: &str,
    elements: &[ElementRef],
    at: DateTime<Utc>,
  ) -> Result<()> {
    let iri = microtheory_iri.to_owned();
    let elements = elements.to_vec();
    let at_str = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO dependencies (
               microtheory_iri, element_iri, element_kind, first_seen_at,
               last_validated_at, is_valid
             ) VALUES (?1, ?2, ?3, ?4, ?4, 1)
             ON CONFLICT (microtheory_iri, element_iri) DO UPDATE SET
               element_kind      = excluded.element_kind,
               last_validated_at = excluded.last_validated_at,
               is_valid          = 1",
          )?;
          for e in &elements {
            stmt.execute(rusqlite::params![iri, e.iri, e.kind.as_str(), at_str])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn invalidate_dependencies(
    &self,
    graph_iri: Option<&str>,
    element_iri: &str,
    kind: ChangeKind,
    at: DateTime<Utc>,
  ) -> Result<u64> {
    let graph = graph_iri.map(str::to_owned);
    let element = element_iri.to_owned();
    let kind_str = kind.as_str();
    let at_str = encode_dt(at);

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE dependencies
           SET is_valid = 0, invalidated_at = ?3, invalidated_by = ?4
           WHERE element_iri = ?2
             AND is_valid = 1
             AND (?1 IS NULL OR microtheory_iri = ?1)",
          rusqlite::params![graph, element, at_str, kind_str],
        )?)
      })
      .await?;
    Ok(n as u64)
  }

  async fn list_dependencies(
    &self,
    microtheory_iri: &str,
    invalid_only: bool,
  ) -> Result<Vec<OntologyDependency>> {
    let sql = format!(
      "SELECT {DEPENDENCY_COLUMNS} FROM dependencies
       WHERE microtheory_iri = ?1 AND (?2 = 0 OR is_valid = 0)
       ORDER BY element_iri"
    );
    self
      .query_dependencies(sql, vec![microtheory_iri.to_owned().into(), i64::from(invalid_only).into()])
      .await
  }

  async fn dependencies_for_element(&self, element_iri: &str) -> Result<Vec<OntologyDependency>> {
    let sql = format!(
      "SELECT {DEPENDENCY_COLUMNS} FROM dependencies WHERE element_iri = ?1 ORDER BY microtheory_iri"
    );
    self.query_dependencies(sql, vec![element_iri.to_owned().into()]).await
  }
}
