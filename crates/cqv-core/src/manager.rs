//! Microtheory lifecycle: create, clone, set-default, load and delete.
//!
//! Graph content lives in the [`GraphStore`]; identity, lineage and the
//! default flag live in the [`ValidationStore`]. A listed microtheory always
//! has a graph behind it: on create the graph is written first and discarded
//! if the metadata write fails, on delete the metadata row goes first and a
//! failed graph drop leaves only an unlisted graph.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
  Error, Result,
  graph::GraphStore,
  microtheory::{Microtheory, MicrotheoryRef, NewMicrotheory},
  store::{StoreConflict, ValidationStore},
};

pub struct MicrotheoryManager<S, G> {
  store: Arc<S>,
  graph: Arc<G>,
}

impl<S, G> Clone for MicrotheoryManager<S, G> {
  fn clone(&self) -> Self { Self { store: self.store.clone(), graph: self.graph.clone() } }
}

impl<S: ValidationStore, G: GraphStore> MicrotheoryManager<S, G> {
  pub fn new(store: Arc<S>, graph: Arc<G>) -> Self { Self { store, graph } }

  pub async fn get(&self, r: &MicrotheoryRef) -> Result<Option<Microtheory>> {
    let found = match r {
      MicrotheoryRef::Id(id) => self.store.get_microtheory(*id).await,
      MicrotheoryRef::Iri(iri) => self.store.get_microtheory_by_iri(iri).await,
    };
    found.map_err(Error::store)
  }

  pub async fn resolve(&self, r: &MicrotheoryRef) -> Result<Microtheory> {
    self.get(r).await?.ok_or_else(|| Error::MicrotheoryNotFound(r.to_string()))
  }

  pub async fn list(&self, project_id: &str) -> Result<Vec<Microtheory>> {
    self.store.list_microtheories(project_id).await.map_err(Error::store)
  }

  pub async fn project_default(&self, project_id: &str) -> Result<Option<Microtheory>> {
    self.store.default_microtheory(project_id).await.map_err(Error::store)
  }

  /// Create a fresh named graph, optionally seeded with Turtle.
  pub async fn create(&self, input: NewMicrotheory) -> Result<Microtheory> {
    let mt_id = Uuid::new_v4();
    let mt = Microtheory {
      mt_id,
      project_id: input.project_id,
      label: input.label,
      iri: Microtheory::mint_iri(mt_id),
      parent_iri: None,
      is_default: input.make_default,
      created_at: Utc::now(),
    };

    self.graph.create_graph(&mt.iri).await?;
    if let Some(seed) = input.seed.as_deref().filter(|s| !s.trim().is_empty())
      && let Err(e) = self.graph.load_turtle(&mt.iri, seed).await
    {
      self.discard_graph(&mt.iri).await;
      return Err(e.into());
    }

    let mt = self.insert(mt).await?;
    tracing::info!(
      mt_id = %mt.mt_id,
      project_id = %mt.project_id,
      label = %mt.label,
      is_default = mt.is_default,
      "microtheory created"
    );
    Ok(mt)
  }

  /// Snapshot `source` into a new microtheory. Later edits to either graph
  /// do not propagate.
  pub async fn clone_from(&self, source: &MicrotheoryRef, label: String) -> Result<Microtheory> {
    let source = self.resolve(source).await?;
    let mt_id = Uuid::new_v4();
    let mt = Microtheory {
      mt_id,
      project_id: source.project_id.clone(),
      label,
      iri: Microtheory::mint_iri(mt_id),
      parent_iri: Some(source.iri.clone()),
      is_default: false,
      created_at: Utc::now(),
    };

    self.graph.copy_graph(&source.iri, &mt.iri).await?;
    let mt = self.insert(mt).await?;
    tracing::info!(mt_id = %mt.mt_id, parent = %source.iri, "microtheory cloned");
    Ok(mt)
  }

  /// Make `r` the single default of its project in one transaction.
  pub async fn set_default(&self, r: &MicrotheoryRef) -> Result<Microtheory> {
    let mt = self.resolve(r).await?;
    let mt = self
      .store
      .set_default_microtheory(mt.mt_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::MicrotheoryNotFound(r.to_string()))?;
    tracing::info!(mt_id = %mt.mt_id, project_id = %mt.project_id, "default microtheory set");
    Ok(mt)
  }

  /// Append Turtle content to the microtheory's graph.
  pub async fn load(&self, r: &MicrotheoryRef, turtle: &str) -> Result<Microtheory> {
    let mt = self.resolve(r).await?;
    self.graph.load_turtle(&mt.iri, turtle).await?;
    tracing::debug!(mt_id = %mt.mt_id, bytes = turtle.len(), "turtle loaded");
    Ok(mt)
  }

  /// Remove the metadata row and its dependency rows, then drop the graph.
  /// Run history that names this microtheory is kept.
  pub async fn delete(&self, r: &MicrotheoryRef) -> Result<Microtheory> {
    let mt = self.resolve(r).await?;
    self.store.delete_microtheory(mt.mt_id).await.map_err(Error::store)?;
    if let Err(e) = self.graph.drop_graph(&mt.iri).await {
      tracing::warn!(iri = %mt.iri, error = %e, "microtheory deleted but its graph was not dropped");
    }
    tracing::info!(mt_id = %mt.mt_id, iri = %mt.iri, "microtheory deleted");
    Ok(mt)
  }

  async fn insert(&self, mt: Microtheory) -> Result<Microtheory> {
    match self.store.create_microtheory(mt.clone()).await {
      Ok(()) => Ok(mt),
      Err(e) => {
        self.discard_graph(&mt.iri).await;
        if e.is_conflict() {
          Err(Error::DuplicateMicrotheoryLabel { project_id: mt.project_id, label: mt.label })
        } else {
          Err(Error::store(e))
        }
      }
    }
  }

  async fn discard_graph(&self, iri: &str) {
    if let Err(e) = self.graph.drop_graph(iri).await {
      tracing::warn!(iri, error = %e, "could not discard graph after failed create");
    }
  }
}
