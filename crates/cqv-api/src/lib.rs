//! JSON REST API for competency-question validation.
//!
//! Exposes an axum [`Router`] over an [`Engine`] backed by any
//! [`ValidationStore`] and [`GraphStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", cqv_api::api_router(engine.clone()))
//! ```

pub mod dependencies;
pub mod error;
pub mod microtheories;
pub mod questions;
pub mod runs;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use cqv_core::{engine::Engine, graph::GraphStore, store::ValidationStore};

pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, G>(engine: Arc<Engine<S, G>>) -> Router<()>
where
  S: ValidationStore + 'static,
  G: GraphStore + 'static,
{
  Router::new()
    // Questions
    .route("/questions", get(questions::list::<S, G>).post(questions::create::<S, G>))
    .route(
      "/questions/{id}",
      get(questions::get_one::<S, G>)
        .patch(questions::update::<S, G>)
        .delete(questions::delete::<S, G>),
    )
    .route("/questions/{id}/status", post(questions::set_status::<S, G>))
    .route("/questions/{id}/deprecate", post(questions::deprecate::<S, G>))
    .route("/questions/{id}/execute", post(questions::execute::<S, G>))
    // Runs
    .route("/questions/{id}/runs", get(runs::list::<S, G>))
    .route("/questions/{id}/runs/latest", get(runs::latest::<S, G>))
    .route("/runs/{id}", get(runs::get_one::<S, G>))
    // Microtheories
    .route(
      "/microtheories",
      get(microtheories::list::<S, G>).post(microtheories::create::<S, G>),
    )
    .route(
      "/microtheories/{id}",
      get(microtheories::get_one::<S, G>).delete(microtheories::delete::<S, G>),
    )
    .route("/microtheories/{id}/clone", post(microtheories::clone_one::<S, G>))
    .route("/microtheories/{id}/default", post(microtheories::set_default::<S, G>))
    .route("/microtheories/{id}/load", post(microtheories::load::<S, G>))
    .route("/microtheories/{id}/revalidate", post(microtheories::revalidate::<S, G>))
    // Dependencies
    .route("/microtheories/{id}/dependencies", get(dependencies::for_microtheory::<S, G>))
    .route("/microtheories/{id}/stale-questions", get(dependencies::stale::<S, G>))
    .route("/dependencies", get(dependencies::for_element::<S, G>))
    .route("/notifications", post(dependencies::notify::<S, G>))
    .route("/notifications/batch", post(dependencies::notify_batch::<S, G>))
    .with_state(engine)
}

#[cfg(test)]
mod tests;
