//! Core types, traits and engine components for competency-question
//! validation.
//!
//! A competency question (CQ) asserts that a graph-structured model can answer
//! a templated query. This crate binds, executes, judges and records those
//! assertions against microtheories (named graphs), and tracks which ontology
//! elements each microtheory's passing runs relied upon.
//!
//! No HTTP or database code lives here. Storage backends implement
//! [`store::ValidationStore`]; graph backends implement [`graph::GraphStore`].

pub mod binder;
pub mod contract;
pub mod dependency;
pub mod engine;
pub mod error;
pub mod executor;
pub mod extract;
pub mod graph;
pub mod manager;
pub mod microtheory;
pub mod question;
pub mod recorder;
pub mod retry;
pub mod run;
pub mod store;
pub mod tracker;
pub mod validator;

pub use error::{Error, Result};
