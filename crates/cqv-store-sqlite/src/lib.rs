//! SQLite backend for the validation store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every call is serialised through that
//! one connection, and the default-microtheory toggle runs in an immediate
//! transaction on top of it.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
