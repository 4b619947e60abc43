//! Core library surface for the Library Catalog Manager TUI application.
//!
//! The public modules exposed here provide an intentionally small API so the
//! `bin` target as well as potential external tooling can reuse the same
//! pieces: the entity model, the SQLite-backed repositories, and the
//! interactive front-end.
pub mod db;
pub mod models;
pub mod ui;

/// Convenience re-exports for the persistence layer. These are what `main.rs`
/// uses to bring up the embedded SQLite store before the UI takes over.
pub use db::{ensure_schema, seed_demo_data};

/// The interactive application entry point and state container.
pub use ui::{run_app, App};
