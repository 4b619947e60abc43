//! Ratatui front-end for the library catalog. The split mirrors the rest of
//! the crate: `app` owns the state machine, `screens` the per-table cursor
//! state, `forms` the modal input handling and boundary validation, and
//! `terminal` the raw-mode bootstrap. All persistence goes through
//! `crate::db`; nothing in here touches SQL.

mod app;
mod forms;
mod helpers;
mod screens;
mod terminal;

pub use app::App;
pub use terminal::run_app;
