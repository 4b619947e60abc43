//! Binary entry point that glues the SQLite-backed catalog to the TUI: bring
//! up the database, seed the demo fixture on first run, and drive the Ratatui
//! event loop until the user exits.
use library_catalog_manager::{ensure_schema, run_app, seed_demo_data, App};

/// Initialize persistence, seed once, and launch the Ratatui event loop.
///
/// Returning a `Result` bubbles up fatal initialization problems (for example
/// an unwritable home directory) to the terminal instead of crashing silently.
fn main() -> anyhow::Result<()> {
    let mut conn = ensure_schema()?;
    seed_demo_data(&mut conn)?;

    let mut app = App::new(conn);
    run_app(&mut app)
}
