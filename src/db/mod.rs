pub mod migrations;
pub mod queries;

use anyhow::Context;
use rusqlite::Connection;

/// Opens the reservation store and brings its schema up to date.
/// `:memory:` gives a private in-memory database (used by the tests).
pub fn init_db(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open reservation database at {path}"))?;

    // Reconciliation takes IMMEDIATE write locks; wait for them instead of failing.
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA foreign_keys=ON;
         PRAGMA busy_timeout=5000;",
    )
    .context("failed to set database pragmas")?;

    migrations::run_migrations(&conn)?;
    tracing::debug!(path = %path, "reservation database ready");

    Ok(conn)
}
