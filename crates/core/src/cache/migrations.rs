//! Schema versions for the store database.
//!
//! `_migrations` records every applied version. Opening a database applies
//! the versions above the highest recorded one inside a single transaction,
//! so a half-migrated file is never left behind.

use super::Error;
use tokio_rusqlite::{Connection, params};

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration { version: 1, name: "stores", sql: include_str!("../../migrations/001_stores.sql") },
    Migration { version: 2, name: "entries", sql: include_str!("../../migrations/002_entries.sql") },
];

/// Bring the schema up to the latest version.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` naming the version whose SQL was rejected.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    let applied = conn
        .call(|conn| -> Result<Vec<i64>, Error> {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS _migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                )",
            )?;
            let current: i64 =
                conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

            let tx = conn.transaction()?;
            let mut applied = Vec::new();
            for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
                tx.execute_batch(migration.sql).map_err(|e| {
                    Error::MigrationFailed(format!("{} ({}): {e}", migration.version, migration.name))
                })?;
                tx.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                    params![migration.version, chrono::Utc::now().to_rfc3339()],
                )?;
                applied.push(migration.version);
            }
            tx.commit()?;

            Ok(applied)
        })
        .await
        .map_err(Error::from)?;

    for version in applied {
        tracing::debug!(version, "applied migration");
    }
    Ok(())
}
