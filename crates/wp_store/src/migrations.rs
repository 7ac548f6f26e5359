//! Database migrations for `wp_store`

use crate::StoreError;
use duckdb::Connection;
use tracing::{debug, info};

/// Migration definition
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "agent_snapshots",
        sql: include_str!("migrations/001_agent_snapshots.sql"),
    },
    Migration {
        version: 2,
        name: "snapshot_ts_index",
        sql: include_str!("migrations/002_snapshot_ts_index.sql"),
    },
];

/// Highest version recorded in `_migrations`, or 0 on a fresh database
fn applied_version(conn: &Connection) -> Result<u32, StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT current_timestamp
        );",
    )?;
    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;
    u32::try_from(version)
        .map_err(|_| StoreError::MigrationError(format!("invalid schema version {version}")))
}

/// Apply every migration newer than the recorded version.
///
/// Each migration commits together with its `_migrations` entry. Returns the
/// number applied.
///
/// # Errors
///
/// Returns [`StoreError`] if the bookkeeping table cannot be read or a
/// migration fails to apply.
pub fn run_all(conn: &mut Connection) -> Result<usize, StoreError> {
    let from = applied_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > from).collect();
    if pending.is_empty() {
        debug!(version = from, "Schema up to date");
        return Ok(0);
    }

    for migration in &pending {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql).map_err(|e| {
            StoreError::MigrationError(format!("{} (v{}): {e}", migration.name, migration.version))
        })?;
        tx.execute(
            "INSERT INTO _migrations (version, name) VALUES (?, ?)",
            duckdb::params![i64::from(migration.version), migration.name],
        )?;
        tx.commit()?;
        info!(version = migration.version, name = migration.name, "Applied migration");
    }

    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_applies_everything_once() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(run_all(&mut conn).unwrap(), MIGRATIONS.len());
        assert_eq!(run_all(&mut conn).unwrap(), 0);

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 2);
        assert_eq!(applied_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_resumes_from_recorded_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0].sql).unwrap();
        // Creates the bookkeeping table
        assert_eq!(applied_version(&conn).unwrap(), 0);
        conn.execute(
            "INSERT INTO _migrations (version, name) VALUES (1, 'agent_snapshots')",
            [],
        )
        .unwrap();

        assert_eq!(run_all(&mut conn).unwrap(), 1);
        assert_eq!(applied_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_versions_are_increasing() {
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
    }
}
