use std::collections::HashSet;

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Embedded schema steps, applied in order and recorded in `schema_migrations`.
const MIGRATIONS: &[(&str, &str, &str)] = &[(
    "001",
    "initial",
    include_str!("migrations/001_initial.sql"),
)];

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .context("Failed to create schema_migrations table")?;

    let applied: HashSet<String> = applied_versions(conn)?.into_iter().collect();
    let pending = MIGRATIONS
        .iter()
        .filter(|(version, _, _)| !applied.contains(*version));

    for &(version, name, sql) in pending {
        tracing::info!("Applying schema {} ({})", version, name);
        let tx = conn.transaction()?;
        tx.execute_batch(sql)
            .with_context(|| format!("Schema {} ({}) failed", version, name))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            (version, name, chrono::Utc::now().to_rfc3339()),
        )?;
        tx.commit()?;
    }

    Ok(())
}

fn applied_versions(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_gets_every_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('projects', 'settings')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);

        let versions = applied_versions(&conn).unwrap();
        assert_eq!(versions, vec!["001"]);
    }

    #[test]
    fn rerunning_applies_nothing_twice() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let versions = applied_versions(&conn).unwrap();
        assert_eq!(versions, vec!["001"]);
    }

    #[test]
    fn branch_paths_are_unique() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        let insert = "INSERT INTO projects (id, name, branch_path, document_json, result_json, created_at, updated_at)
                      VALUES (?, 'p', 'A', '{}', '{}', 'now', 'now')";
        conn.execute(insert, ["one"]).unwrap();
        assert!(conn.execute(insert, ["two"]).is_err());
    }
}
