mod schema;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::*;
use crate::pricing;

const SETTINGS_EXCHANGE_RATE_KEY: &str = "exchange_rate";

const PROJECT_COLUMNS: &str = "id, name, description, parent_id, branch_path, document_json, result_json, created_at, updated_at";

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// A `projects` row before its JSON columns are decoded.
struct ProjectRow {
    summary: ProjectSummary,
    document_json: String,
    result_json: String,
}

impl ProjectRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            summary: ProjectSummary {
                id: parse_uuid(row.get::<_, String>(0)?),
                name: row.get(1)?,
                description: row.get(2)?,
                parent_id: row.get::<_, Option<String>>(3)?.map(parse_uuid),
                branch_path: row.get(4)?,
                created_at: parse_datetime(row.get::<_, String>(7)?),
                updated_at: parse_datetime(row.get::<_, String>(8)?),
            },
            document_json: row.get(5)?,
            result_json: row.get(6)?,
        })
    }

    fn into_snapshot(self) -> Result<ProjectSnapshot> {
        let document = serde_json::from_str(&self.document_json)
            .with_context(|| format!("Corrupt document for project {}", self.summary.id))?;
        let result = serde_json::from_str(&self.result_json)
            .with_context(|| format!("Corrupt result for project {}", self.summary.id))?;
        Ok(ProjectSnapshot {
            summary: self.summary,
            document,
            result,
        })
    }
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "fba-planner")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("fba_planner.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&mut conn)
    }

    // ============================================================
    // Settings
    // ============================================================

    /// The shared settings; defaults when nothing (or nothing parsable) is stored.
    pub fn get_settings(&self) -> Result<Settings> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                [SETTINGS_EXCHANGE_RATE_KEY],
                |row| row.get(0),
            )
            .optional()?;

        let exchange_rate = value
            .and_then(|v| v.parse::<Decimal>().ok())
            .map(ExchangeRate::from_decimal)
            .unwrap_or_default();
        Ok(Settings { exchange_rate })
    }

    pub fn update_settings(&self, settings: Settings) -> Result<Settings> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (
                SETTINGS_EXCHANGE_RATE_KEY,
                settings.exchange_rate.to_string(),
            ),
        )?;
        Ok(settings)
    }

    // ============================================================
    // Project operations
    // ============================================================

    /// All snapshot summaries in branch-path order.
    pub fn get_project_summaries(&self) -> Result<Vec<ProjectSummary>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY branch_path"
        ))?;

        let mut summaries = stmt
            .query_map([], |row| ProjectRow::from_row(row).map(|r| r.summary))?
            .collect::<Result<Vec<_>, _>>()?;
        summaries.sort_by(|a, b| branch_path::compare(&a.branch_path, &b.branch_path));

        Ok(summaries)
    }

    pub fn get_project_tree(&self) -> Result<ProjectForest> {
        Ok(ProjectForest::from_summaries(self.get_project_summaries()?))
    }

    pub fn get_project(&self, id: Uuid) -> Result<Option<ProjectSnapshot>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let row = conn
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"),
                [id.to_string()],
                ProjectRow::from_row,
            )
            .optional()?;

        row.map(ProjectRow::into_snapshot).transpose()
    }

    /// Save `input` as a new root snapshot with a freshly computed result.
    pub fn create_project(&self, input: SaveProjectInput) -> Result<ProjectSnapshot> {
        input.meta.validate()?;
        let result = pricing::calculate(&input.input)?;

        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;

        let roots = sibling_paths(&tx, None)?;
        let branch_path = branch_path::next_segment(roots.iter().map(String::as_str));

        let id = Uuid::new_v4();
        let now = Utc::now();
        tx.execute(
            &format!("INSERT INTO projects ({PROJECT_COLUMNS}) VALUES (?, ?, ?, NULL, ?, ?, ?, ?, ?)"),
            (
                id.to_string(),
                &input.meta.name,
                &input.meta.description,
                &branch_path,
                serde_json::to_string(&input.input)?,
                serde_json::to_string(&result)?,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;
        tx.commit()?;

        tracing::info!("Created project {} at {}", id, branch_path);

        Ok(ProjectSnapshot {
            summary: ProjectSummary {
                id,
                name: input.meta.name,
                description: input.meta.description,
                parent_id: None,
                branch_path,
                created_at: now,
                updated_at: now,
            },
            document: input.input,
            result,
        })
    }

    /// Overwrite a snapshot's meta, document and result in place.
    ///
    /// Identity, parent and branch path are preserved.
    pub fn update_project(
        &self,
        id: Uuid,
        input: SaveProjectInput,
    ) -> Result<Option<ProjectSnapshot>> {
        input.meta.validate()?;
        let Some(existing) = self.get_project(id)? else {
            return Ok(None);
        };
        let result = pricing::calculate(&input.input)?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        conn.execute(
            "UPDATE projects SET name = ?, description = ?, document_json = ?, result_json = ?, updated_at = ? WHERE id = ?",
            (
                &input.meta.name,
                &input.meta.description,
                serde_json::to_string(&input.input)?,
                serde_json::to_string(&result)?,
                now.to_rfc3339(),
                id.to_string(),
            ),
        )?;

        Ok(Some(ProjectSnapshot {
            summary: ProjectSummary {
                name: input.meta.name,
                description: input.meta.description,
                updated_at: now,
                ..existing.summary
            },
            document: input.input,
            result,
        }))
    }

    /// Create a child of `parent_id` that inherits the parent's stored
    /// document and result.
    pub fn create_branch(
        &self,
        parent_id: Uuid,
        input: CreateBranchInput,
    ) -> Result<Option<ProjectSnapshot>> {
        input.meta.validate()?;
        let Some(parent) = self.get_project(parent_id)? else {
            return Ok(None);
        };

        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;

        let siblings = sibling_paths(&tx, Some(parent_id))?;
        let segment =
            branch_path::next_segment(siblings.iter().map(|p| branch_path::last_segment(p)));
        let path = branch_path::child_path(&parent.summary.branch_path, &segment);

        let id = Uuid::new_v4();
        let now = Utc::now();
        tx.execute(
            &format!("INSERT INTO projects ({PROJECT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            (
                id.to_string(),
                &input.meta.name,
                &input.meta.description,
                parent_id.to_string(),
                &path,
                serde_json::to_string(&parent.document)?,
                serde_json::to_string(&parent.result)?,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;
        tx.commit()?;

        tracing::info!("Branched project {} from {} at {}", id, parent_id, path);

        Ok(Some(ProjectSnapshot {
            summary: ProjectSummary {
                id,
                name: input.meta.name,
                description: input.meta.description,
                parent_id: Some(parent_id),
                branch_path: path,
                created_at: now,
                updated_at: now,
            },
            document: parent.document,
            result: parent.result,
        }))
    }

    /// Delete a snapshot and every descendant in one transaction.
    ///
    /// Returns the deleted ids, the requested one first; empty if `id` does
    /// not exist.
    pub fn delete_project_cascade(&self, id: Uuid) -> Result<Vec<Uuid>> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;

        let mut children_by_parent: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut exists = false;
        {
            let mut stmt = tx.prepare("SELECT id, parent_id FROM projects")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let child = parse_uuid(row.get::<_, String>(0)?);
                exists |= child == id;
                if let Some(parent) = row.get::<_, Option<String>>(1)?.map(parse_uuid) {
                    children_by_parent.entry(parent).or_default().push(child);
                }
            }
        }
        if !exists {
            return Ok(Vec::new());
        }

        let mut deleted = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if deleted.contains(&current) {
                continue;
            }
            deleted.push(current);
            if let Some(children) = children_by_parent.get(&current) {
                stack.extend(children.iter().copied());
            }
        }

        let placeholders = vec!["?"; deleted.len()].join(", ");
        tx.execute(
            &format!("DELETE FROM projects WHERE id IN ({placeholders})"),
            rusqlite::params_from_iter(deleted.iter().map(|u| u.to_string())),
        )?;
        tx.commit()?;

        tracing::info!("Deleted project {} with {} descendants", id, deleted.len() - 1);
        Ok(deleted)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn sibling_paths(conn: &Connection, parent_id: Option<Uuid>) -> Result<Vec<String>> {
    let paths = match parent_id {
        Some(parent) => {
            let mut stmt = conn.prepare("SELECT branch_path FROM projects WHERE parent_id = ?")?;
            let rows = stmt
                .query_map([parent.to_string()], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare("SELECT branch_path FROM projects WHERE parent_id IS NULL")?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            rows
        }
    };
    Ok(paths)
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
