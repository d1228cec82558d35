//! SQLite-based storage for workspaces and tasks.
//!
//! Provides persistent storage for:
//! - Workspaces with their duration settings and filter lists
//! - Per-workspace to-do and completed task lists with elapsed time
//! - Key-value store for application state (current workspace)
//!
//! Every write runs in its own transaction and is rolled back on error.

use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{data_dir, migrations};
use crate::error::{CoreError, DatabaseError, Result};
use crate::filter::FilterMode;
use crate::timer::DurationConfig;
use crate::workspace::{Task, TaskType, Workspace};

const CURRENT_WORKSPACE_KEY: &str = "current_workspace_id";
const DEFAULT_WORKSPACE_NAME: &str = "Default";

const WORKSPACE_COLUMNS: &str = "id, name, position, work_duration, break_duration, \
     long_break_duration, work_intervals, autostart_work, autostart_break, \
     enable_website_filter, filter_mode, blocklist, allowlist";

const TASK_COLUMNS: &str =
    "id, workspace_id, name, task_type, position, elapsed_time_ms, target_time_ms";

/// SQLite database for workspaces and tasks.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/focuswall/focuswall.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> Result<Self> {
        Self::open_at(&data_dir()?.join("focuswall.db"))
    }

    /// Open (or create) the database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        let conn = Connection::open(&path)
            .map_err(|source| DatabaseError::OpenFailed { path, source })?;
        Self::init(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        migrations::migrate(&conn)?;
        let db = Self { conn };
        db.ensure_default_workspace()?;
        Ok(db)
    }

    /// Run `f` inside a transaction, committing on success.
    fn write<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // === Workspaces ===

    /// Make sure at least one workspace exists and one is selected.
    pub fn ensure_default_workspace(&self) -> Result<Workspace> {
        if let Some(ws) = self.current_workspace()? {
            return Ok(ws);
        }
        let ws = match self.list_workspaces()?.into_iter().next() {
            Some(ws) => ws,
            None => self.create_workspace(DEFAULT_WORKSPACE_NAME)?,
        };
        self.set_current_workspace_id(&ws.id)?;
        Ok(ws)
    }

    pub fn create_workspace(&self, name: &str) -> Result<Workspace> {
        let mut ws = Workspace::new(name);
        self.write(|conn| {
            ws.position = conn.query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM workspaces",
                [],
                |row| row.get(0),
            )?;
            insert_workspace(conn, &ws)?;
            Ok(())
        })?;
        Ok(ws)
    }

    pub fn get_workspace(&self, id: &str) -> Result<Option<Workspace>> {
        let sql = format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?1");
        let raw = self
            .conn
            .query_row(&sql, params![id], RawWorkspace::from_row)
            .optional()?;
        raw.map(RawWorkspace::into_workspace).transpose()
    }

    pub fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        let sql = format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces ORDER BY position, name");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], RawWorkspace::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_workspace()?);
        }
        Ok(out)
    }

    pub fn update_workspace(&self, ws: &Workspace) -> Result<()> {
        ws.durations.validate()?;
        let blocklist = serde_json::to_string(&ws.blocklist)?;
        let allowlist = serde_json::to_string(&ws.allowlist)?;
        self.write(|conn| {
            let changed = conn.execute(
                "UPDATE workspaces SET name = ?2, position = ?3, work_duration = ?4,
                    break_duration = ?5, long_break_duration = ?6, work_intervals = ?7,
                    autostart_work = ?8, autostart_break = ?9, enable_website_filter = ?10,
                    filter_mode = ?11, blocklist = ?12, allowlist = ?13
                 WHERE id = ?1",
                params![
                    ws.id,
                    ws.name,
                    ws.position,
                    ws.durations.work_duration,
                    ws.durations.break_duration,
                    ws.durations.long_break_duration,
                    ws.durations.work_intervals,
                    ws.durations.autostart_work,
                    ws.durations.autostart_break,
                    ws.durations.enable_website_filter,
                    ws.filter_mode.as_str(),
                    blocklist,
                    allowlist,
                ],
            )?;
            if changed == 0 {
                return Err(not_found("workspace", &ws.id));
            }
            Ok(())
        })
    }

    /// Delete a workspace and its tasks. The last workspace cannot be deleted.
    pub fn delete_workspace(&self, id: &str) -> Result<()> {
        let current = self.current_workspace_id()?;
        self.write(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM workspaces", [], |r| r.get(0))?;
            if count <= 1 {
                return Err(CoreError::Custom(
                    "cannot delete the only workspace".to_string(),
                ));
            }
            conn.execute("DELETE FROM tasks WHERE workspace_id = ?1", params![id])?;
            if conn.execute("DELETE FROM workspaces WHERE id = ?1", params![id])? == 0 {
                return Err(not_found("workspace", id));
            }
            if current.as_deref() == Some(id) {
                conn.execute("DELETE FROM kv WHERE key = ?1", params![CURRENT_WORKSPACE_KEY])?;
            }
            Ok(())
        })?;
        self.ensure_default_workspace()?;
        Ok(())
    }

    pub fn current_workspace_id(&self) -> Result<Option<String>> {
        Ok(self.kv_get(CURRENT_WORKSPACE_KEY)?)
    }

    pub fn set_current_workspace_id(&self, id: &str) -> Result<()> {
        if self.get_workspace(id)?.is_none() {
            return Err(not_found("workspace", id));
        }
        self.kv_set(CURRENT_WORKSPACE_KEY, id)?;
        Ok(())
    }

    /// The selected workspace, if the selection still points at one.
    pub fn current_workspace(&self) -> Result<Option<Workspace>> {
        match self.current_workspace_id()? {
            Some(id) => self.get_workspace(&id),
            None => Ok(None),
        }
    }

    // === Tasks ===

    /// Append a new to-do task to the end of the workspace's list.
    pub fn create_task(
        &self,
        workspace_id: &str,
        name: &str,
        target_time_ms: Option<u64>,
    ) -> Result<Task> {
        if self.get_workspace(workspace_id)?.is_none() {
            return Err(not_found("workspace", workspace_id));
        }
        let mut task = Task::new(workspace_id, name);
        task.target_time_ms = target_time_ms;
        self.write(|conn| {
            task.position = next_position(conn, workspace_id, TaskType::Todo)?;
            conn.execute(
                &format!("INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    task.id,
                    task.workspace_id,
                    task.name,
                    task.task_type.as_str(),
                    task.position,
                    task.elapsed_time_ms,
                    task.target_time_ms,
                ],
            )?;
            Ok(())
        })?;
        Ok(task)
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        let raw = self
            .conn
            .query_row(&sql, params![id], RawTask::from_row)
            .optional()?;
        raw.map(RawTask::into_task).transpose()
    }

    /// Tasks of a workspace ordered by list then position.
    pub fn list_tasks(&self, workspace_id: &str, task_type: Option<TaskType>) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE workspace_id = ?1 AND (?2 IS NULL OR task_type = ?2)
             ORDER BY task_type DESC, position"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![workspace_id, task_type.map(TaskType::as_str)],
            RawTask::from_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_task()?);
        }
        Ok(out)
    }

    /// First row of the workspace's to-do list.
    pub fn first_todo_task(&self, workspace_id: &str) -> Result<Option<Task>> {
        Ok(self
            .list_tasks(workspace_id, Some(TaskType::Todo))?
            .into_iter()
            .next())
    }

    pub fn rename_task(&self, id: &str, name: &str) -> Result<()> {
        self.write(|conn| {
            if conn.execute("UPDATE tasks SET name = ?2 WHERE id = ?1", params![id, name])? == 0 {
                return Err(not_found("task", id));
            }
            Ok(())
        })
    }

    pub fn set_target_time(&self, id: &str, target_time_ms: Option<u64>) -> Result<()> {
        self.write(|conn| {
            let changed = conn.execute(
                "UPDATE tasks SET target_time_ms = ?2 WHERE id = ?1",
                params![id, target_time_ms],
            )?;
            if changed == 0 {
                return Err(not_found("task", id));
            }
            Ok(())
        })
    }

    pub fn set_elapsed(&self, id: &str, elapsed_time_ms: u64) -> Result<()> {
        self.write(|conn| {
            let changed = conn.execute(
                "UPDATE tasks SET elapsed_time_ms = ?2 WHERE id = ?1",
                params![id, elapsed_time_ms],
            )?;
            if changed == 0 {
                return Err(not_found("task", id));
            }
            Ok(())
        })
    }

    /// Move a task to the end of the other list.
    pub fn set_task_type(&self, id: &str, task_type: TaskType) -> Result<Task> {
        let task = self.get_task(id)?.ok_or_else(|| not_found("task", id))?;
        if task.task_type == task_type {
            return Ok(task);
        }
        self.write(|conn| {
            let position = next_position(conn, &task.workspace_id, task_type)?;
            conn.execute(
                "UPDATE tasks SET task_type = ?2, position = ?3 WHERE id = ?1",
                params![id, task_type.as_str(), position],
            )?;
            renumber(conn, &task.workspace_id, task.task_type)?;
            Ok(())
        })?;
        self.get_task(id)?.ok_or_else(|| not_found("task", id))
    }

    /// Reorder a task within its list; `position` is clamped to the list length.
    pub fn move_task(&self, id: &str, position: usize) -> Result<()> {
        let task = self.get_task(id)?.ok_or_else(|| not_found("task", id))?;
        self.write(|conn| {
            let mut ids = ordered_ids(conn, &task.workspace_id, task.task_type)?;
            ids.retain(|other| other != id);
            ids.insert(position.min(ids.len()), id.to_string());
            for (pos, task_id) in ids.iter().enumerate() {
                conn.execute(
                    "UPDATE tasks SET position = ?2 WHERE id = ?1",
                    params![task_id, pos as i64],
                )?;
            }
            Ok(())
        })
    }

    pub fn delete_task(&self, id: &str) -> Result<()> {
        let task = self.get_task(id)?.ok_or_else(|| not_found("task", id))?;
        self.write(|conn| {
            conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
            renumber(conn, &task.workspace_id, task.task_type)?;
            Ok(())
        })
    }

    // === Key-value store ===

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> std::result::Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> std::result::Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

fn not_found(kind: &'static str, id: &str) -> CoreError {
    CoreError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn insert_workspace(conn: &Connection, ws: &Workspace) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO workspaces ({WORKSPACE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ),
        params![
            ws.id,
            ws.name,
            ws.position,
            ws.durations.work_duration,
            ws.durations.break_duration,
            ws.durations.long_break_duration,
            ws.durations.work_intervals,
            ws.durations.autostart_work,
            ws.durations.autostart_break,
            ws.durations.enable_website_filter,
            ws.filter_mode.as_str(),
            serde_json::to_string(&ws.blocklist)?,
            serde_json::to_string(&ws.allowlist)?,
        ],
    )?;
    Ok(())
}

fn next_position(conn: &Connection, workspace_id: &str, task_type: TaskType) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM tasks WHERE workspace_id = ?1 AND task_type = ?2",
        params![workspace_id, task_type.as_str()],
        |row| row.get(0),
    )?)
}

fn ordered_ids(conn: &Connection, workspace_id: &str, task_type: TaskType) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM tasks WHERE workspace_id = ?1 AND task_type = ?2 ORDER BY position",
    )?;
    let ids = stmt
        .query_map(params![workspace_id, task_type.as_str()], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Close gaps in a list's positions.
fn renumber(conn: &Connection, workspace_id: &str, task_type: TaskType) -> Result<()> {
    for (pos, id) in ordered_ids(conn, workspace_id, task_type)?.iter().enumerate() {
        conn.execute(
            "UPDATE tasks SET position = ?2 WHERE id = ?1",
            params![id, pos as i64],
        )?;
    }
    Ok(())
}

struct RawWorkspace {
    id: String,
    name: String,
    position: i64,
    durations: DurationConfig,
    filter_mode: String,
    blocklist: String,
    allowlist: String,
}

impl RawWorkspace {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            position: row.get(2)?,
            durations: DurationConfig {
                work_duration: row.get(3)?,
                break_duration: row.get(4)?,
                long_break_duration: row.get(5)?,
                work_intervals: row.get(6)?,
                autostart_work: row.get(7)?,
                autostart_break: row.get(8)?,
                enable_website_filter: row.get(9)?,
            },
            filter_mode: row.get(10)?,
            blocklist: row.get(11)?,
            allowlist: row.get(12)?,
        })
    }

    fn into_workspace(self) -> Result<Workspace> {
        let filter_mode = self
            .filter_mode
            .parse::<FilterMode>()
            .map_err(|message| DatabaseError::Corrupt {
                column: "filter_mode",
                message,
            })?;
        Ok(Workspace {
            id: self.id,
            name: self.name,
            position: self.position,
            durations: self.durations,
            filter_mode,
            blocklist: decode_list("blocklist", &self.blocklist)?,
            allowlist: decode_list("allowlist", &self.allowlist)?,
        })
    }
}

fn decode_list(column: &'static str, json: &str) -> Result<BTreeSet<String>> {
    serde_json::from_str(json).map_err(|e| {
        DatabaseError::Corrupt {
            column,
            message: e.to_string(),
        }
        .into()
    })
}

struct RawTask {
    task: Task,
    task_type: String,
}

impl RawTask {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            task: Task {
                id: row.get(0)?,
                workspace_id: row.get(1)?,
                name: row.get(2)?,
                task_type: TaskType::Todo,
                position: row.get(4)?,
                elapsed_time_ms: row.get(5)?,
                target_time_ms: row.get(6)?,
            },
            task_type: row.get(3)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        let task_type = TaskType::parse(&self.task_type).ok_or_else(|| DatabaseError::Corrupt {
            column: "task_type",
            message: format!("unknown task type '{}'", self.task_type),
        })?;
        Ok(Task {
            task_type,
            ..self.task
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn open_creates_and_selects_default_workspace() {
        let db = Database::open_memory().unwrap();
        let workspaces = db.list_workspaces().unwrap();
        assert_eq!(workspaces.len(), 1);
        assert_eq!(workspaces[0].name, "Default");
        assert_eq!(
            db.current_workspace_id().unwrap().as_deref(),
            Some(workspaces[0].id.as_str())
        );
    }

    #[test]
    fn workspace_settings_round_trip() {
        let db = Database::open_memory().unwrap();
        let mut ws = db.create_workspace("Writing").unwrap();
        ws.durations.work_duration = 50;
        ws.durations.enable_website_filter = true;
        ws.filter_mode = FilterMode::Allowlist;
        ws.allowlist.insert("docs.rs".into());
        ws.blocklist.insert("news.site".into());
        db.update_workspace(&ws).unwrap();

        let loaded = db.get_workspace(&ws.id).unwrap().unwrap();
        assert_eq!(loaded, ws);
        assert_eq!(loaded.position, 1);
    }

    #[test]
    fn update_workspace_validates_durations() {
        let db = Database::open_memory().unwrap();
        let mut ws = db.ensure_default_workspace().unwrap();
        ws.durations.work_intervals = 11;
        assert!(matches!(
            db.update_workspace(&ws),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn deleting_current_workspace_selects_another() {
        let db = Database::open_memory().unwrap();
        let default = db.ensure_default_workspace().unwrap();
        let other = db.create_workspace("Other").unwrap();
        db.create_task(&default.id, "gone", None).unwrap();

        db.delete_workspace(&default.id).unwrap();
        assert_eq!(db.current_workspace_id().unwrap(), Some(other.id.clone()));
        assert!(db.list_tasks(&default.id, None).unwrap().is_empty());
        assert!(db.delete_workspace(&other.id).is_err());
    }

    #[test]
    fn tasks_append_and_move_between_lists() {
        let db = Database::open_memory().unwrap();
        let ws = db.ensure_default_workspace().unwrap();
        let a = db.create_task(&ws.id, "a", None).unwrap();
        let b = db.create_task(&ws.id, "b", Some(60_000)).unwrap();
        let c = db.create_task(&ws.id, "c", None).unwrap();
        assert_eq!((a.position, b.position, c.position), (0, 1, 2));

        let done = db.set_task_type(&a.id, TaskType::Completed).unwrap();
        assert_eq!(done.task_type, TaskType::Completed);
        assert_eq!(done.position, 0);

        let todo = db.list_tasks(&ws.id, Some(TaskType::Todo)).unwrap();
        assert_eq!(names(&todo), vec!["b", "c"]);
        assert_eq!(todo[0].position, 0);
        assert_eq!(db.first_todo_task(&ws.id).unwrap().unwrap().id, b.id);

        let all = db.list_tasks(&ws.id, None).unwrap();
        assert_eq!(names(&all), vec!["b", "c", "a"]);
    }

    #[test]
    fn move_task_reorders_and_clamps() {
        let db = Database::open_memory().unwrap();
        let ws = db.ensure_default_workspace().unwrap();
        let a = db.create_task(&ws.id, "a", None).unwrap();
        db.create_task(&ws.id, "b", None).unwrap();
        db.create_task(&ws.id, "c", None).unwrap();

        db.move_task(&a.id, 99).unwrap();
        let todo = db.list_tasks(&ws.id, Some(TaskType::Todo)).unwrap();
        assert_eq!(names(&todo), vec!["b", "c", "a"]);
        assert_eq!(todo[2].position, 2);

        db.move_task(&a.id, 0).unwrap();
        let todo = db.list_tasks(&ws.id, Some(TaskType::Todo)).unwrap();
        assert_eq!(names(&todo), vec!["a", "b", "c"]);
    }

    #[test]
    fn elapsed_time_persists() {
        let db = Database::open_memory().unwrap();
        let ws = db.ensure_default_workspace().unwrap();
        let task = db.create_task(&ws.id, "a", None).unwrap();
        db.set_elapsed(&task.id, 125_000).unwrap();
        assert_eq!(db.get_task(&task.id).unwrap().unwrap().elapsed_time_ms, 125_000);
        assert!(matches!(
            db.set_elapsed("missing", 1),
            Err(CoreError::NotFound { kind: "task", .. })
        ));
    }

    #[test]
    fn delete_task_closes_gap() {
        let db = Database::open_memory().unwrap();
        let ws = db.ensure_default_workspace().unwrap();
        let a = db.create_task(&ws.id, "a", None).unwrap();
        db.create_task(&ws.id, "b", None).unwrap();
        db.delete_task(&a.id).unwrap();
        let todo = db.list_tasks(&ws.id, Some(TaskType::Todo)).unwrap();
        assert_eq!(todo[0].position, 0);
        assert!(db.get_task(&a.id).unwrap().is_none());
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
    }
}
