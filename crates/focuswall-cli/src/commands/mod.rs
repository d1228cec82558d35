pub mod config;
pub mod filter;
pub mod session;
pub mod task;
pub mod update;
pub mod workspace;

use focuswall_core::storage::Database;
use focuswall_core::Workspace;

/// Kv key of the task picked with `task select`, read when a session starts.
pub const SELECTED_TASK_KEY: &str = "selected_task_id";

/// Resolve a workspace by id or exact name, defaulting to the current one.
pub fn resolve_workspace(
    db: &Database,
    ident: Option<&str>,
) -> Result<Workspace, Box<dyn std::error::Error>> {
    let Some(ident) = ident else {
        return Ok(db.ensure_default_workspace()?);
    };
    if let Some(ws) = db.get_workspace(ident)? {
        return Ok(ws);
    }
    db.list_workspaces()?
        .into_iter()
        .find(|ws| ws.name == ident)
        .ok_or_else(|| format!("workspace not found: {ident}").into())
}
