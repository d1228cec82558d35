//! Workspace management commands for CLI.

use clap::Subcommand;
use focuswall_core::storage::Database;
use focuswall_core::{FilterMode, Workspace};

use super::{resolve_workspace, SELECTED_TASK_KEY};

#[derive(Subcommand)]
pub enum WorkspaceAction {
    /// Create a workspace
    Create {
        /// Workspace name
        name: String,
    },
    /// List workspaces
    List,
    /// Make a workspace the current one
    Switch {
        /// Workspace id or name
        workspace: String,
    },
    /// Show a workspace with its settings
    Show {
        /// Workspace id or name (default: current)
        workspace: Option<String>,
    },
    /// Change a workspace setting
    Set {
        /// Setting: name, work_duration, break_duration, long_break_duration,
        /// work_intervals, autostart_work, autostart_break,
        /// enable_website_filter, filter_mode
        key: String,
        /// New value
        value: String,
        /// Workspace id or name (default: current)
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Delete a workspace and its tasks
    Delete {
        /// Workspace id or name
        workspace: String,
    },
}

fn apply_setting(ws: &mut Workspace, key: &str, value: &str) -> Result<(), String> {
    let number = || {
        value
            .parse::<u32>()
            .map_err(|e| format!("invalid value for {key}: {e}"))
    };
    let flag = || {
        value
            .parse::<bool>()
            .map_err(|e| format!("invalid value for {key}: {e}"))
    };
    let d = &mut ws.durations;
    match key {
        "name" => ws.name = value.to_string(),
        "work_duration" => d.work_duration = number()?,
        "break_duration" => d.break_duration = number()?,
        "long_break_duration" => d.long_break_duration = number()?,
        "work_intervals" => d.work_intervals = number()?,
        "autostart_work" => d.autostart_work = flag()?,
        "autostart_break" => d.autostart_break = flag()?,
        "enable_website_filter" => d.enable_website_filter = flag()?,
        "filter_mode" => ws.filter_mode = value.parse::<FilterMode>()?,
        _ => return Err(format!("unknown workspace setting: {key}")),
    }
    Ok(())
}

pub fn run(action: WorkspaceAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        WorkspaceAction::Create { name } => {
            let ws = db.create_workspace(&name)?;
            println!("Workspace created: {}", ws.id);
            println!("{}", serde_json::to_string_pretty(&ws)?);
        }
        WorkspaceAction::List => {
            let current = db.current_workspace_id()?;
            let rows: Vec<_> = db
                .list_workspaces()?
                .into_iter()
                .map(|ws| {
                    serde_json::json!({
                        "id": ws.id,
                        "name": ws.name,
                        "current": current.as_deref() == Some(ws.id.as_str()),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        WorkspaceAction::Switch { workspace } => {
            let ws = resolve_workspace(&db, Some(&workspace))?;
            db.set_current_workspace_id(&ws.id)?;
            // A selection from another workspace no longer applies.
            db.kv_set(SELECTED_TASK_KEY, "")?;
            println!("Switched to workspace: {}", ws.name);
        }
        WorkspaceAction::Show { workspace } => {
            let ws = resolve_workspace(&db, workspace.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&ws)?);
        }
        WorkspaceAction::Set {
            key,
            value,
            workspace,
        } => {
            let mut ws = resolve_workspace(&db, workspace.as_deref())?;
            apply_setting(&mut ws, &key, &value)?;
            db.update_workspace(&ws)?;
            println!("ok");
        }
        WorkspaceAction::Delete { workspace } => {
            let ws = resolve_workspace(&db, Some(&workspace))?;
            db.delete_workspace(&ws.id)?;
            println!("Workspace deleted: {}", ws.name);
        }
    }
    Ok(())
}
