//! Task management commands for CLI.

use clap::Subcommand;
use focuswall_core::storage::Database;
use focuswall_core::TaskType;

use super::{resolve_workspace, SELECTED_TASK_KEY};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Add a task to the end of the to-do list
    Add {
        /// Task name
        name: String,
        /// Target time in minutes
        #[arg(long)]
        target: Option<u64>,
        /// Workspace id or name (default: current)
        #[arg(long)]
        workspace: Option<String>,
    },
    /// List tasks
    List {
        /// Show the completed list instead of the to-do list
        #[arg(long, conflicts_with = "all")]
        completed: bool,
        /// Show both lists
        #[arg(long)]
        all: bool,
        /// Workspace id or name (default: current)
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Move a task to the completed list
    Done {
        /// Task ID
        id: String,
    },
    /// Move a completed task back to the to-do list
    Undo {
        /// Task ID
        id: String,
    },
    /// Rename a task
    Rename {
        /// Task ID
        id: String,
        /// New name
        name: String,
    },
    /// Set or clear a task's target time
    Target {
        /// Task ID
        id: String,
        /// Target time in minutes (omit to clear)
        minutes: Option<u64>,
    },
    /// Reorder a task within its list
    Move {
        /// Task ID
        id: String,
        /// New zero-based position
        position: usize,
    },
    /// Delete a task
    Delete {
        /// Task ID
        id: String,
    },
    /// Pick the task the next session tracks
    Select {
        /// Task ID
        id: String,
    },
}

pub fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        TaskAction::Add {
            name,
            target,
            workspace,
        } => {
            let ws = resolve_workspace(&db, workspace.as_deref())?;
            let task = db.create_task(&ws.id, &name, target.map(|m| m * 60_000))?;
            println!("Task created: {}", task.id);
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::List {
            completed,
            all,
            workspace,
        } => {
            let ws = resolve_workspace(&db, workspace.as_deref())?;
            let task_type = match (all, completed) {
                (true, _) => None,
                (false, true) => Some(TaskType::Completed),
                (false, false) => Some(TaskType::Todo),
            };
            let tasks = db.list_tasks(&ws.id, task_type)?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        TaskAction::Done { id } => {
            let task = db.set_task_type(&id, TaskType::Completed)?;
            if db.kv_get(SELECTED_TASK_KEY)?.as_deref() == Some(id.as_str()) {
                db.kv_set(SELECTED_TASK_KEY, "")?;
            }
            println!("Task completed: {}", task.name);
        }
        TaskAction::Undo { id } => {
            let task = db.set_task_type(&id, TaskType::Todo)?;
            println!("Task reopened: {}", task.name);
        }
        TaskAction::Rename { id, name } => {
            db.rename_task(&id, &name)?;
            println!("Task renamed: {id}");
        }
        TaskAction::Target { id, minutes } => {
            db.set_target_time(&id, minutes.map(|m| m * 60_000))?;
            match minutes {
                Some(m) => println!("Target set: {m} min"),
                None => println!("Target cleared: {id}"),
            }
        }
        TaskAction::Move { id, position } => {
            db.move_task(&id, position)?;
            println!("Task moved: {id}");
        }
        TaskAction::Delete { id } => {
            db.delete_task(&id)?;
            if db.kv_get(SELECTED_TASK_KEY)?.as_deref() == Some(id.as_str()) {
                db.kv_set(SELECTED_TASK_KEY, "")?;
            }
            println!("Task deleted: {id}");
        }
        TaskAction::Select { id } => {
            let task = db
                .get_task(&id)?
                .filter(|t| t.task_type == TaskType::Todo)
                .ok_or_else(|| format!("no to-do task with id {id}"))?;
            db.kv_set(SELECTED_TASK_KEY, &task.id)?;
            println!("Task selected: {}", task.name);
        }
    }
    Ok(())
}
