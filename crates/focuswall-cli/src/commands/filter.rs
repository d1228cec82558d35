//! Website filter rule commands for CLI.

use std::path::PathBuf;

use clap::Subcommand;
use focuswall_core::filter::{rule_script, FilterCommand, Verdict, RULE_SCRIPT_FILE};
use focuswall_core::storage::{data_dir, Database};
use focuswall_core::{Config, FilterMode, Workspace};

use super::resolve_workspace;

#[derive(Subcommand)]
pub enum FilterAction {
    /// Show the filter mode and both address lists
    Show {
        /// Workspace id or name (default: current)
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Choose which list is enforced: blocklist or allowlist
    Mode {
        mode: FilterMode,
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Add an address to a list
    Add {
        address: String,
        /// Target list (default: the enforced one)
        #[arg(long)]
        list: Option<FilterMode>,
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Remove an address from a list
    Remove {
        address: String,
        /// Target list (default: the enforced one)
        #[arg(long)]
        list: Option<FilterMode>,
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Tell whether a URL would be blocked
    Check {
        url: String,
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Print the rule script loaded into the proxy
    Script,
    /// Print the proxy command line for the current workspace
    Command {
        #[arg(long)]
        workspace: Option<String>,
    },
}

fn open(workspace: Option<&str>) -> Result<(Database, Workspace), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let ws = resolve_workspace(&db, workspace)?;
    Ok((db, ws))
}

pub fn run(action: FilterAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        FilterAction::Script => print!("{}", rule_script()),
        FilterAction::Show { workspace } => {
            let (_, ws) = open(workspace.as_deref())?;
            let json = serde_json::json!({
                "workspace": ws.name,
                "enabled": ws.durations.enable_website_filter,
                "mode": ws.filter_mode,
                "blocklist": ws.blocklist,
                "allowlist": ws.allowlist,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        FilterAction::Mode { mode, workspace } => {
            let (db, mut ws) = open(workspace.as_deref())?;
            ws.filter_mode = mode;
            db.update_workspace(&ws)?;
            println!("Filter mode: {mode}");
        }
        FilterAction::Add {
            address,
            list,
            workspace,
        } => {
            let (db, mut ws) = open(workspace.as_deref())?;
            let mode = list.unwrap_or(ws.filter_mode);
            let address = address.trim();
            if address.is_empty() {
                return Err("address must not be empty".into());
            }
            if ws.list_mut(mode).insert(address.to_string()) {
                db.update_workspace(&ws)?;
                println!("Added to {mode}: {address}");
            } else {
                println!("Already in {mode}: {address}");
            }
        }
        FilterAction::Remove {
            address,
            list,
            workspace,
        } => {
            let (db, mut ws) = open(workspace.as_deref())?;
            let mode = list.unwrap_or(ws.filter_mode);
            if !ws.list_mut(mode).remove(address.trim()) {
                return Err(format!("not in {mode}: {address}").into());
            }
            db.update_workspace(&ws)?;
            println!("Removed from {mode}: {address}");
        }
        FilterAction::Check { url, workspace } => {
            let (_, ws) = open(workspace.as_deref())?;
            let verdict = match ws.rules().verdict(&url) {
                Verdict::Block => "block",
                Verdict::Pass => "pass",
            };
            println!("{verdict}");
        }
        FilterAction::Command { workspace } => {
            let (_, ws) = open(workspace.as_deref())?;
            let config = Config::load()?;
            let rules = ws.rules();
            let command = FilterCommand {
                binary: PathBuf::from(&config.filter.binary_path),
                port: config.filter.listening_port,
                script: data_dir()?.join(RULE_SCRIPT_FILE),
                addresses_str: rules.addresses_str(),
                mode: rules.mode,
            };
            println!("{}", command.display_native());
        }
    }
    Ok(())
}
