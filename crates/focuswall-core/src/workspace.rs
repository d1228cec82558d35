//! Workspace and task records.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filter::{FilterMode, FilterRuleSet};
use crate::timer::DurationConfig;

/// A workspace groups a task list with its own timer and filter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub position: i64,
    pub durations: DurationConfig,
    pub filter_mode: FilterMode,
    /// Both lists are kept; `filter_mode` picks the active one.
    pub blocklist: BTreeSet<String>,
    pub allowlist: BTreeSet<String>,
}

impl Workspace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            position: 0,
            durations: DurationConfig::default(),
            filter_mode: FilterMode::Blocklist,
            blocklist: BTreeSet::new(),
            allowlist: BTreeSet::new(),
        }
    }

    /// Rule set currently in force for this workspace. Blank entries are dropped.
    pub fn rules(&self) -> FilterRuleSet {
        let addresses = match self.filter_mode {
            FilterMode::Blocklist => &self.blocklist,
            FilterMode::Allowlist => &self.allowlist,
        };
        FilterRuleSet::new(self.filter_mode, addresses)
    }

    pub fn list_mut(&mut self, mode: FilterMode) -> &mut BTreeSet<String> {
        match mode {
            FilterMode::Blocklist => &mut self.blocklist,
            FilterMode::Allowlist => &mut self.allowlist,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Todo,
    Completed,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Todo => "TODO",
            TaskType::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TODO" => Some(TaskType::Todo),
            "COMPLETED" => Some(TaskType::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub task_type: TaskType,
    pub position: i64,
    pub elapsed_time_ms: u64,
    pub target_time_ms: Option<u64>,
}

impl Task {
    pub fn new(workspace_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workspace_id: workspace_id.into(),
            name: name.into(),
            task_type: TaskType::Todo,
            position: 0,
            elapsed_time_ms: 0,
            target_time_ms: None,
        }
    }

    /// True once the elapsed time reached a set target.
    pub fn target_reached(&self) -> bool {
        self.target_time_ms
            .is_some_and(|target| self.elapsed_time_ms >= target)
    }
}
