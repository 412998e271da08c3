//! Read-only projections over a flat task collection.
//!
//! Nothing here mutates: every function takes the current collection and
//! derives a view from it, so callers can recompute after each mutation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::Task;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Filter {
    #[default]
    All,
    Active,
    Completed,
}

impl Filter {
    pub fn matches(self, task: &Task) -> bool {
        match self {
            Filter::All => true,
            Filter::Active => !task.completed,
            Filter::Completed => task.completed,
        }
    }
}

/// Tasks passing `filter`, in collection order.
pub fn filter_tasks(tasks: &[Task], filter: Filter) -> Vec<Task> {
    tasks.iter().filter(|t| filter.matches(t)).cloned().collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub active: usize,
    pub completed: usize,
}

pub fn count_tasks(tasks: &[Task]) -> TaskCounts {
    tasks.iter().fold(TaskCounts::default(), |mut counts, task| {
        if task.completed {
            counts.completed += 1;
        } else {
            counts.active += 1;
        }
        counts
    })
}

/// Top-level tasks plus subtasks grouped by parent id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskTree {
    pub top_level: Vec<Task>,
    /// Children of each parent, sorted by `order`. Parents need not exist.
    pub subtasks_by_parent: HashMap<String, Vec<Task>>,
}

impl TaskTree {
    pub fn subtasks_of(&self, parent_id: &str) -> &[Task] {
        self.subtasks_by_parent
            .get(parent_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn progress(&self, task_id: &str) -> Option<Progress> {
        Progress::of(self.subtasks_of(task_id))
    }
}

pub fn group_subtasks(tasks: &[Task]) -> TaskTree {
    let mut tree = TaskTree::default();

    for task in tasks {
        match &task.parent_id {
            Some(parent_id) => tree
                .subtasks_by_parent
                .entry(parent_id.clone())
                .or_default()
                .push(task.clone()),
            None => tree.top_level.push(task.clone()),
        }
    }

    // stable: equal orders keep collection order
    for children in tree.subtasks_by_parent.values_mut() {
        children.sort_by_key(|t| t.order);
    }

    tree
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// `None` when there are no subtasks to measure.
    pub fn of(subtasks: &[Task]) -> Option<Self> {
        if subtasks.is_empty() {
            return None;
        }
        Some(Self {
            completed: subtasks.iter().filter(|t| t.completed).count(),
            total: subtasks.len(),
        })
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }

    pub fn is_done(&self) -> bool {
        self.completed == self.total
    }
}

pub fn subtask_progress(tasks: &[Task], task_id: &str) -> Option<Progress> {
    let children: Vec<Task> = tasks
        .iter()
        .filter(|t| t.parent_id.as_deref() == Some(task_id))
        .cloned()
        .collect();
    Progress::of(&children)
}

/// Next `order` for a new child of `parent_id`: one past the largest sibling.
pub fn next_subtask_order(tasks: &[Task], parent_id: &str) -> i64 {
    tasks
        .iter()
        .filter(|t| t.parent_id.as_deref() == Some(parent_id))
        .map(|t| t.order)
        .max()
        .unwrap_or(0)
        + 1
}
