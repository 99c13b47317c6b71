//! Markdown task checklist parser
//!
//! Understands the checklist format of a `tasks.md` plan:
//!
//! ```text
//! - [ ] 1. Set up project structure
//!   - [x] 1.1 Create data models
//!   - _Requirements: 1.1, 2.3_
//! - [ ]* 2. Write integration tests
//! ```
//!
//! Lines that are not tasks or requirement references are ignored.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One checklist entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskItem {
    /// Hierarchical number such as `2.1`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    pub title: String,
    pub completed: bool,
    /// Marked with `*` after the checkbox
    pub optional: bool,
    /// Index of the parent task in the parsed list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
    /// Requirement references from a following `_Requirements: ..._` line
    #[serde(default)]
    pub requirements: Vec<String>,
    /// 1-based source line
    pub line: usize,
}

/// Counts over a parsed checklist
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSummary {
    pub total: usize,
    pub completed: usize,
    pub optional: usize,
}

impl TaskSummary {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed * 100) / self.total) as u8
    }
}

fn task_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<indent>\s*)[-*+]\s+\[(?P<mark>[ xX])\](?P<optional>\*)?\s*(?:(?P<number>\d+(?:\.\d+)*)\.?\s+)?(?P<title>\S.*?)\s*$",
        )
        .expect("task line pattern is valid")
    })
}

fn requirements_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*+]\s+)?_Requirements:\s*(?P<refs>[^_]*)_\s*$")
            .expect("requirements pattern is valid")
    })
}

/// Parse every task of a markdown checklist, in document order
pub fn parse_tasks(markdown: &str) -> Vec<TaskItem> {
    let mut tasks: Vec<TaskItem> = Vec::new();
    // Indentation of each parsed task, parallel to `tasks`
    let mut indents: Vec<usize> = Vec::new();

    for (line_index, line) in markdown.lines().enumerate() {
        if let Some(caps) = task_line_re().captures(line) {
            let indent = caps["indent"].chars().count();
            let number = caps.name("number").map(|m| m.as_str().to_string());
            let parent = number
                .as_deref()
                .and_then(|n| parent_by_number(&tasks, n))
                .or_else(|| parent_by_indent(&indents, indent));

            tasks.push(TaskItem {
                number,
                title: caps["title"].to_string(),
                completed: !caps["mark"].trim().is_empty(),
                optional: caps.name("optional").is_some(),
                parent,
                requirements: Vec::new(),
                line: line_index + 1,
            });
            indents.push(indent);
        } else if let Some(caps) = requirements_re().captures(line) {
            if let Some(task) = tasks.last_mut() {
                task.requirements.extend(
                    caps["refs"]
                        .split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(str::to_string),
                );
            }
        }
    }

    tasks
}

/// `2.1` is a child of the task numbered `2`
fn parent_by_number(tasks: &[TaskItem], number: &str) -> Option<usize> {
    let (prefix, _) = number.rsplit_once('.')?;
    tasks
        .iter()
        .rposition(|t| t.number.as_deref() == Some(prefix))
}

/// Nearest earlier task that is indented less
fn parent_by_indent(indents: &[usize], indent: usize) -> Option<usize> {
    indents.iter().rposition(|&i| i < indent)
}

pub fn summarize(tasks: &[TaskItem]) -> TaskSummary {
    TaskSummary {
        total: tasks.len(),
        completed: tasks.iter().filter(|t| t.completed).count(),
        optional: tasks.iter().filter(|t| t.optional).count(),
    }
}

/// First unfinished task that is not optional
pub fn next_pending(tasks: &[TaskItem]) -> Option<&TaskItem> {
    tasks.iter().find(|t| !t.completed && !t.optional)
}
