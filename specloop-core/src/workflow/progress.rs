//! Progress tracking and rendering for workflow runs
//!
//! Keeps a bounded, timestamped log plus per-step timings. Rendering reads
//! that state and never mutates it.

use crate::models::workflow::StepStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// Default number of log entries kept
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Severity of a progress log entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProgressLogLevel {
    Info,
    Warning,
    Error,
}

impl ProgressLogLevel {
    fn icon(&self) -> &'static str {
        match self {
            ProgressLogLevel::Info => "ℹ️",
            ProgressLogLevel::Warning => "⚠️",
            ProgressLogLevel::Error => "❌",
        }
    }
}

/// Timestamped log line attached to a step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressLogEntry {
    pub timestamp: DateTime<Utc>,
    pub step_name: String,
    pub message: String,
    pub level: ProgressLogLevel,
}

/// One step as shown in a progress view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepView {
    pub name: String,
    pub description: String,
    pub status: StepStatus,
}

/// What to render: the workflow's steps and which one is current
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressView {
    pub workflow_name: String,
    pub steps: Vec<StepView>,
    pub current_step: Option<usize>,
}

impl ProgressView {
    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }
}

/// Rendering switches
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Append the log section
    pub show_logs: bool,
    /// Newest entries shown in the log section
    pub max_log_entries: usize,
    /// Include elapsed and estimated time
    pub show_timing: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_logs: false,
            max_log_entries: 20,
            show_timing: true,
        }
    }
}

/// Progress reporter for one engine
#[derive(Debug)]
pub struct ProgressReporter {
    capacity: usize,
    logs: VecDeque<ProgressLogEntry>,
    started_at: Option<Instant>,
    step_started: HashMap<usize, Instant>,
    step_durations: HashMap<usize, Duration>,
}

impl ProgressReporter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            logs: VecDeque::new(),
            started_at: None,
            step_started: HashMap::new(),
            step_durations: HashMap::new(),
        }
    }

    /// Reset the clock; earlier timings are discarded
    pub fn start_tracking(&mut self) {
        self.started_at = Some(Instant::now());
        self.step_started.clear();
        self.step_durations.clear();
    }

    pub fn record_step_start(&mut self, index: usize) {
        self.step_started.insert(index, Instant::now());
    }

    /// Close the timing of a step opened by `record_step_start`
    pub fn record_step_end(&mut self, index: usize) {
        if let Some(started) = self.step_started.remove(&index) {
            self.step_durations.insert(index, started.elapsed());
        }
    }

    pub fn add_log(&mut self, step_name: &str, message: &str, level: ProgressLogLevel) {
        self.logs.push_back(ProgressLogEntry {
            timestamp: Utc::now(),
            step_name: step_name.to_string(),
            message: message.to_string(),
            level,
        });

        while self.logs.len() > self.capacity {
            self.logs.pop_front();
        }
    }

    pub fn logs(&self) -> Vec<ProgressLogEntry> {
        self.logs.iter().cloned().collect()
    }

    pub fn get_total_elapsed_time(&self) -> Duration {
        self.started_at
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    pub fn step_duration(&self, index: usize) -> Option<Duration> {
        self.step_durations.get(&index).copied()
    }

    /// Average finished-step duration times the steps not yet finished
    pub fn estimate_remaining(&self, view: &ProgressView) -> Option<Duration> {
        if self.step_durations.is_empty() {
            return None;
        }
        let total: Duration = self.step_durations.values().sum();
        let average = total / self.step_durations.len() as u32;
        let remaining = view.steps.len().saturating_sub(view.completed_steps());
        Some(average * remaining as u32)
    }

    pub fn reset(&mut self) {
        self.logs.clear();
        self.started_at = None;
        self.step_started.clear();
        self.step_durations.clear();
    }

    /// Render a markdown progress summary
    pub fn render_progress(&self, view: &ProgressView, options: &RenderOptions) -> String {
        let mut out = String::new();
        let total = view.steps.len();
        let done = view.completed_steps();
        let percent = if total == 0 { 100 } else { done * 100 / total };

        let _ = writeln!(out, "## {}", view.workflow_name);
        let _ = writeln!(out);
        let _ = writeln!(out, "Progress: {}/{} ({}%)", done, total, percent);
        let _ = writeln!(out);

        for (index, step) in view.steps.iter().enumerate() {
            let label = format!("{}. {}", index + 1, step.name);
            if view.current_step == Some(index) {
                let _ = write!(out, "{} **{}** ← current", step.status.icon(), label);
            } else {
                let _ = write!(out, "{} {}", step.status.icon(), label);
            }
            if let Some(duration) = self.step_duration(index) {
                let _ = write!(out, " ({})", format_duration(duration));
            }
            let _ = writeln!(out);
            if view.current_step == Some(index) && !step.description.is_empty() {
                let _ = writeln!(out, "   {}", step.description);
            }
        }

        if options.show_timing && self.started_at.is_some() {
            let _ = writeln!(out);
            let _ = write!(
                out,
                "⏱ Elapsed: {}",
                format_duration(self.get_total_elapsed_time())
            );
            if let Some(remaining) = self.estimate_remaining(view) {
                if done < total {
                    let _ = write!(out, " · Estimated remaining: {}", format_duration(remaining));
                }
            }
            let _ = writeln!(out);
        }

        if options.show_logs && !self.logs.is_empty() {
            let shown = self.logs.len().min(options.max_log_entries);
            let _ = writeln!(out);
            let _ = writeln!(out, "<details><summary>Logs ({})</summary>", self.logs.len());
            let _ = writeln!(out);
            for entry in self.logs.iter().skip(self.logs.len() - shown) {
                let _ = writeln!(
                    out,
                    "- [{}] {} {}: {}",
                    entry.timestamp.format("%H:%M:%S"),
                    entry.level.icon(),
                    entry.step_name,
                    entry.message
                );
            }
            let _ = writeln!(out);
            let _ = writeln!(out, "</details>");
        }

        out
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

/// Human-readable duration: `12s`, `3m 05s`, `1h 02m`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
