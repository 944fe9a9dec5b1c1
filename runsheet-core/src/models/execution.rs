use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

use super::patch::{StepPatch, StepUpdate};
use super::runbook::Runbook;
use crate::error::RunsheetError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "execution_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Priority {
    type Err = RunsheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" | "h" => Ok(Priority::High),
            "medium" | "m" => Ok(Priority::Medium),
            "low" | "l" => Ok(Priority::Low),
            other => Err(RunsheetError::ValidationError(format!(
                "unknown priority '{}', expected high, medium or low",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "execution_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    InProgress,
    Completed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::InProgress => write!(f, "in_progress"),
            ExecutionStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Per-run copy of a runbook step carrying completion state and remarks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub text: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub remark_text: Option<String>,
    #[serde(default)]
    pub remark_image: Option<String>,
}

impl ExecutionStep {
    /// Applies the fields present in `patch`. `executed_at` follows
    /// `checked`: stamped with `now` when checked, cleared when unchecked.
    pub fn apply(&mut self, patch: &StepPatch, now: DateTime<Utc>) {
        if let Some(checked) = patch.checked {
            self.checked = checked;
            self.executed_at = if checked { Some(now) } else { None };
        }
        if let Some(text) = &patch.remark_text {
            self.remark_text = Some(text.clone());
        }
        if let Some(image) = &patch.remark_image {
            self.remark_image = Some(image.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: Uuid,
    pub runbook_id: Uuid,
    pub runbook_title: String,
    #[serde(default)]
    pub incident_id: String,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[sqlx(json)]
    #[serde(default)]
    pub steps: Vec<ExecutionStep>,
}

impl Execution {
    /// Snapshots the runbook's steps. Later runbook edits never reach an
    /// execution created here.
    pub fn from_runbook(runbook: &Runbook, request: NewExecution) -> Self {
        let steps = runbook
            .steps
            .iter()
            .map(|s| ExecutionStep {
                text: s.text.clone(),
                link: s.link.clone(),
                ..Default::default()
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            runbook_id: runbook.id,
            runbook_title: runbook.title.clone(),
            incident_id: request.incident_id,
            operator: request.operator,
            priority: request.priority,
            status: ExecutionStatus::InProgress,
            started_at: Utc::now(),
            finished_at: None,
            steps,
        }
    }

    /// Returns false when `step_idx` is out of range; nothing is touched in
    /// that case.
    pub fn apply_step_patch(&mut self, step_idx: usize, patch: &StepPatch, now: DateTime<Utc>) -> bool {
        match self.steps.get_mut(step_idx) {
            Some(step) => {
                step.apply(patch, now);
                true
            }
            None => false,
        }
    }

    /// Applies updates in order, skipping out-of-range entries. Returns the
    /// number of entries applied.
    pub fn apply_step_updates(&mut self, updates: &[StepUpdate], now: DateTime<Utc>) -> usize {
        updates
            .iter()
            .filter(|u| match u.index() {
                Some(idx) => self.apply_step_patch(idx, &u.patch, now),
                None => false,
            })
            .count()
    }

    /// Vacuously true for an execution without steps.
    pub fn all_steps_checked(&self) -> bool {
        self.steps.iter().all(|s| s.checked)
    }

    pub fn checked_count(&self) -> usize {
        self.steps.iter().filter(|s| s.checked).count()
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// True when every step is checked but the execution has not been closed
    /// out yet.
    pub fn needs_completion(&self) -> bool {
        self.all_steps_checked() && !self.is_finished()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

/// Body of `POST /api/executions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExecution {
    pub runbook_id: Uuid,
    #[serde(default)]
    pub incident_id: String,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub priority: Priority,
}

impl NewExecution {
    pub fn new(runbook_id: Uuid, incident_id: impl Into<String>, operator: impl Into<String>) -> Self {
        Self {
            runbook_id,
            incident_id: incident_id.into(),
            operator: operator.into(),
            priority: Priority::default(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Body of the generic `PUT /api/executions/{id}`. Present fields overwrite
/// the stored document; nothing is guarded, including `finished_at`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runbook_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runbook_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<ExecutionStep>>,
}

impl ExecutionUpdate {
    /// The close-out write issued once every step is checked.
    pub fn finish(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(ExecutionStatus::Completed),
            finished_at: Some(now),
            ..Default::default()
        }
    }

    pub fn apply_to(self, execution: &mut Execution) {
        if let Some(runbook_id) = self.runbook_id {
            execution.runbook_id = runbook_id;
        }
        if let Some(title) = self.runbook_title {
            execution.runbook_title = title;
        }
        if let Some(incident_id) = self.incident_id {
            execution.incident_id = incident_id;
        }
        if let Some(operator) = self.operator {
            execution.operator = operator;
        }
        if let Some(priority) = self.priority {
            execution.priority = priority;
        }
        if let Some(status) = self.status {
            execution.status = status;
        }
        if let Some(finished_at) = self.finished_at {
            execution.finished_at = Some(finished_at);
        }
        if let Some(steps) = self.steps {
            execution.steps = steps;
        }
    }
}
