use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{RunsheetError, RunsheetResult};
use crate::models::{Execution, StepPatch, StepUpdate};
use crate::repo::{ExecutionRepository, Repository};

/// Authoritative owner of each execution's step sequence.
///
/// Both patch paths read the whole document, mutate it in memory and
/// persist it with a single save. Concurrent writers race at the document
/// level; the last save wins.
#[derive(Clone)]
pub struct StepRecordStore {
    executions: Arc<dyn ExecutionRepository>,
}

impl StepRecordStore {
    pub fn new(executions: Arc<dyn ExecutionRepository>) -> Self {
        Self { executions }
    }

    pub async fn get_execution(&self, id: Uuid) -> RunsheetResult<Execution> {
        self.executions
            .get_by_id(id)
            .await?
            .ok_or_else(|| RunsheetError::ExecutionNotFound(id.to_string()))
    }

    /// Applies `patch` to the step at `step_idx`. An index past the end is
    /// ignored and the document is saved unchanged.
    pub async fn apply_step_patch(
        &self,
        execution_id: Uuid,
        step_idx: usize,
        patch: &StepPatch,
    ) -> RunsheetResult<Execution> {
        let mut execution = self.get_execution(execution_id).await?;

        if !execution.apply_step_patch(step_idx, patch, Utc::now()) {
            debug!(
                execution_id = %execution_id,
                step_idx,
                steps = execution.steps.len(),
                "Step index out of range, patch ignored"
            );
        }

        self.persist(&execution).await
    }

    /// Applies every entry in order, skipping out-of-range indices, then
    /// saves once.
    pub async fn apply_batch_step_patch(
        &self,
        execution_id: Uuid,
        updates: &[StepUpdate],
    ) -> RunsheetResult<Execution> {
        let mut execution = self.get_execution(execution_id).await?;

        let applied = execution.apply_step_updates(updates, Utc::now());
        debug!(
            execution_id = %execution_id,
            applied,
            skipped = updates.len() - applied,
            "Applied batch step update"
        );

        self.persist(&execution).await
    }

    async fn persist(&self, execution: &Execution) -> RunsheetResult<Execution> {
        self.executions
            .save(execution)
            .await?
            .ok_or_else(|| RunsheetError::ExecutionNotFound(execution.id.to_string()))
    }
}
