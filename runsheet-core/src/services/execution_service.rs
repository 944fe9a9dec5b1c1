use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::StepRecordStore;
use crate::error::{RunsheetError, RunsheetResult};
use crate::models::{Execution, ExecutionUpdate, NewExecution, StepPatch, StepUpdate};
use crate::repo::{ExecutionRepository, Repository, RunbookRepository};

/// Execution lifecycle: start from a runbook snapshot, generic top-level
/// updates, and the two step patch paths through [`StepRecordStore`].
#[derive(Clone)]
pub struct ExecutionService {
    runbooks: Arc<dyn RunbookRepository>,
    executions: Arc<dyn ExecutionRepository>,
    steps: StepRecordStore,
}

impl ExecutionService {
    pub fn new(
        runbooks: Arc<dyn RunbookRepository>,
        executions: Arc<dyn ExecutionRepository>,
    ) -> Self {
        let steps = StepRecordStore::new(executions.clone());
        Self {
            runbooks,
            executions,
            steps,
        }
    }

    pub async fn start(&self, request: NewExecution) -> RunsheetResult<Execution> {
        let runbook = self
            .runbooks
            .get_by_id(request.runbook_id)
            .await?
            .ok_or_else(|| RunsheetError::RunbookNotFound(request.runbook_id.to_string()))?;

        let execution = self
            .executions
            .create(&Execution::from_runbook(&runbook, request))
            .await?;

        info!(
            execution_id = %execution.id,
            runbook_id = %runbook.id,
            incident_id = %execution.incident_id,
            priority = %execution.priority,
            "Started execution"
        );
        Ok(execution)
    }

    pub async fn list(&self) -> RunsheetResult<Vec<Execution>> {
        self.executions.get_all().await
    }

    pub async fn get(&self, id: Uuid) -> RunsheetResult<Execution> {
        self.steps.get_execution(id).await
    }

    /// Merges the present top-level fields into the stored document.
    /// `finishedAt` and `status` are written as sent, without checking the
    /// steps.
    pub async fn update(&self, id: Uuid, update: ExecutionUpdate) -> RunsheetResult<Execution> {
        let mut execution = self.get(id).await?;
        update.apply_to(&mut execution);

        self.executions
            .save(&execution)
            .await?
            .ok_or_else(|| RunsheetError::ExecutionNotFound(id.to_string()))
    }

    pub async fn delete(&self, id: Uuid) -> RunsheetResult<()> {
        let deleted = self.executions.delete(id).await?;
        debug!(execution_id = %id, deleted, "Delete execution");
        Ok(())
    }

    pub async fn patch_step(
        &self,
        id: Uuid,
        step_idx: usize,
        patch: &StepPatch,
    ) -> RunsheetResult<Execution> {
        self.steps.apply_step_patch(id, step_idx, patch).await
    }

    pub async fn patch_steps_batch(
        &self,
        id: Uuid,
        updates: &[StepUpdate],
    ) -> RunsheetResult<Execution> {
        self.steps.apply_batch_step_patch(id, updates).await
    }
}
