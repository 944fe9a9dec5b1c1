use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{RunsheetError, RunsheetResult};
use crate::models::{NewRunbook, Runbook, RunbookUpdate};
use crate::repo::{Repository, RunbookRepository};

/// Runbook CRUD as the REST layer sees it. Bodies are stored as sent; form
/// rules are enforced by the client.
#[derive(Clone)]
pub struct RunbookService {
    runbooks: Arc<dyn RunbookRepository>,
}

impl RunbookService {
    pub fn new(runbooks: Arc<dyn RunbookRepository>) -> Self {
        Self { runbooks }
    }

    pub async fn list(&self) -> RunsheetResult<Vec<Runbook>> {
        self.runbooks.get_all().await
    }

    pub async fn get(&self, id: Uuid) -> RunsheetResult<Runbook> {
        self.runbooks
            .get_by_id(id)
            .await?
            .ok_or_else(|| RunsheetError::RunbookNotFound(id.to_string()))
    }

    pub async fn create(&self, request: NewRunbook) -> RunsheetResult<Runbook> {
        let runbook = self.runbooks.create(&request.into_runbook()).await?;
        info!(runbook_id = %runbook.id, steps = runbook.steps.len(), "Created runbook");
        Ok(runbook)
    }

    pub async fn update(&self, id: Uuid, update: RunbookUpdate) -> RunsheetResult<Runbook> {
        let mut runbook = self.get(id).await?;
        update.apply_to(&mut runbook);

        self.runbooks
            .update(&runbook)
            .await?
            .ok_or_else(|| RunsheetError::RunbookNotFound(id.to_string()))
    }

    /// Existing executions keep their snapshot. Deleting an unknown id is not
    /// an error.
    pub async fn delete(&self, id: Uuid) -> RunsheetResult<()> {
        let deleted = self.runbooks.delete(id).await?;
        debug!(runbook_id = %id, deleted, "Delete runbook");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepTemplate;
    use crate::repo::MemoryRunbookRepository;

    fn service() -> RunbookService {
        RunbookService::new(Arc::new(MemoryRunbookRepository::new()))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let service = service();
        let created = service
            .create(
                NewRunbook::new("Deploy")
                    .with_description("prod rollout")
                    .with_step(StepTemplate::new("Check CI")),
            )
            .await
            .unwrap();

        let fetched = service.get(created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.description, "prod rollout");
    }

    #[tokio::test]
    async fn test_update_reorders_steps() {
        let service = service();
        let created = service
            .create(
                NewRunbook::new("Deploy")
                    .with_step(StepTemplate::new("a"))
                    .with_step(StepTemplate::new("b")),
            )
            .await
            .unwrap();

        let update = RunbookUpdate {
            steps: Some(vec![StepTemplate::new("b"), StepTemplate::new("a")]),
            ..Default::default()
        };
        let updated = service.update(created.id, update).await.unwrap();

        assert_eq!(updated.title, "Deploy");
        assert_eq!(updated.steps[0].text, "b");
        assert_eq!(updated.steps[1].text, "a");
    }

    #[tokio::test]
    async fn test_missing_runbook() {
        let service = service();
        let id = Uuid::new_v4();
        assert!(matches!(
            service.get(id).await,
            Err(RunsheetError::RunbookNotFound(_))
        ));
        assert!(service
            .update(id, RunbookUpdate::default())
            .await
            .unwrap_err()
            .is_not_found());
        assert!(service.delete(id).await.is_ok());
    }
}
