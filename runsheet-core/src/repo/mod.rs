mod execution_repo;
mod memory;
mod runbook_repo;

pub use execution_repo::PgExecutionRepository;
pub use memory::{MemoryExecutionRepository, MemoryRunbookRepository};
pub use runbook_repo::PgRunbookRepository;

use crate::error::RunsheetResult;
use crate::models::{Execution, Runbook};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait Repository: Send + Sync {
    type Entity;
    type Id;

    async fn get_by_id(&self, id: Self::Id) -> RunsheetResult<Option<Self::Entity>>;
    async fn get_all(&self) -> RunsheetResult<Vec<Self::Entity>>;
    async fn delete(&self, id: Self::Id) -> RunsheetResult<bool>;
}

/// Runbook documents. `get_all` is ordered by `created_at`, newest first.
#[async_trait]
pub trait RunbookRepository: Repository<Entity = Runbook, Id = Uuid> {
    async fn create(&self, runbook: &Runbook) -> RunsheetResult<Runbook>;

    /// Overwrites the stored document. `None` when the id is unknown.
    async fn update(&self, runbook: &Runbook) -> RunsheetResult<Option<Runbook>>;
}

/// Execution documents. `get_all` is ordered by `started_at`, newest first.
#[async_trait]
pub trait ExecutionRepository: Repository<Entity = Execution, Id = Uuid> {
    async fn create(&self, execution: &Execution) -> RunsheetResult<Execution>;

    /// Persists the full document, steps included. Last write wins: there is
    /// no version check between concurrent writers. `None` when the id is
    /// unknown.
    async fn save(&self, execution: &Execution) -> RunsheetResult<Option<Execution>>;
}
