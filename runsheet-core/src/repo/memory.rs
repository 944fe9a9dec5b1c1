//! In-process document store. Backs the test suites and `runsheet serve
//! --memory`; nothing survives a restart.

use crate::error::RunsheetResult;
use crate::models::{Execution, Runbook};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ExecutionRepository, Repository, RunbookRepository};

#[derive(Clone, Default)]
pub struct MemoryRunbookRepository {
    runbooks: Arc<RwLock<HashMap<Uuid, Runbook>>>,
}

impl MemoryRunbookRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunbookRepository for MemoryRunbookRepository {
    async fn create(&self, runbook: &Runbook) -> RunsheetResult<Runbook> {
        let mut runbooks = self.runbooks.write().await;
        runbooks.insert(runbook.id, runbook.clone());
        Ok(runbook.clone())
    }

    async fn update(&self, runbook: &Runbook) -> RunsheetResult<Option<Runbook>> {
        let mut runbooks = self.runbooks.write().await;
        match runbooks.get_mut(&runbook.id) {
            Some(stored) => {
                let created_at = stored.created_at;
                *stored = runbook.clone();
                stored.created_at = created_at;
                Ok(Some(stored.clone()))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Repository for MemoryRunbookRepository {
    type Entity = Runbook;
    type Id = Uuid;

    async fn get_by_id(&self, id: Uuid) -> RunsheetResult<Option<Runbook>> {
        let runbooks = self.runbooks.read().await;
        Ok(runbooks.get(&id).cloned())
    }

    async fn get_all(&self) -> RunsheetResult<Vec<Runbook>> {
        let runbooks = self.runbooks.read().await;
        let mut all: Vec<Runbook> = runbooks.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn delete(&self, id: Uuid) -> RunsheetResult<bool> {
        let mut runbooks = self.runbooks.write().await;
        Ok(runbooks.remove(&id).is_some())
    }
}

#[derive(Clone, Default)]
pub struct MemoryExecutionRepository {
    executions: Arc<RwLock<HashMap<Uuid, Execution>>>,
}

impl MemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionRepository for MemoryExecutionRepository {
    async fn create(&self, execution: &Execution) -> RunsheetResult<Execution> {
        let mut executions = self.executions.write().await;
        executions.insert(execution.id, execution.clone());
        Ok(execution.clone())
    }

    async fn save(&self, execution: &Execution) -> RunsheetResult<Option<Execution>> {
        let mut executions = self.executions.write().await;
        match executions.get_mut(&execution.id) {
            Some(stored) => {
                let started_at = stored.started_at;
                *stored = execution.clone();
                stored.started_at = started_at;
                Ok(Some(stored.clone()))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Repository for MemoryExecutionRepository {
    type Entity = Execution;
    type Id = Uuid;

    async fn get_by_id(&self, id: Uuid) -> RunsheetResult<Option<Execution>> {
        let executions = self.executions.read().await;
        Ok(executions.get(&id).cloned())
    }

    async fn get_all(&self) -> RunsheetResult<Vec<Execution>> {
        let executions = self.executions.read().await;
        let mut all: Vec<Execution> = executions.values().cloned().collect();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(all)
    }

    async fn delete(&self, id: Uuid) -> RunsheetResult<bool> {
        let mut executions = self.executions.write().await;
        Ok(executions.remove(&id).is_some())
    }
}
