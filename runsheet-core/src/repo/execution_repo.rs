use crate::error::RunsheetResult;
use crate::models::Execution;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{ExecutionRepository, Repository};

pub struct PgExecutionRepository {
    pool: PgPool,
}

impl PgExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionRepository for PgExecutionRepository {
    async fn create(&self, execution: &Execution) -> RunsheetResult<Execution> {
        let record = sqlx::query_as::<_, Execution>(
            r#"
            INSERT INTO executions (id, runbook_id, runbook_title, incident_id, operator,
                                    priority, status, started_at, finished_at, steps)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, runbook_id, runbook_title, incident_id, operator, priority, status,
                      started_at, finished_at, steps
            "#,
        )
        .bind(execution.id)
        .bind(execution.runbook_id)
        .bind(&execution.runbook_title)
        .bind(&execution.incident_id)
        .bind(&execution.operator)
        .bind(execution.priority)
        .bind(execution.status)
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .bind(Json(&execution.steps))
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn save(&self, execution: &Execution) -> RunsheetResult<Option<Execution>> {
        let record = sqlx::query_as::<_, Execution>(
            r#"
            UPDATE executions
            SET runbook_id = $2, runbook_title = $3, incident_id = $4, operator = $5,
                priority = $6, status = $7, finished_at = $8, steps = $9
            WHERE id = $1
            RETURNING id, runbook_id, runbook_title, incident_id, operator, priority, status,
                      started_at, finished_at, steps
            "#,
        )
        .bind(execution.id)
        .bind(execution.runbook_id)
        .bind(&execution.runbook_title)
        .bind(&execution.incident_id)
        .bind(&execution.operator)
        .bind(execution.priority)
        .bind(execution.status)
        .bind(execution.finished_at)
        .bind(Json(&execution.steps))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}

#[async_trait]
impl Repository for PgExecutionRepository {
    type Entity = Execution;
    type Id = Uuid;

    async fn get_by_id(&self, id: Uuid) -> RunsheetResult<Option<Execution>> {
        let record = sqlx::query_as::<_, Execution>(
            r#"
            SELECT id, runbook_id, runbook_title, incident_id, operator, priority, status,
                   started_at, finished_at, steps
            FROM executions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_all(&self) -> RunsheetResult<Vec<Execution>> {
        let records = sqlx::query_as::<_, Execution>(
            r#"
            SELECT id, runbook_id, runbook_title, incident_id, operator, priority, status,
                   started_at, finished_at, steps
            FROM executions
            ORDER BY started_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn delete(&self, id: Uuid) -> RunsheetResult<bool> {
        let result = sqlx::query("DELETE FROM executions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
