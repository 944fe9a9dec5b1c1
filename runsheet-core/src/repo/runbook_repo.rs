use crate::error::RunsheetResult;
use crate::models::Runbook;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Repository, RunbookRepository};

pub struct PgRunbookRepository {
    pool: PgPool,
}

impl PgRunbookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunbookRepository for PgRunbookRepository {
    async fn create(&self, runbook: &Runbook) -> RunsheetResult<Runbook> {
        let record = sqlx::query_as::<_, Runbook>(
            r#"
            INSERT INTO runbooks (id, title, description, steps, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, title, description, steps, created_at
            "#,
        )
        .bind(runbook.id)
        .bind(&runbook.title)
        .bind(&runbook.description)
        .bind(Json(&runbook.steps))
        .bind(runbook.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update(&self, runbook: &Runbook) -> RunsheetResult<Option<Runbook>> {
        let record = sqlx::query_as::<_, Runbook>(
            r#"
            UPDATE runbooks
            SET title = $2, description = $3, steps = $4
            WHERE id = $1
            RETURNING id, title, description, steps, created_at
            "#,
        )
        .bind(runbook.id)
        .bind(&runbook.title)
        .bind(&runbook.description)
        .bind(Json(&runbook.steps))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}

#[async_trait]
impl Repository for PgRunbookRepository {
    type Entity = Runbook;
    type Id = Uuid;

    async fn get_by_id(&self, id: Uuid) -> RunsheetResult<Option<Runbook>> {
        let record = sqlx::query_as::<_, Runbook>(
            r#"
            SELECT id, title, description, steps, created_at
            FROM runbooks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_all(&self) -> RunsheetResult<Vec<Runbook>> {
        let records = sqlx::query_as::<_, Runbook>(
            r#"
            SELECT id, title, description, steps, created_at
            FROM runbooks
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn delete(&self, id: Uuid) -> RunsheetResult<bool> {
        let result = sqlx::query("DELETE FROM runbooks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
