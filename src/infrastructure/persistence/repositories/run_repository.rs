use crate::domain::repositories::RunRepository;
use crate::domain::types::{AnalysisRun, RunStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};

pub struct PgRunRepository {
    pool: PgPool,
}

impl PgRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunRepository for PgRunRepository {
    async fn open(&self, run_type: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO analysis_runs (run_type, status)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(run_type)
        .bind(RunStatus::Running.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to open analysis run")?;

        Ok(row.try_get("id")?)
    }

    async fn complete(&self, run_id: i64, records_processed: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE analysis_runs
            SET status = $2, records_processed = $3, completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(RunStatus::Completed.as_str())
        .bind(records_processed)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to complete analysis run {run_id}"))?;

        Ok(())
    }

    async fn fail(&self, run_id: i64, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE analysis_runs
            SET status = $2, error_message = $3, completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(RunStatus::Failed.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to mark analysis run {run_id} failed"))?;

        Ok(())
    }

    async fn find(&self, run_id: i64) -> Result<Option<AnalysisRun>> {
        let row = sqlx::query(
            r#"
            SELECT id, run_type, status, records_processed, error_message,
                   started_at, completed_at
            FROM analysis_runs
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load analysis run {run_id}"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.try_get("status")?;
        Ok(Some(AnalysisRun {
            id: row.try_get("id")?,
            run_type: row.try_get("run_type")?,
            status: status.parse::<RunStatus>()?,
            records_processed: row.try_get("records_processed")?,
            error_message: row.try_get("error_message")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        }))
    }
}
