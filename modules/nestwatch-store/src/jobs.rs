use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use nestwatch_common::types::{Job, JobError, JobKind, JobStats, JobStatus, PageRequest};

use crate::{enum_from_text, enum_text, PgStore};

fn job_from_row(row: &PgRow) -> Result<Job> {
    Ok(Job {
        id: row.try_get("id")?,
        triggered_by: row.try_get("triggered_by")?,
        sources: row.try_get("sources")?,
        kind: enum_from_text::<JobKind>(row.try_get::<String, _>("kind")?.as_str())?,
        status: enum_from_text::<JobStatus>(row.try_get::<String, _>("status")?.as_str())?,
        stopped_by: row.try_get("stopped_by")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        stats: serde_json::from_value(row.try_get("stats")?)?,
        error_details: serde_json::from_value(row.try_get("error_details")?)?,
        filters: serde_json::from_value(row.try_get("filters")?)?,
    })
}

impl PgStore {
    pub async fn insert_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            "INSERT INTO scrape_jobs
               (id, triggered_by, sources, kind, status, stopped_by, started_at,
                completed_at, stats, error_details, filters)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(job.id)
        .bind(job.triggered_by)
        .bind(&job.sources)
        .bind(enum_text(&job.kind))
        .bind(enum_text(&job.status))
        .bind(job.stopped_by)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(serde_json::to_value(job.stats)?)
        .bind(serde_json::to_value(&job.error_details)?)
        .bind(serde_json::to_value(&job.filters)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query("SELECT * FROM scrape_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    pub async fn list_jobs(&self, page: PageRequest) -> Result<(Vec<Job>, u64)> {
        let rows = sqlx::query(
            "SELECT * FROM scrape_jobs ORDER BY started_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(page.per_page as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        let jobs = rows.iter().map(job_from_row).collect::<Result<Vec<_>>>()?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scrape_jobs")
            .fetch_one(&self.pool)
            .await?;
        Ok((jobs, total as u64))
    }

    /// Finalize a running job. Returns false when the job already went
    /// terminal (stopped, or a retried finalize) — callers must then
    /// skip side effects that assume they won.
    pub async fn finalize_job(
        &self,
        id: Uuid,
        status: JobStatus,
        stats: JobStats,
        errors: &[JobError],
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scrape_jobs
             SET status = $2, stats = $3, error_details = $4, completed_at = $5
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(enum_text(&status))
        .bind(serde_json::to_value(stats)?)
        .bind(serde_json::to_value(errors)?)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Stop intent: only valid while running.
    pub async fn mark_job_stopped(
        &self,
        id: Uuid,
        stopped_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scrape_jobs
             SET status = 'stopped', stopped_by = $2, completed_at = $3
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(stopped_by)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
