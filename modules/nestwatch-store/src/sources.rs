use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use nestwatch_common::types::{Source, SourceStatus};

use crate::{enum_from_text, enum_text, is_unique_violation, PgStore};

fn source_from_row(row: &PgRow) -> Result<Source> {
    Ok(Source {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        url: row.try_get("url")?,
        scraper_script: row.try_get("scraper_script")?,
        is_enabled: row.try_get("is_enabled")?,
        schedule: serde_json::from_value(row.try_get("schedule")?)?,
        config: serde_json::from_value(row.try_get("config")?)?,
        health: serde_json::from_value(row.try_get("health")?)?,
        status: enum_from_text::<SourceStatus>(row.try_get::<String, _>("status")?.as_str())?,
        created_at: row.try_get("created_at")?,
    })
}

impl PgStore {
    pub async fn list_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query("SELECT * FROM sources ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(source_from_row).collect()
    }

    pub async fn get_source(&self, id: Uuid) -> Result<Option<Source>> {
        let row = sqlx::query("SELECT * FROM sources WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(source_from_row).transpose()
    }

    pub async fn find_source_by_slug(&self, slug: &str) -> Result<Option<Source>> {
        let row = sqlx::query("SELECT * FROM sources WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(source_from_row).transpose()
    }

    /// The subset of `ids` that exists and is currently enabled.
    pub async fn enabled_sources_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Source>> {
        let rows =
            sqlx::query("SELECT * FROM sources WHERE id = ANY($1) AND is_enabled = TRUE")
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(source_from_row).collect()
    }

    pub async fn insert_source(&self, source: &Source) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO sources
               (id, name, slug, url, scraper_script, is_enabled, schedule, config, health, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(source.id)
        .bind(&source.name)
        .bind(&source.slug)
        .bind(&source.url)
        .bind(&source.scraper_script)
        .bind(source.is_enabled)
        .bind(serde_json::to_value(&source.schedule)?)
        .bind(serde_json::to_value(&source.config)?)
        .bind(serde_json::to_value(&source.health)?)
        .bind(enum_text(&source.status))
        .bind(source.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(anyhow!("source slug already exists: {}", source.slug))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrite all mutable fields. `slug` is immutable by omission.
    pub async fn update_source(&self, source: &Source) -> Result<()> {
        sqlx::query(
            "UPDATE sources SET
               name = $2, url = $3, scraper_script = $4, is_enabled = $5,
               schedule = $6, config = $7, health = $8, status = $9
             WHERE id = $1",
        )
        .bind(source.id)
        .bind(&source.name)
        .bind(&source.url)
        .bind(&source.scraper_script)
        .bind(source.is_enabled)
        .bind(serde_json::to_value(&source.schedule)?)
        .bind(serde_json::to_value(&source.config)?)
        .bind(serde_json::to_value(&source.health)?)
        .bind(enum_text(&source.status))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_source(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM sources WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
