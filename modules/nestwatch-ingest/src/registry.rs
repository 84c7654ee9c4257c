//! Source registry: CRUD over scraping targets with URL safety checks.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use nestwatch_common::error::{NestwatchError, Result};
use nestwatch_common::types::{
    AdminStatus, Schedule, ScheduleKind, Source, SourceConfig, SourceStatus,
};
use nestwatch_common::UrlValidator;

use crate::traits::ScrapeStore;

#[derive(Debug, Clone, Deserialize)]
pub struct NewSource {
    pub name: String,
    pub slug: String,
    pub url: String,
    pub scraper_script: String,
    #[serde(default)]
    pub schedule: Option<Schedule>,
    #[serde(default)]
    pub config: Option<SourceConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulePatch {
    pub enabled: Option<bool>,
    pub cron: Option<String>,
    pub kind: Option<ScheduleKind>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfigPatch {
    pub max_pages: Option<u32>,
    pub rate_limit_ms: Option<u64>,
    pub default_location: Option<String>,
}

/// Partial update; `slug` is deliberately absent. Changing a source's
/// slug would orphan every listing and job that references it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcePatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub scraper_script: Option<String>,
    pub schedule: Option<SchedulePatch>,
    pub config: Option<SourceConfigPatch>,
}

/// Result of a kill switch: the disabled source plus how many of its
/// listings were pulled from public view.
#[derive(Debug, Clone)]
pub struct KillReport {
    pub source: Source,
    pub listings_hidden: u64,
}

pub struct SourceRegistry {
    store: Arc<dyn ScrapeStore>,
    validator: UrlValidator,
}

impl SourceRegistry {
    pub fn new(store: Arc<dyn ScrapeStore>) -> Self {
        Self {
            store,
            validator: UrlValidator::new(),
        }
    }

    pub fn with_validator(store: Arc<dyn ScrapeStore>, validator: UrlValidator) -> Self {
        Self { store, validator }
    }

    pub async fn create(&self, input: NewSource) -> Result<Source> {
        if input.name.trim().is_empty()
            || input.slug.trim().is_empty()
            || input.scraper_script.trim().is_empty()
        {
            return Err(NestwatchError::Validation(
                "name, slug, and scraper_script are required".into(),
            ));
        }

        self.validator
            .validate(&input.url)
            .map_err(|e| NestwatchError::Validation(format!("unsafe source url: {e}")))?;

        if self.store.find_source_by_slug(&input.slug).await?.is_some() {
            return Err(NestwatchError::Validation(format!(
                "source slug already exists: {}",
                input.slug
            )));
        }

        let source = Source {
            id: Uuid::new_v4(),
            name: input.name,
            slug: input.slug,
            url: input.url,
            scraper_script: input.scraper_script,
            is_enabled: true,
            schedule: input.schedule.unwrap_or_default(),
            config: input.config.unwrap_or_default(),
            health: Default::default(),
            status: SourceStatus::Active,
            created_at: Utc::now(),
        };
        self.store.insert_source(&source).await?;
        info!(slug = %source.slug, "source registered");
        Ok(source)
    }

    pub async fn list(&self) -> Result<Vec<Source>> {
        Ok(self.store.list_sources().await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Source> {
        self.store
            .get_source(id)
            .await?
            .ok_or_else(|| NestwatchError::NotFound("source", id.to_string()))
    }

    pub async fn update(&self, id: Uuid, patch: SourcePatch) -> Result<Source> {
        let mut source = self.get(id).await?;

        if let Some(url) = patch.url {
            self.validator
                .validate(&url)
                .map_err(|e| NestwatchError::Validation(format!("unsafe source url: {e}")))?;
            source.url = url;
        }
        if let Some(name) = patch.name {
            source.name = name;
        }
        if let Some(script) = patch.scraper_script {
            source.scraper_script = script;
        }
        if let Some(schedule) = patch.schedule {
            if let Some(enabled) = schedule.enabled {
                source.schedule.enabled = enabled;
            }
            if let Some(cron) = schedule.cron {
                source.schedule.cron = cron;
            }
            if let Some(kind) = schedule.kind {
                source.schedule.kind = kind;
            }
        }
        if let Some(config) = patch.config {
            if let Some(max_pages) = config.max_pages {
                source.config.max_pages = max_pages;
            }
            if let Some(rate_limit_ms) = config.rate_limit_ms {
                source.config.rate_limit_ms = rate_limit_ms;
            }
            if let Some(location) = config.default_location {
                source.config.default_location = Some(location);
            }
        }

        self.store.update_source(&source).await?;
        Ok(source)
    }

    /// Flip the enabled flag; status tracks it (Active / Paused).
    pub async fn toggle(&self, id: Uuid) -> Result<Source> {
        let mut source = self.get(id).await?;
        source.is_enabled = !source.is_enabled;
        source.status = if source.is_enabled {
            SourceStatus::Active
        } else {
            SourceStatus::Paused
        };
        self.store.update_source(&source).await?;
        info!(slug = %source.slug, enabled = source.is_enabled, "source toggled");
        Ok(source)
    }

    /// Kill switch: disable the source and hide all of its listings in
    /// one sweep. The hide bypasses per-listing review stamps.
    pub async fn kill(&self, id: Uuid) -> Result<KillReport> {
        let mut source = self.get(id).await?;
        source.is_enabled = false;
        source.status = SourceStatus::Disabled;
        self.store.update_source(&source).await?;

        let listings_hidden = self
            .store
            .set_status_by_source(id, AdminStatus::Hidden, None, Utc::now())
            .await?;
        info!(slug = %source.slug, listings_hidden, "source killed");

        Ok(KillReport {
            source,
            listings_hidden,
        })
    }

    /// Delete a source and everything scraped from it.
    pub async fn delete(&self, id: Uuid) -> Result<u64> {
        let source = self.get(id).await?;
        let listings_deleted = self.store.delete_listings_by_source(id).await?;
        self.store.delete_source(id).await?;
        info!(slug = %source.slug, listings_deleted, "source deleted");
        Ok(listings_deleted)
    }
}
