//! Job orchestration: fire-and-forget scrape runs with durable progress.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use nestwatch_common::error::{NestwatchError, Result};
use nestwatch_common::types::{
    Job, JobError, JobFilters, JobKind, JobStats, JobStatus, PageRequest, ScrapeConfig,
    ScrapeRequest, Source, SourceScrapeRequest,
};

use crate::normalize::{IngestEngine, IngestOutcome};
use crate::traits::{Enricher, ScraperRunner, ScrapeStore};

pub struct JobOrchestrator {
    store: Arc<dyn ScrapeStore>,
    runner: Arc<dyn ScraperRunner>,
    enricher: Arc<dyn Enricher>,
    handles: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn ScrapeStore>,
        runner: Arc<dyn ScraperRunner>,
        enricher: Arc<dyn Enricher>,
    ) -> Self {
        Self {
            store,
            runner,
            enricher,
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Validate, record a running job, and kick off the scrape in the
    /// background. Returns the job record immediately; progress lands in
    /// the store as the run proceeds.
    pub async fn trigger(
        &self,
        triggered_by: Uuid,
        source_ids: &[Uuid],
        kind: JobKind,
        filters: JobFilters,
    ) -> Result<Job> {
        if source_ids.is_empty() {
            return Err(NestwatchError::Validation(
                "at least one source id is required".into(),
            ));
        }

        let sources = self.store.enabled_sources_by_ids(source_ids).await?;
        if sources.is_empty() {
            return Err(NestwatchError::Validation(
                "no enabled sources matched the request".into(),
            ));
        }

        let job = Job {
            id: Uuid::new_v4(),
            triggered_by,
            sources: sources.iter().map(|s| s.slug.clone()).collect(),
            kind,
            status: JobStatus::Running,
            stopped_by: None,
            started_at: Utc::now(),
            completed_at: None,
            stats: JobStats::default(),
            error_details: Vec::new(),
            filters,
        };
        self.store.insert_job(&job).await?;
        info!(job_id = %job.id, sources = job.sources.len(), kind = %kind, "scrape job started");

        let store = Arc::clone(&self.store);
        let runner = Arc::clone(&self.runner);
        let enricher = Arc::clone(&self.enricher);
        let spawned = job.clone();
        let registry = Arc::clone(&self.handles);
        let job_id = job.id;
        let handle = tokio::spawn(async move {
            run_job(store, runner, enricher, spawned, sources).await;
            registry.lock().unwrap().remove(&job_id);
        });
        // Sweep before tracking: a run that finished before its handle
        // landed in the map (or a very fast one) must not accumulate.
        let mut handles = self.handles.lock().unwrap();
        handles.retain(|_, h| !h.is_finished());
        handles.insert(job.id, handle);

        Ok(job)
    }

    /// Background runs still tracked. Finished runs remove themselves.
    pub fn active_jobs(&self) -> usize {
        self.handles.lock().unwrap().len()
    }

    /// Await a background run. Test and shutdown hook; normal callers
    /// poll the job record instead.
    pub async fn wait(&self, job_id: Uuid) {
        let handle = self.handles.lock().unwrap().remove(&job_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(job_id = %job_id, error = %e, "scrape task panicked");
            }
        }
    }

    /// Request a stop. The background task keeps running but its
    /// finalize loses the compare-and-set, so the stopped status sticks.
    pub async fn stop(&self, job_id: Uuid, stopped_by: Uuid) -> Result<Job> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| NestwatchError::NotFound("job", job_id.to_string()))?;

        if job.status.is_terminal() {
            return Err(NestwatchError::Validation("job is not running".into()));
        }

        if !self
            .store
            .mark_job_stopped(job_id, stopped_by, Utc::now())
            .await?
        {
            // Finished in the window between the read and the update.
            return Err(NestwatchError::Validation("job is not running".into()));
        }

        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| NestwatchError::NotFound("job", job_id.to_string()))
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.store.get_job(job_id).await?)
    }

    pub async fn list(&self, page: PageRequest) -> Result<(Vec<Job>, u64)> {
        Ok(self.store.list_jobs(page).await?)
    }
}

/// Merge request-level filters over a source's own config.
fn build_scrape_request(sources: &[Source], kind: JobKind, filters: &JobFilters) -> ScrapeRequest {
    let sources = sources
        .iter()
        .map(|s| SourceScrapeRequest {
            slug: s.slug.clone(),
            script: s.scraper_script.clone(),
            config: ScrapeConfig {
                max_pages: filters.max_pages.unwrap_or(s.config.max_pages),
                rate_limit_ms: s.config.rate_limit_ms,
                location: filters
                    .location
                    .clone()
                    .or_else(|| s.config.default_location.clone())
                    .unwrap_or_default(),
                price_min: filters.price_min.unwrap_or(0),
                price_max: filters.price_max.unwrap_or(0),
            },
        })
        .collect();
    ScrapeRequest { sources, kind }
}

async fn run_job(
    store: Arc<dyn ScrapeStore>,
    runner: Arc<dyn ScraperRunner>,
    enricher: Arc<dyn Enricher>,
    job: Job,
    sources: Vec<Source>,
) {
    let request = build_scrape_request(&sources, job.kind, &job.filters);

    let batch = match runner.run(&request).await {
        Ok(batch) => batch,
        Err(e) => {
            error!(job_id = %job.id, error = %e, "scrape run failed");
            let errors = vec![JobError {
                source: "runner".to_string(),
                message: e.to_string(),
            }];
            let finalized = match store
                .finalize_job(job.id, JobStatus::Failed, JobStats::default(), &errors, Utc::now())
                .await
            {
                Ok(finalized) => finalized,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "failed to persist job failure");
                    false
                }
            };
            if finalized {
                stamp_failure(store.as_ref(), &sources).await;
            }
            return;
        }
    };

    let engine = IngestEngine::new(Arc::clone(&store), enricher);
    let mut stats = JobStats {
        total_scraped: batch.listings.len() as u64,
        ..Default::default()
    };
    // Health counters only grow for listings that actually landed.
    let mut inserted_by_source: HashMap<String, u64> = HashMap::new();

    for raw in &batch.listings {
        let Some(source) = sources.iter().find(|s| s.slug == raw.source_slug) else {
            warn!(slug = %raw.source_slug, "listing from unrequested source, skipping");
            continue;
        };
        match engine.ingest_one(raw, source, job.kind, Utc::now()).await {
            // PII-flagged arrivals are tallied separately from clean new
            // listings; the two counters partition the inserts.
            Ok(IngestOutcome::New { pii }) => {
                if pii {
                    stats.pii_auto_flagged += 1;
                } else {
                    stats.new_listings += 1;
                }
                *inserted_by_source.entry(raw.source_slug.clone()).or_default() += 1;
            }
            Ok(IngestOutcome::Updated) => stats.updated += 1,
            Ok(IngestOutcome::Duplicate) => stats.duplicates_skipped += 1,
            Err(e) => {
                warn!(url = %raw.source_url, error = %e, "listing ingest failed");
            }
        }
    }

    // Per-source errors are recorded on the job but do not fail it; the
    // run produced everything it could.
    let finalized = match store
        .finalize_job(job.id, JobStatus::Completed, stats, &batch.errors, Utc::now())
        .await
    {
        Ok(finalized) => finalized,
        Err(e) => {
            error!(job_id = %job.id, error = %e, "failed to persist job completion");
            return;
        }
    };

    if !finalized {
        // Stopped mid-run (or a duplicate finalize). The winner already
        // owns the terminal state; skip the health stamping too.
        info!(job_id = %job.id, "job already terminal, skipping finalize side effects");
        return;
    }

    info!(job_id = %job.id, stats = %stats, "scrape job completed");

    let failed: std::collections::HashSet<_> =
        batch.errors.iter().map(|e| e.source.as_str()).collect();
    let now = Utc::now();
    for source in &sources {
        // Re-read so concurrent admin edits are not clobbered.
        let Ok(Some(mut current)) = store.get_source(source.id).await else {
            continue;
        };
        current.health.last_scrape_at = Some(now);
        if failed.contains(source.slug.as_str()) {
            current.health.last_failure_at = Some(now);
        } else {
            current.health.last_success_at = Some(now);
        }
        current.health.total_scraped += inserted_by_source
            .get(source.slug.as_str())
            .copied()
            .unwrap_or(0);
        if let Err(e) = store.update_source(&current).await {
            warn!(slug = %source.slug, error = %e, "failed to update source health");
        }
    }
}

async fn stamp_failure(store: &dyn ScrapeStore, sources: &[Source]) {
    let now = Utc::now();
    for source in sources {
        let Ok(Some(mut current)) = store.get_source(source.id).await else {
            continue;
        };
        current.health.last_scrape_at = Some(now);
        current.health.last_failure_at = Some(now);
        if let Err(e) = store.update_source(&current).await {
            warn!(slug = %source.slug, error = %e, "failed to update source health");
        }
    }
}
