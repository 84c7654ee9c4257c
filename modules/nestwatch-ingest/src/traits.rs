// Trait abstractions for the ingestion pipeline's collaborators.
//
// ScraperRunner hides the per-source scraping scripts, Enricher hides
// the external analyzer service, and ScrapeStore hides the document
// store. Each has an in-memory double in `testing`, so the whole
// pipeline runs deterministically: no network, no database, no Docker.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use nestwatch_common::types::{
    AdminStatus, AiAnalysis, Job, JobError, JobStats, JobStatus, ListingFilter, LocalListing,
    LocalStats, PageRequest, PublicFilter, RawListing, ScrapeBatch, ScrapeConfig, ScrapeRequest,
    ScrapedListing, Source,
};
use nestwatch_store::PgStore;

// ---------------------------------------------------------------------------
// ScraperRunner — the black-box scraping boundary
// ---------------------------------------------------------------------------

/// One batched invocation across all selected sources. The runner owns
/// per-source concurrency and rate limiting; a single source's failure
/// surfaces in `errors`, never as an `Err`.
#[async_trait]
pub trait ScraperRunner: Send + Sync {
    async fn run(&self, request: &ScrapeRequest) -> Result<ScrapeBatch>;
}

/// A single source's scraping script. Registered in the
/// `ScraperRegistry` under its script identifier; adding a source means
/// registering an adapter, not branching on names.
#[async_trait]
pub trait SourceScraper: Send + Sync {
    async fn fetch(&self, config: &ScrapeConfig) -> Result<Vec<RawListing>>;
}

// ---------------------------------------------------------------------------
// Enricher — the AI scoring boundary
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Enricher: Send + Sync {
    /// Score a listing against local comparison stats.
    async fn analyze(&self, listing: &ScrapedListing, local: &LocalStats) -> Result<AiAnalysis>;

    /// Turn deterministic market breakdowns into a narrative summary.
    /// Aggregation correctness is never delegated here.
    async fn narrate_market_report(&self, breakdowns: &serde_json::Value) -> Result<String>;
}

// ---------------------------------------------------------------------------
// ScrapeStore — the document store boundary
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ScrapeStore: Send + Sync {
    // --- Sources ---

    async fn list_sources(&self) -> Result<Vec<Source>>;
    async fn get_source(&self, id: Uuid) -> Result<Option<Source>>;
    async fn find_source_by_slug(&self, slug: &str) -> Result<Option<Source>>;
    /// The subset of `ids` that exists and is currently enabled.
    async fn enabled_sources_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Source>>;
    async fn insert_source(&self, source: &Source) -> Result<()>;
    async fn update_source(&self, source: &Source) -> Result<()>;
    async fn delete_source(&self, id: Uuid) -> Result<()>;

    // --- Jobs ---

    async fn insert_job(&self, job: &Job) -> Result<()>;
    async fn get_job(&self, id: Uuid) -> Result<Option<Job>>;
    async fn list_jobs(&self, page: PageRequest) -> Result<(Vec<Job>, u64)>;
    /// Compare-and-set finalize; false when the job already went terminal.
    async fn finalize_job(
        &self,
        id: Uuid,
        status: JobStatus,
        stats: JobStats,
        errors: &[JobError],
        completed_at: DateTime<Utc>,
    ) -> Result<bool>;
    async fn mark_job_stopped(&self, id: Uuid, stopped_by: Uuid, at: DateTime<Utc>)
        -> Result<bool>;

    // --- Listings ---

    async fn find_listing_by_source_url(&self, url: &str) -> Result<Option<ScrapedListing>>;
    async fn get_listing(&self, id: Uuid) -> Result<Option<ScrapedListing>>;
    /// False when another record already owns this source_url.
    async fn insert_listing(&self, listing: &ScrapedListing) -> Result<bool>;
    async fn touch_listing_recheck(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
    async fn update_listing(&self, listing: &ScrapedListing) -> Result<()>;
    async fn query_listings(
        &self,
        filter: &ListingFilter,
        page: PageRequest,
    ) -> Result<(Vec<ScrapedListing>, u64)>;
    async fn query_public_listings(
        &self,
        filter: &PublicFilter,
        page: PageRequest,
    ) -> Result<(Vec<ScrapedListing>, u64)>;
    async fn all_listings(&self) -> Result<Vec<ScrapedListing>>;
    async fn listing_status_counts(&self) -> Result<Vec<(AdminStatus, u64)>>;
    async fn set_status_by_ids(
        &self,
        ids: &[Uuid],
        status: AdminStatus,
        reviewed_by: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<u64>;
    async fn set_status_by_source(
        &self,
        source_id: Uuid,
        status: AdminStatus,
        reviewed_by: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<u64>;
    async fn delete_listings_by_ids(&self, ids: &[Uuid]) -> Result<u64>;
    async fn delete_listings_by_source(&self, source_id: Uuid) -> Result<u64>;
    async fn increment_views(&self, ids: &[Uuid]) -> Result<()>;
    async fn increment_click_through(&self, id: Uuid) -> Result<()>;
    async fn expire_due_listings(&self, now: DateTime<Utc>) -> Result<u64>;

    // --- Local inventory (price comparison baseline) ---

    async fn approved_local_listings(&self) -> Result<Vec<LocalListing>>;
}

#[async_trait]
impl ScrapeStore for PgStore {
    async fn list_sources(&self) -> Result<Vec<Source>> {
        PgStore::list_sources(self).await
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<Source>> {
        PgStore::get_source(self, id).await
    }

    async fn find_source_by_slug(&self, slug: &str) -> Result<Option<Source>> {
        PgStore::find_source_by_slug(self, slug).await
    }

    async fn enabled_sources_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Source>> {
        PgStore::enabled_sources_by_ids(self, ids).await
    }

    async fn insert_source(&self, source: &Source) -> Result<()> {
        PgStore::insert_source(self, source).await
    }

    async fn update_source(&self, source: &Source) -> Result<()> {
        PgStore::update_source(self, source).await
    }

    async fn delete_source(&self, id: Uuid) -> Result<()> {
        PgStore::delete_source(self, id).await
    }

    async fn insert_job(&self, job: &Job) -> Result<()> {
        PgStore::insert_job(self, job).await
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        PgStore::get_job(self, id).await
    }

    async fn list_jobs(&self, page: PageRequest) -> Result<(Vec<Job>, u64)> {
        PgStore::list_jobs(self, page).await
    }

    async fn finalize_job(
        &self,
        id: Uuid,
        status: JobStatus,
        stats: JobStats,
        errors: &[JobError],
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        PgStore::finalize_job(self, id, status, stats, errors, completed_at).await
    }

    async fn mark_job_stopped(
        &self,
        id: Uuid,
        stopped_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        PgStore::mark_job_stopped(self, id, stopped_by, at).await
    }

    async fn find_listing_by_source_url(&self, url: &str) -> Result<Option<ScrapedListing>> {
        PgStore::find_listing_by_source_url(self, url).await
    }

    async fn get_listing(&self, id: Uuid) -> Result<Option<ScrapedListing>> {
        PgStore::get_listing(self, id).await
    }

    async fn insert_listing(&self, listing: &ScrapedListing) -> Result<bool> {
        PgStore::insert_listing(self, listing).await
    }

    async fn touch_listing_recheck(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        PgStore::touch_listing_recheck(self, id, at).await
    }

    async fn update_listing(&self, listing: &ScrapedListing) -> Result<()> {
        PgStore::update_listing(self, listing).await
    }

    async fn query_listings(
        &self,
        filter: &ListingFilter,
        page: PageRequest,
    ) -> Result<(Vec<ScrapedListing>, u64)> {
        PgStore::query_listings(self, filter, page).await
    }

    async fn query_public_listings(
        &self,
        filter: &PublicFilter,
        page: PageRequest,
    ) -> Result<(Vec<ScrapedListing>, u64)> {
        PgStore::query_public_listings(self, filter, page).await
    }

    async fn all_listings(&self) -> Result<Vec<ScrapedListing>> {
        PgStore::all_listings(self).await
    }

    async fn listing_status_counts(&self) -> Result<Vec<(AdminStatus, u64)>> {
        PgStore::listing_status_counts(self).await
    }

    async fn set_status_by_ids(
        &self,
        ids: &[Uuid],
        status: AdminStatus,
        reviewed_by: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        PgStore::set_status_by_ids(self, ids, status, reviewed_by, at).await
    }

    async fn set_status_by_source(
        &self,
        source_id: Uuid,
        status: AdminStatus,
        reviewed_by: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        PgStore::set_status_by_source(self, source_id, status, reviewed_by, at).await
    }

    async fn delete_listings_by_ids(&self, ids: &[Uuid]) -> Result<u64> {
        PgStore::delete_listings_by_ids(self, ids).await
    }

    async fn delete_listings_by_source(&self, source_id: Uuid) -> Result<u64> {
        PgStore::delete_listings_by_source(self, source_id).await
    }

    async fn increment_views(&self, ids: &[Uuid]) -> Result<()> {
        PgStore::increment_views(self, ids).await
    }

    async fn increment_click_through(&self, id: Uuid) -> Result<()> {
        PgStore::increment_click_through(self, id).await
    }

    async fn expire_due_listings(&self, now: DateTime<Utc>) -> Result<u64> {
        PgStore::expire_due_listings(self, now).await
    }

    async fn approved_local_listings(&self) -> Result<Vec<LocalListing>> {
        PgStore::approved_local_listings(self).await
    }
}
