//! In-memory doubles for the pipeline's trait seams. Tests exercise the
//! real services against these; nothing here touches the network or a
//! database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use nestwatch_common::types::{
    AdminStatus, AiAnalysis, Job, JobError, JobStats, JobStatus, ListingFilter, LocalListing,
    LocalStats, PageRequest, PublicFilter, ScrapeBatch, ScrapeRequest, ScrapedListing, Source,
};

use crate::traits::{Enricher, ScraperRunner, ScrapeStore};

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    sources: HashMap<Uuid, Source>,
    jobs: HashMap<Uuid, Job>,
    listings: HashMap<Uuid, ScrapedListing>,
    locals: Vec<LocalListing>,
}

/// Stateful in-memory store with the same identity and transition
/// guarantees as the Postgres implementation: unique source slugs,
/// unique listing source URLs, forward-only job finalization.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_finalize: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `finalize_job` call error, simulating a database
    /// outage at the end of a run.
    pub fn failing_finalize(self) -> Self {
        self.fail_finalize.store(true, Ordering::SeqCst);
        self
    }

    /// Seed local inventory for price comparison tests.
    pub fn add_local(&self, local: LocalListing) {
        self.inner.lock().unwrap().locals.push(local);
    }

    pub fn listing_count(&self) -> usize {
        self.inner.lock().unwrap().listings.len()
    }
}

fn matches_admin_filter(l: &ScrapedListing, f: &ListingFilter) -> bool {
    if let Some(status) = f.status {
        if l.admin_status != status {
            return false;
        }
    }
    if let Some(ref website) = f.source_website {
        if &l.source_website != website {
            return false;
        }
    }
    if let Some(ref town) = f.town {
        if !l
            .location
            .town
            .to_lowercase()
            .contains(&town.to_lowercase())
        {
            return false;
        }
    }
    if let Some(min) = f.min_price {
        if l.price < min {
            return false;
        }
    }
    if let Some(max) = f.max_price {
        if l.price > max {
            return false;
        }
    }
    if let Some(min) = f.min_quality {
        if l.ai_analysis.quality_score < min {
            return false;
        }
    }
    if let Some(max) = f.max_scam_risk {
        if l.ai_analysis.scam_risk_score > max {
            return false;
        }
    }
    if let Some(ref search) = f.search {
        let needle = search.to_lowercase();
        if !l.title.to_lowercase().contains(&needle)
            && !l.description.to_lowercase().contains(&needle)
        {
            return false;
        }
    }
    true
}

fn matches_public_filter(l: &ScrapedListing, f: &PublicFilter) -> bool {
    if l.admin_status != AdminStatus::Approved || !l.is_active {
        return false;
    }
    if let Some(ref town) = f.town {
        if !l
            .location
            .town
            .to_lowercase()
            .contains(&town.to_lowercase())
        {
            return false;
        }
    }
    if let Some(beds) = f.beds {
        if l.beds != beds {
            return false;
        }
    }
    if let Some(property_type) = f.property_type {
        if l.property_type != property_type {
            return false;
        }
    }
    if let Some(min) = f.min_price {
        if l.price < min {
            return false;
        }
    }
    if let Some(max) = f.max_price {
        if l.price > max {
            return false;
        }
    }
    true
}

fn paginate<T: Clone>(mut items: Vec<T>, page: PageRequest) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let start = (page.offset() as usize).min(items.len());
    let end = (start + page.per_page as usize).min(items.len());
    items.drain(..start);
    items.truncate(end - start);
    (items, total)
}

#[async_trait]
impl ScrapeStore for MemoryStore {
    async fn list_sources(&self) -> Result<Vec<Source>> {
        let inner = self.inner.lock().unwrap();
        let mut sources: Vec<_> = inner.sources.values().cloned().collect();
        sources.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sources)
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<Source>> {
        Ok(self.inner.lock().unwrap().sources.get(&id).cloned())
    }

    async fn find_source_by_slug(&self, slug: &str) -> Result<Option<Source>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sources.values().find(|s| s.slug == slug).cloned())
    }

    async fn enabled_sources_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Source>> {
        let inner = self.inner.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| inner.sources.get(id))
            .filter(|s| s.is_enabled)
            .cloned()
            .collect())
    }

    async fn insert_source(&self, source: &Source) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.sources.values().any(|s| s.slug == source.slug) {
            return Err(anyhow!("source slug already exists: {}", source.slug));
        }
        inner.sources.insert(source.id, source.clone());
        Ok(())
    }

    async fn update_source(&self, source: &Source) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .sources
            .insert(source.id, source.clone());
        Ok(())
    }

    async fn delete_source(&self, id: Uuid) -> Result<()> {
        self.inner.lock().unwrap().sources.remove(&id);
        Ok(())
    }

    async fn insert_job(&self, job: &Job) -> Result<()> {
        self.inner.lock().unwrap().jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.inner.lock().unwrap().jobs.get(&id).cloned())
    }

    async fn list_jobs(&self, page: PageRequest) -> Result<(Vec<Job>, u64)> {
        let inner = self.inner.lock().unwrap();
        let mut jobs: Vec<_> = inner.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(paginate(jobs, page))
    }

    async fn finalize_job(
        &self,
        id: Uuid,
        status: JobStatus,
        stats: JobStats,
        errors: &[JobError],
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        if self.fail_finalize.load(Ordering::SeqCst) {
            return Err(anyhow!("store unavailable"));
        }
        let mut inner = self.inner.lock().unwrap();
        let Some(job) = inner.jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.status != JobStatus::Running {
            return Ok(false);
        }
        job.status = status;
        job.stats = stats;
        job.error_details = errors.to_vec();
        job.completed_at = Some(completed_at);
        Ok(true)
    }

    async fn mark_job_stopped(
        &self,
        id: Uuid,
        stopped_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(job) = inner.jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.status != JobStatus::Running {
            return Ok(false);
        }
        job.status = JobStatus::Stopped;
        job.stopped_by = Some(stopped_by);
        job.completed_at = Some(at);
        Ok(true)
    }

    async fn find_listing_by_source_url(&self, url: &str) -> Result<Option<ScrapedListing>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .listings
            .values()
            .find(|l| l.source_url == url)
            .cloned())
    }

    async fn get_listing(&self, id: Uuid) -> Result<Option<ScrapedListing>> {
        Ok(self.inner.lock().unwrap().listings.get(&id).cloned())
    }

    async fn insert_listing(&self, listing: &ScrapedListing) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .listings
            .values()
            .any(|l| l.source_url == listing.source_url)
        {
            return Ok(false);
        }
        inner.listings.insert(listing.id, listing.clone());
        Ok(true)
    }

    async fn touch_listing_recheck(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(listing) = inner.listings.get_mut(&id) {
            listing.last_checked = Some(at);
            listing.is_active = true;
        }
        Ok(())
    }

    async fn update_listing(&self, listing: &ScrapedListing) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .listings
            .insert(listing.id, listing.clone());
        Ok(())
    }

    async fn query_listings(
        &self,
        filter: &ListingFilter,
        page: PageRequest,
    ) -> Result<(Vec<ScrapedListing>, u64)> {
        let inner = self.inner.lock().unwrap();
        let mut matched: Vec<_> = inner
            .listings
            .values()
            .filter(|l| matches_admin_filter(l, filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at));
        Ok(paginate(matched, page))
    }

    async fn query_public_listings(
        &self,
        filter: &PublicFilter,
        page: PageRequest,
    ) -> Result<(Vec<ScrapedListing>, u64)> {
        let inner = self.inner.lock().unwrap();
        let mut matched: Vec<_> = inner
            .listings
            .values()
            .filter(|l| matches_public_filter(l, filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at));
        Ok(paginate(matched, page))
    }

    async fn all_listings(&self) -> Result<Vec<ScrapedListing>> {
        Ok(self.inner.lock().unwrap().listings.values().cloned().collect())
    }

    async fn listing_status_counts(&self) -> Result<Vec<(AdminStatus, u64)>> {
        let inner = self.inner.lock().unwrap();
        let mut counts: HashMap<AdminStatus, u64> = HashMap::new();
        for l in inner.listings.values() {
            *counts.entry(l.admin_status).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn set_status_by_ids(
        &self,
        ids: &[Uuid],
        status: AdminStatus,
        reviewed_by: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut affected = 0;
        for id in ids {
            if let Some(listing) = inner.listings.get_mut(id) {
                listing.admin_status = status;
                if let Some(reviewer) = reviewed_by {
                    listing.reviewed_by = Some(reviewer);
                    listing.reviewed_at = Some(at);
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn set_status_by_source(
        &self,
        source_id: Uuid,
        status: AdminStatus,
        reviewed_by: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut affected = 0;
        for listing in inner.listings.values_mut() {
            if listing.source_id == source_id {
                listing.admin_status = status;
                if let Some(reviewer) = reviewed_by {
                    listing.reviewed_by = Some(reviewer);
                    listing.reviewed_at = Some(at);
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete_listings_by_ids(&self, ids: &[Uuid]) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut deleted = 0;
        for id in ids {
            if inner.listings.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn delete_listings_by_source(&self, source_id: Uuid) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.listings.len();
        inner.listings.retain(|_, l| l.source_id != source_id);
        Ok((before - inner.listings.len()) as u64)
    }

    async fn increment_views(&self, ids: &[Uuid]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for id in ids {
            if let Some(listing) = inner.listings.get_mut(id) {
                listing.views += 1;
            }
        }
        Ok(())
    }

    async fn increment_click_through(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(listing) = inner.listings.get_mut(&id) {
            listing.click_throughs += 1;
        }
        Ok(())
    }

    async fn expire_due_listings(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut swept = 0;
        for listing in inner.listings.values_mut() {
            if listing.expires_at <= now && listing.admin_status != AdminStatus::Expired {
                listing.admin_status = AdminStatus::Expired;
                swept += 1;
            }
        }
        Ok(swept)
    }

    async fn approved_local_listings(&self) -> Result<Vec<LocalListing>> {
        Ok(self.inner.lock().unwrap().locals.clone())
    }
}

// ---------------------------------------------------------------------------
// MockRunner
// ---------------------------------------------------------------------------

/// Scripted runner: returns a fixed batch, or fails outright. Records
/// every request it receives for assertion.
#[derive(Default)]
pub struct MockRunner {
    batch: Mutex<ScrapeBatch>,
    fail: AtomicBool,
    requests: Mutex<Vec<ScrapeRequest>>,
}

impl MockRunner {
    pub fn returning(batch: ScrapeBatch) -> Self {
        Self {
            batch: Mutex::new(batch),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        let runner = Self::default();
        runner.fail.store(true, Ordering::SeqCst);
        runner
    }

    pub fn requests(&self) -> Vec<ScrapeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScraperRunner for MockRunner {
    async fn run(&self, request: &ScrapeRequest) -> Result<ScrapeBatch> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("runner unavailable"));
        }
        Ok(self.batch.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// MockEnricher
// ---------------------------------------------------------------------------

/// Returns a canned analysis (or errors), counting invocations.
#[derive(Default)]
pub struct MockEnricher {
    analysis: Mutex<AiAnalysis>,
    fail: AtomicBool,
    calls: AtomicUsize,
    narrative: Mutex<Option<String>>,
}

impl MockEnricher {
    pub fn returning(analysis: AiAnalysis) -> Self {
        Self {
            analysis: Mutex::new(analysis),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        let enricher = Self::default();
        enricher.fail.store(true, Ordering::SeqCst);
        enricher
    }

    pub fn with_narrative(self, narrative: impl Into<String>) -> Self {
        *self.narrative.lock().unwrap() = Some(narrative.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Enricher for MockEnricher {
    async fn analyze(&self, listing: &ScrapedListing, _local: &LocalStats) -> Result<AiAnalysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("analyzer unavailable"));
        }
        let mut analysis = self.analysis.lock().unwrap().clone();
        if analysis.data_completeness == 0 {
            analysis.data_completeness = listing.calculate_completeness();
        }
        analysis.analyzed_at = Some(Utc::now());
        Ok(analysis)
    }

    async fn narrate_market_report(&self, _breakdowns: &serde_json::Value) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("analyzer unavailable"));
        }
        self.narrative
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("no narrative configured"))
    }
}
