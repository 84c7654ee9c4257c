use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Source ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Active,
    Paused,
    Disabled,
    Blocked,
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceStatus::Active => write!(f, "active"),
            SourceStatus::Paused => write!(f, "paused"),
            SourceStatus::Disabled => write!(f, "disabled"),
            SourceStatus::Blocked => write!(f, "blocked"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    #[default]
    Daily,
    Weekly,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub enabled: bool,
    /// Cron expression, evaluated by an external scheduler.
    pub cron: String,
    pub kind: ScheduleKind,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: "0 2 * * *".to_string(),
            kind: ScheduleKind::Daily,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub max_pages: u32,
    /// Milliseconds between requests, honored by the scraper adapter.
    pub rate_limit_ms: u64,
    pub default_location: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            max_pages: 3,
            rate_limit_ms: 2000,
            default_location: None,
        }
    }
}

/// Health statistics, written only by the job orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceHealth {
    pub last_scrape_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub success_rate: Option<f64>,
    pub is_blocked: bool,
    pub total_scraped: u64,
}

/// A configured external listings website being scraped.
///
/// `slug` is the stable join key referenced by jobs and is never
/// reused or mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub url: String,
    /// Identifier of the per-source scraper adapter (e.g. "ikman_scraper").
    pub scraper_script: String,
    pub is_enabled: bool,
    pub schedule: Schedule,
    pub config: SourceConfig,
    pub health: SourceHealth,
    pub status: SourceStatus,
    pub created_at: DateTime<Utc>,
}

// --- Job ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Full,
    #[default]
    Incremental,
    /// Re-sighting pass: refreshes `last_checked`/`is_active` on known
    /// listings instead of counting them as duplicates.
    Recheck,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Full => write!(f, "full"),
            JobKind::Incremental => write!(f, "incremental"),
            JobKind::Recheck => write!(f, "recheck"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Partial,
    Stopped,
}

impl JobStatus {
    /// Terminal jobs are immutable; status transitions only move forward.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Partial => write!(f, "partial"),
            JobStatus::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub total_scraped: u64,
    pub new_listings: u64,
    pub updated: u64,
    pub duplicates_skipped: u64,
    pub pii_auto_flagged: u64,
}

impl std::fmt::Display for JobStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "scraped {} / new {} / updated {} / dup {} / pii {}",
            self.total_scraped,
            self.new_listings,
            self.updated,
            self.duplicates_skipped,
            self.pii_auto_flagged
        )
    }
}

/// Per-source error captured during a run. Carried verbatim into the
/// job record; one source failing never aborts the others.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub source: String,
    pub message: String,
}

/// Request-level filters; these override per-source config defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFilters {
    pub location: Option<String>,
    pub price_min: Option<i64>,
    pub price_max: Option<i64>,
    pub max_pages: Option<u32>,
}

/// One execution of scraping across one or more sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub triggered_by: Uuid,
    /// Slugs of the participating sources.
    pub sources: Vec<String>,
    pub kind: JobKind,
    pub status: JobStatus,
    pub stopped_by: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stats: JobStats,
    pub error_details: Vec<JobError>,
    pub filters: JobFilters,
}

// --- Scraped listing ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    House,
    BoardingRoom,
    Annex,
    Apartment,
    Other,
    #[default]
    Unknown,
}

impl PropertyType {
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().replace(['-', '_'], " ").trim() {
            "house" => Self::House,
            "boarding room" | "room" | "boarding" => Self::BoardingRoom,
            "annex" | "annexe" => Self::Annex,
            "apartment" | "flat" => Self::Apartment,
            "other" => Self::Other,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyType::House => write!(f, "House"),
            PropertyType::BoardingRoom => write!(f, "Boarding Room"),
            PropertyType::Annex => write!(f, "Annex"),
            PropertyType::Apartment => write!(f, "Apartment"),
            PropertyType::Other => write!(f, "Other"),
            PropertyType::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Furnished {
    Furnished,
    Unfurnished,
    SemiFurnished,
    #[default]
    Unknown,
}

impl Furnished {
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().replace(['-', '_'], " ").trim() {
            "furnished" | "fully furnished" => Self::Furnished,
            "unfurnished" | "not furnished" => Self::Unfurnished,
            "semi furnished" | "semi" | "partially furnished" => Self::SemiFurnished,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub town: String,
    #[serde(default)]
    pub district: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub raw_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriceRating {
    BelowMarket,
    Fair,
    AboveMarket,
    #[default]
    Unknown,
}

impl PriceRating {
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().replace(['-', '_'], " ").trim() {
            "below market" | "below" => Self::BelowMarket,
            "fair" => Self::Fair,
            "above market" | "above" => Self::AboveMarket,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarketTrend {
    Rising,
    Stable,
    Declining,
    #[default]
    Unknown,
}

impl MarketTrend {
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().trim() {
            "rising" | "up" => Self::Rising,
            "stable" | "flat" => Self::Stable,
            "declining" | "down" => Self::Declining,
            _ => Self::Unknown,
        }
    }
}

/// AI-derived scoring attached to a listing. All fields default to
/// zero/Unknown when enrichment fails; the listing is stored regardless.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub estimated_fair_price: i64,
    pub price_rating: PriceRating,
    pub quality_score: u32,
    pub scam_risk_score: u32,
    pub location_insights: String,
    pub comparison_to_local: String,
    pub tags: Vec<String>,
    pub market_trend: MarketTrend,
    pub data_completeness: u32,
    pub analyzed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdminStatus {
    #[default]
    Pending,
    Approved,
    Hidden,
    Flagged,
    Expired,
}

impl AdminStatus {
    /// Whether an explicit admin transition to `target` is legal.
    ///
    /// Approved/Hidden/Flagged interchange freely; Expired is reached
    /// only by the time-based sweep, never by direct admin action.
    pub fn can_transition_to(&self, target: AdminStatus) -> bool {
        if target == AdminStatus::Expired {
            return false;
        }
        matches!(
            target,
            AdminStatus::Approved | AdminStatus::Hidden | AdminStatus::Flagged
        )
    }
}

impl std::fmt::Display for AdminStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdminStatus::Pending => write!(f, "pending"),
            AdminStatus::Approved => write!(f, "approved"),
            AdminStatus::Hidden => write!(f, "hidden"),
            AdminStatus::Flagged => write!(f, "flagged"),
            AdminStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Canonical, deduplicated external listing record.
///
/// Identity is `source_url`: at most one record per source URL ever
/// exists, enforced by a unique index at the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedListing {
    pub id: Uuid,
    pub source_id: Uuid,
    pub source_website: String,
    pub source_url: String,
    /// The source site's own listing identifier, when it exposes one.
    pub source_listing_id: Option<String>,

    pub title: String,
    pub description: String,
    pub description_snippet: String,
    pub price: i64,
    pub location: Location,
    pub beds: u32,
    pub baths: u32,
    pub size_sqft: u32,
    pub property_type: PropertyType,
    pub furnished: Furnished,
    pub images: Vec<String>,

    pub scraped_at: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,

    pub pii_detected: bool,
    pub pii_details: Vec<String>,

    pub ai_analysis: AiAnalysis,

    pub admin_status: AdminStatus,
    pub admin_notes: String,
    pub assigned_to: Option<Uuid>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,

    pub show_full_description: bool,
    pub show_images: bool,

    pub views: u64,
    pub click_throughs: u64,
}

impl ScrapedListing {
    /// Percentage of the canonical property fields that carry real data
    /// (not zero, empty, or Unknown).
    pub fn calculate_completeness(&self) -> u32 {
        let checks = [
            !self.title.is_empty(),
            !self.description.is_empty(),
            self.price > 0,
            !self.location.town.is_empty(),
            self.beds > 0,
            self.baths > 0,
            self.size_sqft > 0,
            self.property_type != PropertyType::Unknown,
            self.furnished != Furnished::Unknown,
        ];
        let filled = checks.iter().filter(|c| **c).count();
        (filled as f64 / checks.len() as f64 * 100.0).round() as u32
    }
}

// --- Scraper runner wire types ---

/// Effective per-source scrape configuration after request-level filters
/// are merged over source defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    pub max_pages: u32,
    pub rate_limit_ms: u64,
    pub location: String,
    pub price_min: i64,
    pub price_max: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceScrapeRequest {
    pub slug: String,
    pub script: String,
    pub config: ScrapeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub sources: Vec<SourceScrapeRequest>,
    pub kind: JobKind,
}

/// Unnormalized output of a per-source scrape. Any field may be absent;
/// normalization is total over this shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawListing {
    /// Which source produced this listing. Tagged by the runner.
    #[serde(default)]
    pub source_slug: String,
    #[serde(default)]
    pub source_url: String,
    pub source_listing_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub location: Option<Location>,
    pub beds: Option<u32>,
    pub baths: Option<u32>,
    pub size_sqft: Option<u32>,
    pub property_type: Option<String>,
    pub furnished: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub pii_detected: bool,
    #[serde(default)]
    pub pii_details: Vec<String>,
}

/// Combined result of one batched runner invocation.
#[derive(Debug, Clone, Default)]
pub struct ScrapeBatch {
    pub listings: Vec<RawListing>,
    pub errors: Vec<JobError>,
}

// --- Local inventory comparison ---

/// The platform's own listing, reduced to the fields the comparison
/// aggregations need.
#[derive(Debug, Clone)]
pub struct LocalListing {
    pub town: String,
    pub price: i64,
    pub beds: u32,
    pub baths: u32,
}

/// Comparison baseline handed to the enrichment service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalStats {
    pub avg_price: i64,
    pub total_listings: u64,
    pub avg_beds: u32,
    pub avg_baths: u32,
}

impl LocalStats {
    /// Neutral baseline used when no local inventory exists for a town.
    pub fn baseline() -> Self {
        Self {
            avg_price: 0,
            total_listings: 0,
            avg_beds: 2,
            avg_baths: 1,
        }
    }
}

// --- Query filters ---

/// Admin-surface listing filter. All fields optional and combinable.
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    pub status: Option<AdminStatus>,
    pub source_website: Option<String>,
    pub town: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub min_quality: Option<u32>,
    pub max_scam_risk: Option<u32>,
    pub search: Option<String>,
}

/// Public-surface filter; status/active constraints are fixed by the
/// gateway, not expressed here.
#[derive(Debug, Clone, Default)]
pub struct PublicFilter {
    pub town: Option<String>,
    pub beds: Option<u32>,
    pub property_type: Option<PropertyType>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u64,
    pub per_page: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1) * self.per_page
    }
}
