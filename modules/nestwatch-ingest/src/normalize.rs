//! Normalization and deduplication of raw scraped listings.
//!
//! Identity is `source_url`. A raw record lands in exactly one of three
//! buckets: new (canonicalized, enriched, stored), updated (recheck
//! re-sighting of a known URL), or duplicate (known URL on a normal run).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;
use uuid::Uuid;

use nestwatch_common::error::{NestwatchError, Result};
use nestwatch_common::pii::detect_pii;
use nestwatch_common::types::{
    AdminStatus, Furnished, JobKind, Location, PropertyType, RawListing, ScrapedListing, Source,
};

use crate::enrich::{defaulted_analysis, local_stats};
use crate::traits::{Enricher, ScrapeStore};

/// Days until a stored listing is considered stale and swept to expired.
pub const DEFAULT_EXPIRE_DAYS: i64 = 30;

const SNIPPET_LEN: usize = 200;

/// First 200 characters of the description, for restricted public display.
pub fn snippet(description: &str) -> String {
    if description.chars().count() <= SNIPPET_LEN {
        return description.to_string();
    }
    let cut: String = description.chars().take(SNIPPET_LEN).collect();
    format!("{cut}...")
}

/// Total mapping from a raw record to the canonical shape. Missing
/// fields become zero/empty/Unknown; nothing here can fail except an
/// absent `source_url`, which has no identity to store under.
pub fn canonicalize(
    raw: &RawListing,
    source: &Source,
    now: DateTime<Utc>,
) -> Result<ScrapedListing> {
    if raw.source_url.is_empty() {
        return Err(NestwatchError::Ingestion(format!(
            "listing from {} has no source_url",
            source.slug
        )));
    }

    let title = raw.title.clone().unwrap_or_default();
    let description = raw.description.clone().unwrap_or_default();

    // Scrapers may pre-flag PII; scan here regardless so a lazy adapter
    // cannot leak contact details to the public surface.
    let mut pii_details = raw.pii_details.clone();
    if !raw.pii_detected {
        let found = detect_pii(&format!("{title} {description}"));
        pii_details.extend(found);
    }
    let pii_detected = raw.pii_detected || !pii_details.is_empty();

    Ok(ScrapedListing {
        id: Uuid::new_v4(),
        source_id: source.id,
        source_website: source.slug.clone(),
        source_url: raw.source_url.clone(),
        source_listing_id: raw.source_listing_id.clone(),
        description_snippet: snippet(&description),
        title,
        description,
        price: raw.price.unwrap_or(0).max(0),
        location: raw.location.clone().unwrap_or_else(|| Location {
            town: source.config.default_location.clone().unwrap_or_default(),
            ..Default::default()
        }),
        beds: raw.beds.unwrap_or(0),
        baths: raw.baths.unwrap_or(0),
        size_sqft: raw.size_sqft.unwrap_or(0),
        property_type: raw
            .property_type
            .as_deref()
            .map(PropertyType::from_str_loose)
            .unwrap_or_default(),
        furnished: raw
            .furnished
            .as_deref()
            .map(Furnished::from_str_loose)
            .unwrap_or_default(),
        images: raw.images.clone(),
        scraped_at: now,
        last_checked: None,
        is_active: true,
        expires_at: now + Duration::days(DEFAULT_EXPIRE_DAYS),
        pii_detected,
        pii_details,
        ai_analysis: Default::default(),
        admin_status: if pii_detected {
            AdminStatus::Flagged
        } else {
            AdminStatus::Pending
        },
        admin_notes: if pii_detected {
            "Auto-flagged: PII detected in listing text".to_string()
        } else {
            String::new()
        },
        assigned_to: None,
        reviewed_by: None,
        reviewed_at: None,
        show_full_description: false,
        show_images: true,
        views: 0,
        click_throughs: 0,
    })
}

/// Outcome of ingesting one raw record, for job stat counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    New { pii: bool },
    Updated,
    Duplicate,
}

pub struct IngestEngine {
    store: Arc<dyn ScrapeStore>,
    enricher: Arc<dyn Enricher>,
}

impl IngestEngine {
    pub fn new(store: Arc<dyn ScrapeStore>, enricher: Arc<dyn Enricher>) -> Self {
        Self { store, enricher }
    }

    /// Classify and persist one raw listing.
    ///
    /// Known URLs are duplicates on full/incremental runs; recheck runs
    /// instead refresh `last_checked` and reactivate the record. New
    /// URLs are canonicalized, enriched, and inserted; a lost insert
    /// race is reported as a duplicate.
    pub async fn ingest_one(
        &self,
        raw: &RawListing,
        source: &Source,
        kind: JobKind,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome> {
        if raw.source_url.is_empty() {
            return Err(NestwatchError::Ingestion(format!(
                "listing from {} has no source_url",
                source.slug
            )));
        }

        if let Some(existing) = self
            .store
            .find_listing_by_source_url(&raw.source_url)
            .await?
        {
            if kind == JobKind::Recheck {
                self.store.touch_listing_recheck(existing.id, now).await?;
                return Ok(IngestOutcome::Updated);
            }
            return Ok(IngestOutcome::Duplicate);
        }

        let mut listing = canonicalize(raw, source, now)?;

        // Enrichment failure never blocks ingestion; the listing is
        // stored with a defaulted analysis and can be re-analyzed later.
        let local = local_stats(self.store.as_ref(), &listing.location.town).await?;
        listing.ai_analysis = match self.enricher.analyze(&listing, &local).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(url = %listing.source_url, error = %e, "enrichment failed, storing defaults");
                defaulted_analysis(&listing, now)
            }
        };

        let pii = listing.pii_detected;
        if self.store.insert_listing(&listing).await? {
            Ok(IngestOutcome::New { pii })
        } else {
            // Lost a concurrent insert race on source_url.
            Ok(IngestOutcome::Duplicate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestwatch_common::types::{Schedule, SourceConfig, SourceHealth, SourceStatus};

    fn source() -> Source {
        Source {
            id: Uuid::new_v4(),
            name: "Ikman".into(),
            slug: "ikman".into(),
            url: "https://ikman.example/rentals".into(),
            scraper_script: "ikman_scraper".into(),
            is_enabled: true,
            schedule: Schedule::default(),
            config: SourceConfig {
                default_location: Some("Kandy".into()),
                ..Default::default()
            },
            health: SourceHealth::default(),
            status: SourceStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn snippet_truncates_long_descriptions() {
        let short = "cozy annex";
        assert_eq!(snippet(short), short);

        let long = "x".repeat(450);
        let s = snippet(&long);
        assert_eq!(s.chars().count(), 203);
        assert!(s.ends_with("..."));
    }

    #[test]
    fn canonicalize_fills_defaults() {
        let raw = RawListing {
            source_url: "https://ikman.example/ad/1".into(),
            title: Some("2BR Annex".into()),
            property_type: Some("annexe".into()),
            ..Default::default()
        };
        let listing = canonicalize(&raw, &source(), Utc::now()).unwrap();
        assert_eq!(listing.price, 0);
        assert_eq!(listing.beds, 0);
        assert_eq!(listing.property_type, PropertyType::Annex);
        assert_eq!(listing.furnished, Furnished::Unknown);
        // Town falls back to the source's default location.
        assert_eq!(listing.location.town, "Kandy");
        assert_eq!(listing.admin_status, AdminStatus::Pending);
        assert!(listing.is_active);
    }

    #[test]
    fn canonicalize_rejects_missing_url() {
        let raw = RawListing::default();
        assert!(canonicalize(&raw, &source(), Utc::now()).is_err());
    }

    #[test]
    fn pii_in_description_flags_listing() {
        let raw = RawListing {
            source_url: "https://ikman.example/ad/2".into(),
            description: Some("Call me on 0771234567 anytime".into()),
            ..Default::default()
        };
        let listing = canonicalize(&raw, &source(), Utc::now()).unwrap();
        assert!(listing.pii_detected);
        assert!(!listing.pii_details.is_empty());
        assert_eq!(listing.admin_status, AdminStatus::Flagged);
    }

    #[test]
    fn negative_price_clamps_to_zero() {
        let raw = RawListing {
            source_url: "https://ikman.example/ad/3".into(),
            price: Some(-500),
            ..Default::default()
        };
        let listing = canonicalize(&raw, &source(), Utc::now()).unwrap();
        assert_eq!(listing.price, 0);
    }

    #[test]
    fn expiry_is_thirty_days_out() {
        let now = Utc::now();
        let raw = RawListing {
            source_url: "https://ikman.example/ad/4".into(),
            ..Default::default()
        };
        let listing = canonicalize(&raw, &source(), now).unwrap();
        assert_eq!(listing.expires_at, now + Duration::days(30));
    }
}
