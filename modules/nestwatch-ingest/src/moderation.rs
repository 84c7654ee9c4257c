//! Moderation queue: admin review of scraped listings.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use nestwatch_common::error::{NestwatchError, Result};
use nestwatch_common::types::{
    AdminStatus, Furnished, ListingFilter, Location, PageRequest, PropertyType, ScrapedListing,
};

use crate::enrich::local_stats;
use crate::traits::{Enricher, ScrapeStore};

/// Admin edits to a listing's property fields. Identity and provenance
/// fields (source_url, source_website, scraped_at) are not editable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub location: Option<Location>,
    pub beds: Option<u32>,
    pub baths: Option<u32>,
    pub size_sqft: Option<u32>,
    pub property_type: Option<PropertyType>,
    pub furnished: Option<Furnished>,
    pub admin_notes: Option<String>,
    pub show_full_description: Option<bool>,
    pub show_images: Option<bool>,
}

#[derive(Debug, Clone)]
pub enum BulkSelector {
    Ids(Vec<Uuid>),
    Source(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Approve,
    Hide,
    Flag,
    Delete,
}

/// Page of the review queue plus overall status tallies for the
/// dashboard counters.
#[derive(Debug, Clone)]
pub struct QueuePage {
    pub listings: Vec<ScrapedListing>,
    pub total: u64,
    pub status_counts: Vec<(AdminStatus, u64)>,
}

pub struct ModerationQueue {
    store: Arc<dyn ScrapeStore>,
    enricher: Arc<dyn Enricher>,
}

impl ModerationQueue {
    pub fn new(store: Arc<dyn ScrapeStore>, enricher: Arc<dyn Enricher>) -> Self {
        Self { store, enricher }
    }

    pub async fn list(&self, filter: &ListingFilter, page: PageRequest) -> Result<QueuePage> {
        let (listings, total) = self.store.query_listings(filter, page).await?;
        let status_counts = self.store.listing_status_counts().await?;
        Ok(QueuePage {
            listings,
            total,
            status_counts,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<ScrapedListing> {
        self.store
            .get_listing(id)
            .await?
            .ok_or_else(|| NestwatchError::NotFound("listing", id.to_string()))
    }

    pub async fn edit(&self, id: Uuid, patch: ListingPatch) -> Result<ScrapedListing> {
        let mut listing = self.get(id).await?;

        if let Some(title) = patch.title {
            listing.title = title;
        }
        if let Some(description) = patch.description {
            listing.description_snippet = crate::normalize::snippet(&description);
            listing.description = description;
        }
        if let Some(price) = patch.price {
            listing.price = price.max(0);
        }
        if let Some(location) = patch.location {
            listing.location = location;
        }
        if let Some(beds) = patch.beds {
            listing.beds = beds;
        }
        if let Some(baths) = patch.baths {
            listing.baths = baths;
        }
        if let Some(size_sqft) = patch.size_sqft {
            listing.size_sqft = size_sqft;
        }
        if let Some(property_type) = patch.property_type {
            listing.property_type = property_type;
        }
        if let Some(furnished) = patch.furnished {
            listing.furnished = furnished;
        }
        if let Some(notes) = patch.admin_notes {
            listing.admin_notes = notes;
        }
        if let Some(show) = patch.show_full_description {
            listing.show_full_description = show;
        }
        if let Some(show) = patch.show_images {
            listing.show_images = show;
        }

        self.store.update_listing(&listing).await?;
        Ok(listing)
    }

    /// Explicit admin transition, checked against the state machine.
    pub async fn set_status(
        &self,
        id: Uuid,
        status: AdminStatus,
        reviewed_by: Uuid,
        notes: Option<String>,
    ) -> Result<ScrapedListing> {
        let mut listing = self.get(id).await?;

        if !listing.admin_status.can_transition_to(status) {
            return Err(NestwatchError::Validation(format!(
                "cannot transition listing from {} to {}",
                listing.admin_status, status
            )));
        }

        listing.admin_status = status;
        listing.reviewed_by = Some(reviewed_by);
        listing.reviewed_at = Some(Utc::now());
        if let Some(notes) = notes {
            listing.admin_notes = notes;
        }

        self.store.update_listing(&listing).await?;
        info!(listing_id = %id, status = %status, "listing status changed");
        Ok(listing)
    }

    pub async fn approve(&self, id: Uuid, reviewed_by: Uuid) -> Result<ScrapedListing> {
        self.set_status(id, AdminStatus::Approved, reviewed_by, None)
            .await
    }

    pub async fn hide(&self, id: Uuid, reviewed_by: Uuid) -> Result<ScrapedListing> {
        self.set_status(id, AdminStatus::Hidden, reviewed_by, None)
            .await
    }

    pub async fn flag(
        &self,
        id: Uuid,
        reviewed_by: Uuid,
        notes: Option<String>,
    ) -> Result<ScrapedListing> {
        self.set_status(id, AdminStatus::Flagged, reviewed_by, notes)
            .await
    }

    pub async fn assign(&self, id: Uuid, assignee: Option<Uuid>) -> Result<ScrapedListing> {
        let mut listing = self.get(id).await?;
        listing.assigned_to = assignee;
        self.store.update_listing(&listing).await?;
        Ok(listing)
    }

    /// Re-run enrichment on demand. Unlike pipeline ingestion this is a
    /// direct admin action, so analyzer failures surface to the caller.
    pub async fn reanalyze(&self, id: Uuid) -> Result<ScrapedListing> {
        let mut listing = self.get(id).await?;
        let local = local_stats(self.store.as_ref(), &listing.location.town).await?;
        listing.ai_analysis = self
            .enricher
            .analyze(&listing, &local)
            .await
            .map_err(NestwatchError::Anyhow)?;
        self.store.update_listing(&listing).await?;
        Ok(listing)
    }

    /// Bulk moderation. Status actions report rows matched; delete
    /// reports rows actually removed. Bulk status changes skip the
    /// per-listing transition check — they are the sweep tool for
    /// cleaning up after a bad source.
    pub async fn bulk(
        &self,
        action: BulkAction,
        selector: BulkSelector,
        reviewed_by: Uuid,
    ) -> Result<u64> {
        let now = Utc::now();

        let affected = match (action, selector) {
            (BulkAction::Delete, BulkSelector::Ids(ids)) => {
                self.store.delete_listings_by_ids(&ids).await?
            }
            (BulkAction::Delete, BulkSelector::Source(source_id)) => {
                self.store.delete_listings_by_source(source_id).await?
            }
            (action, selector) => {
                let status = match action {
                    BulkAction::Approve => AdminStatus::Approved,
                    BulkAction::Hide => AdminStatus::Hidden,
                    BulkAction::Flag => AdminStatus::Flagged,
                    BulkAction::Delete => unreachable!(),
                };
                match selector {
                    BulkSelector::Ids(ids) => {
                        self.store
                            .set_status_by_ids(&ids, status, Some(reviewed_by), now)
                            .await?
                    }
                    BulkSelector::Source(source_id) => {
                        self.store
                            .set_status_by_source(source_id, status, Some(reviewed_by), now)
                            .await?
                    }
                }
            }
        };

        info!(action = ?action, affected, "bulk moderation applied");
        Ok(affected)
    }

    /// Time-based sweep: everything past its expiry becomes Expired,
    /// whatever state it was in. Returns the number swept.
    pub async fn expire_due(&self) -> Result<u64> {
        let swept = self.store.expire_due_listings(Utc::now()).await?;
        if swept > 0 {
            info!(swept, "expired stale listings");
        }
        Ok(swept)
    }
}
