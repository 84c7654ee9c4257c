//! Public exposure gateway: the only read path for unauthenticated
//! consumers. Approved, active listings only, with moderation internals
//! stripped and descriptions restricted per exposure policy.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use nestwatch_common::config::ExposureRules;
use nestwatch_common::error::{NestwatchError, Result};
use nestwatch_common::types::{
    AiAnalysis, Furnished, Location, PageRequest, PropertyType, PublicFilter, ScrapedListing,
};

use crate::traits::ScrapeStore;

/// Public projection of a listing. Moderation fields (notes, assignee,
/// reviewer, PII findings) never appear here.
#[derive(Debug, Clone, Serialize)]
pub struct PublicListing {
    pub id: Uuid,
    pub source_website: String,
    /// Always present: consumers must be able to reach the original ad.
    pub source_url: String,
    pub title: String,
    pub description: String,
    pub price: i64,
    pub location: Location,
    pub beds: u32,
    pub baths: u32,
    pub size_sqft: u32,
    pub property_type: PropertyType,
    pub furnished: Furnished,
    pub images: Vec<String>,
    pub scraped_at: DateTime<Utc>,
    pub ai_analysis: AiAnalysis,
    pub views: u64,
}

impl PublicListing {
    fn project(listing: ScrapedListing, rules: &ExposureRules) -> Self {
        let description =
            if listing.show_full_description || !rules.show_description_snippet_only {
                listing.description
            } else {
                listing.description_snippet
            };
        let images = if listing.show_images && rules.show_images {
            listing.images
        } else {
            Vec::new()
        };

        Self {
            id: listing.id,
            source_website: listing.source_website,
            source_url: listing.source_url,
            title: listing.title,
            description,
            price: listing.price,
            location: listing.location,
            beds: listing.beds,
            baths: listing.baths,
            size_sqft: listing.size_sqft,
            property_type: listing.property_type,
            furnished: listing.furnished,
            images,
            scraped_at: listing.scraped_at,
            ai_analysis: listing.ai_analysis,
            views: listing.views,
        }
    }
}

pub struct PublicGateway {
    store: Arc<dyn ScrapeStore>,
    rules: ExposureRules,
}

impl PublicGateway {
    pub fn new(store: Arc<dyn ScrapeStore>, rules: ExposureRules) -> Self {
        Self { store, rules }
    }

    /// Page of approved, active listings. Serving a page counts one
    /// view per listing, batched into a single store call.
    pub async fn list(
        &self,
        filter: &PublicFilter,
        page: PageRequest,
    ) -> Result<(Vec<PublicListing>, u64)> {
        let (listings, total) = self.store.query_public_listings(filter, page).await?;

        let ids: Vec<Uuid> = listings.iter().map(|l| l.id).collect();
        if !ids.is_empty() {
            self.store.increment_views(&ids).await?;
        }

        let projected = listings
            .into_iter()
            .map(|l| PublicListing::project(l, &self.rules))
            .collect();
        Ok((projected, total))
    }

    /// Record a click-through to the original ad.
    pub async fn track_click_through(&self, id: Uuid) -> Result<()> {
        self.store
            .get_listing(id)
            .await?
            .ok_or_else(|| NestwatchError::NotFound("listing", id.to_string()))?;
        self.store.increment_click_through(id).await?;
        Ok(())
    }

    pub fn exposure_rules(&self) -> &ExposureRules {
        &self.rules
    }
}
