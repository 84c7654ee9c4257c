//! AI enrichment: local comparison stats and the analyzer HTTP client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use nestwatch_common::types::{
    AiAnalysis, LocalStats, MarketTrend, PriceRating, ScrapedListing,
};
use nestwatch_common::Config;

use crate::traits::{Enricher, ScrapeStore};

/// Comparison baseline for a town, averaged over the platform's own
/// approved inventory. Case-insensitive containment match; no matching
/// inventory (or no town) yields the neutral baseline.
pub async fn local_stats(store: &dyn ScrapeStore, town: &str) -> Result<LocalStats> {
    if town.is_empty() {
        return Ok(LocalStats::baseline());
    }

    let needle = town.to_lowercase();
    let locals: Vec<_> = store
        .approved_local_listings()
        .await?
        .into_iter()
        .filter(|l| l.town.to_lowercase().contains(&needle))
        .collect();

    if locals.is_empty() {
        return Ok(LocalStats::baseline());
    }

    let n = locals.len() as f64;
    let avg_price = (locals.iter().map(|l| l.price as f64).sum::<f64>() / n).round() as i64;
    let avg_beds = (locals.iter().map(|l| l.beds as f64).sum::<f64>() / n).round() as u32;
    let avg_baths = (locals.iter().map(|l| l.baths as f64).sum::<f64>() / n).round() as u32;

    Ok(LocalStats {
        avg_price,
        total_listings: locals.len() as u64,
        avg_beds,
        avg_baths,
    })
}

/// Analysis stored when enrichment is unavailable: zero scores, Unknown
/// ratings, and a completeness figure computed locally so moderators can
/// still triage by data quality.
pub fn defaulted_analysis(listing: &ScrapedListing, now: DateTime<Utc>) -> AiAnalysis {
    AiAnalysis {
        data_completeness: listing.calculate_completeness(),
        analyzed_at: Some(now),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// HTTP client for the external analyzer service
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    #[serde(default)]
    estimated_fair_price: i64,
    #[serde(default)]
    price_rating: String,
    #[serde(default)]
    quality_score: u32,
    #[serde(default)]
    scam_risk_score: u32,
    #[serde(default)]
    location_insights: String,
    #[serde(default)]
    comparison_to_local: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    market_trend: String,
    #[serde(default)]
    data_completeness: u32,
}

#[derive(Debug, Deserialize)]
struct ReportResponse {
    narrative: String,
}

pub struct HttpEnricher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEnricher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.analyzer_timeout_secs))
            .build()
            .context("building analyzer http client")?;
        Ok(Self {
            client,
            base_url: config.analyzer_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Enricher for HttpEnricher {
    async fn analyze(&self, listing: &ScrapedListing, local: &LocalStats) -> Result<AiAnalysis> {
        let body = serde_json::json!({
            "listing": {
                "title": listing.title,
                "description": listing.description,
                "price": listing.price,
                "town": listing.location.town,
                "beds": listing.beds,
                "baths": listing.baths,
                "sizeSqft": listing.size_sqft,
                "propertyType": listing.property_type.to_string(),
                "furnished": listing.furnished,
                "sourceWebsite": listing.source_website,
            },
            "localStats": {
                "avgPrice": local.avg_price,
                "totalListings": local.total_listings,
                "avgBeds": local.avg_beds,
                "avgBaths": local.avg_baths,
            },
        });

        debug!(url = %listing.source_url, "requesting analysis");
        let response: AnalyzeResponse = self
            .client
            .post(format!("{}/analyze", self.base_url))
            .json(&body)
            .send()
            .await
            .context("analyzer request failed")?
            .error_for_status()
            .context("analyzer returned error status")?
            .json()
            .await
            .context("decoding analyzer response")?;

        Ok(AiAnalysis {
            estimated_fair_price: response.estimated_fair_price,
            price_rating: PriceRating::from_str_loose(&response.price_rating),
            quality_score: response.quality_score.min(100),
            scam_risk_score: response.scam_risk_score.min(100),
            location_insights: response.location_insights,
            comparison_to_local: response.comparison_to_local,
            tags: response.tags,
            market_trend: MarketTrend::from_str_loose(&response.market_trend),
            data_completeness: if response.data_completeness > 0 {
                response.data_completeness.min(100)
            } else {
                listing.calculate_completeness()
            },
            analyzed_at: Some(Utc::now()),
        })
    }

    async fn narrate_market_report(&self, breakdowns: &serde_json::Value) -> Result<String> {
        let response: ReportResponse = self
            .client
            .post(format!("{}/market-report", self.base_url))
            .json(breakdowns)
            .send()
            .await
            .context("market report request failed")?
            .error_for_status()
            .context("market report returned error status")?
            .json()
            .await
            .context("decoding market report response")?;
        Ok(response.narrative)
    }
}
