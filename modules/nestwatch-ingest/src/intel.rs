//! Market intelligence: deterministic aggregations over the scraped
//! corpus, with an optional AI-written narrative on top.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use nestwatch_common::error::Result;
use nestwatch_common::types::{AdminStatus, LocalListing, ScrapedListing};

use crate::traits::{Enricher, ScrapeStore};

const TOP_AREAS: usize = 20;

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusBreakdown {
    pub pending: u64,
    pub approved: u64,
    pub hidden: u64,
    pub flagged: u64,
    pub expired: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceBreakdown {
    pub source_website: String,
    pub count: u64,
    pub avg_price: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TownBreakdown {
    pub town: String,
    pub count: u64,
    pub avg_price: i64,
}

/// Scraped-vs-local price gap for one town, sorted by gap magnitude.
#[derive(Debug, Clone, Serialize)]
pub struct PriceComparison {
    pub town: String,
    pub scraped_avg: i64,
    pub local_avg: i64,
    pub scraped_count: u64,
    pub diff_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HotArea {
    pub town: String,
    pub listings: u64,
    pub total_views: u64,
}

/// Field-coverage percentages for one source's listings.
#[derive(Debug, Clone, Serialize)]
pub struct SourceQuality {
    pub source_website: String,
    pub total: u64,
    pub with_price_percent: f64,
    pub with_town_percent: f64,
    pub with_beds_percent: f64,
    pub with_baths_percent: f64,
    pub with_images_percent: f64,
    pub avg_quality_score: f64,
    pub avg_completeness: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    pub total_views: u64,
    pub total_click_throughs: u64,
    pub click_rate_percent: f64,
}

pub fn status_breakdown(listings: &[ScrapedListing]) -> StatusBreakdown {
    let mut b = StatusBreakdown::default();
    for l in listings {
        match l.admin_status {
            AdminStatus::Pending => b.pending += 1,
            AdminStatus::Approved => b.approved += 1,
            AdminStatus::Hidden => b.hidden += 1,
            AdminStatus::Flagged => b.flagged += 1,
            AdminStatus::Expired => b.expired += 1,
        }
    }
    b
}

pub fn by_source(listings: &[ScrapedListing]) -> Vec<SourceBreakdown> {
    let mut groups: HashMap<&str, (u64, i64)> = HashMap::new();
    for l in listings {
        let entry = groups.entry(l.source_website.as_str()).or_default();
        entry.0 += 1;
        entry.1 += l.price;
    }
    let mut out: Vec<_> = groups
        .into_iter()
        .map(|(source, (count, total))| SourceBreakdown {
            source_website: source.to_string(),
            count,
            avg_price: if count > 0 { total / count as i64 } else { 0 },
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out
}

pub fn by_town(listings: &[ScrapedListing]) -> Vec<TownBreakdown> {
    let mut groups: HashMap<&str, (u64, i64)> = HashMap::new();
    for l in listings {
        if l.location.town.is_empty() {
            continue;
        }
        let entry = groups.entry(l.location.town.as_str()).or_default();
        entry.0 += 1;
        entry.1 += l.price;
    }
    let mut out: Vec<_> = groups
        .into_iter()
        .map(|(town, (count, total))| TownBreakdown {
            town: town.to_string(),
            count,
            avg_price: if count > 0 { total / count as i64 } else { 0 },
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out.truncate(TOP_AREAS);
    out
}

/// Average scraped price per town against the local inventory average.
/// Only priced, non-hidden scraped listings count. A town with no local
/// inventory still appears, with a zero local average and zero gap.
pub fn price_comparison(
    listings: &[ScrapedListing],
    locals: &[LocalListing],
) -> Vec<PriceComparison> {
    let mut local_groups: HashMap<String, (u64, i64)> = HashMap::new();
    for l in locals {
        if l.town.is_empty() || l.price <= 0 {
            continue;
        }
        let entry = local_groups.entry(l.town.to_lowercase()).or_default();
        entry.0 += 1;
        entry.1 += l.price;
    }

    let mut scraped_groups: HashMap<String, (String, u64, i64)> = HashMap::new();
    for l in listings {
        if l.price <= 0 || l.location.town.is_empty() || l.admin_status == AdminStatus::Hidden {
            continue;
        }
        let entry = scraped_groups
            .entry(l.location.town.to_lowercase())
            .or_insert_with(|| (l.location.town.clone(), 0, 0));
        entry.1 += 1;
        entry.2 += l.price;
    }

    let mut out: Vec<_> = scraped_groups
        .into_iter()
        .map(|(key, (town, count, total))| {
            let scraped_avg = total / count as i64;
            let local_avg = local_groups
                .get(&key)
                .map(|(n, sum)| sum / *n as i64)
                .unwrap_or(0);
            let diff_percent = if local_avg > 0 {
                (scraped_avg - local_avg) as f64 / local_avg as f64 * 100.0
            } else {
                0.0
            };
            PriceComparison {
                town,
                scraped_avg,
                local_avg,
                scraped_count: count,
                diff_percent,
            }
        })
        .collect();
    out.sort_by(|a, b| {
        b.diff_percent
            .abs()
            .partial_cmp(&a.diff_percent.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    out
}

/// Towns ranked by accumulated public views.
pub fn hot_areas(listings: &[ScrapedListing]) -> Vec<HotArea> {
    let mut groups: HashMap<&str, (u64, u64)> = HashMap::new();
    for l in listings {
        if l.location.town.is_empty() {
            continue;
        }
        let entry = groups.entry(l.location.town.as_str()).or_default();
        entry.0 += 1;
        entry.1 += l.views;
    }
    let mut out: Vec<_> = groups
        .into_iter()
        .map(|(town, (listings, total_views))| HotArea {
            town: town.to_string(),
            listings,
            total_views,
        })
        .collect();
    out.sort_by(|a, b| b.total_views.cmp(&a.total_views));
    out.truncate(TOP_AREAS);
    out
}

pub fn data_quality(listings: &[ScrapedListing]) -> Vec<SourceQuality> {
    let mut groups: HashMap<&str, Vec<&ScrapedListing>> = HashMap::new();
    for l in listings {
        groups.entry(l.source_website.as_str()).or_default().push(l);
    }

    let mut out: Vec<_> = groups
        .into_iter()
        .map(|(source, group)| {
            let total = group.len() as u64;
            let pct = |n: usize| n as f64 / total as f64 * 100.0;
            SourceQuality {
                source_website: source.to_string(),
                total,
                with_price_percent: pct(group.iter().filter(|l| l.price > 0).count()),
                with_town_percent: pct(
                    group.iter().filter(|l| !l.location.town.is_empty()).count(),
                ),
                with_beds_percent: pct(group.iter().filter(|l| l.beds > 0).count()),
                with_baths_percent: pct(group.iter().filter(|l| l.baths > 0).count()),
                with_images_percent: pct(group.iter().filter(|l| !l.images.is_empty()).count()),
                avg_quality_score: group
                    .iter()
                    .map(|l| l.ai_analysis.quality_score as f64)
                    .sum::<f64>()
                    / total as f64,
                avg_completeness: group
                    .iter()
                    .map(|l| l.ai_analysis.data_completeness as f64)
                    .sum::<f64>()
                    / total as f64,
            }
        })
        .collect();
    out.sort_by(|a, b| b.total.cmp(&a.total));
    out
}

pub fn conversion_stats(listings: &[ScrapedListing]) -> ConversionStats {
    let total_views: u64 = listings.iter().map(|l| l.views).sum();
    let total_click_throughs: u64 = listings.iter().map(|l| l.click_throughs).sum();
    ConversionStats {
        total_views,
        total_click_throughs,
        click_rate_percent: if total_views > 0 {
            total_click_throughs as f64 / total_views as f64 * 100.0
        } else {
            0.0
        },
    }
}

// ---------------------------------------------------------------------------
// Service wrapper
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub total_listings: u64,
    pub new_today: u64,
    pub pii_flagged: u64,
    pub sources_active: u64,
    pub sources_blocked: u64,
    pub last_scrape_at: Option<chrono::DateTime<Utc>>,
    pub status: StatusBreakdown,
    pub by_source: Vec<SourceBreakdown>,
    pub by_town: Vec<TownBreakdown>,
    pub data_quality: Vec<SourceQuality>,
    pub conversion: ConversionStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketReport {
    pub generated_at: chrono::DateTime<Utc>,
    pub price_comparison: Vec<PriceComparison>,
    pub hot_areas: Vec<HotArea>,
    pub by_town: Vec<TownBreakdown>,
    /// AI-written summary; absent when the analyzer is unreachable. The
    /// numbers above stand on their own either way.
    pub narrative: Option<String>,
}

pub struct MarketIntel {
    store: Arc<dyn ScrapeStore>,
    enricher: Arc<dyn Enricher>,
}

impl MarketIntel {
    pub fn new(store: Arc<dyn ScrapeStore>, enricher: Arc<dyn Enricher>) -> Self {
        Self { store, enricher }
    }

    pub async fn dashboard(&self) -> Result<Dashboard> {
        let listings = self.store.all_listings().await?;
        let sources = self.store.list_sources().await?;
        let day_ago = Utc::now() - chrono::Duration::hours(24);

        Ok(Dashboard {
            total_listings: listings.len() as u64,
            new_today: listings.iter().filter(|l| l.scraped_at >= day_ago).count() as u64,
            pii_flagged: listings.iter().filter(|l| l.pii_detected).count() as u64,
            sources_active: sources.iter().filter(|s| s.is_enabled).count() as u64,
            sources_blocked: sources.iter().filter(|s| s.health.is_blocked).count() as u64,
            last_scrape_at: sources
                .iter()
                .filter_map(|s| s.health.last_scrape_at)
                .max(),
            status: status_breakdown(&listings),
            by_source: by_source(&listings),
            by_town: by_town(&listings),
            data_quality: data_quality(&listings),
            conversion: conversion_stats(&listings),
        })
    }

    pub async fn data_quality(&self) -> Result<Vec<SourceQuality>> {
        let listings = self.store.all_listings().await?;
        Ok(data_quality(&listings))
    }

    pub async fn conversion_stats(&self) -> Result<ConversionStats> {
        let listings = self.store.all_listings().await?;
        Ok(conversion_stats(&listings))
    }

    pub async fn price_comparison(&self) -> Result<Vec<PriceComparison>> {
        let listings = self.store.all_listings().await?;
        let locals = self.store.approved_local_listings().await?;
        Ok(price_comparison(&listings, &locals))
    }

    pub async fn hot_areas(&self) -> Result<Vec<HotArea>> {
        let listings = self.store.all_listings().await?;
        Ok(hot_areas(&listings))
    }

    pub async fn market_report(&self) -> Result<MarketReport> {
        let listings = self.store.all_listings().await?;
        let locals = self.store.approved_local_listings().await?;

        let mut report = MarketReport {
            generated_at: Utc::now(),
            price_comparison: price_comparison(&listings, &locals),
            hot_areas: hot_areas(&listings),
            by_town: by_town(&listings),
            narrative: None,
        };

        let breakdowns = serde_json::json!({
            "priceComparison": report.price_comparison,
            "hotAreas": report.hot_areas,
            "byTown": report.by_town,
        });
        match self.enricher.narrate_market_report(&breakdowns).await {
            Ok(narrative) => report.narrative = Some(narrative),
            Err(e) => warn!(error = %e, "market report narrative unavailable"),
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nestwatch_common::types::{AiAnalysis, Furnished, Location, PropertyType};
    use uuid::Uuid;

    fn listing(town: &str, price: i64, status: AdminStatus, views: u64) -> ScrapedListing {
        ScrapedListing {
            id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            source_website: "ikman".into(),
            source_url: format!("https://x/{}", Uuid::new_v4()),
            source_listing_id: None,
            title: "t".into(),
            description: String::new(),
            description_snippet: String::new(),
            price,
            location: Location {
                town: town.into(),
                ..Default::default()
            },
            beds: 2,
            baths: 1,
            size_sqft: 0,
            property_type: PropertyType::Unknown,
            furnished: Furnished::Unknown,
            images: vec![],
            scraped_at: Utc::now(),
            last_checked: None,
            is_active: true,
            expires_at: Utc::now(),
            pii_detected: false,
            pii_details: vec![],
            ai_analysis: AiAnalysis::default(),
            admin_status: status,
            admin_notes: String::new(),
            assigned_to: None,
            reviewed_by: None,
            reviewed_at: None,
            show_full_description: false,
            show_images: true,
            views,
            click_throughs: 0,
        }
    }

    fn local(town: &str, price: i64) -> LocalListing {
        LocalListing {
            town: town.into(),
            price,
            beds: 2,
            baths: 1,
        }
    }

    #[test]
    fn price_comparison_computes_gap() {
        let listings = vec![
            listing("Kandy", 50000, AdminStatus::Approved, 0),
            listing("Kandy", 70000, AdminStatus::Pending, 0),
        ];
        let locals = vec![local("kandy", 40000), local("Kandy", 40000)];

        let cmp = price_comparison(&listings, &locals);
        assert_eq!(cmp.len(), 1);
        assert_eq!(cmp[0].scraped_avg, 60000);
        assert_eq!(cmp[0].local_avg, 40000);
        assert_eq!(cmp[0].scraped_count, 2);
        assert!((cmp[0].diff_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn price_comparison_without_local_inventory() {
        let listings = vec![listing("Matale", 30000, AdminStatus::Approved, 0)];
        let cmp = price_comparison(&listings, &[]);
        assert_eq!(cmp.len(), 1);
        assert_eq!(cmp[0].local_avg, 0);
        assert_eq!(cmp[0].diff_percent, 0.0);
    }

    #[test]
    fn price_comparison_excludes_hidden_and_unpriced() {
        let listings = vec![
            listing("Kandy", 50000, AdminStatus::Hidden, 0),
            listing("Kandy", 0, AdminStatus::Approved, 0),
        ];
        assert!(price_comparison(&listings, &[]).is_empty());
    }

    #[test]
    fn price_comparison_sorts_by_gap_magnitude() {
        let listings = vec![
            listing("Kandy", 44000, AdminStatus::Approved, 0),
            listing("Galle", 80000, AdminStatus::Approved, 0),
        ];
        let locals = vec![local("Kandy", 40000), local("Galle", 40000)];
        let cmp = price_comparison(&listings, &locals);
        assert_eq!(cmp[0].town, "Galle"); // 100% gap before 10% gap
    }

    #[test]
    fn hot_areas_ranked_by_views() {
        let listings = vec![
            listing("Kandy", 1, AdminStatus::Approved, 5),
            listing("Galle", 1, AdminStatus::Approved, 50),
            listing("", 1, AdminStatus::Approved, 999),
        ];
        let hot = hot_areas(&listings);
        assert_eq!(hot.len(), 2);
        assert_eq!(hot[0].town, "Galle");
    }

    #[test]
    fn status_breakdown_counts_all_states() {
        let listings = vec![
            listing("a", 1, AdminStatus::Pending, 0),
            listing("a", 1, AdminStatus::Approved, 0),
            listing("a", 1, AdminStatus::Approved, 0),
            listing("a", 1, AdminStatus::Expired, 0),
        ];
        let b = status_breakdown(&listings);
        assert_eq!(b.pending, 1);
        assert_eq!(b.approved, 2);
        assert_eq!(b.expired, 1);
        assert_eq!(b.hidden, 0);
    }

    #[test]
    fn data_quality_groups_by_source() {
        let mut a = listing("Kandy", 1000, AdminStatus::Approved, 0);
        a.images = vec!["https://img/1".into()];
        let b = listing("", 0, AdminStatus::Pending, 0);
        let mut c = listing("Galle", 2000, AdminStatus::Approved, 0);
        c.source_website = "patpat".into();

        let q = data_quality(&[a, b, c]);
        assert_eq!(q.len(), 2);
        // Sorted by volume: ikman (2) before patpat (1).
        assert_eq!(q[0].source_website, "ikman");
        assert_eq!(q[0].total, 2);
        assert!((q[0].with_price_percent - 50.0).abs() < 1e-9);
        assert!((q[0].with_town_percent - 50.0).abs() < 1e-9);
        assert!((q[0].with_images_percent - 50.0).abs() < 1e-9);
        assert!((q[1].with_price_percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn conversion_guards_division_by_zero() {
        let stats = conversion_stats(&[]);
        assert_eq!(stats.click_rate_percent, 0.0);
    }
}
