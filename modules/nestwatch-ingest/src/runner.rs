//! Dispatches scrape requests to registered per-source scraper adapters.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

use nestwatch_common::types::{JobError, RawListing, ScrapeBatch, ScrapeRequest};

use crate::traits::{ScraperRunner, SourceScraper};

/// Maps scraper script identifiers to adapter implementations. Sources
/// reference adapters by `scraper_script`; an unregistered script is a
/// per-source error, not a run failure.
#[derive(Default)]
pub struct ScraperRegistry {
    scrapers: HashMap<String, Arc<dyn SourceScraper>>,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, script: impl Into<String>, scraper: Arc<dyn SourceScraper>) {
        self.scrapers.insert(script.into(), scraper);
    }

    pub fn has(&self, script: &str) -> bool {
        self.scrapers.contains_key(script)
    }
}

#[async_trait]
impl ScraperRunner for ScraperRegistry {
    async fn run(&self, request: &ScrapeRequest) -> Result<ScrapeBatch> {
        // Sources scrape concurrently; rate limiting is per source,
        // inside each adapter.
        let fetches = request.sources.iter().map(|source| async move {
            let Some(scraper) = self.scrapers.get(&source.script) else {
                warn!(slug = %source.slug, script = %source.script, "no scraper registered");
                return (
                    &source.slug,
                    Err(anyhow::anyhow!("unknown scraper script: {}", source.script)),
                );
            };
            (&source.slug, scraper.fetch(&source.config).await)
        });
        let results: Vec<(&String, Result<Vec<RawListing>>)> = join_all(fetches).await;

        let mut batch = ScrapeBatch::default();
        for (slug, result) in results {
            match result {
                Ok(listings) => {
                    info!(slug = %slug, count = listings.len(), "source scraped");
                    for mut raw in listings {
                        raw.source_slug = slug.clone();
                        batch.listings.push(raw);
                    }
                }
                Err(e) => {
                    warn!(slug = %slug, error = %e, "source scrape failed");
                    batch.errors.push(JobError {
                        source: slug.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        // In-batch dedup: sources can return overlapping pages. Records
        // without a URL pass through; normalization rejects them later.
        let mut seen = HashSet::new();
        batch
            .listings
            .retain(|l| l.source_url.is_empty() || seen.insert(l.source_url.clone()));

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestwatch_common::types::{JobKind, RawListing, ScrapeConfig, SourceScrapeRequest};

    struct FixedScraper(Vec<RawListing>);

    #[async_trait]
    impl SourceScraper for FixedScraper {
        async fn fetch(&self, _config: &ScrapeConfig) -> Result<Vec<RawListing>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenScraper;

    #[async_trait]
    impl SourceScraper for BrokenScraper {
        async fn fetch(&self, _config: &ScrapeConfig) -> Result<Vec<RawListing>> {
            anyhow::bail!("connection reset by peer")
        }
    }

    fn request_for(slug: &str, script: &str) -> ScrapeRequest {
        ScrapeRequest {
            sources: vec![SourceScrapeRequest {
                slug: slug.to_string(),
                script: script.to_string(),
                config: ScrapeConfig {
                    max_pages: 1,
                    rate_limit_ms: 0,
                    location: String::new(),
                    price_min: 0,
                    price_max: 0,
                },
            }],
            kind: JobKind::Incremental,
        }
    }

    fn raw(url: &str) -> RawListing {
        RawListing {
            source_url: url.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn tags_listings_with_source_slug() {
        let mut registry = ScraperRegistry::new();
        registry.register("s1", Arc::new(FixedScraper(vec![raw("https://a/1")])));

        let batch = registry.run(&request_for("ikman", "s1")).await.unwrap();
        assert_eq!(batch.listings.len(), 1);
        assert_eq!(batch.listings[0].source_slug, "ikman");
        assert!(batch.errors.is_empty());
    }

    #[tokio::test]
    async fn unknown_script_becomes_source_error() {
        let registry = ScraperRegistry::new();
        let batch = registry.run(&request_for("ikman", "missing")).await.unwrap();
        assert!(batch.listings.is_empty());
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].source, "ikman");
    }

    #[tokio::test]
    async fn failing_source_does_not_abort_others() {
        let mut registry = ScraperRegistry::new();
        registry.register("ok", Arc::new(FixedScraper(vec![raw("https://a/1")])));
        registry.register("broken", Arc::new(BrokenScraper));

        let mut request = request_for("good", "ok");
        request.sources.push(SourceScrapeRequest {
            slug: "bad".to_string(),
            script: "broken".to_string(),
            config: request.sources[0].config.clone(),
        });

        let batch = registry.run(&request).await.unwrap();
        assert_eq!(batch.listings.len(), 1);
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].source, "bad");
    }

    #[tokio::test]
    async fn dedups_repeated_urls_within_batch() {
        let mut registry = ScraperRegistry::new();
        registry.register(
            "s1",
            Arc::new(FixedScraper(vec![
                raw("https://a/1"),
                raw("https://a/1"),
                raw("https://a/2"),
            ])),
        );

        let batch = registry.run(&request_for("ikman", "s1")).await.unwrap();
        assert_eq!(batch.listings.len(), 2);
    }
}
