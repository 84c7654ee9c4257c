//! Listing ingestion pipeline: scrape orchestration, normalization,
//! AI enrichment, moderation, market intelligence, and the public
//! exposure gateway.

pub mod enrich;
pub mod gateway;
pub mod intel;
pub mod moderation;
pub mod normalize;
pub mod orchestrator;
pub mod registry;
pub mod runner;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use enrich::HttpEnricher;
pub use gateway::{PublicGateway, PublicListing};
pub use intel::MarketIntel;
pub use moderation::{BulkAction, BulkSelector, ListingPatch, ModerationQueue};
pub use normalize::{IngestEngine, IngestOutcome};
pub use orchestrator::JobOrchestrator;
pub use registry::{KillReport, NewSource, SourcePatch, SourceRegistry};
pub use runner::ScraperRegistry;
pub use traits::{Enricher, ScraperRunner, ScrapeStore, SourceScraper};
