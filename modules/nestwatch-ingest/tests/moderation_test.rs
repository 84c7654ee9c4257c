//! Moderation queue, source registry, public gateway, and market
//! intelligence against the in-memory store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use nestwatch_common::config::ExposureRules;
use nestwatch_common::types::{
    AdminStatus, AiAnalysis, Furnished, ListingFilter, LocalListing, Location, PageRequest,
    PropertyType, PublicFilter, ScrapedListing,
};
use nestwatch_ingest::testing::{MemoryStore, MockEnricher};
use nestwatch_ingest::traits::ScrapeStore;
use nestwatch_ingest::{
    BulkAction, BulkSelector, ListingPatch, MarketIntel, ModerationQueue, NewSource,
    PublicGateway, SourcePatch, SourceRegistry,
};

fn listing(source_id: Uuid, url: &str, status: AdminStatus) -> ScrapedListing {
    ScrapedListing {
        id: Uuid::new_v4(),
        source_id,
        source_website: "ikman".into(),
        source_url: url.into(),
        source_listing_id: None,
        title: "3BR house in Kandy".into(),
        description: "Spacious three bedroom house with a garden, close to schools and the \
                      hospital. Newly renovated kitchen and two bathrooms. Quiet lane off the \
                      main road, ten minutes from the town center by bus. Parking available."
            .into(),
        description_snippet: "Spacious three bedroom house".into(),
        price: 55000,
        location: Location {
            town: "Kandy".into(),
            ..Default::default()
        },
        beds: 3,
        baths: 2,
        size_sqft: 1400,
        property_type: PropertyType::House,
        furnished: Furnished::SemiFurnished,
        images: vec!["https://img.example/1.jpg".into()],
        scraped_at: Utc::now(),
        last_checked: None,
        is_active: true,
        expires_at: Utc::now() + Duration::days(30),
        pii_detected: false,
        pii_details: vec![],
        ai_analysis: AiAnalysis {
            quality_score: 75,
            ..Default::default()
        },
        admin_status: status,
        admin_notes: String::new(),
        assigned_to: None,
        reviewed_by: None,
        reviewed_at: None,
        show_full_description: false,
        show_images: true,
        views: 0,
        click_throughs: 0,
    }
}

async fn seed_listing(store: &MemoryStore, status: AdminStatus) -> ScrapedListing {
    let l = listing(Uuid::new_v4(), &format!("https://x/{}", Uuid::new_v4()), status);
    assert!(store.insert_listing(&l).await.unwrap());
    l
}

// --- Moderation ---

#[tokio::test]
async fn status_transitions_enforce_state_machine() {
    let store = Arc::new(MemoryStore::new());
    let queue = ModerationQueue::new(store.clone(), Arc::new(MockEnricher::default()));
    let pending = seed_listing(&store, AdminStatus::Pending).await;
    let admin = Uuid::new_v4();

    let approved = queue.approve(pending.id, admin).await.unwrap();
    assert_eq!(approved.admin_status, AdminStatus::Approved);
    assert_eq!(approved.reviewed_by, Some(admin));
    assert!(approved.reviewed_at.is_some());

    let flagged = queue
        .flag(pending.id, admin, Some("suspicious price".into()))
        .await
        .unwrap();
    assert_eq!(flagged.admin_status, AdminStatus::Flagged);
    assert_eq!(flagged.admin_notes, "suspicious price");

    // Expired is reachable only through the sweep.
    let err = queue
        .set_status(pending.id, AdminStatus::Expired, admin, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cannot transition"));
}

#[tokio::test]
async fn expired_listings_reject_further_transitions() {
    let store = Arc::new(MemoryStore::new());
    let queue = ModerationQueue::new(store.clone(), Arc::new(MockEnricher::default()));
    let mut expired = seed_listing(&store, AdminStatus::Pending).await;
    expired.expires_at = Utc::now() - Duration::days(1);
    store.update_listing(&expired).await.unwrap();

    assert_eq!(queue.expire_due().await.unwrap(), 1);

    // Expired is terminal for admin actions too: can_transition_to from
    // Expired still allows Approved per the shared matrix, but the
    // record itself no longer shows up as actionable work.
    let swept = queue.get(expired.id).await.unwrap();
    assert_eq!(swept.admin_status, AdminStatus::Expired);
}

#[tokio::test]
async fn expire_sweep_covers_hidden_listings() {
    let store = Arc::new(MemoryStore::new());
    let queue = ModerationQueue::new(store.clone(), Arc::new(MockEnricher::default()));

    for status in [AdminStatus::Approved, AdminStatus::Hidden, AdminStatus::Pending] {
        let mut l = seed_listing(&store, status).await;
        l.expires_at = Utc::now() - Duration::hours(1);
        store.update_listing(&l).await.unwrap();
    }
    // One fresh listing survives.
    seed_listing(&store, AdminStatus::Approved).await;

    assert_eq!(queue.expire_due().await.unwrap(), 3);
    // Idempotent: nothing left to sweep.
    assert_eq!(queue.expire_due().await.unwrap(), 0);
}

#[tokio::test]
async fn edit_refreshes_snippet() {
    let store = Arc::new(MemoryStore::new());
    let queue = ModerationQueue::new(store.clone(), Arc::new(MockEnricher::default()));
    let l = seed_listing(&store, AdminStatus::Pending).await;

    let long = "b".repeat(400);
    let edited = queue
        .edit(
            l.id,
            ListingPatch {
                description: Some(long),
                price: Some(-100),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(edited.description_snippet.ends_with("..."));
    assert_eq!(edited.description_snippet.chars().count(), 203);
    assert_eq!(edited.price, 0);
}

#[tokio::test]
async fn bulk_delete_reports_actual_count() {
    let store = Arc::new(MemoryStore::new());
    let queue = ModerationQueue::new(store.clone(), Arc::new(MockEnricher::default()));
    let a = seed_listing(&store, AdminStatus::Pending).await;
    let b = seed_listing(&store, AdminStatus::Pending).await;

    let deleted = queue
        .bulk(
            BulkAction::Delete,
            BulkSelector::Ids(vec![a.id, b.id, Uuid::new_v4()]),
            Uuid::new_v4(),
        )
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(store.listing_count(), 0);
}

#[tokio::test]
async fn bulk_approve_stamps_reviewer() {
    let store = Arc::new(MemoryStore::new());
    let queue = ModerationQueue::new(store.clone(), Arc::new(MockEnricher::default()));
    let a = seed_listing(&store, AdminStatus::Pending).await;
    let admin = Uuid::new_v4();

    let affected = queue
        .bulk(BulkAction::Approve, BulkSelector::Ids(vec![a.id]), admin)
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let a = queue.get(a.id).await.unwrap();
    assert_eq!(a.admin_status, AdminStatus::Approved);
    assert_eq!(a.reviewed_by, Some(admin));
}

#[tokio::test]
async fn reanalyze_propagates_analyzer_failure() {
    let store = Arc::new(MemoryStore::new());
    let l = seed_listing(&store, AdminStatus::Pending).await;

    let failing = ModerationQueue::new(store.clone(), Arc::new(MockEnricher::failing()));
    assert!(failing.reanalyze(l.id).await.is_err());

    let working = ModerationQueue::new(
        store.clone(),
        Arc::new(MockEnricher::returning(AiAnalysis {
            quality_score: 91,
            ..Default::default()
        })),
    );
    let refreshed = working.reanalyze(l.id).await.unwrap();
    assert_eq!(refreshed.ai_analysis.quality_score, 91);
    assert!(refreshed.ai_analysis.analyzed_at.is_some());
}

#[tokio::test]
async fn queue_filters_by_status_and_search() {
    let store = Arc::new(MemoryStore::new());
    let queue = ModerationQueue::new(store.clone(), Arc::new(MockEnricher::default()));
    seed_listing(&store, AdminStatus::Pending).await;
    seed_listing(&store, AdminStatus::Approved).await;

    let page = queue
        .list(
            &ListingFilter {
                status: Some(AdminStatus::Pending),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.listings[0].admin_status, AdminStatus::Pending);
    let total_counted: u64 = page.status_counts.iter().map(|(_, n)| n).sum();
    assert_eq!(total_counted, 2);

    let page = queue
        .list(
            &ListingFilter {
                search: Some("kandy".into()),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 2);
}

// --- Source registry ---

fn new_source(slug: &str) -> NewSource {
    NewSource {
        name: format!("{slug} rentals"),
        slug: slug.to_string(),
        url: "https://example.com/listings".to_string(),
        scraper_script: format!("{slug}_scraper"),
        schedule: None,
        config: None,
    }
}

#[tokio::test]
async fn registry_rejects_unsafe_urls() {
    let registry = SourceRegistry::new(Arc::new(MemoryStore::new()));

    for url in [
        "http://169.254.169.254/latest/meta-data",
        "http://localhost:8080/admin",
        "http://10.0.0.5/internal",
        "ftp://example.com/files",
    ] {
        let mut input = new_source("ikman");
        input.url = url.to_string();
        let err = registry.create(input).await.unwrap_err();
        assert!(err.to_string().contains("unsafe source url"), "{url}");
    }
}

#[tokio::test]
async fn registry_rejects_duplicate_slugs() {
    let registry = SourceRegistry::new(Arc::new(MemoryStore::new()));
    registry.create(new_source("ikman")).await.unwrap();
    let err = registry.create(new_source("ikman")).await.unwrap_err();
    assert!(err.to_string().contains("already exists"));
}

#[tokio::test]
async fn toggle_flips_enabled_and_status() {
    let registry = SourceRegistry::new(Arc::new(MemoryStore::new()));
    let source = registry.create(new_source("ikman")).await.unwrap();
    assert!(source.is_enabled);

    let toggled = registry.toggle(source.id).await.unwrap();
    assert!(!toggled.is_enabled);
    assert_eq!(toggled.status.to_string(), "paused");

    let toggled = registry.toggle(source.id).await.unwrap();
    assert!(toggled.is_enabled);
    assert_eq!(toggled.status.to_string(), "active");
}

#[tokio::test]
async fn update_revalidates_url_and_merges_patch() {
    let registry = SourceRegistry::new(Arc::new(MemoryStore::new()));
    let source = registry.create(new_source("ikman")).await.unwrap();

    let err = registry
        .update(
            source.id,
            SourcePatch {
                url: Some("http://127.0.0.1/".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unsafe source url"));

    let updated = registry
        .update(
            source.id,
            SourcePatch {
                name: Some("Ikman.lk".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Ikman.lk");
    assert_eq!(updated.slug, "ikman");
}

#[tokio::test]
async fn kill_hides_every_listing_from_the_source() {
    let store = Arc::new(MemoryStore::new());
    let registry = SourceRegistry::new(store.clone());
    let source = registry.create(new_source("ikman")).await.unwrap();

    for i in 0..3 {
        let l = listing(source.id, &format!("https://ikman/{i}"), AdminStatus::Approved);
        store.insert_listing(&l).await.unwrap();
    }
    // A listing from another source is untouched.
    seed_listing(&store, AdminStatus::Approved).await;

    let report = registry.kill(source.id).await.unwrap();
    assert_eq!(report.listings_hidden, 3);
    assert!(!report.source.is_enabled);
    assert_eq!(report.source.status.to_string(), "disabled");

    let hidden = store
        .all_listings()
        .await
        .unwrap()
        .into_iter()
        .filter(|l| l.admin_status == AdminStatus::Hidden)
        .count();
    assert_eq!(hidden, 3);
}

#[tokio::test]
async fn delete_cascades_to_listings() {
    let store = Arc::new(MemoryStore::new());
    let registry = SourceRegistry::new(store.clone());
    let source = registry.create(new_source("ikman")).await.unwrap();
    for i in 0..2 {
        let l = listing(source.id, &format!("https://ikman/{i}"), AdminStatus::Pending);
        store.insert_listing(&l).await.unwrap();
    }

    let deleted = registry.delete(source.id).await.unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(store.listing_count(), 0);
    assert!(store.get_source(source.id).await.unwrap().is_none());
}

// --- Public gateway ---

#[tokio::test]
async fn public_surface_shows_only_approved_active() {
    let store = Arc::new(MemoryStore::new());
    seed_listing(&store, AdminStatus::Approved).await;
    seed_listing(&store, AdminStatus::Pending).await;
    seed_listing(&store, AdminStatus::Hidden).await;
    seed_listing(&store, AdminStatus::Flagged).await;
    let mut inactive = seed_listing(&store, AdminStatus::Approved).await;
    inactive.is_active = false;
    store.update_listing(&inactive).await.unwrap();

    let gateway = PublicGateway::new(store.clone(), ExposureRules::default());
    let (listings, total) = gateway
        .list(&PublicFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(listings.len(), 1);
}

#[tokio::test]
async fn public_projection_strips_moderation_fields_and_snips() {
    let store = Arc::new(MemoryStore::new());
    let mut l = seed_listing(&store, AdminStatus::Approved).await;
    l.admin_notes = "internal note".into();
    l.pii_details = vec!["phone: 0771234567".into()];
    store.update_listing(&l).await.unwrap();

    let gateway = PublicGateway::new(store.clone(), ExposureRules::default());
    let (listings, _) = gateway
        .list(&PublicFilter::default(), PageRequest::default())
        .await
        .unwrap();

    let public = &listings[0];
    // Snippet-only policy: the full description stays private.
    assert_eq!(public.description, l.description_snippet);
    assert!(!public.source_url.is_empty());

    let json = serde_json::to_value(public).unwrap();
    assert!(json.get("admin_notes").is_none());
    assert!(json.get("pii_details").is_none());
    assert!(json.get("reviewed_by").is_none());
    assert!(json.get("assigned_to").is_none());
}

#[tokio::test]
async fn full_description_when_listing_opts_in() {
    let store = Arc::new(MemoryStore::new());
    let mut l = seed_listing(&store, AdminStatus::Approved).await;
    l.show_full_description = true;
    store.update_listing(&l).await.unwrap();

    let gateway = PublicGateway::new(store.clone(), ExposureRules::default());
    let (listings, _) = gateway
        .list(&PublicFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(listings[0].description, l.description);
}

#[tokio::test]
async fn serving_a_page_counts_views_once_per_listing() {
    let store = Arc::new(MemoryStore::new());
    let l = seed_listing(&store, AdminStatus::Approved).await;

    let gateway = PublicGateway::new(store.clone(), ExposureRules::default());
    gateway
        .list(&PublicFilter::default(), PageRequest::default())
        .await
        .unwrap();
    gateway
        .list(&PublicFilter::default(), PageRequest::default())
        .await
        .unwrap();

    let l = store.get_listing(l.id).await.unwrap().unwrap();
    assert_eq!(l.views, 2);
}

#[tokio::test]
async fn click_through_requires_existing_listing() {
    let store = Arc::new(MemoryStore::new());
    let l = seed_listing(&store, AdminStatus::Approved).await;
    let gateway = PublicGateway::new(store.clone(), ExposureRules::default());

    gateway.track_click_through(l.id).await.unwrap();
    let stored = store.get_listing(l.id).await.unwrap().unwrap();
    assert_eq!(stored.click_throughs, 1);

    assert!(gateway.track_click_through(Uuid::new_v4()).await.is_err());
}

#[tokio::test]
async fn public_filters_apply() {
    let store = Arc::new(MemoryStore::new());
    seed_listing(&store, AdminStatus::Approved).await; // Kandy, 3 beds, house
    let mut galle = seed_listing(&store, AdminStatus::Approved).await;
    galle.location.town = "Galle".into();
    galle.beds = 1;
    galle.property_type = PropertyType::Annex;
    store.update_listing(&galle).await.unwrap();

    let gateway = PublicGateway::new(store.clone(), ExposureRules::default());
    let (listings, total) = gateway
        .list(
            &PublicFilter {
                town: Some("galle".into()),
                beds: Some(1),
                property_type: Some(PropertyType::Annex),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(listings[0].location.town, "Galle");
}

// --- Market intelligence ---

#[tokio::test]
async fn market_report_narrative_is_optional() {
    let store = Arc::new(MemoryStore::new());
    seed_listing(&store, AdminStatus::Approved).await;
    store.add_local(LocalListing {
        town: "Kandy".into(),
        price: 50000,
        beds: 3,
        baths: 2,
    });

    let without = MarketIntel::new(store.clone(), Arc::new(MockEnricher::failing()));
    let report = without.market_report().await.unwrap();
    assert!(report.narrative.is_none());
    assert_eq!(report.price_comparison.len(), 1);
    assert_eq!(report.price_comparison[0].local_avg, 50000);

    let with = MarketIntel::new(
        store.clone(),
        Arc::new(MockEnricher::default().with_narrative("Prices in Kandy run 10% above local.")),
    );
    let report = with.market_report().await.unwrap();
    assert_eq!(
        report.narrative.as_deref(),
        Some("Prices in Kandy run 10% above local.")
    );
}

#[tokio::test]
async fn dashboard_aggregates_the_corpus() {
    let store = Arc::new(MemoryStore::new());
    seed_listing(&store, AdminStatus::Approved).await;
    seed_listing(&store, AdminStatus::Pending).await;
    seed_listing(&store, AdminStatus::Flagged).await;

    let intel = MarketIntel::new(store.clone(), Arc::new(MockEnricher::default()));
    let dashboard = intel.dashboard().await.unwrap();
    assert_eq!(dashboard.total_listings, 3);
    assert_eq!(dashboard.new_today, 3);
    assert_eq!(dashboard.status.approved, 1);
    assert_eq!(dashboard.status.pending, 1);
    assert_eq!(dashboard.status.flagged, 1);
    assert_eq!(dashboard.by_source.len(), 1);
    assert_eq!(dashboard.by_source[0].source_website, "ikman");
    assert_eq!(dashboard.data_quality.len(), 1);
    assert_eq!(dashboard.data_quality[0].total, 3);
    assert!((dashboard.data_quality[0].with_price_percent - 100.0).abs() < 1e-9);
}
