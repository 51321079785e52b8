use crate::apis::EventSource;
use crate::config::{Config, CrawlConfig};
use crate::dedup::DuplicateDetector;
use crate::error::{Result, ScraperError};
use crate::fetch::SourceFetcher;
use crate::geocoder::{Geocoder, GeocodingClient};
use crate::metrics::IngestMetrics;
use crate::notify::EventNotifier;
use crate::organizer::{OrganizerCache, OrganizerResolver};
use crate::storage::Storage;
use crate::types::{Event, EventCreated, EventFilter, EventId, GeoPoint, RawItem};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Outcome of one bounded crawl of one source.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub run_id: Uuid,
    pub source: String,
    pub pages_fetched: u32,
    pub items_seen: usize,
    pub created: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub geocoded: usize,
    /// The crawl stopped early on a cancellation signal.
    pub cancelled: bool,
    pub errors: Vec<String>,
}

impl CrawlReport {
    fn new(source: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source: source.to_string(),
            pages_fetched: 0,
            items_seen: 0,
            created: 0,
            duplicates: 0,
            skipped: 0,
            geocoded: 0,
            cancelled: false,
            errors: Vec::new(),
        }
    }
}

/// State scoped to a single crawl run.
struct CrawlContext {
    organizers: OrganizerCache,
    report: CrawlReport,
}

enum ItemOutcome {
    Created { geocoded: bool },
    Duplicate,
    Skipped(&'static str),
}

/// Drives sources page by page and runs every item through
/// extract → dedup → organizer → persist → notify → geocode.
#[derive(Clone)]
pub struct Orchestrator {
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn SourceFetcher>,
    geocoder: Geocoder,
    detector: DuplicateDetector,
    resolver: OrganizerResolver,
    notifier: Arc<dyn EventNotifier>,
    crawl: CrawlConfig,
}

fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow()
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn SourceFetcher>,
        geocoding: Arc<dyn GeocodingClient>,
        notifier: Arc<dyn EventNotifier>,
    ) -> Self {
        Self {
            detector: DuplicateDetector::new(storage.clone(), &config.dedup),
            resolver: OrganizerResolver::new(storage.clone()),
            geocoder: Geocoder::new(geocoding),
            storage,
            fetcher,
            notifier,
            crawl: config.crawl.clone(),
        }
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.storage.clone()
    }

    pub fn crawl_config(&self) -> &CrawlConfig {
        &self.crawl
    }

    /// Crawl one source until an empty page, the page cap, a page-level failure or
    /// cancellation. Item failures are counted and never end the crawl.
    #[instrument(skip_all, fields(source = source.source_name(), run_id = tracing::field::Empty))]
    pub async fn run_source(
        &self,
        source: &dyn EventSource,
        cancel: watch::Receiver<bool>,
    ) -> CrawlReport {
        let name = source.source_name();
        let started = Instant::now();
        let max_pages = self.crawl.max_pages_for(name, source.default_max_pages());
        let first = source.first_page();
        let mut ctx = CrawlContext {
            organizers: OrganizerCache::new(),
            report: CrawlReport::new(name),
        };
        tracing::Span::current().record("run_id", tracing::field::display(ctx.report.run_id));
        info!(
            "🚀 Starting crawl {} of {} ({} pages max)",
            ctx.report.run_id, name, max_pages
        );

        'pages: for page in first..first.saturating_add(max_pages) {
            if is_cancelled(&cancel) {
                ctx.report.cancelled = true;
                break;
            }

            let url = source.page_url(page);
            let body = match self.fetcher.get_text(&url).await {
                Ok(body) => body,
                // WordPress answers a page past the end with 400 instead of an empty list.
                Err(ScraperError::Status { status: 400, .. }) if page > first => {
                    info!("Page {} is past the end of the listing, crawl complete", page);
                    break;
                }
                Err(e) => {
                    warn!("Fetching page {} failed, stopping crawl: {}", page, e);
                    ctx.report.errors.push(format!("page {page}: {e}"));
                    break;
                }
            };
            IngestMetrics::record_page_fetched(name);
            ctx.report.pages_fetched += 1;

            let items = match source.list_items(&body) {
                Ok(items) => items,
                Err(e) => {
                    warn!("Listing page {} could not be parsed, stopping crawl: {}", page, e);
                    ctx.report.errors.push(format!("page {page}: {e}"));
                    break;
                }
            };
            if items.is_empty() {
                info!("Page {} is empty, crawl complete", page);
                break;
            }
            debug!("Page {} has {} items", page, items.len());

            for item in &items {
                if is_cancelled(&cancel) {
                    ctx.report.cancelled = true;
                    break 'pages;
                }
                ctx.report.items_seen += 1;
                match self.process_item(source, item, &mut ctx.organizers).await {
                    ItemOutcome::Created { geocoded } => {
                        ctx.report.created += 1;
                        if geocoded {
                            ctx.report.geocoded += 1;
                        }
                    }
                    ItemOutcome::Duplicate => ctx.report.duplicates += 1,
                    ItemOutcome::Skipped(stage) => {
                        IngestMetrics::record_skipped(name, stage);
                        ctx.report.skipped += 1;
                    }
                }
            }
        }

        if ctx.report.cancelled {
            warn!("Crawl {} of {} cancelled", ctx.report.run_id, name);
        }
        IngestMetrics::record_crawl_duration(name, started.elapsed());
        info!(
            "✅ Crawl of {} finished: {} pages, {} created, {} duplicates, {} skipped, {} organizers resolved",
            name,
            ctx.report.pages_fetched,
            ctx.report.created,
            ctx.report.duplicates,
            ctx.report.skipped,
            ctx.organizers.len()
        );
        ctx.report
    }

    async fn process_item(
        &self,
        source: &dyn EventSource,
        item: &RawItem,
        organizers: &mut OrganizerCache,
    ) -> ItemOutcome {
        let name = source.source_name();
        let key = source.item_key(item).unwrap_or_else(|| "<unkeyed>".to_string());

        let candidate = match source.extract(item, self.fetcher.as_ref()).await {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!("Skipping item {}: extraction failed: {}", key, e);
                return ItemOutcome::Skipped("extract");
            }
        };

        if self
            .detector
            .is_duplicate(&candidate.title, &candidate.date, &candidate.location)
            .await
        {
            debug!("Skipping duplicate '{}'", candidate.title);
            IngestMetrics::record_duplicate(name);
            return ItemOutcome::Duplicate;
        }

        let organizer_id = match self
            .resolver
            .resolve(
                organizers,
                &candidate.organizer_name,
                &candidate.organizer_email,
                &candidate.organizer_phone,
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!("Skipping '{}': organizer resolution failed: {}", candidate.title, e);
                return ItemOutcome::Skipped("organizer");
            }
        };

        let source_coordinates = candidate.coordinates;
        let mut event = Event::from_candidate(candidate, organizer_id);
        let event_id = match self.storage.create_event(&mut event).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Skipping '{}': could not store event: {}", event.name, e);
                return ItemOutcome::Skipped("persist");
            }
        };
        IngestMetrics::record_event_created(name);
        info!("Created event {} '{}'", event_id, event.name);
        self.notifier.event_created(EventCreated {
            event_id,
            name: event.name.clone(),
        });

        let geocoded = self.attach_coordinates(&mut event, source_coordinates).await;
        ItemOutcome::Created { geocoded }
    }

    /// Fill in coordinates from the source or the geocoder and save them. Failure
    /// leaves the stored event without coordinates.
    async fn attach_coordinates(
        &self,
        event: &mut Event,
        source_coordinates: Option<GeoPoint>,
    ) -> bool {
        let point = match source_coordinates {
            Some(point) => Some(point),
            None => self.geocoder.geocode(&event.location).await,
        };
        let Some(point) = point else {
            return false;
        };
        event.set_coordinates(point);
        match self.storage.save_event(event).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not save coordinates for event {:?}: {}", event.id, e);
                false
            }
        }
    }

    /// Geocode stored events that still have no coordinates. Returns
    /// `(attempted, updated)`.
    #[instrument(skip(self))]
    pub async fn backfill_coordinates(&self, limit: usize) -> Result<(usize, usize)> {
        let filter = EventFilter {
            missing_coordinates: true,
            limit: Some(limit),
            ..Default::default()
        };
        let pending = self.storage.find_events(&filter).await?;
        info!("{} events without coordinates", pending.len());

        let mut attempted = 0;
        let mut updated: Vec<EventId> = Vec::new();
        for mut event in pending {
            if event.location.trim().is_empty() {
                continue;
            }
            attempted += 1;
            if self.attach_coordinates(&mut event, None).await {
                if let Some(id) = event.id {
                    updated.push(id);
                }
            }
        }
        info!("Backfill geocoded {} of {} events", updated.len(), attempted);
        Ok((attempted, updated.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::GainesvilleSunCrawler;
    use crate::error::ScraperError;
    use crate::geocoder::GeocodeHit;
    use crate::notify::NoopNotifier;
    use crate::storage::InMemoryStorage;
    use std::collections::HashMap;

    struct StaticFetcher(HashMap<String, String>);

    #[async_trait::async_trait]
    impl SourceFetcher for StaticFetcher {
        async fn get_text(&self, url: &str) -> Result<String> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| ScraperError::api(format!("no page at {url}")))
        }
    }

    struct FixedGeocoder;

    #[async_trait::async_trait]
    impl GeocodingClient for FixedGeocoder {
        async fn search(&self, _query: &str) -> Result<Vec<GeocodeHit>> {
            Ok(vec![GeocodeHit { lat: "29.65".into(), lon: "-82.32".into() }])
        }
    }

    fn orchestrator(storage: &InMemoryStorage, pages: HashMap<String, String>) -> Orchestrator {
        Orchestrator::new(
            &Config::default(),
            Arc::new(storage.clone()),
            Arc::new(StaticFetcher(pages)),
            Arc::new(FixedGeocoder),
            Arc::new(NoopNotifier),
        )
    }

    #[tokio::test]
    async fn page_fetch_failure_ends_crawl_with_error() {
        let storage = InMemoryStorage::new();
        let (_tx, rx) = watch::channel(false);
        let report = orchestrator(&storage, HashMap::new())
            .run_source(&GainesvilleSunCrawler::new(), rx)
            .await;
        assert_eq!(report.pages_fetched, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(storage.events().is_empty());
    }

    #[tokio::test]
    async fn geocodes_events_without_source_coordinates() {
        let source = GainesvilleSunCrawler::new();
        let page = serde_json::json!({"rawEvents": [{
            "title": "Art Walk",
            "start_date": "2025-07-25",
            "venue": {"address_1": "12 SE 1st St", "town": "Gainesville"}
        }]});
        let pages = HashMap::from([(source.page_url(0), page.to_string())]);
        let storage = InMemoryStorage::new();
        let (_tx, rx) = watch::channel(false);

        let report = orchestrator(&storage, pages).run_source(&source, rx).await;
        assert_eq!(report.created, 1);
        assert_eq!(report.geocoded, 1);
        // Page 1 is missing from the fetcher, which ends the crawl.
        assert_eq!(report.pages_fetched, 1);
        let stored = storage.events();
        assert_eq!(stored[0].latitude, Some(29.65));
        assert_eq!(stored[0].longitude, Some(-82.32));
        assert_eq!(stored[0].organizer_id, None);
    }

    #[tokio::test]
    async fn backfill_fills_missing_coordinates() {
        let storage = InMemoryStorage::new();
        for (title, location) in [("A", "1 Main St"), ("B", ""), ("C", "3 Oak Ave")] {
            let mut event = Event::from_candidate(
                crate::types::CandidateEvent {
                    title: title.into(),
                    date: "2025-01-01".into(),
                    location: location.into(),
                    ..Default::default()
                },
                None,
            );
            storage.create_event(&mut event).await.unwrap();
        }

        let (attempted, updated) = orchestrator(&storage, HashMap::new())
            .backfill_coordinates(10)
            .await
            .unwrap();
        assert_eq!((attempted, updated), (2, 2));
        let missing = storage
            .find_events(&EventFilter { missing_coordinates: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "B");
    }
}
