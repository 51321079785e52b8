use super::{classify_tokens, EventSource};
use crate::constants::{
    VISIT_GAINESVILLE_API, VISIT_GAINESVILLE_LISTING_URL, VISIT_GAINESVILLE_MAX_PAGES,
};
use crate::error::{Result, ScraperError};
use crate::fetch::SourceFetcher;
use crate::text::clean;
use crate::types::{CandidateEvent, RawItem};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, instrument};

static TITLE: Lazy<Selector> = Lazy::new(|| selector("h1.event-title-text"));
static DATE: Lazy<Selector> = Lazy::new(|| selector("li.event-date-time"));
static ADDRESS: Lazy<Selector> = Lazy::new(|| selector("div.address"));
static DIRECTIONS: Lazy<Selector> = Lazy::new(|| selector("div.directionsRow.row--format a[href]"));
static CONTENT: Lazy<Selector> = Lazy::new(|| selector("div.section-content"));
static COPIED_MESSAGE: Lazy<Selector> =
    Lazy::new(|| selector("span[data-olk-copy-source='MessageBody']"));
static OG_IMAGE: Lazy<Selector> = Lazy::new(|| selector("meta[property='og:image']"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

/// Visit Gainesville events calendar. Listing items only carry a link and the
/// WordPress classification list; everything else lives on the detail page.
pub struct VisitGainesvilleCrawler;

impl Default for VisitGainesvilleCrawler {
    fn default() -> Self {
        Self::new()
    }
}

impl VisitGainesvilleCrawler {
    pub fn new() -> Self {
        Self
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    clean(&element.text().collect::<String>())
}

fn first_text(document: &Html, selector: &Selector) -> String {
    document
        .select(selector)
        .next()
        .map(element_text)
        .unwrap_or_default()
}

/// Description text with pasted mail-client fragments removed.
fn description_text(document: &Html) -> String {
    let Some(content) = document.select(&CONTENT).next() else {
        return String::new();
    };
    let mut text = content.text().collect::<String>();
    for span in content.select(&COPIED_MESSAGE) {
        let fragment = span.text().collect::<String>();
        if !fragment.is_empty() {
            text = text.replacen(&fragment, "", 1);
        }
    }
    clean(&text)
}

/// Parse an event detail page. Only the title is required.
pub fn parse_event_page(html: &str) -> Result<CandidateEvent> {
    let document = Html::parse_document(html);

    let title = first_text(&document, &TITLE);
    if title.is_empty() {
        return Err(ScraperError::MissingField("event title not found".into()));
    }

    let google_maps_link = document
        .select(&DIRECTIONS)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .unwrap_or_default();
    let image_url = document
        .select(&OG_IMAGE)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(|content| content.trim().to_string())
        .unwrap_or_default();

    Ok(CandidateEvent {
        title,
        date: first_text(&document, &DATE),
        location: first_text(&document, &ADDRESS),
        description: description_text(&document),
        google_maps_link,
        image_url,
        ..Default::default()
    })
}

fn class_tokens(item: &RawItem) -> Vec<&str> {
    item.get("class_list")
        .and_then(Value::as_array)
        .map(|tokens| tokens.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl EventSource for VisitGainesvilleCrawler {
    fn source_name(&self) -> &'static str {
        VISIT_GAINESVILLE_API
    }

    fn first_page(&self) -> u32 {
        1
    }

    fn default_max_pages(&self) -> u32 {
        VISIT_GAINESVILLE_MAX_PAGES
    }

    fn page_url(&self, page: u32) -> String {
        VISIT_GAINESVILLE_LISTING_URL.replace("{page}", &page.to_string())
    }

    fn list_items(&self, body: &str) -> Result<Vec<RawItem>> {
        match serde_json::from_str::<Value>(body)? {
            Value::Array(items) => Ok(items),
            other => Err(ScraperError::api(format!(
                "unexpected listing shape: {}",
                other
            ))),
        }
    }

    fn item_key(&self, item: &RawItem) -> Option<String> {
        item.get("link").and_then(Value::as_str).map(str::to_string)
    }

    #[instrument(skip(self, item, fetcher))]
    async fn extract(&self, item: &RawItem, fetcher: &dyn SourceFetcher) -> Result<CandidateEvent> {
        let link = self
            .item_key(item)
            .filter(|link| !link.trim().is_empty())
            .ok_or_else(|| ScraperError::MissingField("link".into()))?;

        let html = fetcher.get_text(&link).await?;
        let mut event = parse_event_page(&html)?;

        let categories = classify_tokens(class_tokens(item));
        debug!("{} -> categories {:?}", link, categories);
        event.category = categories.first().cloned().unwrap_or_default();
        event.tags = categories;
        if event.website_url.is_empty() {
            event.website_url = link;
        }
        Ok(event)
    }
}
