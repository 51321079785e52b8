//! Gainesville Sun community calendar, served by the evvnt publisher API.
//!
//! One JSON page carries a `rawEvents` array with everything needed; no detail
//! pages are fetched.

use super::{decode_one_or_many, google_maps_link, EventSource};
use crate::constants::{
    BOILERPLATE_TAGS, GAINESVILLE_SUN_API, GAINESVILLE_SUN_LISTING_URL, GAINESVILLE_SUN_MAX_PAGES,
};
use crate::error::{Result, ScraperError};
use crate::fetch::SourceFetcher;
use crate::text::{clean, strip_all_whitespace};
use crate::types::{CandidateEvent, GeoPoint, RawItem};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct EvvntPage {
    #[serde(rename = "rawEvents", default)]
    raw_events: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EvvntEvent {
    title: Option<String>,
    start_date: Option<String>,
    description: Option<String>,
    keywords: Option<String>,
    category_name: Option<String>,
    organiser_name: Option<String>,
    organiser_email: Option<String>,
    contact_email: Option<String>,
    organiser_phone: Option<String>,
    contact_number: Option<String>,
    venue: Option<EvvntVenue>,
    links: Option<EvvntLinks>,
    images: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EvvntVenue {
    name: Option<String>,
    address_1: Option<String>,
    address_2: Option<String>,
    town: Option<String>,
    country: Option<String>,
    post_code: Option<String>,
    latitude: Option<Value>,
    longitude: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EvvntLinks {
    #[serde(rename = "Tickets")]
    tickets: Option<String>,
    #[serde(rename = "Website")]
    website: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EvvntImage {
    original: EvvntImageOriginal,
}

#[derive(Debug, Deserialize)]
struct EvvntImageOriginal {
    url: String,
}

pub struct GainesvilleSunCrawler;

impl Default for GainesvilleSunCrawler {
    fn default() -> Self {
        Self::new()
    }
}

impl GainesvilleSunCrawler {
    pub fn new() -> Self {
        Self
    }

    /// Map one `rawEvents` entry to a candidate. Title and start date are required.
    pub fn parse_event(&self, raw: &RawItem) -> Result<CandidateEvent> {
        let event: EvvntEvent = serde_json::from_value(raw.clone())?;

        let title = clean(event.title.as_deref().unwrap_or_default());
        if title.is_empty() {
            return Err(ScraperError::MissingField("title not found".into()));
        }
        let date = clean(event.start_date.as_deref().unwrap_or_default());
        if date.is_empty() {
            return Err(ScraperError::MissingField("start_date not found".into()));
        }

        let venue = event.venue.unwrap_or_default();
        let location = clean(
            &[
                &venue.address_1,
                &venue.address_2,
                &venue.town,
                &venue.country,
                &venue.post_code,
            ]
            .iter()
            .map(|part| part.as_deref().unwrap_or_default())
            .collect::<Vec<_>>()
            .join(" "),
        );
        if location.is_empty() {
            debug!("Event '{}' has no venue address (venue name {:?})", title, venue.name);
        }
        let coordinates = match (
            venue.latitude.as_ref().and_then(coordinate),
            venue.longitude.as_ref().and_then(coordinate),
        ) {
            (Some(latitude), Some(longitude)) if latitude != 0.0 && longitude != 0.0 => {
                Some(GeoPoint { latitude, longitude })
            }
            _ => None,
        };

        let links = event.links.unwrap_or_default();
        let organizer_email = event
            .organiser_email
            .or(event.contact_email)
            .unwrap_or_default();
        let organizer_phone = event
            .organiser_phone
            .or(event.contact_number)
            .unwrap_or_default();

        Ok(CandidateEvent {
            google_maps_link: google_maps_link(&location),
            title,
            date,
            location,
            description: clean(event.description.as_deref().unwrap_or_default()),
            category: clean(event.category_name.as_deref().unwrap_or_default()),
            tags: keyword_tags(event.keywords.as_deref().unwrap_or_default()),
            organizer_name: clean(event.organiser_name.as_deref().unwrap_or_default()),
            organizer_email: organizer_email.trim().to_string(),
            organizer_phone: organizer_phone.trim().to_string(),
            image_url: first_image_url(event.images.as_ref()),
            website_url: links.website.unwrap_or_default(),
            tickets_url: links.tickets.unwrap_or_default(),
            coordinates,
        })
    }
}

/// Comma-separated keywords → tags with no whitespace and no boilerplate.
fn keyword_tags(keywords: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for keyword in keywords.split(',') {
        let tag = strip_all_whitespace(keyword);
        if tag.is_empty() || BOILERPLATE_TAGS.contains(&tag.to_lowercase().as_str()) {
            continue;
        }
        if !tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            tags.push(tag);
        }
    }
    tags
}

/// Evvnt sends `images` as one object or a list; anything else leaves the image empty.
fn first_image_url(images: Option<&Value>) -> String {
    let Some(images) = images.filter(|v| !v.is_null()) else {
        return String::new();
    };
    match decode_one_or_many::<EvvntImage>(images) {
        Some(list) => list
            .into_iter()
            .next()
            .map(|image| image.original.url)
            .unwrap_or_default(),
        None => {
            warn!("Unrecognised images field: {}", images);
            String::new()
        }
    }
}

fn coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait::async_trait]
impl EventSource for GainesvilleSunCrawler {
    fn source_name(&self) -> &'static str {
        GAINESVILLE_SUN_API
    }

    fn first_page(&self) -> u32 {
        0
    }

    fn default_max_pages(&self) -> u32 {
        GAINESVILLE_SUN_MAX_PAGES
    }

    fn page_url(&self, page: u32) -> String {
        GAINESVILLE_SUN_LISTING_URL.replace("{page}", &page.to_string())
    }

    fn list_items(&self, body: &str) -> Result<Vec<RawItem>> {
        let page: EvvntPage = serde_json::from_str(body)?;
        Ok(page.raw_events)
    }

    fn item_key(&self, item: &RawItem) -> Option<String> {
        match item.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    async fn extract(&self, item: &RawItem, _fetcher: &dyn SourceFetcher) -> Result<CandidateEvent> {
        self.parse_event(item)
    }
}
