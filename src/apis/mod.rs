pub mod gainesville_sun;
pub mod visit_gainesville;

use crate::constants::{
    self, BOILERPLATE_PREFIXES, BOILERPLATE_TAGS, CATEGORY_PREFIXES, GOOGLE_MAPS_URL,
};
use crate::error::Result;
use crate::fetch::SourceFetcher;
use crate::text::title_case;
use crate::types::{CandidateEvent, RawItem};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub use gainesville_sun::GainesvilleSunCrawler;
pub use visit_gainesville::VisitGainesvilleCrawler;

/// Core trait that all upstream event sources implement.
///
/// A source is driven page by page: the orchestrator fetches `page_url(n)`, splits
/// the body with `list_items`, and hands each item to `extract`. Sources keep no
/// state between pages.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Unique identifier for this source
    fn source_name(&self) -> &'static str;

    /// Index of the first listing page.
    fn first_page(&self) -> u32;

    /// Page cap used when the configuration does not name one.
    fn default_max_pages(&self) -> u32;

    fn page_url(&self, page: u32) -> String;

    /// Split a listing page into raw items. An empty list ends the crawl.
    fn list_items(&self, body: &str) -> Result<Vec<RawItem>>;

    /// Stable identifier for an item, used in logs.
    fn item_key(&self, _item: &RawItem) -> Option<String> {
        None
    }

    /// Turn one raw item into a candidate event, fetching detail pages if needed.
    async fn extract(&self, item: &RawItem, fetcher: &dyn SourceFetcher) -> Result<CandidateEvent>;
}

/// Build a source by name.
pub fn create_source(name: &str) -> Option<Arc<dyn EventSource>> {
    match name {
        constants::VISIT_GAINESVILLE_API => Some(Arc::new(VisitGainesvilleCrawler::new())),
        constants::GAINESVILLE_SUN_API => Some(Arc::new(GainesvilleSunCrawler::new())),
        _ => None,
    }
}

/// Decode a field that upstream sends either as one object or as a list of them.
/// `None` when it is neither.
pub fn decode_one_or_many<T: DeserializeOwned>(value: &Value) -> Option<Vec<T>> {
    if let Ok(one) = T::deserialize(value) {
        return Some(vec![one]);
    }
    Vec::<T>::deserialize(value).ok()
}

/// Turn a site's classification list into category names: boilerplate tokens are
/// dropped, known prefixes stripped, the rest title-cased and de-duplicated.
pub fn classify_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in tokens {
        let lower = raw.trim().to_lowercase();
        if lower.is_empty()
            || BOILERPLATE_TAGS.contains(&lower.as_str())
            || BOILERPLATE_PREFIXES.iter().any(|p| lower.starts_with(p))
        {
            continue;
        }
        let stem = CATEGORY_PREFIXES
            .iter()
            .find_map(|p| lower.strip_prefix(p))
            .unwrap_or(&lower);
        let name = title_case(&stem.replace(|c: char| c == '-' || c == '_', " "));
        if name.is_empty() || BOILERPLATE_TAGS.contains(&name.to_lowercase().as_str()) {
            continue;
        }
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Google Maps search link for an address; empty for an empty address.
pub fn google_maps_link(location: &str) -> String {
    if location.trim().is_empty() {
        return String::new();
    }
    reqwest::Url::parse_with_params(GOOGLE_MAPS_URL, &[("q", format!("address={location}"))])
        .map(|url| url.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Original {
        url: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Image {
        original: Original,
    }

    #[test]
    fn decodes_single_object() {
        let value = serde_json::json!({"original": {"url": "https://img/1.jpg"}});
        let images: Vec<Image> = decode_one_or_many(&value).unwrap();
        assert_eq!(images[0].original.url, "https://img/1.jpg");
    }

    #[test]
    fn decodes_list() {
        let value = serde_json::json!([
            {"original": {"url": "https://img/1.jpg"}},
            {"original": {"url": "https://img/2.jpg"}}
        ]);
        let images: Vec<Image> = decode_one_or_many(&value).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[1].original.url, "https://img/2.jpg");
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(decode_one_or_many::<Image>(&serde_json::json!("nope")).is_none());
        assert!(decode_one_or_many::<Image>(&Value::Null).is_none());
    }

    #[test]
    fn classification_drops_boilerplate_and_title_cases() {
        let tokens = [
            "post-8812",
            "tribe_events",
            "type-tribe_events",
            "status-publish",
            "hentry",
            "tribe_events_cat-live-music",
            "tribe_events_cat-food_and_drink",
            "tag-family",
            "tag-FAMILY",
            "tribe-events-last",
        ];
        assert_eq!(
            classify_tokens(tokens),
            vec!["Live Music".to_string(), "Food And Drink".to_string(), "Family".to_string()]
        );
    }

    #[test]
    fn maps_link_encodes_address() {
        let link = google_maps_link("3000 SW 35th Pl Gainesville FL");
        assert!(link.starts_with("https://www.google.com/maps?q=address"));
        assert!(link.contains("3000"));
        assert!(!link.contains(' '));
        assert_eq!(google_maps_link("  "), "");
    }

    #[test]
    fn known_sources_are_registered() {
        for name in constants::get_supported_sources() {
            let source = create_source(name).unwrap();
            assert_eq!(source.source_name(), name);
        }
        assert!(create_source("eventbrite").is_none());
    }
}
