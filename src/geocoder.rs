//! Free-text location → coordinates, with one simplified retry.
//!
//! Locations that lead with a venue name ("Bo Diddley Plaza 111 E University Ave")
//! are retried from the first purely numeric token, which is taken as the start of
//! the street address. Locations that lead with a street number are retried with
//! everything from the first country name onwards cut off. Both policies give up
//! after the retry; no result is a normal outcome, not an error.

use crate::config::GeocoderConfig;
use crate::constants::COUNTRY_TOKENS;
use crate::error::{Result, ScraperError};
use crate::rate_limiter::{Limits, RateLimiter};
use crate::types::GeoPoint;
use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// One search hit. Providers return coordinates as strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeocodeHit {
    pub lat: String,
    pub lon: String,
}

#[async_trait]
pub trait GeocodingClient: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeHit>>;
}

/// Client for the Nominatim `/search` endpoint.
pub struct NominatimClient {
    client: reqwest::Client,
    search_url: String,
    limiter: RateLimiter,
}

impl NominatimClient {
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            search_url: format!("{}/search", config.base_url.trim_end_matches('/')),
            limiter: RateLimiter::new(Limits::per_minute(config.requests_per_min)),
        })
    }
}

#[async_trait]
impl GeocodingClient for NominatimClient {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeHit>> {
        self.limiter.acquire().await;
        let resp = self
            .client
            .get(&self.search_url)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ScraperError::Geocode(format!(
                "search returned {}",
                resp.status().as_u16()
            )));
        }
        Ok(resp.json::<Vec<GeocodeHit>>().await?)
    }
}

static COUNTRY_TOKEN: Lazy<Regex> = Lazy::new(|| {
    let alternatives = COUNTRY_TOKENS
        .iter()
        .map(|c| regex::escape(c))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{alternatives})\b")).expect("valid country regex")
});

/// Drop the leading non-numeric tokens (usually a venue name) so the text starts at
/// the street number. Empty when there is no purely numeric token.
pub fn remove_name_from_location(location: &str) -> String {
    let parts: Vec<&str> = location.split_whitespace().collect();
    parts
        .iter()
        .position(|part| part.chars().all(|c| c.is_ascii_digit()))
        .map(|i| parts[i..].join(" "))
        .unwrap_or_default()
}

/// Cut the text at the first country name and trim the separator left behind.
/// Returns the input unchanged when no country name occurs.
pub fn truncate_at_country(location: &str) -> String {
    match COUNTRY_TOKEN.find(location) {
        Some(m) => location[..m.start()]
            .trim_end_matches(|c: char| c.is_whitespace() || c == ',')
            .to_string(),
        None => location.to_string(),
    }
}

fn parse_hit(hit: &GeocodeHit) -> Option<GeoPoint> {
    let latitude = hit.lat.trim().parse::<f64>().ok()?;
    let longitude = hit.lon.trim().parse::<f64>().ok()?;
    Some(GeoPoint { latitude, longitude })
}

#[derive(Clone)]
pub struct Geocoder {
    client: Arc<dyn GeocodingClient>,
}

impl Geocoder {
    pub fn new(client: Arc<dyn GeocodingClient>) -> Self {
        Self { client }
    }

    /// Resolve `location` to coordinates. `None` covers empty input, provider
    /// failures, empty result sets and unparseable coordinates alike.
    #[instrument(skip(self))]
    pub async fn geocode(&self, location: &str) -> Option<GeoPoint> {
        let location = location.trim();
        let Some(first) = location.chars().next() else {
            debug!("Empty location, nothing to geocode");
            return None;
        };

        if let Some(point) = self.attempt(location).await {
            counter!("gnv_geocode_total", "outcome" => "found").increment(1);
            return Some(point);
        }

        let simplified = if first.is_ascii_digit() {
            truncate_at_country(location)
        } else {
            remove_name_from_location(location)
        };
        if simplified.is_empty() || simplified == location {
            counter!("gnv_geocode_total", "outcome" => "not_found").increment(1);
            return None;
        }

        debug!("Retrying geocode with simplified query '{}'", simplified);
        match self.attempt(&simplified).await {
            Some(point) => {
                counter!("gnv_geocode_total", "outcome" => "found_simplified").increment(1);
                Some(point)
            }
            None => {
                counter!("gnv_geocode_total", "outcome" => "not_found").increment(1);
                None
            }
        }
    }

    async fn attempt(&self, query: &str) -> Option<GeoPoint> {
        match self.client.search(query).await {
            Ok(hits) => match hits.first() {
                Some(hit) => {
                    let point = parse_hit(hit);
                    if point.is_none() {
                        warn!("Unparseable coordinates {:?} for '{}'", hit, query);
                    }
                    point
                }
                None => {
                    debug!("No geocoding results for '{}'", query);
                    None
                }
            },
            Err(e) => {
                warn!("Geocoding '{}' failed: {}", query, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedClient {
        answers: HashMap<String, Vec<GeocodeHit>>,
        failing: Vec<String>,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn answer(mut self, query: &str, lat: &str, lon: &str) -> Self {
            self.answers.insert(
                query.to_string(),
                vec![GeocodeHit { lat: lat.into(), lon: lon.into() }],
            );
            self
        }

        fn fail(mut self, query: &str) -> Self {
            self.failing.push(query.to_string());
            self
        }
    }

    #[async_trait]
    impl GeocodingClient for ScriptedClient {
        async fn search(&self, query: &str) -> Result<Vec<GeocodeHit>> {
            self.queries.lock().unwrap().push(query.to_string());
            if self.failing.iter().any(|q| q == query) {
                return Err(ScraperError::Geocode("service unavailable".into()));
            }
            Ok(self.answers.get(query).cloned().unwrap_or_default())
        }
    }

    fn geocoder(client: ScriptedClient) -> (Geocoder, Arc<ScriptedClient>) {
        let client = Arc::new(client);
        (Geocoder::new(client.clone()), client)
    }

    #[test]
    fn name_is_removed_up_to_street_number() {
        assert_eq!(
            remove_name_from_location("Bo Diddley Plaza 111 E University Ave Gainesville"),
            "111 E University Ave Gainesville"
        );
        assert_eq!(remove_name_from_location("Depot Park"), "");
        // "12th" is not purely numeric
        assert_eq!(remove_name_from_location("Hall 12th St 300 Main"), "300 Main");
    }

    #[test]
    fn truncates_at_first_country_token() {
        assert_eq!(
            truncate_at_country("123 Main St, Springfield, United States"),
            "123 Main St, Springfield"
        );
        assert_eq!(truncate_at_country("10 Downing St London UK SW1A"), "10 Downing St London");
        assert_eq!(truncate_at_country("5 Main St Gainesville USA 32601"), "5 Main St Gainesville");
        // word boundaries keep "US" inside other words intact
        assert_eq!(truncate_at_country("42 Custer Rd"), "42 Custer Rd");
    }

    #[tokio::test]
    async fn full_text_success_needs_one_query() {
        let (g, client) = geocoder(ScriptedClient::default().answer("Depot Park", "29.64", "-82.32"));
        let point = g.geocode("Depot Park").await.unwrap();
        assert_eq!(point, GeoPoint { latitude: 29.64, longitude: -82.32 });
        assert_eq!(client.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn digit_first_falls_back_to_text_before_country() {
        let location = "123 Main St, Springfield, United States";
        let (g, client) = geocoder(
            ScriptedClient::default()
                .fail(location)
                .answer("123 Main St, Springfield", "39.78", "-89.65"),
        );
        let point = g.geocode(location).await.unwrap();
        assert_eq!(point, GeoPoint { latitude: 39.78, longitude: -89.65 });
        assert_eq!(
            *client.queries.lock().unwrap(),
            vec![location.to_string(), "123 Main St, Springfield".to_string()]
        );
    }

    #[tokio::test]
    async fn letter_first_falls_back_to_street_address_on_empty_results() {
        let (g, _) = geocoder(
            ScriptedClient::default().answer("111 E University Ave", "29.65", "-82.32"),
        );
        let point = g.geocode("Bo Diddley Plaza 111 E University Ave").await;
        assert_eq!(point, Some(GeoPoint { latitude: 29.65, longitude: -82.32 }));
    }

    #[tokio::test]
    async fn retry_failure_is_not_found() {
        let (g, client) = geocoder(ScriptedClient::default());
        assert_eq!(g.geocode("9 Elm St, Canada").await, None);
        assert_eq!(client.queries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn no_retry_when_simplification_changes_nothing() {
        let (g, client) = geocoder(ScriptedClient::default());
        assert_eq!(g.geocode("Depot Park").await, None);
        assert_eq!(client.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_location_makes_no_request() {
        let (g, client) = geocoder(ScriptedClient::default());
        assert_eq!(g.geocode("   ").await, None);
        assert!(client.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unparseable_coordinates_count_as_not_found() {
        let (g, _) = geocoder(ScriptedClient::default().answer("Depot Park", "north", "-82.3"));
        assert_eq!(g.geocode("Depot Park").await, None);
    }
}
