use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw item as returned from an upstream listing page.
pub type RawItem = serde_json::Value;

pub type EventId = i64;
pub type OrganizerId = i64;

/// A resolved coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// An event as parsed from an upstream source, before any persistence.
///
/// Optional upstream fields are carried as empty strings rather than `Option` so the
/// store receives the same shape whatever the source provided.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvent {
    pub title: String,
    pub date: String,
    pub location: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub organizer_name: String,
    pub organizer_email: String,
    pub organizer_phone: String,
    pub image_url: String,
    pub website_url: String,
    pub tickets_url: String,
    pub google_maps_link: String,
    /// Coordinates published by the source itself, if any.
    pub coordinates: Option<GeoPoint>,
}

/// A persisted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<EventId>,
    pub name: String,
    pub date: String,
    pub location: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub organizer_id: Option<OrganizerId>,
    pub image_url: String,
    pub website: String,
    pub tickets_url: String,
    pub google_maps_link: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn from_candidate(candidate: CandidateEvent, organizer_id: Option<OrganizerId>) -> Self {
        Self {
            id: None,
            name: candidate.title,
            date: candidate.date,
            location: candidate.location,
            description: candidate.description,
            category: candidate.category,
            tags: candidate.tags,
            organizer_id,
            image_url: candidate.image_url,
            website: candidate.website_url,
            tickets_url: candidate.tickets_url,
            google_maps_link: candidate.google_maps_link,
            latitude: None,
            longitude: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn coordinates(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint { latitude, longitude }),
            _ => None,
        }
    }

    pub fn set_coordinates(&mut self, point: GeoPoint) {
        self.latitude = Some(point.latitude);
        self.longitude = Some(point.longitude);
    }
}

/// An organizer in the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organizer {
    pub id: Option<OrganizerId>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

impl Organizer {
    pub fn new(name: &str, email: &str, phone: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Store-side filter for events. Text comparisons are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    /// Event name must start with this text.
    pub title_prefix: Option<String>,
    pub date: Option<String>,
    pub location: Option<String>,
    /// Only events that have not been geocoded yet.
    pub missing_coordinates: bool,
    /// Return the most recently stored events first.
    pub newest_first: bool,
    pub limit: Option<usize>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        let title_ok = self.title_prefix.as_ref().map_or(true, |prefix| {
            event.name.to_lowercase().starts_with(&prefix.to_lowercase())
        });
        let date_ok = self
            .date
            .as_ref()
            .map_or(true, |date| event.date.eq_ignore_ascii_case(date));
        let location_ok = self
            .location
            .as_ref()
            .map_or(true, |location| event.location.eq_ignore_ascii_case(location));
        let coords_ok = !self.missing_coordinates || event.coordinates().is_none();
        title_ok && date_ok && location_ok && coords_ok
    }
}

/// Exact-match organizer lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrganizerFilter {
    pub name: String,
    pub email: String,
}

/// Emitted once per newly created event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCreated {
    pub event_id: EventId,
    pub name: String,
}
