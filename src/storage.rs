use crate::error::{Result, ScraperError};
use crate::types::{Event, EventFilter, EventId, Organizer, OrganizerFilter, OrganizerId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Persistence interface the ingestion pipeline writes through.
///
/// Every write is a single-row create or update; no operation spans rows.
#[async_trait]
pub trait Storage: Send + Sync {
    // Event operations
    async fn find_events(&self, filter: &EventFilter) -> Result<Vec<Event>>;
    /// Insert `event`, assign its id and return it.
    async fn create_event(&self, event: &mut Event) -> Result<EventId>;
    /// Overwrite an existing event by id.
    async fn save_event(&self, event: &Event) -> Result<()>;

    // Organizer operations
    async fn find_organizer(&self, filter: &OrganizerFilter) -> Result<Option<Organizer>>;
    async fn create_organizer(&self, organizer: &mut Organizer) -> Result<OrganizerId>;
}

/// In-memory storage implementation for development/testing
#[derive(Default, Clone)]
pub struct InMemoryStorage {
    inner: Arc<Mutex<Tables>>,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    events: BTreeMap<EventId, Event>,
    organizers: BTreeMap<OrganizerId, Organizer>,
    organizer_lookups: usize,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.inner
            .lock()
            .map_err(|_| ScraperError::api("in-memory storage lock poisoned"))
    }

    /// Snapshot of every stored event, in insertion order.
    pub fn events(&self) -> Vec<Event> {
        self.tables()
            .map(|t| t.events.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn organizers(&self) -> Vec<Organizer> {
        self.tables()
            .map(|t| t.organizers.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of `find_organizer` calls served so far.
    pub fn organizer_lookups(&self) -> usize {
        self.tables().map(|t| t.organizer_lookups).unwrap_or_default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn find_events(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        let tables = self.tables()?;
        let limit = filter.limit.unwrap_or(usize::MAX);
        let matching = tables.events.values().filter(|e| filter.matches(e));
        let events = if filter.newest_first {
            matching.rev().take(limit).cloned().collect()
        } else {
            matching.take(limit).cloned().collect()
        };
        Ok(events)
    }

    async fn create_event(&self, event: &mut Event) -> Result<EventId> {
        let mut tables = self.tables()?;
        let id = tables.allocate_id();
        event.id = Some(id);
        tables.events.insert(id, event.clone());

        debug!("Created event: {} with id {}", event.name, id);
        Ok(id)
    }

    async fn save_event(&self, event: &Event) -> Result<()> {
        let event_id = event
            .id
            .ok_or_else(|| ScraperError::api("Cannot save event without ID"))?;

        let mut tables = self.tables()?;
        match tables.events.get_mut(&event_id) {
            Some(stored) => *stored = event.clone(),
            None => return Err(ScraperError::api(format!("No event with id {event_id}"))),
        }

        debug!("Saved event: {} with id {}", event.name, event_id);
        Ok(())
    }

    async fn find_organizer(&self, filter: &OrganizerFilter) -> Result<Option<Organizer>> {
        let mut tables = self.tables()?;
        tables.organizer_lookups += 1;
        Ok(tables
            .organizers
            .values()
            .find(|o| o.name == filter.name && o.email == filter.email)
            .cloned())
    }

    async fn create_organizer(&self, organizer: &mut Organizer) -> Result<OrganizerId> {
        let mut tables = self.tables()?;
        let id = tables.allocate_id();
        organizer.id = Some(id);
        tables.organizers.insert(id, organizer.clone());

        debug!("Created organizer: {} with id {}", organizer.name, id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CandidateEvent;

    fn event(name: &str) -> Event {
        Event::from_candidate(
            CandidateEvent {
                title: name.to_string(),
                date: "June 1".into(),
                location: "Depot Park".into(),
                ..Default::default()
            },
            None,
        )
    }

    #[tokio::test]
    async fn create_assigns_ids_and_find_respects_limit() {
        let storage = InMemoryStorage::new();
        for i in 0..5 {
            let mut e = event(&format!("Market {i}"));
            let id = storage.create_event(&mut e).await.unwrap();
            assert_eq!(e.id, Some(id));
        }
        let filter = EventFilter {
            title_prefix: Some("market".into()),
            limit: Some(3),
            ..Default::default()
        };
        assert_eq!(storage.find_events(&filter).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn save_requires_existing_id() {
        let storage = InMemoryStorage::new();
        let unsaved = event("Orphan");
        assert!(storage.save_event(&unsaved).await.is_err());

        let mut e = event("Market");
        storage.create_event(&mut e).await.unwrap();
        e.latitude = Some(29.6);
        e.longitude = Some(-82.3);
        storage.save_event(&e).await.unwrap();
        assert_eq!(storage.events()[0].latitude, Some(29.6));
    }

    #[tokio::test]
    async fn organizer_lookup_is_exact_on_name_and_email() {
        let storage = InMemoryStorage::new();
        let mut o = Organizer::new("Cade Museum", "info@cade.org", "");
        storage.create_organizer(&mut o).await.unwrap();

        let hit = OrganizerFilter { name: "Cade Museum".into(), email: "info@cade.org".into() };
        let miss = OrganizerFilter { name: "Cade Museum".into(), email: String::new() };
        assert!(storage.find_organizer(&hit).await.unwrap().is_some());
        assert!(storage.find_organizer(&miss).await.unwrap().is_none());
        assert_eq!(storage.organizer_lookups(), 2);
    }
}
