use crate::error::{Result, ScraperError};
use crate::storage::Storage;
use crate::types::{Event, EventFilter, EventId, Organizer, OrganizerFilter, OrganizerId};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS organizers (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    email       TEXT NOT NULL DEFAULT '',
    phone       TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_organizers_name_email ON organizers (name, email);
CREATE TABLE IF NOT EXISTS events (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    name              TEXT NOT NULL,
    date              TEXT NOT NULL,
    location          TEXT NOT NULL,
    description       TEXT NOT NULL DEFAULT '',
    category          TEXT NOT NULL DEFAULT '',
    tags              TEXT NOT NULL DEFAULT '',
    organizer_id      INTEGER REFERENCES organizers (id),
    image_url         TEXT NOT NULL DEFAULT '',
    website           TEXT NOT NULL DEFAULT '',
    tickets_url       TEXT NOT NULL DEFAULT '',
    google_maps_link  TEXT NOT NULL DEFAULT '',
    latitude          REAL,
    longitude         REAL,
    active            INTEGER NOT NULL DEFAULT 1,
    created_at        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_date_location ON events (date, location);
"#;

const EVENT_COLUMNS: &str = "id, name, date, location, description, category, tags, organizer_id, \
     image_url, website, tickets_url, google_maps_link, latitude, longitude, active, created_at";

/// SQLite-backed event store.
///
/// `rusqlite` is blocking, so every call runs on the blocking thread pool behind a
/// single shared connection.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening event store at {}", path.display());
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| ScraperError::api("sqlite connection lock poisoned"))?;
            f(&*guard)
        })
        .await
        .map_err(|e| ScraperError::api(format!("sqlite task failed: {e}")))?
    }
}

/// Escape LIKE wildcards so user text matches literally (with `ESCAPE '\'`).
fn like_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn join_tags(tags: &[String]) -> String {
    tags.join(",")
}

fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let tags: String = row.get(6)?;
    Ok(Event {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        date: row.get(2)?,
        location: row.get(3)?,
        description: row.get(4)?,
        category: row.get(5)?,
        tags: split_tags(&tags),
        organizer_id: row.get(7)?,
        image_url: row.get(8)?,
        website: row.get(9)?,
        tickets_url: row.get(10)?,
        google_maps_link: row.get(11)?,
        latitude: row.get(12)?,
        longitude: row.get(13)?,
        active: row.get(14)?,
        created_at: row.get(15)?,
    })
}

fn build_event_query(filter: &EventFilter) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if let Some(prefix) = &filter.title_prefix {
        clauses.push("name LIKE ? ESCAPE '\\'");
        values.push(format!("{}%", like_escape(prefix)));
    }
    if let Some(date) = &filter.date {
        clauses.push("date LIKE ? ESCAPE '\\'");
        values.push(like_escape(date));
    }
    if let Some(location) = &filter.location {
        clauses.push("location LIKE ? ESCAPE '\\'");
        values.push(like_escape(location));
    }
    if filter.missing_coordinates {
        clauses.push("(latitude IS NULL OR longitude IS NULL)");
    }

    let mut sql = format!("SELECT {EVENT_COLUMNS} FROM events");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(if filter.newest_first { " ORDER BY id DESC" } else { " ORDER BY id" });
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    (sql, values)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn find_events(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        let (sql, values) = build_event_query(filter);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), event_from_row)?;
            let events = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(events)
        })
        .await
    }

    async fn create_event(&self, event: &mut Event) -> Result<EventId> {
        let row = event.clone();
        let id = self
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO events (name, date, location, description, category, tags, organizer_id, \
                     image_url, website, tickets_url, google_maps_link, latitude, longitude, active, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    params![
                        row.name,
                        row.date,
                        row.location,
                        row.description,
                        row.category,
                        join_tags(&row.tags),
                        row.organizer_id,
                        row.image_url,
                        row.website,
                        row.tickets_url,
                        row.google_maps_link,
                        row.latitude,
                        row.longitude,
                        row.active,
                        row.created_at,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        event.id = Some(id);
        debug!("Created event: {} with id {}", event.name, id);
        Ok(id)
    }

    async fn save_event(&self, event: &Event) -> Result<()> {
        let event_id = event
            .id
            .ok_or_else(|| ScraperError::api("Cannot save event without ID"))?;
        let row = event.clone();
        let changed = self
            .with_conn(move |conn| {
                Ok(conn.execute(
                    "UPDATE events SET name = ?1, date = ?2, location = ?3, description = ?4, category = ?5, \
                     tags = ?6, organizer_id = ?7, image_url = ?8, website = ?9, tickets_url = ?10, \
                     google_maps_link = ?11, latitude = ?12, longitude = ?13, active = ?14 WHERE id = ?15",
                    params![
                        row.name,
                        row.date,
                        row.location,
                        row.description,
                        row.category,
                        join_tags(&row.tags),
                        row.organizer_id,
                        row.image_url,
                        row.website,
                        row.tickets_url,
                        row.google_maps_link,
                        row.latitude,
                        row.longitude,
                        row.active,
                        event_id,
                    ],
                )?)
            })
            .await?;
        if changed == 0 {
            return Err(ScraperError::api(format!("No event with id {event_id}")));
        }
        debug!("Saved event: {} with id {}", event.name, event_id);
        Ok(())
    }

    async fn find_organizer(&self, filter: &OrganizerFilter) -> Result<Option<Organizer>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let organizer = conn
                .query_row(
                    "SELECT id, name, email, phone, created_at FROM organizers \
                     WHERE name = ?1 AND email = ?2 ORDER BY id LIMIT 1",
                    params![filter.name, filter.email],
                    |row| {
                        Ok(Organizer {
                            id: Some(row.get(0)?),
                            name: row.get(1)?,
                            email: row.get(2)?,
                            phone: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(organizer)
        })
        .await
    }

    async fn create_organizer(&self, organizer: &mut Organizer) -> Result<OrganizerId> {
        let row = organizer.clone();
        let id = self
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO organizers (name, email, phone, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![row.name, row.email, row.phone, row.created_at],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        organizer.id = Some(id);
        debug!("Created organizer: {} with id {}", organizer.name, id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateEvent, GeoPoint};
    use tempfile::tempdir;

    fn event(name: &str, location: &str) -> Event {
        Event::from_candidate(
            CandidateEvent {
                title: name.to_string(),
                date: "Saturday, June 7".into(),
                location: location.to_string(),
                tags: vec!["Music".into(), "Outdoors".into()],
                ..Default::default()
            },
            None,
        )
    }

    #[test]
    fn like_escape_neutralises_wildcards() {
        assert_eq!(like_escape("100%_fun\\"), "100\\%\\_fun\\\\");
    }

    #[tokio::test]
    async fn events_round_trip_through_sqlite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.db");
        let storage = SqliteStorage::open(&path).unwrap();

        let mut organizer = Organizer::new("Heartwood Soundstage", "", "352-555-0100");
        let organizer_id = storage.create_organizer(&mut organizer).await.unwrap();

        let mut e = event("Swamp Jazz Night", "619 S Main St");
        e.organizer_id = Some(organizer_id);
        let id = storage.create_event(&mut e).await.unwrap();

        e.set_coordinates(GeoPoint { latitude: 29.64, longitude: -82.32 });
        storage.save_event(&e).await.unwrap();

        // reopen to make sure it was written to disk
        drop(storage);
        let storage = SqliteStorage::open(&path).unwrap();
        let found = storage
            .find_events(&EventFilter {
                title_prefix: Some("swamp".into()),
                date: Some("SATURDAY, JUNE 7".into()),
                location: Some("619 s main st".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, Some(id));
        assert_eq!(found[0].organizer_id, Some(organizer_id));
        assert_eq!(found[0].tags, vec!["Music".to_string(), "Outdoors".to_string()]);
        assert_eq!(found[0].coordinates(), Some(GeoPoint { latitude: 29.64, longitude: -82.32 }));
    }

    #[tokio::test]
    async fn missing_coordinates_and_limit_filters() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        for i in 0..4 {
            let mut e = event(&format!("Show {i}"), "Depot Park");
            storage.create_event(&mut e).await.unwrap();
            if i == 0 {
                e.set_coordinates(GeoPoint { latitude: 1.0, longitude: 2.0 });
                storage.save_event(&e).await.unwrap();
            }
        }
        let pending = storage
            .find_events(&EventFilter { missing_coordinates: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(pending.len(), 3);

        let limited = storage
            .find_events(&EventFilter { limit: Some(2), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].name, "Show 0");

        let newest = storage
            .find_events(&EventFilter { newest_first: true, limit: Some(2), ..Default::default() })
            .await
            .unwrap();
        let names: Vec<_> = newest.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Show 3", "Show 2"]);
    }

    #[tokio::test]
    async fn organizer_lookup_matches_name_and_email() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut o = Organizer::new("Santa Fe College", "events@sfcollege.edu", "");
        let id = storage.create_organizer(&mut o).await.unwrap();

        let found = storage
            .find_organizer(&OrganizerFilter {
                name: "Santa Fe College".into(),
                email: "events@sfcollege.edu".into(),
            })
            .await
            .unwrap();
        assert_eq!(found.and_then(|o| o.id), Some(id));

        let missing = storage
            .find_organizer(&OrganizerFilter { name: "Santa Fe College".into(), email: String::new() })
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn saving_unknown_event_fails() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut e = event("Ghost", "Nowhere");
        e.id = Some(99);
        assert!(storage.save_event(&e).await.is_err());
    }
}
