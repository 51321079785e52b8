use crate::error::Result;
use crate::storage::Storage;
use crate::types::{Organizer, OrganizerFilter, OrganizerId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Per-crawl memo of organizers already resolved, keyed by (name, email).
///
/// One cache lives for one crawl run; concurrent crawls each own theirs.
#[derive(Debug, Default)]
pub struct OrganizerCache {
    resolved: HashMap<OrganizerFilter, OrganizerId>,
}

impl OrganizerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

/// Find-or-create for organizers. The store stays the source of truth across runs;
/// the cache only saves round-trips within one.
#[derive(Clone)]
pub struct OrganizerResolver {
    storage: Arc<dyn Storage>,
}

impl OrganizerResolver {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    #[instrument(skip(self, cache))]
    pub async fn resolve(
        &self,
        cache: &mut OrganizerCache,
        name: &str,
        email: &str,
        phone: &str,
    ) -> Result<Option<OrganizerId>> {
        let name = name.trim();
        if name.is_empty() {
            info!("No organizer name, event will be stored without an organizer");
            return Ok(None);
        }

        let key = OrganizerFilter {
            name: name.to_string(),
            email: email.trim().to_string(),
        };
        if let Some(id) = cache.resolved.get(&key) {
            debug!("Organizer '{}' already resolved this run ({})", name, id);
            return Ok(Some(*id));
        }

        let id = match self.storage.find_organizer(&key).await? {
            Some(Organizer { id: Some(id), .. }) => {
                debug!("Found existing organizer: {} ({})", name, id);
                id
            }
            _ => {
                let mut organizer = Organizer::new(&key.name, &key.email, phone.trim());
                let id = self.storage.create_organizer(&mut organizer).await?;
                info!("Created new organizer: {} ({})", name, id);
                id
            }
        };

        cache.resolved.insert(key, id);
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    #[tokio::test]
    async fn empty_name_resolves_to_none() {
        let storage = Arc::new(InMemoryStorage::new());
        let resolver = OrganizerResolver::new(storage.clone());
        let mut cache = OrganizerCache::new();
        assert_eq!(resolver.resolve(&mut cache, "  ", "", "").await.unwrap(), None);
        assert!(storage.organizers().is_empty());
    }

    #[tokio::test]
    async fn same_pair_twice_in_one_run_creates_once() {
        let storage = Arc::new(InMemoryStorage::new());
        let resolver = OrganizerResolver::new(storage.clone());
        let mut cache = OrganizerCache::new();

        let first = resolver
            .resolve(&mut cache, "Gainesville Arts Council", "hello@gac.org", "")
            .await
            .unwrap();
        let second = resolver
            .resolve(&mut cache, "Gainesville Arts Council", "hello@gac.org", "")
            .await
            .unwrap();

        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(storage.organizers().len(), 1);
        // second call never reached the store
        assert_eq!(storage.organizer_lookups(), 1);
    }

    #[tokio::test]
    async fn later_run_reuses_stored_organizer() {
        let storage = Arc::new(InMemoryStorage::new());
        let resolver = OrganizerResolver::new(storage.clone());

        let first = resolver
            .resolve(&mut OrganizerCache::new(), "Cade Museum", "", "352-555-0199")
            .await
            .unwrap();
        let second = resolver
            .resolve(&mut OrganizerCache::new(), "Cade Museum", "", "")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(storage.organizers().len(), 1);
        assert_eq!(storage.organizers()[0].phone, "352-555-0199");
    }

    #[tokio::test]
    async fn different_email_is_a_different_organizer() {
        let storage = Arc::new(InMemoryStorage::new());
        let resolver = OrganizerResolver::new(storage.clone());
        let mut cache = OrganizerCache::new();

        let a = resolver.resolve(&mut cache, "UF Performing Arts", "a@ufl.edu", "").await.unwrap();
        let b = resolver.resolve(&mut cache, "UF Performing Arts", "b@ufl.edu", "").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }
}
