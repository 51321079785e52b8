use crate::config::DedupConfig;
use crate::storage::Storage;
use crate::types::EventFilter;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// True when `existing` is the same title as `new`, exactly or within `threshold`
/// case-insensitive edits.
pub fn titles_match(new: &str, existing: &str, threshold: usize) -> bool {
    if new == existing {
        return true;
    }
    strsim::levenshtein(&new.to_lowercase(), &existing.to_lowercase()) <= threshold
}

/// Decides whether a candidate event is already stored.
///
/// Candidates are pre-filtered in the store on date and location only, newest first
/// and capped at `candidate_limit`, then every title is compared by edit distance. Store errors
/// count as "not a duplicate" so a flaky store never stalls a crawl.
#[derive(Clone)]
pub struct DuplicateDetector {
    storage: Arc<dyn Storage>,
    threshold: usize,
    candidate_limit: usize,
}

impl DuplicateDetector {
    pub fn new(storage: Arc<dyn Storage>, config: &DedupConfig) -> Self {
        Self {
            storage,
            threshold: config.threshold,
            candidate_limit: config.candidate_limit,
        }
    }

    /// Same day and place, newest first. Titles are left to `titles_match`.
    fn candidate_filter(&self, date: &str, location: &str) -> EventFilter {
        EventFilter {
            title_prefix: None,
            date: Some(date.to_string()),
            location: Some(location.to_string()),
            missing_coordinates: false,
            newest_first: true,
            limit: Some(self.candidate_limit),
        }
    }

    #[instrument(skip(self))]
    pub async fn is_duplicate(&self, title: &str, date: &str, location: &str) -> bool {
        let filter = self.candidate_filter(date, location);
        let candidates = match self.storage.find_events(&filter).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Duplicate lookup failed, treating as new: {}", e);
                return false;
            }
        };
        debug!("Comparing against {} stored candidates", candidates.len());

        match candidates
            .iter()
            .find(|existing| titles_match(title, &existing.name, self.threshold))
        {
            Some(existing) => {
                info!(
                    "Duplicate found, event not inserted: '{}' matches stored '{}'",
                    title, existing.name
                );
                true
            }
            None => false,
        }
    }
}
