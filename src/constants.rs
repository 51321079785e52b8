/// Source name constants to ensure consistency across the codebase.
/// These are the names accepted on the CLI, by `/admin/ingest/:source` and in
/// `[crawl.max_pages]`.
pub const VISIT_GAINESVILLE_API: &str = "visit_gainesville";
pub const GAINESVILLE_SUN_API: &str = "gainesville_sun";

pub const VISIT_GAINESVILLE_LISTING_URL: &str = "https://www.visitgainesville.com/wp-json/wp/v2/tribe_events?order=asc&page={page}&per_page=12&orderby=date";
pub const GAINESVILLE_SUN_LISTING_URL: &str = "https://discovery.evvnt.com/api/publisher/458/home_page_events?hitsPerPage=30&multipleEventInstances=true&page={page}&publisher_id=458";

/// Default page caps. A cap counts pages fetched starting at the source's first
/// page index, so the Sun crawl reads pages 0 through 5.
pub const VISIT_GAINESVILLE_MAX_PAGES: u32 = 2;
pub const GAINESVILLE_SUN_MAX_PAGES: u32 = 6;

pub const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org/";
pub const GOOGLE_MAPS_URL: &str = "https://www.google.com/maps";

/// Country names that end the useful part of a street address.
/// Longer names come first so "United States" wins over "US".
pub const COUNTRY_TOKENS: &[&str] = &[
    "United States",
    "United Kingdom",
    "USA",
    "Canada",
    "US",
    "UK",
];

/// Site-wide classification tokens that carry no category information.
pub const BOILERPLATE_TAGS: &[&str] = &[
    "tribe_events",
    "type-tribe_events",
    "status-publish",
    "hentry",
    "has-post-thumbnail",
    "format-standard",
    "events",
    "event",
    "featured",
    "gainesville",
    "visit gainesville",
    "uncategorized",
];

/// Token prefixes that are pure boilerplate ("post-1234", "tribe-events-...").
pub const BOILERPLATE_PREFIXES: &[&str] = &["post-", "tribe-events-", "tribe_events_venue-", "tribe_events_organizer-"];

/// Prefixes whose remainder is a real category or tag name.
pub const CATEGORY_PREFIXES: &[&str] = &["tribe_events_cat-", "cat_", "category-", "tag-"];

/// Get all supported source names
pub fn get_supported_sources() -> Vec<&'static str> {
    vec![VISIT_GAINESVILLE_API, GAINESVILLE_SUN_API]
}
