pub mod apis;
pub mod config;
pub mod constants;
pub mod db;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod geocoder;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod organizer;
pub mod pipeline;
pub mod rate_limiter;
pub mod server;
pub mod storage;
pub mod tasks;
pub mod text;
pub mod types;
