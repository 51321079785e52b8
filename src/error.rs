use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("API error: {message}")]
    Api { message: String },

    #[error("GET {url} returned {status}")]
    Status { url: String, status: u16 },

    #[error("Geocoding failed: {0}")]
    Geocode(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),
}

impl ScraperError {
    pub fn api(message: impl Into<String>) -> Self {
        ScraperError::Api {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;
