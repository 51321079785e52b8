use crate::config::CrawlConfig;
use crate::error::{Result, ScraperError};
use crate::rate_limiter::{Limits, RateLimiter};
use async_trait::async_trait;
use metrics::{counter, histogram};
use std::time::Instant;
use tracing::{debug, instrument};

/// Issues GET requests against upstream sites and returns the body text.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String>;
}

/// `reqwest`-backed fetcher with a per-call timeout, a fixed User-Agent and a
/// shared request-rate limit.
pub struct ReqwestFetcher {
    client: reqwest::Client,
    limiter: RateLimiter,
}

impl ReqwestFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            limiter: RateLimiter::new(
                Limits::per_minute(config.requests_per_min).with_burst(config.request_burst),
            ),
        })
    }
}

#[async_trait]
impl SourceFetcher for ReqwestFetcher {
    #[instrument(skip(self))]
    async fn get_text(&self, url: &str) -> Result<String> {
        self.limiter.acquire().await;
        let t0 = Instant::now();
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            counter!("gnv_fetch_errors_total").increment(1);
            return Err(ScraperError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.text().await?;
        histogram!("gnv_fetch_duration_seconds").record(t0.elapsed().as_secs_f64());
        debug!("Fetched {} bytes", body.len());
        Ok(body)
    }
}
