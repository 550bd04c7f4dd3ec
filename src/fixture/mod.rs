// Fixture provisioning and distribution
//
// The fixture is the short code every virtual client redirects through.
// It is created exactly once, before any client exists, and is read-only
// from then on.

use std::sync::Arc;
use std::time::SystemTime;

use tracing::{error, info};

use crate::api::{self, CreateLinkResponse, STATUS_OK};
use crate::config::Config;
use crate::error::LoadTestError;
use crate::transport::HttpTransport;

/// Shared resource under concurrent test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    pub short_code: String,
    pub long_url: String,
    pub created_at: SystemTime,
}

impl Fixture {
    pub fn new(short_code: impl Into<String>, long_url: impl Into<String>) -> Self {
        Self {
            short_code: short_code.into(),
            long_url: long_url.into(),
            created_at: SystemTime::now(),
        }
    }
}

/// Probe the target and create the shared short link.
///
/// Every failure here is fatal and nothing is retried: a missing or
/// malformed fixture means no work unit can run meaningfully.
pub async fn provision(
    transport: &dyn HttpTransport,
    config: &Config,
) -> Result<Fixture, LoadTestError> {
    info!(base_url = %config.base_url, "testing click count accuracy");

    let health = match transport.send(&api::health_request()).await {
        Ok(resp) => resp,
        Err(e) => {
            error!(error = %e, "server is not reachable");
            return Err(LoadTestError::HealthCheckFailed { status: 0 });
        }
    };
    if health.status != STATUS_OK {
        error!(status = health.status, "server health check failed");
        return Err(LoadTestError::HealthCheckFailed {
            status: health.status,
        });
    }
    info!("server health check passed");

    let created = transport
        .send(&api::create_link_request(&config.long_url, config.ttl_seconds))
        .await
        .map_err(|e| LoadTestError::CreateLinkFailed {
            status: 0,
            body: e.to_string(),
        })?;
    if created.status != STATUS_OK {
        error!(status = created.status, body = %created.body, "failed to create short URL");
        return Err(LoadTestError::CreateLinkFailed {
            status: created.status,
            body: created.body,
        });
    }

    let parsed: CreateLinkResponse = serde_json::from_str(&created.body)
        .map_err(|e| LoadTestError::InvalidFixture(format!("{} (body: {})", e, created.body)))?;
    let short_code = parsed.short_code;
    if short_code.trim().is_empty() {
        return Err(LoadTestError::InvalidFixture("short_code is empty".to_string()));
    }
    if short_code.trim() != short_code {
        return Err(LoadTestError::InvalidFixture(format!(
            "short_code has surrounding whitespace: {:?}",
            short_code
        )));
    }

    info!(short_code = %short_code, "setup complete");
    Ok(Fixture::new(short_code, config.long_url.clone()))
}

/// Hands the same immutable fixture to a fixed number of virtual clients.
///
/// Construction takes the provisioned fixture by value, so a broadcast can
/// only exist once provisioning has succeeded.
#[derive(Debug)]
pub struct FixtureBroadcast {
    fixture: Arc<Fixture>,
    population: usize,
}

impl FixtureBroadcast {
    pub fn new(fixture: Fixture, population: usize) -> Self {
        Self {
            fixture: Arc::new(fixture),
            population,
        }
    }

    pub fn fixture(&self) -> &Fixture {
        &self.fixture
    }

    pub fn population(&self) -> usize {
        self.population
    }

    /// One read-only handle per virtual client, all pointing at one value.
    pub fn handles(&self) -> Vec<Arc<Fixture>> {
        (0..self.population).map(|_| Arc::clone(&self.fixture)).collect()
    }
}
