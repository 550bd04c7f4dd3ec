#[derive(Debug, thiserror::Error)]
pub enum LoadTestError {
    #[error("Health check failed: expected 200 from /healthz, got {status}")]
    HealthCheckFailed { status: u16 },
    #[error("Failed to create short URL. Status: {status}, Body: {body}")]
    CreateLinkFailed { status: u16, body: String },
    #[error("Invalid fixture from create response: {0}")]
    InvalidFixture(String),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Could not retrieve statistics from server. Status: {status}, Body: {body}")]
    StatsUnavailable { status: u16, body: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Virtual client task failed: {0}")]
    WorkerPanicked(String),
    #[error("Result file error: {0}")]
    ResultFile(String),
}

impl LoadTestError {
    /// True for faults raised while provisioning the shared fixture.
    /// When one of these is returned no work unit has been dispatched.
    pub fn is_setup_fault(&self) -> bool {
        matches!(
            self,
            LoadTestError::HealthCheckFailed { .. }
                | LoadTestError::CreateLinkFailed { .. }
                | LoadTestError::InvalidFixture(_)
        )
    }
}

impl From<reqwest::Error> for LoadTestError {
    fn from(err: reqwest::Error) -> Self {
        LoadTestError::Transport(err.to_string())
    }
}
