use redis::RedisError;
use thiserror::Error;

pub type Result<T, E = GovernanceError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error("Connection failure ({target}): {cause}")]
    ConnectionFailure { target: &'static str, cause: String },

    #[error("Fetch failed: {cause}")]
    FetchFailed { cause: String },

    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Invalid configuration for {key}: {cause}")]
    InvalidConfiguration { key: String, cause: String },

    #[error("Invalid weight: {0:?}")]
    InvalidWeight(String),
}

impl GovernanceError {
    pub fn fetch(cause: impl ToString) -> Self {
        Self::FetchFailed {
            cause: cause.to_string(),
        }
    }
}

impl From<reqwest::Error> for GovernanceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            return Self::ConnectionFailure {
                target: "graph",
                cause: e.to_string(),
            };
        }

        Self::fetch(e)
    }
}

impl From<RedisError> for GovernanceError {
    fn from(e: RedisError) -> Self {
        Self::ConnectionFailure {
            target: "store",
            cause: e.to_string(),
        }
    }
}
