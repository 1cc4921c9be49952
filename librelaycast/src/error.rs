//! Error types for Relaycast

use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            RelayError::Config(_) => 2,
            RelayError::Store(StoreError::InvalidEndpoint(_)) => 2,
            RelayError::Platform(PlatformError::Authentication(_)) => 2,
            _ => 1,
        }
    }

    /// Whether this error aborts the whole poll cycle rather than a single item.
    ///
    /// Only a failed feed listing is cycle-fatal; everything else is handled
    /// per item by the pipeline.
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(self, RelayError::Feed(_))
    }

    /// The platform rate-limit reset time, if this is a rate-limit error.
    pub fn rate_limit_reset(&self) -> Option<Option<DateTime<Utc>>> {
        match self {
            RelayError::Platform(PlatformError::RateLimit { reset_at, .. }) => Some(*reset_at),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required environment variable: {0}")]
    MissingCredential(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Invalid store endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed request failed: {0}")]
    Network(String),

    #[error("Feed returned HTTP {status} for {community}")]
    Status { community: String, status: u16 },

    #[error("Failed to parse feed listing: {0}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to read image body from {url}: {reason}")]
    Read { url: String, reason: String },

    #[error("Image at {url} is {size} bytes, over the {limit} byte limit")]
    TooLarge { url: String, size: usize, limit: usize },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        reset_at: Option<DateTime<Utc>>,
    },
}

impl PlatformError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, PlatformError::RateLimit { .. })
    }
}
