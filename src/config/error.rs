//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid socket address: {0}")]
    InvalidSocketAddr(String),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Relay batch size must be between 1 and 10000")]
    InvalidBatchSize,

    #[error("Relay poll interval must be between 10ms and 60s")]
    InvalidPollInterval,

    #[error("Relay max_concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("Relay partition index {index} out of range for {count} partitions")]
    InvalidPartition { index: u32, count: u32 },

    #[error("Backoff base must be positive and not exceed the maximum")]
    InvalidBackoff,

    #[error("Relay retention must be between 1 hour and 1 year")]
    InvalidRetention,

    #[error("Relay cleanup interval must be between 1s and 1 day")]
    InvalidCleanupInterval,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Stream name must not be empty")]
    EmptyStreamName,

    #[error("max_payload_bytes must be positive")]
    InvalidPayloadLimit,
}
