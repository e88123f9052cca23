//! Publisher configuration

use serde::Deserialize;

use crate::adapters::publishers::RedisStreamConfig;

use super::error::ValidationError;

/// Which EventPublisher the relay uses
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PublisherKind {
    /// Write events to the log
    #[default]
    Log,
    /// Append events to a Redis stream
    Redis,
}

/// Publisher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    #[serde(default)]
    pub kind: PublisherKind,

    /// Redis connection URL, required for the redis publisher
    pub redis_url: Option<String>,

    /// Stream key events are appended to
    #[serde(default = "default_stream")]
    pub stream: String,

    /// Approximate stream length cap, 0 disables trimming
    #[serde(default = "default_stream_max_len")]
    pub stream_max_len: usize,

    /// Larger payloads are dead-lettered
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Include payloads in log publisher output
    #[serde(default)]
    pub log_payload: bool,
}

impl PublisherConfig {
    pub fn redis_stream_config(&self) -> RedisStreamConfig {
        RedisStreamConfig {
            stream: self.stream.clone(),
            max_len: (self.stream_max_len > 0).then_some(self.stream_max_len),
            max_payload_bytes: self.max_payload_bytes,
        }
    }

    /// Validate publisher configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_payload_bytes == 0 {
            return Err(ValidationError::InvalidPayloadLimit);
        }
        if self.kind == PublisherKind::Redis {
            let url = self
                .redis_url
                .as_deref()
                .ok_or(ValidationError::MissingRequired("PUBLISHER__REDIS_URL"))?;
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err(ValidationError::InvalidRedisUrl);
            }
            if self.stream.trim().is_empty() {
                return Err(ValidationError::EmptyStreamName);
            }
        }
        Ok(())
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            kind: PublisherKind::default(),
            redis_url: None,
            stream: default_stream(),
            stream_max_len: default_stream_max_len(),
            max_payload_bytes: default_max_payload_bytes(),
            log_payload: false,
        }
    }
}

fn default_stream() -> String {
    "order-events".to_string()
}

fn default_stream_max_len() -> usize {
    100_000
}

fn default_max_payload_bytes() -> usize {
    512 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_publisher_needs_nothing() {
        assert!(PublisherConfig::default().validate().is_ok());
    }

    #[test]
    fn test_redis_publisher_requires_url() {
        let config = PublisherConfig {
            kind: PublisherKind::Redis,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingRequired("PUBLISHER__REDIS_URL"))
        );
    }

    #[test]
    fn test_redis_publisher_rejects_bad_url() {
        let config = PublisherConfig {
            kind: PublisherKind::Redis,
            redis_url: Some("http://localhost:6379".to_string()),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidRedisUrl));
    }

    #[test]
    fn test_zero_max_len_disables_trimming() {
        let config = PublisherConfig {
            stream_max_len: 0,
            ..Default::default()
        };
        assert_eq!(config.redis_stream_config().max_len, None);
    }
}
