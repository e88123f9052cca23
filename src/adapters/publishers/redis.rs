//! Redis Streams publisher for production deployments.
//!
//! Each event becomes one stream entry:
//!
//! ```text
//! XADD <stream> MAXLEN ~ <max_len> * type <event_type> aggregateid <aggregate_id> payload <json>
//! ```
//!
//! Consumers read the stream with consumer groups and must tolerate
//! duplicates, since the relay delivers at least once.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{ErrorKind, RedisError};

use crate::ports::{EventPublisher, PublishError};

/// Stream settings.
#[derive(Debug, Clone)]
pub struct RedisStreamConfig {
    /// Stream key entries are appended to.
    pub stream: String,

    /// Approximate cap on stream length. `None` keeps everything.
    pub max_len: Option<usize>,

    /// Payloads larger than this are rejected permanently.
    pub max_payload_bytes: usize,
}

impl Default for RedisStreamConfig {
    fn default() -> Self {
        Self {
            stream: "order-events".to_string(),
            max_len: Some(100_000),
            max_payload_bytes: 512 * 1024,
        }
    }
}

/// Appends events to a Redis stream.
///
/// Connection failures and server conditions that clear on their own are
/// transient. Errors the server gives for the command itself (wrong key
/// type, rejected arguments) and oversized payloads are permanent.
#[derive(Clone)]
pub struct RedisStreamPublisher {
    conn: MultiplexedConnection,
    config: RedisStreamConfig,
}

impl RedisStreamPublisher {
    pub fn new(conn: MultiplexedConnection, config: RedisStreamConfig) -> Self {
        Self { conn, config }
    }

    /// Connects to `url` and builds a publisher.
    pub async fn connect(url: &str, config: RedisStreamConfig) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self::new(conn, config))
    }

    pub fn config(&self) -> &RedisStreamConfig {
        &self.config
    }

    fn build_command(&self, event_type: &str, aggregate_id: &str, payload: &[u8]) -> redis::Cmd {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.config.stream);
        if let Some(max_len) = self.config.max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*")
            .arg("type")
            .arg(event_type)
            .arg("aggregateid")
            .arg(aggregate_id)
            .arg("payload")
            .arg(payload);
        cmd
    }
}

#[async_trait]
impl EventPublisher for RedisStreamPublisher {
    async fn publish(
        &self,
        event_type: &str,
        aggregate_id: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        if payload.len() > self.config.max_payload_bytes {
            return Err(PublishError::permanent(format!(
                "payload of {} bytes exceeds limit of {} bytes",
                payload.len(),
                self.config.max_payload_bytes
            )));
        }

        let mut conn = self.conn.clone();
        let entry_id: String = self
            .build_command(event_type, aggregate_id, payload)
            .query_async(&mut conn)
            .await
            .map_err(classify_error)?;

        tracing::debug!(
            stream = %self.config.stream,
            entry_id = %entry_id,
            event_type,
            aggregate_id,
            "Event appended to stream"
        );
        Ok(())
    }
}

/// Maps a Redis error to whether retrying the same XADD can succeed.
fn classify_error(e: RedisError) -> PublishError {
    match e.kind() {
        // WRONGTYPE and other unlisted server codes arrive as ExtensionError
        ErrorKind::ResponseError | ErrorKind::ExtensionError | ErrorKind::TypeError => {
            PublishError::permanent(e.to_string())
        }
        _ => PublishError::transient(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_errors_are_permanent() {
        let wrong_type = RedisError::from((
            ErrorKind::ExtensionError,
            "WRONGTYPE",
            "Operation against a key holding the wrong kind of value".to_string(),
        ));
        let bad_args = RedisError::from((ErrorKind::ResponseError, "ERR syntax error"));

        assert!(matches!(classify_error(wrong_type), PublishError::Permanent(_)));
        assert!(matches!(classify_error(bad_args), PublishError::Permanent(_)));
    }

    #[test]
    fn connection_and_server_state_errors_are_transient() {
        let io = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ));
        let loading = RedisError::from((ErrorKind::BusyLoadingError, "LOADING"));
        let read_only = RedisError::from((ErrorKind::ReadOnly, "READONLY"));

        for e in [io, loading, read_only] {
            assert!(matches!(classify_error(e), PublishError::Transient(_)));
        }
    }

    #[test]
    fn default_config_caps_stream_and_payload() {
        let config = RedisStreamConfig::default();

        assert_eq!(config.stream, "order-events");
        assert_eq!(config.max_len, Some(100_000));
        assert_eq!(config.max_payload_bytes, 512 * 1024);
    }
}
