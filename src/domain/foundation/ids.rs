//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use super::Timestamp;

/// Store-generated identifier of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(i64);

impl OrderId {
    /// Wraps an identifier handed out by the store.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrderId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Identifier of an outbox record.
///
/// Laid out as a UUIDv7: 48 bits of Unix milliseconds, a 12-bit sequence
/// counter, then random bits. Ids produced by [`OutboxRecordId::generate`]
/// are strictly increasing within a process, and byte order equals
/// creation order, so `ORDER BY id` in the store is creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboxRecordId(Uuid);

struct SequenceState {
    last_millis: u64,
    counter: u16,
}

static SEQUENCE: Mutex<SequenceState> = Mutex::new(SequenceState {
    last_millis: 0,
    counter: 0,
});

const MAX_COUNTER: u16 = 0x0FFF;

impl OutboxRecordId {
    /// Generates the next id for this process.
    pub fn generate() -> Self {
        Self::generate_at(Timestamp::now())
    }

    /// Generates the next id using `now` as the wall clock reading.
    ///
    /// A clock that steps backwards does not break monotonicity: the
    /// previous millisecond is reused and the counter advances instead.
    pub fn generate_at(now: Timestamp) -> Self {
        let now_millis = now.as_unix_millis().max(0) as u64;

        let (millis, counter) = {
            let mut state = SEQUENCE.lock().unwrap_or_else(PoisonError::into_inner);
            if now_millis > state.last_millis {
                state.last_millis = now_millis;
                state.counter = 0;
            } else if state.counter == MAX_COUNTER {
                state.last_millis += 1;
                state.counter = 0;
            } else {
                state.counter += 1;
            }
            (state.last_millis, state.counter)
        };

        let random = Uuid::new_v4();
        let random = random.as_bytes();

        let mut bytes = [0u8; 16];
        bytes[0..6].copy_from_slice(&millis.to_be_bytes()[2..8]);
        bytes[6] = 0x70 | ((counter >> 8) as u8 & 0x0F);
        bytes[7] = (counter & 0xFF) as u8;
        bytes[8..16].copy_from_slice(&random[8..16]);
        bytes[8] = 0x80 | (bytes[8] & 0x3F);

        Self(Uuid::from_bytes(bytes))
    }

    /// Creates an OutboxRecordId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Milliseconds embedded in the id.
    pub fn unix_millis(&self) -> u64 {
        let b = self.0.as_bytes();
        let mut millis = [0u8; 8];
        millis[2..8].copy_from_slice(&b[0..6]);
        u64::from_be_bytes(millis)
    }
}

impl fmt::Display for OutboxRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OutboxRecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}
