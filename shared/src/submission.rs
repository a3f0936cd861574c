//! Submission envelope and identifiers
//!
//! The [`Envelope`] is the JSON document published on the broker topic:
//!
//! ```json
//! {
//!   "identifier": "1a2b3c4d5e",
//!   "title": null,
//!   "text": "Hello, world!",
//!   "image": null,
//!   "client_address": "203.0.113.7",
//!   "timestamp": "2025-05-01T12:00:00Z"
//! }
//! ```
//!
//! Identifiers are snowflake-style 64-bit values rendered as lowercase
//! base-36 text.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::util::{from_base36, now_millis, to_base36};

/// Custom epoch: 2024-01-01 00:00:00 UTC
pub const ID_EPOCH_MS: i64 = 1_704_067_200_000;

const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const TIMESTAMP_MASK: u64 = 0x1FF_FFFF_FFFF; // 41 bits

/// Unique identifier of one submission.
///
/// Layout:
///   - 41 bits: milliseconds since [`ID_EPOCH_MS`]
///   - 12 bits: per-millisecond sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionId(u64);

impl SubmissionId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Milliseconds since the Unix epoch encoded in the identifier
    pub fn timestamp_millis(&self) -> i64 {
        (self.0 >> SEQUENCE_BITS) as i64 + ID_EPOCH_MS
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_base36(self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid submission identifier: {0}")]
pub struct InvalidSubmissionId(pub String);

impl FromStr for SubmissionId {
    type Err = InvalidSubmissionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        from_base36(s)
            .map(SubmissionId)
            .ok_or_else(|| InvalidSubmissionId(s.to_string()))
    }
}

impl Serialize for SubmissionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SubmissionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Default)]
struct GeneratorState {
    last_ts: u64,
    sequence: u64,
}

/// Process-wide identifier generator.
///
/// Never returns the same value twice: exhausting the sequence within one
/// millisecond waits for the next millisecond, and a clock that moves
/// backwards keeps the last timestamp.
#[derive(Debug, Default)]
pub struct IdGenerator {
    state: Mutex<GeneratorState>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn elapsed_millis() -> u64 {
        (now_millis() - ID_EPOCH_MS).max(0) as u64 & TIMESTAMP_MASK
    }

    pub fn next_id(&self) -> SubmissionId {
        let mut state = self.state.lock();
        let mut ts = Self::elapsed_millis().max(state.last_ts);

        if ts == state.last_ts {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                ts = Self::wait_next_millis(state.last_ts);
            }
        } else {
            state.sequence = 0;
        }

        state.last_ts = ts;
        SubmissionId((ts << SEQUENCE_BITS) | state.sequence)
    }

    fn wait_next_millis(last_ts: u64) -> u64 {
        loop {
            let now = Self::elapsed_millis();
            if now > last_ts {
                return now;
            }
            // Clock is behind the last issued timestamp; step forward instead of stalling
            if last_ts - now > 1 {
                return last_ts + 1;
            }
            std::thread::yield_now();
        }
    }
}

/// In-flight submission as published on the broker topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub identifier: SubmissionId,
    pub title: Option<String>,
    pub text: String,
    #[serde(default, with = "base64_opt")]
    pub image: Option<Vec<u8>>,
    pub client_address: String,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

mod base64_opt {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
