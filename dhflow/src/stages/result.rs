//! Counters and payload produced or consumed by a stage.

use crate::core::Payload;
use serde::{Deserialize, Serialize};

/// Row counters reported by a stage.
///
/// The engine never checks how the fields relate to each other; stages own
/// their counter semantics and the engine only sums or copies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counters {
    /// Rows read.
    #[serde(default)]
    pub read: u64,
    /// Rows inserted.
    #[serde(default)]
    pub insert: u64,
    /// Rows updated.
    #[serde(default)]
    pub update: u64,
    /// Rows discarded.
    #[serde(default)]
    pub discard: u64,
    /// Rows handled in total.
    #[serde(default)]
    pub total: u64,
}

impl Counters {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the read count.
    #[must_use]
    pub fn with_read(mut self, n: u64) -> Self {
        self.read = n;
        self
    }

    /// Sets the insert count.
    #[must_use]
    pub fn with_insert(mut self, n: u64) -> Self {
        self.insert = n;
        self
    }

    /// Sets the update count.
    #[must_use]
    pub fn with_update(mut self, n: u64) -> Self {
        self.update = n;
        self
    }

    /// Sets the discard count.
    #[must_use]
    pub fn with_discard(mut self, n: u64) -> Self {
        self.discard = n;
        self
    }

    /// Sets the total count.
    #[must_use]
    pub fn with_total(mut self, n: u64) -> Self {
        self.total = n;
        self
    }

    /// Field-wise saturating sum.
    #[must_use]
    pub fn sum(self, other: Self) -> Self {
        Self {
            read: self.read.saturating_add(other.read),
            insert: self.insert.saturating_add(other.insert),
            update: self.update.saturating_add(other.update),
            discard: self.discard.saturating_add(other.discard),
            total: self.total.saturating_add(other.total),
        }
    }
}

impl std::ops::Add for Counters {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.sum(rhs)
    }
}

impl std::iter::Sum for Counters {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Self::sum)
    }
}

/// Why a row was discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardCause {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable reason.
    pub reason: String,
}

impl DiscardCause {
    /// Creates a new discard cause.
    #[must_use]
    pub fn new(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            reason: reason.into(),
        }
    }
}

/// Counters plus payload produced by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageResult {
    /// The data produced or consumed.
    #[serde(default)]
    pub payload: Payload,
    /// Row counters.
    #[serde(default)]
    pub counters: Counters,
    /// Discard causes in the order they were recorded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discard_causes: Vec<DiscardCause>,
}

impl StageResult {
    /// Creates a result with no discard causes.
    #[must_use]
    pub fn new(payload: Payload, counters: Counters) -> Self {
        Self {
            payload,
            counters,
            discard_causes: Vec::new(),
        }
    }

    /// Wraps a payload with zeroed counters.
    #[must_use]
    pub fn from_payload(payload: impl Into<Payload>) -> Self {
        Self::new(payload.into(), Counters::default())
    }

    /// Creates an empty result carrying only counters.
    #[must_use]
    pub fn counters_only(counters: Counters) -> Self {
        Self::new(Payload::Empty, counters)
    }

    /// Appends a discard cause.
    #[must_use]
    pub fn with_discard_cause(mut self, cause: DiscardCause) -> Self {
        self.discard_causes.push(cause);
        self
    }

    /// Replaces the payload, keeping counters and causes.
    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Drops the payload, keeping counters and causes.
    pub fn clear_payload(&mut self) {
        self.payload = Payload::Empty;
    }
}
