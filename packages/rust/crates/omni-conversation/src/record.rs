//! Conversation state data structures.
//!
//! A `HistoryRecord` is the stored snapshot of one invocation; `ContextMemory`
//! holds the derived sequences the heuristics read; `TrackerState` bundles
//! everything the tracker owns.

use std::collections::VecDeque;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// Auxiliary key/value data carried by an invocation.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Maximum number of message lengths retained in `ContextMemory`.
pub const MAX_MESSAGE_LENGTHS: usize = 50;

/// Number of leading characters of a triggering message kept per switch event.
pub const SWITCH_PREVIEW_CHARS: usize = 100;

/// Key names reported by [`ContextMemory::memory_keys`].
pub const MESSAGE_LENGTHS_KEY: &str = "message_lengths";
/// See [`MESSAGE_LENGTHS_KEY`].
pub const STAGE_TRANSITIONS_KEY: &str = "stage_transitions";
/// See [`MESSAGE_LENGTHS_KEY`].
pub const CONTEXT_SWITCHES_KEY: &str = "context_switches";

/// Parse an RFC 3339 timestamp; a timestamp without an offset is taken as UTC.
pub(crate) fn parse_utc_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match text.parse::<DateTime<FixedOffset>>() {
        Ok(stamp) => Ok(stamp.with_timezone(&Utc)),
        Err(_) => text.parse::<NaiveDateTime>().map(|naive| naive.and_utc()),
    }
}

pub(crate) fn de_utc_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_utc_timestamp(&text).map_err(serde::de::Error::custom)
}

pub(crate) fn de_opt_utc_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|text| parse_utc_timestamp(&text).map_err(serde::de::Error::custom))
        .transpose()
}

/// Immutable snapshot of one processed invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HistoryRecord {
    /// When the invocation was processed.
    #[serde(deserialize_with = "de_utc_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Message text seen by the tracker.
    pub message: String,
    /// Pipeline stage the invocation ran in.
    pub stage: String,
    /// 1-based invocation counter at record time.
    #[serde(alias = "execution_number")]
    pub sequence_number: u64,
    /// Owned copy of the invocation metadata at record time.
    #[serde(default, alias = "metadata")]
    pub metadata_snapshot: Metadata,
}

impl HistoryRecord {
    /// Build a record. `metadata_snapshot` is moved in, so the caller hands over an owned copy.
    #[must_use]
    pub fn new(
        timestamp: DateTime<Utc>,
        message: &str,
        stage: &str,
        sequence_number: u64,
        metadata_snapshot: Metadata,
    ) -> Self {
        Self {
            timestamp,
            message: message.to_string(),
            stage: stage.to_string(),
            sequence_number,
            metadata_snapshot,
        }
    }

    /// Message length in characters.
    #[must_use]
    pub fn message_chars(&self) -> usize {
        self.message.chars().count()
    }
}

/// One detected topic change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContextSwitchEvent {
    /// Detection time.
    #[serde(deserialize_with = "de_utc_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// History size at detection, before any truncation.
    pub previous_context_size: usize,
    /// First 100 characters of the message that triggered the switch.
    pub trigger_message: String,
}

impl ContextSwitchEvent {
    /// Build a switch event, truncating the trigger message on a char boundary.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, previous_context_size: usize, message: &str) -> Self {
        Self {
            timestamp,
            previous_context_size,
            trigger_message: message.chars().take(SWITCH_PREVIEW_CHARS).collect(),
        }
    }
}

/// Derived sequences used by the pattern and switch heuristics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContextMemory {
    /// Character lengths of recent messages, oldest first, capped at 50.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_lengths: Vec<usize>,
    /// Stage names, appended only when the stage changes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stage_transitions: Vec<String>,
    /// Every detected context switch, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_switches: Vec<ContextSwitchEvent>,
}

impl ContextMemory {
    /// Record one message length, dropping the oldest past the cap.
    pub fn record_length(&mut self, length: usize) {
        self.message_lengths.push(length);
        if self.message_lengths.len() > MAX_MESSAGE_LENGTHS {
            let excess = self.message_lengths.len() - MAX_MESSAGE_LENGTHS;
            self.message_lengths.drain(..excess);
        }
    }

    /// Record a stage if it differs from the last recorded one.
    ///
    /// Returns `true` when a transition was appended.
    pub fn record_stage(&mut self, stage: &str) -> bool {
        if self.stage_transitions.last().is_some_and(|last| last == stage) {
            return false;
        }
        self.stage_transitions.push(stage.to_string());
        true
    }

    /// Keys currently present; a key appears once its sequence holds an entry.
    #[must_use]
    pub fn memory_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::with_capacity(3);
        if !self.message_lengths.is_empty() {
            keys.push(MESSAGE_LENGTHS_KEY);
        }
        if !self.stage_transitions.is_empty() {
            keys.push(STAGE_TRANSITIONS_KEY);
        }
        if !self.context_switches.is_empty() {
            keys.push(CONTEXT_SWITCHES_KEY);
        }
        keys
    }

    /// Whether no key is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memory_keys().is_empty()
    }
}

/// Full mutable state owned by one tracker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerState {
    /// Bounded history, oldest first.
    pub history: VecDeque<HistoryRecord>,
    /// Derived sequences.
    pub context_memory: ContextMemory,
    /// Total invocations processed since creation or the last clear.
    pub execution_count: u64,
    /// Time of the most recent invocation.
    pub last_execution_time: Option<DateTime<Utc>>,
}

impl TrackerState {
    /// Append a record and evict from the front until `max_history` holds.
    pub fn push_record(&mut self, record: HistoryRecord, max_history: usize) {
        self.history.push_back(record);
        while self.history.len() > max_history {
            if self.history.pop_front().is_none() {
                break;
            }
        }
    }

    /// Keep only the newest `keep` records.
    pub fn retain_recent(&mut self, keep: usize) {
        let excess = self.history.len().saturating_sub(keep);
        self.history.drain(..excess);
    }

    /// Newest `n` records, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &HistoryRecord> {
        self.history.iter().skip(self.history.len().saturating_sub(n))
    }
}
