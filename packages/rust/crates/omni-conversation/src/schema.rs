//! Persisted tracker document.
//!
//! Rust is the source of truth for the sink format: the JSON schema is derived
//! from `TrackerSnapshot`, and loading validates strictly before any state is
//! replaced.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{ContextMemory, HistoryRecord, TrackerState, de_opt_utc_timestamp};

/// Number of most recent history records written to the sink.
pub const PERSISTED_HISTORY_LIMIT: usize = 20;

/// Error when a persisted snapshot fails validation.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// JSON deserialization failed.
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Document is structurally valid JSON but violates the contract.
    #[error("Schema validation: {0}")]
    Validation(String),
}

/// Serializable tracker state written to and read from a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrackerSnapshot {
    /// Total invocations processed.
    pub execution_count: u64,
    /// Time of the most recent invocation.
    #[serde(default, deserialize_with = "de_opt_utc_timestamp")]
    pub last_execution_time: Option<DateTime<Utc>>,
    /// Most recent history records (at most 20), oldest first.
    #[serde(default)]
    pub conversation_history: Vec<HistoryRecord>,
    /// Derived sequences.
    #[serde(default)]
    pub context_memory: ContextMemory,
}

impl TrackerSnapshot {
    /// Capture `state`, keeping only the newest persisted records.
    #[must_use]
    pub fn capture(state: &TrackerState) -> Self {
        Self {
            execution_count: state.execution_count,
            last_execution_time: state.last_execution_time,
            conversation_history: state.recent(PERSISTED_HISTORY_LIMIT).cloned().collect(),
            context_memory: state.context_memory.clone(),
        }
    }

    /// Rebuild tracker state, trimming history from the front to `max_history`.
    #[must_use]
    pub fn into_state(self, max_history: usize) -> TrackerState {
        let mut history: VecDeque<HistoryRecord> = self.conversation_history.into();
        let excess = history.len().saturating_sub(max_history);
        history.drain(..excess);
        TrackerState {
            history,
            context_memory: self.context_memory,
            execution_count: self.execution_count,
            last_execution_time: self.last_execution_time,
        }
    }

    /// Check sequence-number invariants.
    ///
    /// # Errors
    ///
    /// Returns an error if sequence numbers are zero, not strictly increasing,
    /// or exceed `execution_count`.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut previous = 0_u64;
        for record in &self.conversation_history {
            if record.sequence_number <= previous {
                return Err(SnapshotError::Validation(format!(
                    "sequence_number {} does not follow {previous}",
                    record.sequence_number
                )));
            }
            previous = record.sequence_number;
        }
        if previous > self.execution_count {
            return Err(SnapshotError::Validation(format!(
                "sequence_number {previous} exceeds execution_count {}",
                self.execution_count
            )));
        }
        Ok(())
    }

    /// Deserialize from JSON with strict validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, not valid JSON, or violates
    /// sequence-number invariants.
    pub fn from_json(s: &str) -> Result<Self, SnapshotError> {
        if s.trim().is_empty() {
            return Err(SnapshotError::Validation("Empty snapshot document".to_string()));
        }
        let snapshot: Self = serde_json::from_str(s)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }
}

/// JSON schema of the persisted tracker document.
#[must_use]
pub fn tracker_snapshot_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(TrackerSnapshot);
    serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
}
