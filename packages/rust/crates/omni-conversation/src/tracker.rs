//! Conversation state tracker.
//!
//! Keeps a bounded history of invocations, derives lightweight analytics from
//! it, and optionally persists a snapshot to a [`StateSink`]. One tracker owns
//! one conversation; callers serialize access to `process`.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::analysis::{SwitchTrigger, detect_context_switch, detect_patterns, seconds};
use crate::config::{ConfigError, TrackerConfig};
use crate::context::InvocationContext;
use crate::observability::TrackerEvent;
use crate::record::{ContextMemory, ContextSwitchEvent, HistoryRecord, TrackerState};
use crate::schema::TrackerSnapshot;
use crate::state_backend::{JsonFileSink, StateSink};

/// Records kept when history is truncated on a context switch.
pub const CONTEXT_SWITCH_RETAINED_HISTORY: usize = 10;

/// Metadata key for the pattern flags object.
pub const DETECTED_PATTERNS_KEY: &str = "detected_patterns";
/// Metadata key set to `true` when a context switch is detected.
pub const CONTEXT_SWITCH_DETECTED_KEY: &str = "context_switch_detected";
/// Metadata key for the running invocation count.
pub const EXECUTION_COUNT_KEY: &str = "execution_count";
/// Metadata key for the post-truncation history size.
pub const HISTORY_SIZE_KEY: &str = "history_size";
/// Metadata key for seconds since the previous invocation (`null` on the first).
pub const TIME_SINCE_LAST_KEY: &str = "time_since_last";

/// Errors surfaced to the host.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invocation metadata could not be captured for the history record.
    #[error("failed to snapshot invocation metadata: {0}")]
    MetadataSnapshot(String),

    /// The plugin adapter was invoked in a stage it does not handle.
    #[error("stage {stage} is not supported by {plugin}")]
    UnsupportedStage {
        /// Plugin name.
        plugin: String,
        /// Rejected stage.
        stage: String,
    },
}

/// Read-only view of tracker state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerSummary {
    /// Total invocations processed.
    pub execution_count: u64,
    /// Records currently retained.
    pub history_size: usize,
    /// Number of recorded context switches.
    pub context_switches: usize,
    /// Time of the most recent invocation.
    pub last_execution: Option<DateTime<Utc>>,
    /// Keys present in context memory.
    pub memory_keys: Vec<String>,
}

/// Stateful conversation tracker.
pub struct ConversationStateTracker {
    config: TrackerConfig,
    state: TrackerState,
    sink: Box<dyn StateSink>,
}

impl ConversationStateTracker {
    /// Create a tracker persisting to a JSON file at `config.persistence_target`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation. Persistence problems never fail construction.
    pub fn new(config: TrackerConfig) -> Result<Self, ConfigError> {
        let sink = JsonFileSink::new(&config.persistence_target);
        Self::with_sink(config, sink)
    }

    /// Create a tracker from a host key/value mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if a recognized option holds an invalid value.
    pub fn from_map(config: &serde_json::Map<String, Value>) -> Result<Self, ConfigError> {
        Self::new(TrackerConfig::from_map(config)?)
    }

    /// Create a tracker with an explicit sink. The sink is only used when persistence is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn with_sink(config: TrackerConfig, sink: impl StateSink + 'static) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut tracker = Self {
            config,
            state: TrackerState::default(),
            sink: Box::new(sink),
        };
        tracing::debug!(
            event = TrackerEvent::TrackerCreated.as_str(),
            max_history_size = tracker.config.max_history_size,
            persistence = tracker.config.enable_persistence,
            backend = tracker.sink.backend_name(),
            "conversation state tracker created"
        );
        if tracker.config.enable_persistence {
            tracker.load();
        }
        Ok(tracker)
    }

    /// Process one invocation and return it with augmented metadata.
    ///
    /// Adds `execution_count`, `history_size` and `time_since_last`, plus
    /// `detected_patterns` and `context_switch_detected` when applicable.
    /// The message is never modified.
    ///
    /// # Errors
    ///
    /// Returns an error only when the invocation metadata cannot be captured.
    /// Persistence failures are logged and absorbed.
    pub fn process<C: InvocationContext>(&mut self, mut ctx: C) -> Result<C, TrackerError> {
        let metadata_snapshot = ctx.snapshot_metadata()?;
        let now = Utc::now();

        self.state.execution_count += 1;
        let time_since_last = self
            .state
            .last_execution_time
            .map(|last| seconds(now - last).max(0.0));
        self.state.last_execution_time = Some(now);

        let prior_records = self.state.history.len();
        let record = HistoryRecord::new(
            now,
            ctx.message(),
            ctx.stage(),
            self.state.execution_count,
            metadata_snapshot,
        );
        let message_chars = record.message_chars();
        self.state.push_record(record, self.config.max_history_size);

        self.state.context_memory.record_length(message_chars);
        self.state.context_memory.record_stage(ctx.stage());

        let switch = detect_context_switch(
            &self.state.history,
            prior_records,
            &self.config.thresholds,
        );

        let patterns = detect_patterns(
            &self.state.history,
            &self.state.context_memory,
            &self.config.thresholds,
        );
        if !patterns.is_empty() {
            ctx.metadata_mut()
                .insert(DETECTED_PATTERNS_KEY.to_string(), patterns.to_metadata());
        }

        if let Some(trigger) = switch {
            ctx.metadata_mut()
                .insert(CONTEXT_SWITCH_DETECTED_KEY.to_string(), Value::Bool(true));
            self.handle_context_switch(now, ctx.message(), &trigger);
        }

        let metadata = ctx.metadata_mut();
        metadata.insert(EXECUTION_COUNT_KEY.to_string(), json!(self.state.execution_count));
        metadata.insert(HISTORY_SIZE_KEY.to_string(), json!(self.state.history.len()));
        metadata.insert(TIME_SINCE_LAST_KEY.to_string(), json!(time_since_last));

        if self.config.enable_persistence {
            self.save();
        }
        Ok(ctx)
    }

    fn handle_context_switch(&mut self, now: DateTime<Utc>, message: &str, trigger: &SwitchTrigger) {
        let previous_context_size = self.state.history.len();
        self.state
            .context_memory
            .context_switches
            .push(ContextSwitchEvent::new(now, previous_context_size, message));
        tracing::info!(
            event = TrackerEvent::ContextSwitchDetected.as_str(),
            execution_count = self.state.execution_count,
            previous_context_size,
            trigger = ?trigger,
            "context switch detected"
        );

        if self.config.clear_on_context_switch {
            self.state.retain_recent(CONTEXT_SWITCH_RETAINED_HISTORY);
            tracing::debug!(
                event = TrackerEvent::HistoryTruncated.as_str(),
                from = previous_context_size,
                to = self.state.history.len(),
                "history truncated after context switch"
            );
        }
    }

    /// Summarize current state without mutating it.
    #[must_use]
    pub fn summary(&self) -> TrackerSummary {
        TrackerSummary {
            execution_count: self.state.execution_count,
            history_size: self.state.history.len(),
            context_switches: self.state.context_memory.context_switches.len(),
            last_execution: self.state.last_execution_time,
            memory_keys: self
                .state
                .context_memory
                .memory_keys()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    /// Reset all state; persists the empty state when persistence is enabled.
    pub fn clear(&mut self) {
        self.state = TrackerState::default();
        tracing::debug!(
            event = TrackerEvent::StateCleared.as_str(),
            persistence = self.config.enable_persistence,
            "conversation state cleared"
        );
        if self.config.enable_persistence {
            self.save();
        }
    }

    /// Write a snapshot to the sink. Returns `false` if the write failed.
    pub fn save(&self) -> bool {
        let started = Instant::now();
        let snapshot = TrackerSnapshot::capture(&self.state);
        match self.sink.save(&snapshot) {
            Ok(()) => {
                tracing::debug!(
                    event = TrackerEvent::StateSaveSucceeded.as_str(),
                    backend = self.sink.backend_name(),
                    target = %self.sink.target(),
                    execution_count = snapshot.execution_count,
                    records = snapshot.conversation_history.len(),
                    duration_ms = started.elapsed().as_millis(),
                    "conversation state persisted"
                );
                true
            }
            Err(error) => {
                tracing::warn!(
                    event = TrackerEvent::StateSaveFailed.as_str(),
                    backend = self.sink.backend_name(),
                    target = %self.sink.target(),
                    duration_ms = started.elapsed().as_millis(),
                    error = %format!("{error:#}"),
                    "failed to persist conversation state"
                );
                false
            }
        }
    }

    /// Replace state with the sink's snapshot.
    ///
    /// An absent sink leaves state untouched and counts as success. Any other
    /// failure is logged, leaves state untouched, and returns `false`.
    pub fn load(&mut self) -> bool {
        let started = Instant::now();
        match self.sink.load() {
            Ok(Some(snapshot)) => {
                let persisted_records = snapshot.conversation_history.len();
                self.state = snapshot.into_state(self.config.max_history_size);
                if self.state.history.len() < persisted_records {
                    tracing::debug!(
                        event = TrackerEvent::HistoryTruncated.as_str(),
                        from = persisted_records,
                        to = self.state.history.len(),
                        "restored history trimmed to max_history_size"
                    );
                }
                tracing::debug!(
                    event = TrackerEvent::StateLoadSucceeded.as_str(),
                    backend = self.sink.backend_name(),
                    target = %self.sink.target(),
                    execution_count = self.state.execution_count,
                    records = self.state.history.len(),
                    duration_ms = started.elapsed().as_millis(),
                    "conversation state restored"
                );
                true
            }
            Ok(None) => {
                tracing::debug!(
                    event = TrackerEvent::StateLoadSkipped.as_str(),
                    backend = self.sink.backend_name(),
                    target = %self.sink.target(),
                    "no persisted conversation state"
                );
                true
            }
            Err(error) => {
                tracing::warn!(
                    event = TrackerEvent::StateLoadFailed.as_str(),
                    backend = self.sink.backend_name(),
                    target = %self.sink.target(),
                    duration_ms = started.elapsed().as_millis(),
                    error = %format!("{error:#}"),
                    "failed to load conversation state; continuing with current state"
                );
                false
            }
        }
    }

    /// Retained history records, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &HistoryRecord> {
        self.state.history.iter()
    }

    /// Derived context memory.
    #[must_use]
    pub fn context_memory(&self) -> &ContextMemory {
        &self.state.context_memory
    }

    /// Total invocations processed.
    #[must_use]
    pub fn execution_count(&self) -> u64 {
        self.state.execution_count
    }

    /// Time of the most recent invocation.
    #[must_use]
    pub fn last_execution_time(&self) -> Option<DateTime<Utc>> {
        self.state.last_execution_time
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Snapshot as it would be written to the sink.
    #[must_use]
    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot::capture(&self.state)
    }
}

impl std::fmt::Debug for ConversationStateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStateTracker")
            .field("config", &self.config)
            .field("execution_count", &self.state.execution_count)
            .field("history_size", &self.state.history.len())
            .field("backend", &self.sink.backend_name())
            .finish_non_exhaustive()
    }
}
