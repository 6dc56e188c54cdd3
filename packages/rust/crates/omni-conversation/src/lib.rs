//! omni-conversation - Conversation state tracking for agent workflow plugins.
//!
//! Provides a self-contained tracker a host pipeline can call once per invocation:
//! - Bounded, FIFO-evicted interaction history with value-isolated metadata snapshots
//! - Lightweight analytics (repetition, length trend, rapid-fire, context switch)
//! - Optional JSON persistence with swallow-and-log failure handling
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Host pipeline (external)                    │
//! │  - Stage scheduling                                         │
//! │  - Invocation context (message / stage / metadata)          │
//! └─────────────────────────────────────────────────────────────┘
//!                             │  InvocationContext / Plugin
//!                             ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConversationStateTracker                    │
//! │  - History + ContextMemory                                  │
//! │  - Pattern / context-switch heuristics                      │
//! │  - StateSink (JSON file, in-memory)                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Examples
//!
//! ```rust
//! use omni_conversation::{ConversationStateTracker, Invocation, TrackerConfig};
//!
//! let mut tracker = ConversationStateTracker::new(TrackerConfig::default())?;
//! let out = tracker.process(Invocation::new("hello", "THINK"))?;
//! assert_eq!(out.metadata["execution_count"], 1);
//! assert!(out.metadata["time_since_last"].is_null());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// ============================================================================
// Core modules
// ============================================================================

mod analysis;
mod config;
mod context;
mod observability;
mod persistence;
mod plugin;
mod record;
mod schema;
mod state_backend;
mod tracker;

// ============================================================================
// Public exports
// ============================================================================

pub use analysis::{
    DetectedPatterns, HeuristicThresholds, LengthTrend, Repetition, SWITCH_INDICATORS,
    SwitchTrigger, detect_context_switch, detect_patterns,
};
pub use config::{ConfigError, DEFAULT_MAX_HISTORY_SIZE, DEFAULT_PERSISTENCE_TARGET, TrackerConfig};
pub use context::{Invocation, InvocationContext};
pub use plugin::{Plugin, StatefulPlugin};
pub use record::{
    ContextMemory, ContextSwitchEvent, HistoryRecord, MAX_MESSAGE_LENGTHS, Metadata,
    SWITCH_PREVIEW_CHARS, TrackerState,
};
pub use schema::{PERSISTED_HISTORY_LIMIT, SnapshotError, TrackerSnapshot, tracker_snapshot_schema};
pub use state_backend::{JsonFileSink, MemorySink, StateSink};
pub use tracker::{
    CONTEXT_SWITCH_DETECTED_KEY, CONTEXT_SWITCH_RETAINED_HISTORY, ConversationStateTracker,
    DETECTED_PATTERNS_KEY, EXECUTION_COUNT_KEY, HISTORY_SIZE_KEY, TIME_SINCE_LAST_KEY,
    TrackerError, TrackerSummary,
};
