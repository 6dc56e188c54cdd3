//! Stable event names for structured tracker logs.

/// `event` field values emitted by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerEvent {
    /// A tracker was constructed.
    TrackerCreated,
    /// Persisted state replaced the in-memory state.
    StateLoadSucceeded,
    /// No persisted state was found.
    StateLoadSkipped,
    /// Persisted state could not be read or validated.
    StateLoadFailed,
    /// A snapshot was written to the sink.
    StateSaveSucceeded,
    /// Writing a snapshot failed.
    StateSaveFailed,
    /// All tracker state was reset.
    StateCleared,
    /// The current invocation changed topic.
    ContextSwitchDetected,
    /// History was cut down (context switch or restore under a smaller cap).
    HistoryTruncated,
}

impl TrackerEvent {
    /// Dotted event name used as the `event` log field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TrackerCreated => "conversation.tracker.created",
            Self::StateLoadSucceeded => "conversation.state.load.succeeded",
            Self::StateLoadSkipped => "conversation.state.load.skipped",
            Self::StateLoadFailed => "conversation.state.load.failed",
            Self::StateSaveSucceeded => "conversation.state.save.succeeded",
            Self::StateSaveFailed => "conversation.state.save.failed",
            Self::StateCleared => "conversation.state.cleared",
            Self::ContextSwitchDetected => "conversation.context_switch.detected",
            Self::HistoryTruncated => "conversation.history.truncated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_share_conversation_prefix() {
        for event in [
            TrackerEvent::TrackerCreated,
            TrackerEvent::StateLoadFailed,
            TrackerEvent::StateSaveFailed,
            TrackerEvent::HistoryTruncated,
        ] {
            assert!(event.as_str().starts_with("conversation."), "{event:?}");
        }
    }
}
