//! Shared test helpers for omni-conversation.

#![allow(dead_code)]

use omni_conversation::{ConversationStateTracker, Invocation};

/// State file path nested under `dir`, so parent creation is exercised.
pub fn state_path(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    dir.path().join("state").join(format!("{name}.json"))
}

/// Run `messages` through `tracker` in the THINK stage.
pub fn run_messages(tracker: &mut ConversationStateTracker, messages: &[&str]) -> Vec<Invocation> {
    messages
        .iter()
        .map(|message| {
            tracker
                .process(Invocation::new(*message, "THINK"))
                .expect("process should not fail")
        })
        .collect()
}

/// Messages currently retained by `tracker`, oldest first.
pub fn history_messages(tracker: &ConversationStateTracker) -> Vec<String> {
    tracker.history().map(|record| record.message.clone()).collect()
}
