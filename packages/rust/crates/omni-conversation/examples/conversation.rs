//! Example: feed a short conversation through the tracker and print the metadata it attaches.
//!
//! State is persisted to the path given as the first argument (default: a temp file),
//! so running the example twice continues the same conversation.
//!
//! Run: `RUST_LOG=omni_conversation=debug cargo run -p omni-conversation --example conversation`

use omni_conversation::{ConversationStateTracker, Invocation, TrackerConfig};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("omni_conversation=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let target = std::env::args().nth(1).unwrap_or_else(|| {
        std::env::temp_dir()
            .join("omni-conversation-demo.json")
            .to_string_lossy()
            .to_string()
    });
    let config = TrackerConfig::default()
        .with_max_history_size(50)
        .with_persistence(target.clone());
    let mut tracker = ConversationStateTracker::new(config)?;

    let turns = [
        ("THINK", "How do I profile a Rust binary?"),
        ("THINK", "Which flamegraph tool works on Linux?"),
        ("REVIEW", "Which flamegraph tool works on Linux?"),
        ("THINK", "By the way, what is the capital of Peru?"),
    ];
    for (stage, message) in turns {
        let out = tracker.process(Invocation::new(message, stage))?;
        println!("[{stage}] {message}");
        println!("  {}", serde_json::to_string(&out.metadata)?);
    }

    println!();
    println!("state file: {target}");
    println!("{}", serde_json::to_string_pretty(&tracker.summary())?);
    Ok(())
}
