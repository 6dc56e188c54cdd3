//! Plugin adapter: exposes the tracker through the host's async plugin seam.

use async_trait::async_trait;

use crate::config::{ConfigError, TrackerConfig};
use crate::context::InvocationContext;
use crate::tracker::{ConversationStateTracker, TrackerError, TrackerSummary};

/// Async plugin contract as seen from the host pipeline.
#[async_trait]
pub trait Plugin<C>: Send
where
    C: InvocationContext + Send + 'static,
{
    /// Plugin name for logs and errors.
    fn name(&self) -> &str;

    /// Stages this plugin handles.
    fn supported_stages(&self) -> &[String];

    /// Whether `stage` is handled.
    fn supports_stage(&self, stage: &str) -> bool {
        self.supported_stages().iter().any(|s| s == stage)
    }

    /// Run the plugin on one invocation.
    async fn execute(&mut self, ctx: C) -> Result<C, TrackerError>;
}

/// Stateful plugin backed by a [`ConversationStateTracker`].
#[derive(Debug)]
pub struct StatefulPlugin {
    tracker: ConversationStateTracker,
}

impl StatefulPlugin {
    /// Plugin name.
    pub const NAME: &'static str = "stateful";

    /// Build the plugin from a host key/value configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_map(config: &serde_json::Map<String, serde_json::Value>) -> Result<Self, ConfigError> {
        Ok(Self::from_tracker(ConversationStateTracker::from_map(config)?))
    }

    /// Build the plugin from a typed configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: TrackerConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_tracker(ConversationStateTracker::new(config)?))
    }

    /// Wrap an existing tracker.
    #[must_use]
    pub fn from_tracker(tracker: ConversationStateTracker) -> Self {
        Self { tracker }
    }

    /// Underlying tracker.
    #[must_use]
    pub fn tracker(&self) -> &ConversationStateTracker {
        &self.tracker
    }

    /// State summary.
    #[must_use]
    pub fn state_summary(&self) -> TrackerSummary {
        self.tracker.summary()
    }

    /// Clear all tracker state.
    pub fn clear_state(&mut self) {
        self.tracker.clear();
    }
}

#[async_trait]
impl<C> Plugin<C> for StatefulPlugin
where
    C: InvocationContext + Send + 'static,
{
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supported_stages(&self) -> &[String] {
        &self.tracker.config().supported_stages
    }

    async fn execute(&mut self, ctx: C) -> Result<C, TrackerError> {
        if !<Self as Plugin<C>>::supports_stage(self, ctx.stage()) {
            return Err(TrackerError::UnsupportedStage {
                plugin: Self::NAME.to_string(),
                stage: ctx.stage().to_string(),
            });
        }
        self.tracker.process(ctx)
    }
}
