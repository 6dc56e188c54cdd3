//! Host-facing invocation context.
//!
//! The plugin host owns the concrete context type. The tracker only needs to
//! read the message and stage and to read and write metadata, so any host
//! integration can implement [`InvocationContext`].

use serde::{Deserialize, Serialize};

use crate::record::Metadata;
use crate::tracker::TrackerError;

/// Capability the tracker needs from a host invocation.
pub trait InvocationContext {
    /// Message text of this invocation.
    fn message(&self) -> &str;

    /// Pipeline stage identifier.
    fn stage(&self) -> &str;

    /// Read access to auxiliary metadata.
    fn metadata(&self) -> &Metadata;

    /// Write access to auxiliary metadata.
    fn metadata_mut(&mut self) -> &mut Metadata;

    /// Owned, value-isolated copy of the metadata for history records.
    ///
    /// Hosts whose metadata holds values that cannot be captured as JSON
    /// override this and report [`TrackerError::MetadataSnapshot`].
    ///
    /// # Errors
    ///
    /// The default implementation never fails.
    fn snapshot_metadata(&self) -> Result<Metadata, TrackerError> {
        Ok(self.metadata().clone())
    }
}

/// Owned invocation: message, stage, metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Message text.
    pub message: String,
    /// Stage identifier.
    pub stage: String,
    /// Auxiliary metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Invocation {
    /// Create an invocation with empty metadata.
    #[must_use]
    pub fn new(message: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage: stage.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl InvocationContext for Invocation {
    fn message(&self) -> &str {
        &self.message
    }

    fn stage(&self) -> &str {
        &self.stage
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
