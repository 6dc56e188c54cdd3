//! Tracker state persistence backends.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result, bail};

use crate::persistence::{atomic_write_text, read_text_if_present};
use crate::schema::TrackerSnapshot;

/// Persistence abstraction for tracker state.
pub trait StateSink: Send + Sync {
    /// Backend identifier for logs.
    fn backend_name(&self) -> &'static str;

    /// Human-readable location of the sink.
    fn target(&self) -> String;

    /// Load the persisted snapshot. `Ok(None)` means no prior state.
    fn load(&self) -> Result<Option<TrackerSnapshot>>;

    /// Replace the persisted snapshot.
    fn save(&self, snapshot: &TrackerSnapshot) -> Result<()>;
}

/// Local JSON file sink with atomic replace.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    /// Create a sink writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File the sink reads and writes.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateSink for JsonFileSink {
    fn backend_name(&self) -> &'static str {
        "json-file"
    }

    fn target(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Option<TrackerSnapshot>> {
        let Some(text) = read_text_if_present(&self.path)? else {
            return Ok(None);
        };
        let snapshot = TrackerSnapshot::from_json(&text)
            .with_context(|| format!("failed to decode tracker state {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &TrackerSnapshot) -> Result<()> {
        let json = snapshot
            .to_json()
            .context("failed to encode tracker state snapshot")?;
        atomic_write_text(&self.path, &json)
    }
}

#[derive(Debug)]
struct MemorySinkInner {
    payload: Option<String>,
    available: bool,
}

/// In-process sink holding the last saved JSON document.
#[derive(Debug)]
pub struct MemorySink {
    inner: Mutex<MemorySinkInner>,
}

impl MemorySink {
    /// Create an empty, available sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemorySinkInner {
                payload: None,
                available: true,
            }),
        }
    }

    /// Create a sink pre-seeded with a raw document.
    #[must_use]
    pub fn with_payload(payload: impl Into<String>) -> Self {
        let sink = Self::new();
        sink.lock().payload = Some(payload.into());
        sink
    }

    /// Simulate an outage: while unavailable, load and save fail.
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Raw JSON document last written, if any.
    #[must_use]
    pub fn payload(&self) -> Option<String> {
        self.lock().payload.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemorySinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl StateSink for MemorySink {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn target(&self) -> String {
        "memory".to_string()
    }

    fn load(&self) -> Result<Option<TrackerSnapshot>> {
        let inner = self.lock();
        if !inner.available {
            bail!("memory sink unavailable");
        }
        match inner.payload.as_deref() {
            None => Ok(None),
            Some(text) if text.trim().is_empty() => Ok(None),
            Some(text) => Ok(Some(
                TrackerSnapshot::from_json(text).context("failed to decode memory sink payload")?,
            )),
        }
    }

    fn save(&self, snapshot: &TrackerSnapshot) -> Result<()> {
        let json = snapshot
            .to_json()
            .context("failed to encode tracker state snapshot")?;
        let mut inner = self.lock();
        if !inner.available {
            bail!("memory sink unavailable");
        }
        inner.payload = Some(json);
        Ok(())
    }
}

/// Shared sinks delegate, so a host can keep a handle on the sink it hands over.
impl<S: StateSink + ?Sized> StateSink for std::sync::Arc<S> {
    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }

    fn target(&self) -> String {
        (**self).target()
    }

    fn load(&self) -> Result<Option<TrackerSnapshot>> {
        (**self).load()
    }

    fn save(&self, snapshot: &TrackerSnapshot) -> Result<()> {
        (**self).save(snapshot)
    }
}
