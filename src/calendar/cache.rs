use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::calendar::types::Event;

/// Source of calendar events. Called at most once per `EventCache`.
#[async_trait]
pub trait EventProvider: Send + Sync {
    async fn fetch_events(&self) -> anyhow::Result<Vec<Event>>;
}

/// Reads a JSON array of events from disk.
pub struct JsonFileEventProvider {
    path: PathBuf,
}

impl JsonFileEventProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EventProvider for JsonFileEventProvider {
    async fn fetch_events(&self) -> anyhow::Result<Vec<Event>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading events from {}", self.path.display()))?;
        let events: Vec<Event> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing events in {}", self.path.display()))?;
        Ok(events)
    }
}

/// Fixed event list, used when no calendar source is configured.
#[derive(Default)]
pub struct StaticEventProvider {
    events: Vec<Event>,
}

impl StaticEventProvider {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl EventProvider for StaticEventProvider {
    async fn fetch_events(&self) -> anyhow::Result<Vec<Event>> {
        Ok(self.events.clone())
    }
}

#[derive(Debug)]
struct CachedEvents {
    events: Arc<[Event]>,
    failure: Option<String>,
}

/// Single-key, never-expiring cache in front of an `EventProvider`.
pub struct EventCache {
    provider: Arc<dyn EventProvider>,
    cell: OnceCell<CachedEvents>,
}

impl EventCache {
    pub fn new(provider: Arc<dyn EventProvider>) -> Self {
        Self {
            provider,
            cell: OnceCell::new(),
        }
    }

    /// Returns the cached events, fetching them on first use.
    ///
    /// A provider failure is cached as an empty list; it is not retried.
    pub async fn get_events(&self) -> Arc<[Event]> {
        let cached = self
            .cell
            .get_or_init(|| async {
                match self.provider.fetch_events().await {
                    Ok(events) => {
                        info!("Event cache loaded {} events", events.len());
                        CachedEvents {
                            events: events.into(),
                            failure: None,
                        }
                    }
                    Err(e) => {
                        warn!("Event provider unavailable, continuing without events: {:#}", e);
                        CachedEvents {
                            events: Arc::from(Vec::new()),
                            failure: Some(format!("{:#}", e)),
                        }
                    }
                }
            })
            .await;
        Arc::clone(&cached.events)
    }

    /// The recorded provider failure, if the first fetch failed.
    pub fn provider_failure(&self) -> Option<&str> {
        self.cell.get().and_then(|c| c.failure.as_deref())
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}
