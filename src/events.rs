//! Cache notifications delivered to the surrounding player/proxy
//!
//! Events travel over a `tokio::sync::broadcast` channel. Publishing is a
//! plain synchronous call, so download workers on ordinary threads can emit
//! without a runtime; subscribers may consume with `recv().await` or, from
//! synchronous code, `try_recv()` / `blocking_recv()`.

use crate::configuration::ResourceConfiguration;
use crate::error::CacheError;
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of events buffered per subscriber
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Notification about a cached resource
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// New bytes were cached; throttled per resource
    Updated {
        resource_key: String,
        configuration: ResourceConfiguration,
    },
    /// A download session completed or failed; never throttled
    Finished {
        resource_key: String,
        configuration: ResourceConfiguration,
        error: Option<CacheError>,
    },
}

impl CacheEvent {
    pub fn resource_key(&self) -> &str {
        match self {
            CacheEvent::Updated { resource_key, .. } => resource_key,
            CacheEvent::Finished { resource_key, .. } => resource_key,
        }
    }

    pub fn configuration(&self) -> &ResourceConfiguration {
        match self {
            CacheEvent::Updated { configuration, .. } => configuration,
            CacheEvent::Finished { configuration, .. } => configuration,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, CacheEvent::Finished { .. })
    }
}

/// Broadcast channel for [`CacheEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CacheEvent>,
}

impl EventBus {
    /// Create an event bus buffering `capacity` events per subscriber
    ///
    /// A subscriber that falls further behind receives
    /// `RecvError::Lagged` and continues with newer events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event, returning how many subscribers received it
    ///
    /// Having no subscribers is normal and not reported as an error.
    pub fn emit(&self, event: CacheEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                trace!("No subscribers for event on {}", event.resource_key());
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}
