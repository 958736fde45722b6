//! Event fan-out
//!
//! A broadcast bus decouples the pipeline from notification adapters,
//! calendar invalidation and anything else that wants to observe domain
//! events. Publishing never fails on missing receivers.

use crate::error::{ReelvaultError, Result};
use crate::models::quality::QualityId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};
use uuid::Uuid;

const EVENT_BUFFER_SIZE: usize = 1000;

/// Discriminant used by notification adapters to filter deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    Grabbed,
    Imported,
    Upgraded,
    MovieAdded,
    MovieUpdated,
    MovieDeleted,
    MovieFileDeleted,
    DownloadFailed,
    Health,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Ok,
    Warning,
    Error,
}

/// Domain events published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SystemEvent {
    Grabbed {
        movie_id: Uuid,
        release_title: String,
        quality: QualityId,
        download_id: String,
    },
    Imported {
        movie_id: Uuid,
        movie_file_id: Uuid,
        path: String,
        upgrade: bool,
    },
    MovieAdded {
        movie_id: Uuid,
    },
    MovieUpdated {
        movie_id: Uuid,
    },
    MovieDeleted {
        movie_id: Uuid,
        deleted_files: bool,
    },
    MovieFileDeleted {
        movie_id: Uuid,
        path: String,
    },
    DownloadFailed {
        movie_id: Uuid,
        download_id: String,
        message: String,
    },
    Health {
        component: String,
        level: HealthLevel,
        message: String,
    },
}

impl SystemEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            SystemEvent::Grabbed { .. } => EventType::Grabbed,
            SystemEvent::Imported { upgrade: true, .. } => EventType::Upgraded,
            SystemEvent::Imported { .. } => EventType::Imported,
            SystemEvent::MovieAdded { .. } => EventType::MovieAdded,
            SystemEvent::MovieUpdated { .. } => EventType::MovieUpdated,
            SystemEvent::MovieDeleted { .. } => EventType::MovieDeleted,
            SystemEvent::MovieFileDeleted { .. } => EventType::MovieFileDeleted,
            SystemEvent::DownloadFailed { .. } => EventType::DownloadFailed,
            SystemEvent::Health { .. } => EventType::Health,
        }
    }

    /// True for events that change what the calendar would render.
    pub fn invalidates_calendar(&self) -> bool {
        matches!(
            self.event_type(),
            EventType::MovieAdded
                | EventType::MovieUpdated
                | EventType::MovieDeleted
                | EventType::Imported
                | EventType::Upgraded
        )
    }

    pub fn movie_id(&self) -> Option<Uuid> {
        match self {
            SystemEvent::Grabbed { movie_id, .. }
            | SystemEvent::Imported { movie_id, .. }
            | SystemEvent::MovieAdded { movie_id }
            | SystemEvent::MovieUpdated { movie_id }
            | SystemEvent::MovieDeleted { movie_id, .. }
            | SystemEvent::MovieFileDeleted { movie_id, .. }
            | SystemEvent::DownloadFailed { movie_id, .. } => Some(*movie_id),
            SystemEvent::Health { .. } => None,
        }
    }
}

/// Broadcast bus for domain events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { sender }
    }

    pub fn publish(&self, event: SystemEvent) {
        debug!("publishing event {:?}", event.event_type());
        if self.sender.send(event).is_err() {
            // No receivers; nothing to deliver.
            debug!("event published with no receivers");
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EventSubscriber {
    receiver: broadcast::Receiver<SystemEvent>,
}

impl EventSubscriber {
    pub async fn recv(&mut self) -> Result<SystemEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(ReelvaultError::internal("event bus closed"))
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("event subscriber lagged, skipped {} events", skipped);
                }
            }
        }
    }
}

/// Subscriber-side handler.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &SystemEvent) -> Result<()>;

    fn wants(&self, event: &SystemEvent) -> bool {
        let _ = event;
        true
    }
}

/// Forwards bus events to registered handlers until the bus closes.
pub struct EventProcessor {
    subscriber: EventSubscriber,
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventProcessor {
    pub fn new(bus: &EventBus) -> Self {
        Self {
            subscriber: bus.subscribe(),
            handlers: Vec::new(),
        }
    }

    pub fn add_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub async fn run(mut self) {
        while let Ok(event) = self.subscriber.recv().await {
            for handler in &self.handlers {
                if handler.wants(&event) {
                    if let Err(e) = handler.handle(&event).await {
                        error!("event handler failed for {:?}: {}", event.event_type(), e);
                    }
                }
            }
        }
        debug!("event processor shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{timeout, Duration};

    struct Counter(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl EventHandler for Counter {
        async fn handle(&self, _event: &SystemEvent) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::new();
        let mut subscriber = bus.subscribe();

        bus.publish(SystemEvent::MovieAdded {
            movie_id: Uuid::new_v4(),
        });

        let event = timeout(Duration::from_millis(100), subscriber.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type(), EventType::MovieAdded);
    }

    #[tokio::test]
    async fn processor_fans_out() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let processor = EventProcessor::new(&bus).add_handler(Arc::new(Counter(count.clone())));
        let handle = tokio::spawn(processor.run());
        tokio::time::sleep(Duration::from_millis(10)).await;

        for _ in 0..3 {
            bus.publish(SystemEvent::Health {
                component: "indexer".to_string(),
                level: HealthLevel::Warning,
                message: "slow".to_string(),
            });
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        drop(bus);
        let _ = timeout(Duration::from_millis(100), handle).await;
    }

    #[test]
    fn upgrade_import_has_its_own_event_type() {
        let event = SystemEvent::Imported {
            movie_id: Uuid::new_v4(),
            movie_file_id: Uuid::new_v4(),
            path: "/movies/x.mkv".to_string(),
            upgrade: true,
        };
        assert_eq!(event.event_type(), EventType::Upgraded);
        assert!(event.invalidates_calendar());
    }
}
