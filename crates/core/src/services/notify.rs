//! Notification fan-out: bus events delivered to configured adapters

use crate::error::Result;
use crate::events::{EventHandler, SystemEvent};
use crate::registry::ExtRegistry;
use std::sync::Arc;
use tracing::warn;

pub struct NotificationFanout {
    registry: Arc<ExtRegistry>,
}

impl NotificationFanout {
    pub fn new(registry: Arc<ExtRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait::async_trait]
impl EventHandler for NotificationFanout {
    async fn handle(&self, event: &SystemEvent) -> Result<()> {
        for adapter in self.registry.notifications().await {
            if !adapter.supports(event) {
                continue;
            }
            if let Err(e) = adapter.send(event).await {
                // Delivery failures never affect the pipeline.
                warn!(event = ?event.event_type(), "notification delivery failed: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedNotification;
    use uuid::Uuid;

    #[tokio::test]
    async fn delivers_to_registered_adapters() {
        let registry = Arc::new(ExtRegistry::new());
        let adapter = Arc::new(ScriptedNotification::default());
        registry.register_notification(1, adapter.clone()).await;

        let fanout = NotificationFanout::new(registry);
        fanout
            .handle(&SystemEvent::MovieAdded {
                movie_id: Uuid::new_v4(),
            })
            .await
            .unwrap();

        assert_eq!(adapter.sent.lock().unwrap().len(), 1);
    }
}
