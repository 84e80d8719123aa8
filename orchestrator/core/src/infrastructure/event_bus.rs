// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Progress Event Bus - Pub/Sub for provisioning progress
//
// In-memory fan-out of progress events using tokio broadcast channels, so the
// CLI and HTTP observers can follow runs without being the run's caller.
// Events are not persisted; a slow receiver lags and loses the oldest events.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::{ProgressSink, ProvisioningProgress};
use crate::domain::provisioning::ClientId;

#[derive(Clone)]
pub struct ProgressEventBus {
    sender: Arc<broadcast::Sender<ProvisioningProgress>>,
}

impl ProgressEventBus {
    /// Capacity is the number of events buffered before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: ProvisioningProgress) {
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to progress event");
        }
    }

    /// Subscribe to the events of every run
    pub fn subscribe(&self) -> ProgressReceiver {
        ProgressReceiver {
            receiver: self.sender.subscribe(),
            client_id: None,
        }
    }

    /// Subscribe to the events of one client's runs
    pub fn subscribe_client(&self, client_id: ClientId) -> ProgressReceiver {
        ProgressReceiver {
            receiver: self.sender.subscribe(),
            client_id: Some(client_id),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ProgressEventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl ProgressSink for ProgressEventBus {
    fn on_progress(&self, event: &ProvisioningProgress) {
        self.publish(event.clone());
    }
}

pub struct ProgressReceiver {
    receiver: broadcast::Receiver<ProvisioningProgress>,
    client_id: Option<ClientId>,
}

impl ProgressReceiver {
    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<ProvisioningProgress, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Progress receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Receive a matching event without waiting
    pub fn try_recv(&mut self) -> Result<ProvisioningProgress, EventBusError> {
        loop {
            let event = self.receiver.try_recv().map_err(|e| match e {
                broadcast::error::TryRecvError::Empty => EventBusError::Empty,
                broadcast::error::TryRecvError::Closed => EventBusError::Closed,
                broadcast::error::TryRecvError::Lagged(n) => {
                    warn!("Progress receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    fn matches(&self, event: &ProvisioningProgress) -> bool {
        self.client_id.as_ref().is_none_or(|id| id == &event.client_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provisioning::ProvisioningStatus;
    use chrono::Utc;

    fn event(client: &str, percentage: u8) -> ProvisioningProgress {
        ProvisioningProgress {
            client_id: ClientId::new(client),
            status: ProvisioningStatus::CreatingDatabase,
            message: "Creating database".to_string(),
            percentage,
            timestamp: Utc::now(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = ProgressEventBus::new(10);
        let mut receiver = bus.subscribe();

        bus.on_progress(&event("t1", 5));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.client_id.as_str(), "t1");
        assert_eq!(received.percentage, 5);
    }

    #[tokio::test]
    async fn test_client_filtering() {
        let bus = ProgressEventBus::new(10);
        let mut receiver = bus.subscribe_client(ClientId::new("t1"));

        bus.publish(event("t2", 5));
        bus.publish(event("t1", 15));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.client_id.as_str(), "t1");
        assert_eq!(received.percentage, 15);
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = ProgressEventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(event("t1", 5));
    }
}
