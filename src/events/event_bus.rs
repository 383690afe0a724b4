use super::types::{CatalogEvent, EventType};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

const MAX_HISTORY: usize = 100;

/// Event subscriber handle
pub struct EventSubscriber {
    receiver: broadcast::Receiver<CatalogEvent>,
    types: Option<Vec<EventType>>,
}

impl EventSubscriber {
    fn wants(&self, event: &CatalogEvent) -> bool {
        self.types
            .as_ref()
            .is_none_or(|types| types.contains(&event.event_type))
    }

    /// Receive the next matching event. `None` once the bus is gone.
    /// Lagging subscribers skip what they missed.
    pub async fn recv(&mut self) -> Option<CatalogEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!("Event subscriber lagged by {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive without blocking
    pub fn try_recv(&mut self) -> Option<CatalogEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct EventBusStats {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub dropped_events: u64,
}

/// Broadcasts catalog events to whoever is listening.
/// Publishing never fails; events with no subscriber are counted and dropped.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<CatalogEvent>,
    stats: Mutex<EventBusStats>,
    history: Mutex<Vec<CatalogEvent>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            stats: Mutex::new(EventBusStats::default()),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn publish(&self, event: CatalogEvent) {
        trace!("Publishing event: {}", event.event_type.as_str());

        {
            let mut history = self.history.lock().unwrap_or_else(|p| p.into_inner());
            history.push(event.clone());
            if history.len() > MAX_HISTORY {
                let excess = history.len() - MAX_HISTORY;
                history.drain(0..excess);
            }
        }

        let delivered = self.sender.send(event.clone()).is_ok();

        let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        stats.total_events += 1;
        *stats
            .events_by_type
            .entry(event.event_type.as_str().to_string())
            .or_insert(0) += 1;
        if !delivered {
            stats.dropped_events += 1;
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
            types: None,
        }
    }

    pub fn subscribe_to_types(&self, types: Vec<EventType>) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
            types: Some(types),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn stats(&self) -> EventBusStats {
        self.stats.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Recent events, oldest first
    pub fn history(&self) -> Vec<CatalogEvent> {
        self.history.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}
