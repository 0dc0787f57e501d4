use crate::domain::jobs::ProgressEvent;
use crate::ports::notifier::ProgressNotifier;
use crate::ports::PortError;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// In-process broadcast of progress events, consumed by SSE subscribers.
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<ProgressEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Sends to every current subscriber; returns how many there were.
    pub fn broadcast(&self, event: ProgressEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl ProgressNotifier for EventHub {
    async fn publish(&self, event: &ProgressEvent) -> Result<(), PortError> {
        // Nobody listening is not a failure.
        self.broadcast(event.clone());
        Ok(())
    }
}
