//! Fire-and-forget delivery of progress events.
//!
//! Producers never wait on the transport: events go into a bounded queue
//! and are dropped when it is full. One drain task forwards them to the
//! notifier and logs delivery failures.

use crate::domain::jobs::ProgressEvent;
use crate::ports::notifier::ProgressNotifier;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<ProgressEvent>,
    dropped: Arc<AtomicU64>,
}

impl NotificationQueue {
    /// Starts the drain task. It runs until every queue handle is dropped.
    pub fn start<N>(notifier: N, capacity: usize) -> (Self, JoinHandle<()>)
    where
        N: ProgressNotifier + 'static,
    {
        let (sender, mut receiver) = mpsc::channel::<ProgressEvent>(capacity.max(1));

        let drain = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match notifier.publish(&event).await {
                    Ok(()) => debug!(channel = %event.channel, progress = %event.progress, "progress published"),
                    Err(e) => warn!(channel = %event.channel, error = %e, "failed to publish progress"),
                }
            }
        });

        let queue = Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (queue, drain)
    }

    /// Queues `event` without waiting. Returns false if it was dropped.
    pub fn publish(&self, event: ProgressEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(channel = %event.channel, dropped, "notification queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(channel = %event.channel, dropped, "notification queue closed, dropping event");
                false
            }
        }
    }

    /// Events discarded because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
