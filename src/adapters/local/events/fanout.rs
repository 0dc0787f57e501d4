use crate::domain::jobs::ProgressEvent;
use crate::ports::notifier::ProgressNotifier;
use crate::ports::PortError;
use async_trait::async_trait;

/// Publishes every event to each inner notifier in turn.
#[derive(Default)]
pub struct FanoutNotifier {
    notifiers: Vec<Box<dyn ProgressNotifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: impl ProgressNotifier + 'static) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }
}

#[async_trait]
impl ProgressNotifier for FanoutNotifier {
    /// Every notifier is tried; the first failure is returned.
    async fn publish(&self, event: &ProgressEvent) -> Result<(), PortError> {
        let mut first_error = None;
        for notifier in &self.notifiers {
            if let Err(e) = notifier.publish(event).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
