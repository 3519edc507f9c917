//! Fixed-interval trigger.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{TriggerHandle, WakeResult, WakeupSource};

/// Wakes the run loop once per interval until the deadline.
#[derive(Debug, Clone)]
pub struct PollTrigger {
    interval: Duration,
    until: Option<Instant>,
}

impl PollTrigger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            until: None,
        }
    }

    /// Stop ticking once `deadline` has passed.
    pub fn until(mut self, deadline: Instant) -> Self {
        self.until = Some(deadline);
        self
    }

    pub async fn run(self, handle: TriggerHandle, mut shutdown: broadcast::Receiver<()>) {
        info!("Poll trigger started (every {:?})", self.interval);

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("Poll trigger received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    if self.until.is_some_and(|until| Instant::now() >= until) {
                        info!("Poll trigger reached the deadline");
                        break;
                    }
                    if handle.wake(WakeupSource::Poll) == WakeResult::Closed {
                        debug!("Run loop gone, stopping poll trigger");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::trigger_channel;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_deadline() {
        let (handle, mut rx) = trigger_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let deadline = Instant::now() + Duration::from_millis(350);
        let task = tokio::spawn(
            PollTrigger::new(Duration::from_millis(100))
                .until(deadline)
                .run(handle, shutdown_rx),
        );

        let mut received = 0;
        while let Some(wakeup) = rx.recv().await {
            assert_eq!(wakeup.source, WakeupSource::Poll);
            received += 1;
        }
        task.await.unwrap();
        assert_eq!(received, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_shutdown() {
        let (handle, _rx) = trigger_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(PollTrigger::new(Duration::from_secs(60)).run(handle, shutdown_rx));
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
