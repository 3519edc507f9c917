//! Wake-up triggers for the run loop.
//!
//! Triggers never reconcile themselves. They push a [`Wakeup`] onto a
//! single-consumer channel with room for exactly one pending item; a wake-up
//! that arrives while another is pending is coalesced.

mod config;
mod poll;
mod push;
pub mod signalr;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::metrics;

pub use config::{TriggerConfig, TriggerMode};
pub use poll::PollTrigger;
pub use push::PushTrigger;
pub use signalr::{HubConnector, HubError, Notification};

/// Pending wake-ups the channel can hold.
pub const TRIGGER_CAPACITY: usize = 1;

/// Where a wake-up came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupSource {
    Poll,
    Push,
    Manual,
}

impl WakeupSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WakeupSource::Poll => "poll",
            WakeupSource::Push => "push",
            WakeupSource::Manual => "manual",
        }
    }
}

/// A request for one reconciliation turn.
#[derive(Debug, Clone)]
pub struct Wakeup {
    pub source: WakeupSource,
    pub at: DateTime<Utc>,
}

/// Result of offering a wake-up to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeResult {
    Queued,
    /// Another wake-up was already pending.
    Coalesced,
    /// The run loop is gone.
    Closed,
}

impl WakeResult {
    fn as_str(&self) -> &'static str {
        match self {
            WakeResult::Queued => "queued",
            WakeResult::Coalesced => "coalesced",
            WakeResult::Closed => "closed",
        }
    }
}

/// Sending side of the wake-up channel.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<Wakeup>,
}

impl TriggerHandle {
    /// Request a turn. Never blocks.
    pub fn wake(&self, source: WakeupSource) -> WakeResult {
        let wakeup = Wakeup {
            source,
            at: Utc::now(),
        };
        let result = match self.tx.try_send(wakeup) {
            Ok(()) => WakeResult::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => WakeResult::Coalesced,
            Err(mpsc::error::TrySendError::Closed(_)) => WakeResult::Closed,
        };
        metrics::TRIGGER_WAKEUPS
            .with_label_values(&[source.as_str(), result.as_str()])
            .inc();
        result
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create the wake-up channel.
pub fn trigger_channel() -> (TriggerHandle, mpsc::Receiver<Wakeup>) {
    let (tx, rx) = mpsc::channel(TRIGGER_CAPACITY);
    (TriggerHandle { tx }, rx)
}

/// A configured trigger adapter.
pub enum Trigger {
    Poll(PollTrigger),
    Push(PushTrigger),
}

impl Trigger {
    pub fn mode(&self) -> TriggerMode {
        match self {
            Trigger::Poll(_) => TriggerMode::Poll,
            Trigger::Push(_) => TriggerMode::Push,
        }
    }

    /// Run the adapter in the background until shutdown.
    pub fn spawn(self, handle: TriggerHandle, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        match self {
            Trigger::Poll(poll) => tokio::spawn(poll.run(handle, shutdown)),
            Trigger::Push(push) => tokio::spawn(push.run(handle, shutdown)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_wake_is_coalesced() {
        let (handle, mut rx) = trigger_channel();
        assert_eq!(handle.wake(WakeupSource::Push), WakeResult::Queued);
        assert_eq!(handle.wake(WakeupSource::Push), WakeResult::Coalesced);
        assert_eq!(handle.wake(WakeupSource::Poll), WakeResult::Coalesced);

        let wakeup = rx.recv().await.unwrap();
        assert_eq!(wakeup.source, WakeupSource::Push);
        assert!(rx.try_recv().is_err());

        assert_eq!(handle.wake(WakeupSource::Manual), WakeResult::Queued);
    }

    #[tokio::test]
    async fn test_wake_after_receiver_dropped() {
        let (handle, rx) = trigger_channel();
        drop(rx);
        assert!(handle.is_closed());
        assert_eq!(handle.wake(WakeupSource::Poll), WakeResult::Closed);
    }
}
