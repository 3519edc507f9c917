//! Notification hub trigger.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::metrics;

use super::signalr::{HubConnector, HubError, HubSession};
use super::{TriggerHandle, WakeResult, WakeupSource};

/// Wakes the run loop on hub notifications, resubscribing after disconnects.
///
/// Every (re)connect also issues one wake-up, so notifications missed while
/// disconnected are covered by a fresh snapshot.
pub struct PushTrigger {
    connector: HubConnector,
    reconnect_delay: Duration,
}

enum SessionEnd {
    Disconnected(HubError),
    ConsumerClosed,
}

impl PushTrigger {
    pub fn new(connector: HubConnector, reconnect_delay: Duration) -> Self {
        Self {
            connector,
            reconnect_delay,
        }
    }

    pub async fn run(self, handle: TriggerHandle, mut shutdown: broadcast::Receiver<()>) {
        info!("Push trigger subscribing to {}", self.connector.hub_url());

        loop {
            let connected = tokio::select! {
                _ = shutdown.recv() => break,
                result = self.connector.connect() => result,
            };

            match connected {
                Ok(mut session) => {
                    metrics::PUSH_CONNECTIONS.with_label_values(&["connected"]).inc();
                    if handle.wake(WakeupSource::Push) == WakeResult::Closed {
                        session.close();
                        break;
                    }

                    let end = tokio::select! {
                        _ = shutdown.recv() => {
                            session.close();
                            debug!("Push trigger received shutdown signal");
                            break;
                        }
                        end = pump(&mut session, &handle) => end,
                    };

                    match end {
                        SessionEnd::ConsumerClosed => {
                            session.close();
                            break;
                        }
                        SessionEnd::Disconnected(e) => {
                            warn!("Hub connection lost: {}", e);
                        }
                    }
                }
                Err(e) => {
                    metrics::PUSH_CONNECTIONS.with_label_values(&["failed"]).inc();
                    warn!("Hub connection failed: {}", e);
                }
            }

            if handle.is_closed() {
                break;
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {
                    debug!("Resubscribing to hub");
                }
            }
        }

        info!("Push trigger stopped");
    }
}

async fn pump(session: &mut HubSession, handle: &TriggerHandle) -> SessionEnd {
    loop {
        match session.next_notification().await {
            Ok(notification) if notification.requests_reconciliation() => {
                debug!(
                    "Job notification (module {:?}, job {:?})",
                    notification.module, notification.job_id
                );
                if handle.wake(WakeupSource::Push) == WakeResult::Closed {
                    return SessionEnd::ConsumerClosed;
                }
            }
            Ok(notification) => {
                debug!(
                    "Progress for {:?}: {}",
                    notification.module,
                    notification.progress_message.unwrap_or_default()
                );
            }
            Err(e) => return SessionEnd::Disconnected(e),
        }
    }
}
