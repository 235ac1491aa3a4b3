use crate::session::SessionEvent;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 1000;
/// Timeout for channel send operations to prevent indefinite blocking
/// when the consumer is slow or stalled.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Queue between a session backend and the bridge event loop.
///
/// Events are consumed in the order they were published.
pub struct EventBus {
    tx: mpsc::Sender<SessionEvent>,
    rx: Option<mpsc::Receiver<SessionEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self { tx, rx: Some(rx) }
    }

    /// Handle for producers. Cheap to clone.
    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    /// Extract the receiver; only the event loop should hold it.
    pub fn take_rx(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.rx.take()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<SessionEvent>,
}

impl EventSender {
    pub async fn publish(&self, event: SessionEvent) -> Result<()> {
        let label = event_label(&event);
        // Use timeout to prevent indefinite blocking when consumer is slow
        tokio::time::timeout(SEND_TIMEOUT, self.tx.send(event))
            .await
            .map_err(|_| {
                warn!(
                    "session event send timed out after {}s: queue full or event loop stalled",
                    SEND_TIMEOUT.as_secs()
                );
                anyhow::anyhow!("session event send timed out, queue full")
            })?
            .context("Failed to publish session event - receiver closed")?;
        debug!("session event queued: {}", label);
        Ok(())
    }
}

fn event_label(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Message(msg) => format!("message id={}", msg.id),
        SessionEvent::QrCode(_) => "qr".to_string(),
        SessionEvent::Ready => "ready".to_string(),
        SessionEvent::Disconnected { reason } => format!("disconnected reason={}", reason),
    }
}
