//! Connection lifecycle: tracks session readiness, fans lifecycle events
//! out to push subscribers and re-initializes the session after a drop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use crate::config::ReconnectConfig;
use crate::session::{SessionClient, SessionEvent};
use crate::utils::exponential_backoff_delay;

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    /// A pairing code is out and nobody has scanned it yet.
    AwaitingScan,
    Ready,
}

/// Shared, always-current connection state. Starts out `Disconnected`.
#[derive(Clone)]
pub struct SessionState {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl SessionState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.current() == ConnectionState::Ready
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    fn set(&self, state: ConnectionState) {
        self.tx.send_replace(state);
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Message pushed to realtime subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Snapshot sent once when a subscriber connects.
    State { state: ConnectionState },
    Qr { data: String },
    Ready,
    Disconnected { reason: String },
}

pub struct LifecycleBroadcaster {
    state: SessionState,
    events: broadcast::Sender<LifecycleEvent>,
    session: Arc<dyn SessionClient>,
    policy: ReconnectConfig,
    reconnecting: AtomicBool,
    print_qr: bool,
}

impl LifecycleBroadcaster {
    pub fn new(session: Arc<dyn SessionClient>, policy: ReconnectConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: SessionState::new(),
            events,
            session,
            policy,
            reconnecting: AtomicBool::new(false),
            print_qr: false,
        }
    }

    /// Also render pairing codes on stdout for whoever runs the process.
    #[must_use]
    pub fn with_terminal_qr(mut self, enabled: bool) -> Self {
        self.print_qr = enabled;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Apply a lifecycle event. Message events are not ours and are ignored.
    pub fn handle(self: &Arc<Self>, event: &SessionEvent) {
        match event {
            SessionEvent::Message(_) => {}
            SessionEvent::QrCode(code) => {
                info!("pairing code issued, waiting for scan");
                if self.print_qr {
                    print_terminal_qr(code);
                }
                self.state.set(ConnectionState::AwaitingScan);
                self.broadcast(LifecycleEvent::Qr { data: code.clone() });
            }
            SessionEvent::Ready => {
                info!("session ready");
                self.state.set(ConnectionState::Ready);
                self.broadcast(LifecycleEvent::Ready);
            }
            SessionEvent::Disconnected { reason } => {
                warn!("session disconnected: {}", reason);
                self.state.set(ConnectionState::Disconnected);
                self.broadcast(LifecycleEvent::Disconnected {
                    reason: reason.clone(),
                });
                if self
                    .reconnecting
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    let this = Arc::clone(self);
                    tokio::spawn(async move {
                        this.reinitialize().await;
                        this.reconnecting.store(false, Ordering::SeqCst);
                    });
                } else {
                    info!("re-initialization already in progress");
                }
            }
        }
    }

    /// Re-initialize the session: first attempt immediately, then with
    /// exponential backoff, up to `maxAttempts` in total.
    /// Returns whether an attempt succeeded.
    pub async fn reinitialize(&self) -> bool {
        let max_attempts = self.policy.max_attempts;
        if max_attempts == 0 {
            warn!("session re-initialization disabled (maxAttempts = 0)");
            return false;
        }

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = exponential_backoff_delay(
                    attempt - 1,
                    self.policy.base_delay_secs,
                    self.policy.max_delay_secs,
                );
                info!(
                    "retrying session initialization in {}s (attempt {}/{})",
                    delay,
                    attempt + 1,
                    max_attempts
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            match self.session.initialize().await {
                Ok(()) => {
                    info!("session re-initialized, awaiting pairing or ready");
                    return true;
                }
                Err(e) => warn!(
                    "session initialization attempt {}/{} failed: {}",
                    attempt + 1,
                    max_attempts,
                    e
                ),
            }
        }

        error!(
            "session re-initialization gave up after {} attempts",
            max_attempts
        );
        false
    }

    fn broadcast(&self, event: LifecycleEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

const MAX_QR_LINES: usize = 25;

fn print_terminal_qr(code: &str) {
    println!("\nScan this code to link the bridge:");
    if let Err(e) = qr2term::print_qr(code) {
        warn!("qr2term failed: {}, falling back to qrcode crate", e);
        match qrcode::QrCode::new(code) {
            Ok(qr) => {
                let rendered = qr
                    .render::<char>()
                    .quiet_zone(false)
                    .module_dimensions(2, 1)
                    .build();
                for line in rendered.lines().take(MAX_QR_LINES) {
                    println!("{}", line);
                }
            }
            Err(e) => {
                warn!("failed to render QR code: {}", e);
                println!("Raw pairing code: {}", code);
            }
        }
    }
    println!("\nOpen Settings > Linked Devices > Link a Device on the phone.");
}
