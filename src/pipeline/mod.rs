//! Inbound message pipeline: classify, resolve the author, cache media,
//! build the canonical payload and hand it to the webhook dispatcher.
//!
//! Every message is processed independently; a failure in one never
//! blocks another.

pub mod classify;
pub mod contacts;
pub mod dispatch;
pub mod payload;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::lifecycle::LifecycleBroadcaster;
use crate::media::MediaCache;
use crate::session::{InboundMessage, SessionClient, SessionEvent};
use classify::{MessageKind, classify};
use contacts::{ContactDirectory, resolve_by_author};
use dispatch::{DispatchOutcome, WebhookDispatcher};
use payload::MediaOutcome;

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Self-originated; dropped silently.
    Ignored,
    /// Classified, logged and not forwarded.
    NotForwarded(MessageKind),
    Dispatched(DispatchOutcome),
}

pub struct Pipeline {
    session: Arc<dyn SessionClient>,
    contacts: ContactDirectory,
    media: Arc<MediaCache>,
    dispatcher: WebhookDispatcher,
}

impl Pipeline {
    pub fn new(
        session: Arc<dyn SessionClient>,
        media: Arc<MediaCache>,
        dispatcher: WebhookDispatcher,
        contact_ttl: Duration,
    ) -> Self {
        Self {
            contacts: ContactDirectory::new(session.clone(), contact_ttl),
            session,
            media,
            dispatcher,
        }
    }

    pub async fn handle(&self, message: &InboundMessage) -> PipelineOutcome {
        let kind = classify(message);

        if !kind.is_dispatchable() {
            match &kind {
                MessageKind::Ignored => {
                    debug!("ignoring self-originated message {}", message.id);
                    return PipelineOutcome::Ignored;
                }
                MessageKind::DirectText { phone_number } => {
                    info!("direct message from {}: {}", phone_number, message.body);
                }
                MessageKind::Unsupported { declared_type } => {
                    info!(
                        "unsupported message type '{}' in {} ({}), not forwarded",
                        declared_type, message.from, message.id
                    );
                }
                _ => {}
            }
            return PipelineOutcome::NotForwarded(kind);
        }

        let directory = self.contacts.snapshot().await;
        let author = message.author.as_deref().unwrap_or("");
        let contact = resolve_by_author(&directory, author);
        if !contact.found {
            debug!("no phone number resolved for author '{}'", author);
        }

        let media = if kind.is_image() {
            payload::prepare_media(self.session.as_ref(), &self.media, message).await
        } else {
            MediaOutcome::NotApplicable
        };

        let Some(payload) = payload::build(message, &kind, &contact, media) else {
            warn!("no payload built for dispatchable message {}", message.id);
            return PipelineOutcome::NotForwarded(kind);
        };

        PipelineOutcome::Dispatched(self.dispatcher.dispatch(&payload).await)
    }
}

/// Drain the session event queue until every producer is gone.
///
/// Messages are processed concurrently, one task each. Lifecycle events are
/// applied inline so state transitions keep their order.
pub async fn run_event_loop(
    mut rx: mpsc::Receiver<SessionEvent>,
    pipeline: Arc<Pipeline>,
    lifecycle: Arc<LifecycleBroadcaster>,
) {
    info!("event loop started");
    while let Some(event) = rx.recv().await {
        match event {
            SessionEvent::Message(message) => {
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    pipeline.handle(&message).await;
                });
            }
            other => lifecycle.handle(&other),
        }
    }
    info!("event loop stopped: all producers closed");
}
