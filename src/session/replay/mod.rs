//! Session backend that replays recorded events from a JSON-lines stream.
//!
//! Each line is one [`ReplayRecord`]. Contacts and media attached to the
//! stream are served back through [`SessionClient`], so the bridge runs
//! end to end without a live protocol connection.
//!
//! ```text
//! {"event":"contacts","contacts":[{"id":"1234@c.us","name":"Bob","number":"1234","isUser":true}]}
//! {"event":"ready"}
//! {"event":"message","message":{"id":"m1","from":"1203@g.us","author":"A@g.us","type":"chat","body":"hi"}}
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{ContactRecord, DownloadedMedia, InboundMessage, SessionClient, SessionEvent};
use crate::bus::EventSender;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReplayRecord {
    Message {
        message: InboundMessage,
        /// Media served when the bridge downloads this message's attachment.
        #[serde(default)]
        media: Option<DownloadedMedia>,
    },
    /// Replaces the contact directory.
    Contacts { contacts: Vec<ContactRecord> },
    Qr { code: String },
    Ready,
    Disconnected {
        #[serde(default)]
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub published: usize,
    pub skipped: usize,
}

#[derive(Default)]
pub struct ReplaySession {
    contacts: RwLock<Vec<ContactRecord>>,
    media: Mutex<HashMap<String, DownloadedMedia>>,
    deleted: Mutex<Vec<String>>,
    initializations: AtomicUsize,
}

impl ReplaySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of messages deleted at the webhook's request, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }

    /// Read records until EOF and publish them in order.
    /// Blank lines are skipped; malformed lines are logged and skipped.
    pub async fn replay<R>(&self, reader: R, events: &EventSender) -> Result<ReplayStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut stats = ReplayStats::default();
        let mut lines = reader.lines();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await.context("failed to read event stream")? {
            line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: ReplayRecord = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    warn!("event stream line {}: {}", line_no, e);
                    stats.skipped += 1;
                    continue;
                }
            };
            if let Some(event) = self.apply(record).await {
                events.publish(event).await?;
                stats.published += 1;
            }
        }

        info!(
            "event stream finished: {} published, {} skipped",
            stats.published, stats.skipped
        );
        Ok(stats)
    }

    async fn apply(&self, record: ReplayRecord) -> Option<SessionEvent> {
        match record {
            ReplayRecord::Message { message, media } => {
                if let Some(media) = media
                    && let Ok(mut store) = self.media.lock()
                {
                    store.insert(message.id.clone(), media);
                }
                Some(SessionEvent::Message(message))
            }
            ReplayRecord::Contacts { contacts } => {
                debug!("contact directory replaced: {} records", contacts.len());
                *self.contacts.write().await = contacts;
                None
            }
            ReplayRecord::Qr { code } => Some(SessionEvent::QrCode(code)),
            ReplayRecord::Ready => Some(SessionEvent::Ready),
            ReplayRecord::Disconnected { reason } => Some(SessionEvent::Disconnected { reason }),
        }
    }
}

#[async_trait]
impl SessionClient for ReplaySession {
    async fn get_contacts(&self) -> Result<Vec<ContactRecord>> {
        Ok(self.contacts.read().await.clone())
    }

    async fn download_media(&self, message: &InboundMessage) -> Result<DownloadedMedia> {
        self.media
            .lock()
            .map_err(|_| anyhow::anyhow!("media store poisoned"))?
            .get(&message.id)
            .cloned()
            .with_context(|| format!("no media recorded for message {}", message.id))
    }

    async fn delete_for_everyone(&self, message: &InboundMessage) -> Result<()> {
        self.deleted
            .lock()
            .map_err(|_| anyhow::anyhow!("deletion log poisoned"))?
            .push(message.id.clone());
        info!("replay: message {} deleted for everyone", message.id);
        Ok(())
    }

    async fn initialize(&self) -> Result<()> {
        self.initializations.fetch_add(1, Ordering::SeqCst);
        info!("replay: session initialized");
        Ok(())
    }
}
