// Shared test helpers, not all items used by every test binary.
#![allow(unused)]

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wabridge::config::ReconnectConfig;
use wabridge::gateway::GatewayState;
use wabridge::lifecycle::LifecycleBroadcaster;
use wabridge::media::MediaCache;
use wabridge::pipeline::Pipeline;
use wabridge::pipeline::dispatch::WebhookDispatcher;
use wabridge::session::{
    ContactRecord, DownloadedMedia, InboundMessage, SessionClient,
};

pub const GROUP_ID: &str = "120363041234567890@g.us";
pub const PUBLIC_BASE: &str = "http://localhost:3333";

/// Session double that serves canned contacts and media and records deletions.
#[derive(Default)]
pub struct FakeSession {
    pub contacts: Mutex<Vec<ContactRecord>>,
    pub media: Mutex<HashMap<String, DownloadedMedia>>,
    pub deleted: Mutex<Vec<String>>,
}

impl FakeSession {
    pub fn with_bob() -> Self {
        let session = Self::default();
        *session.contacts.lock().unwrap() = vec![
            contact("A@g.us", "Bob", None),
            contact("1234@c.us", "Bob", Some("1234")),
        ];
        session
    }

    pub fn add_media(&self, message_id: &str, bytes: &[u8], mimetype: &str) {
        self.media.lock().unwrap().insert(
            message_id.to_string(),
            DownloadedMedia {
                data: BASE64.encode(bytes),
                mimetype: mimetype.to_string(),
                filename: None,
            },
        );
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionClient for FakeSession {
    async fn get_contacts(&self) -> anyhow::Result<Vec<ContactRecord>> {
        Ok(self.contacts.lock().unwrap().clone())
    }

    async fn download_media(&self, message: &InboundMessage) -> anyhow::Result<DownloadedMedia> {
        self.media
            .lock()
            .unwrap()
            .get(&message.id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no media for {}", message.id))
    }

    async fn delete_for_everyone(&self, message: &InboundMessage) -> anyhow::Result<()> {
        self.deleted.lock().unwrap().push(message.id.clone());
        Ok(())
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub fn contact(id: &str, name: &str, number: Option<&str>) -> ContactRecord {
    ContactRecord {
        id: id.to_string(),
        name: Some(name.to_string()),
        number: number.map(ToString::to_string),
        is_user: true,
    }
}

pub fn group_message(id: &str, message_type: &str, body: &str) -> InboundMessage {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "from": GROUP_ID,
        "author": "A@g.us",
        "type": message_type,
        "body": body,
        "hasMedia": message_type == "image",
        "timestamp": 1_700_000_000
    }))
    .unwrap()
}

/// Everything a running bridge wires together, pointed at `webhook_url`.
pub struct TestBridge {
    pub tmp: TempDir,
    pub session: Arc<FakeSession>,
    pub media: Arc<MediaCache>,
    pub broadcaster: Arc<LifecycleBroadcaster>,
    pub pipeline: Arc<Pipeline>,
}

impl TestBridge {
    pub fn new(session: FakeSession, webhook_url: &str) -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let session = Arc::new(session);
        let media = Arc::new(
            MediaCache::new(
                tmp.path().join("temp"),
                PUBLIC_BASE,
                Duration::from_secs(3600),
                1024 * 1024,
            )
            .expect("create media cache"),
        );
        let broadcaster = Arc::new(LifecycleBroadcaster::new(
            session.clone(),
            ReconnectConfig {
                max_attempts: 1,
                base_delay_secs: 0,
                max_delay_secs: 0,
            },
        ));
        let dispatcher =
            WebhookDispatcher::new(webhook_url, Duration::from_secs(5), session.clone());
        let pipeline = Arc::new(Pipeline::new(
            session.clone(),
            media.clone(),
            dispatcher,
            Duration::ZERO,
        ));
        Self {
            tmp,
            session,
            media,
            broadcaster,
            pipeline,
        }
    }

    pub fn gateway_state(&self) -> GatewayState {
        GatewayState {
            broadcaster: self.broadcaster.clone(),
            media: self.media.clone(),
        }
    }
}
