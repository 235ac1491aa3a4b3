//! In-memory [`SessionClient`] for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{ContactRecord, DownloadedMedia, InboundMessage, SessionClient};

#[derive(Default)]
pub(crate) struct MockSession {
    pub contacts: Mutex<Vec<ContactRecord>>,
    pub fail_contacts: AtomicBool,
    pub media: Mutex<Option<DownloadedMedia>>,
    pub fail_delete: AtomicBool,
    /// Number of upcoming `initialize` calls that should fail.
    pub fail_initialize: AtomicU32,
    pub contact_fetches: AtomicUsize,
    pub initializations: AtomicUsize,
    pub deleted: Mutex<Vec<String>>,
}

impl MockSession {
    pub fn with_contacts(contacts: Vec<ContactRecord>) -> Self {
        Self {
            contacts: Mutex::new(contacts),
            ..Self::default()
        }
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionClient for MockSession {
    async fn get_contacts(&self) -> anyhow::Result<Vec<ContactRecord>> {
        self.contact_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_contacts.load(Ordering::SeqCst) {
            anyhow::bail!("directory unavailable");
        }
        Ok(self.contacts.lock().unwrap().clone())
    }

    async fn download_media(&self, _message: &InboundMessage) -> anyhow::Result<DownloadedMedia> {
        self.media
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("media not available"))
    }

    async fn delete_for_everyone(&self, message: &InboundMessage) -> anyhow::Result<()> {
        self.deleted.lock().unwrap().push(message.id.clone());
        if self.fail_delete.load(Ordering::SeqCst) {
            anyhow::bail!("revoke rejected");
        }
        Ok(())
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        self.initializations.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_initialize.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_initialize.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("browser failed to launch");
        }
        Ok(())
    }
}

pub(crate) fn contact(id: &str, name: Option<&str>, number: Option<&str>) -> ContactRecord {
    ContactRecord {
        id: id.to_string(),
        name: name.map(ToString::to_string),
        number: number.map(ToString::to_string),
        is_user: true,
    }
}

pub(crate) fn group_message(id: &str, message_type: &str, body: &str) -> InboundMessage {
    InboundMessage {
        id: id.to_string(),
        from: "120363041234567890@g.us".to_string(),
        author: Some("A@g.us".to_string()),
        body: body.to_string(),
        message_type: message_type.to_string(),
        caption: None,
        data_caption: None,
        from_me: false,
        timestamp: Some(1_700_000_000),
        has_media: matches!(message_type, "image" | "video"),
        metadata: HashMap::new(),
    }
}
