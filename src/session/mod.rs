//! Session capability boundary.
//!
//! The messaging-session client (connection lifecycle, message delivery,
//! contact directory, media download, deletion) lives outside this crate.
//! Backends implement [`SessionClient`] and push [`SessionEvent`]s onto the
//! [`EventBus`](crate::bus::EventBus); the pipeline and the lifecycle
//! broadcaster only ever see these types.

pub mod replay;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier suffix for one-to-one chats.
pub const DIRECT_SUFFIX: &str = "@c.us";
/// Identifier suffix for group chats.
pub const GROUP_SUFFIX: &str = "@g.us";

/// Which addressing namespace a chat or author identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Direct,
    Group,
    Other,
}

impl Namespace {
    pub fn of(id: &str) -> Self {
        if id.ends_with(DIRECT_SUFFIX) {
            Self::Direct
        } else if id.ends_with(GROUP_SUFFIX) {
            Self::Group
        } else {
            Self::Other
        }
    }
}

/// Strip the direct-message suffix, leaving the bare phone number.
pub fn phone_from_direct_id(id: &str) -> &str {
    id.strip_suffix(DIRECT_SUFFIX).unwrap_or(id)
}

/// A message as delivered by the session. Immutable for one pipeline pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Unique serialized message id.
    pub id: String,
    /// Chat the message arrived in (direct or group identifier).
    pub from: String,
    /// Author identifier inside a group; absent for direct chats.
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub body: String,
    /// Declared type tag (`chat`, `image`, `video`, ...).
    #[serde(rename = "type")]
    pub message_type: String,
    /// Explicit caption field, when the session surfaces one.
    #[serde(default)]
    pub caption: Option<String>,
    /// Caption as carried on the underlying protocol data.
    #[serde(default, rename = "dataCaption")]
    pub data_caption: Option<String>,
    #[serde(default, rename = "fromMe")]
    pub from_me: bool,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default, rename = "hasMedia")]
    pub has_media: bool,
    /// Backend-specific fields carried through to the webhook untouched.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// One entry of the session's contact directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default, rename = "isUser")]
    pub is_user: bool,
}

/// Media payload returned by [`SessionClient::download_media`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedMedia {
    /// Base64-encoded bytes.
    pub data: String,
    pub mimetype: String,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Events a session backend publishes to the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Message(InboundMessage),
    /// A pairing code was issued and is waiting to be scanned.
    QrCode(String),
    /// The session authenticated.
    Ready,
    Disconnected { reason: String },
}

/// Queries and commands the bridge needs from the messaging session.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Snapshot of the contact directory.
    async fn get_contacts(&self) -> anyhow::Result<Vec<ContactRecord>>;

    async fn download_media(&self, message: &InboundMessage) -> anyhow::Result<DownloadedMedia>;

    /// Delete `message` for every participant of the chat.
    async fn delete_for_everyone(&self, message: &InboundMessage) -> anyhow::Result<()>;

    /// (Re)start the session. A fresh pairing code is expected to follow.
    async fn initialize(&self) -> anyhow::Result<()>;
}
