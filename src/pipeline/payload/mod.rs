use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::BridgeError;
use crate::media::{MediaCache, extension_for_mime};
use crate::pipeline::classify::MessageKind;
use crate::pipeline::contacts::ResolvedContact;
use crate::session::{InboundMessage, SessionClient};

/// `messageText` sent when an image could not be downloaded or cached.
pub const MEDIA_ERROR_TEXT: &str = "Error downloading image";

/// Discriminator of the canonical payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadType {
    Text,
    Image,
    ImageWithCaption,
    Video,
    VideoWithCaption,
    Unsupported,
}

/// Cached media referenced from a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaDescriptor {
    pub url: String,
    pub mimetype: String,
    pub filename: String,
    /// Decoded size in whole kilobytes.
    pub size: u64,
}

/// Canonical record POSTed to the webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    #[serde(rename = "chatId")]
    pub chat_id: String,
    /// Raw declared type tag of the original message.
    #[serde(rename = "messageType")]
    pub message_type: String,
    #[serde(rename = "phoneNumber")]
    pub phone_number: Option<String>,
    #[serde(rename = "contactFound")]
    pub contact_found: bool,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub payload_type: PayloadType,
    #[serde(rename = "messageText")]
    pub message_text: Option<String>,
    /// Whether a non-empty caption accompanied the media.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<bool>,
    #[serde(rename = "mediaType", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(rename = "mediaData", skip_serializing_if = "Option::is_none")]
    pub media_data: Option<MediaDescriptor>,
    /// The original message, untouched.
    pub message: InboundMessage,
}

/// Result of the media preparation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOutcome {
    /// The message kind carries no media we cache.
    NotApplicable,
    Ready(MediaDescriptor),
    /// Download, decode or store failed; the payload reports it in `messageText`.
    Failed(String),
}

/// Download the message's media and place it in the cache.
///
/// Never fails: every error becomes [`MediaOutcome::Failed`] so the
/// event still reaches the webhook.
pub async fn prepare_media(
    session: &dyn SessionClient,
    cache: &MediaCache,
    message: &InboundMessage,
) -> MediaOutcome {
    match try_prepare_media(session, cache, message).await {
        Ok(descriptor) => {
            info!(
                "image cached for {}: {}, size: {}KB, url: {}",
                message.id, descriptor.filename, descriptor.size, descriptor.url
            );
            MediaOutcome::Ready(descriptor)
        }
        Err(e) => {
            warn!("media unavailable for {} ({}): {}", message.id, e.kind(), e);
            MediaOutcome::Failed(e.to_string())
        }
    }
}

async fn try_prepare_media(
    session: &dyn SessionClient,
    cache: &MediaCache,
    message: &InboundMessage,
) -> Result<MediaDescriptor, BridgeError> {
    let media = session
        .download_media(message)
        .await
        .map_err(|e| BridgeError::Download(e.to_string()))?;
    let bytes = BASE64
        .decode(media.data.trim())
        .map_err(|e| BridgeError::Download(format!("invalid base64 media: {}", e)))?;

    let stored = cache.store(&bytes, &media.mimetype, &message.id).await?;

    let filename = media.filename.filter(|f| !f.is_empty()).unwrap_or_else(|| {
        format!(
            "image_{}.{}",
            chrono::Utc::now().timestamp_millis(),
            extension_for_mime(&media.mimetype)
        )
    });

    Ok(MediaDescriptor {
        url: stored.url,
        mimetype: media.mimetype,
        filename,
        size: size_in_kb(bytes.len()),
    })
}

/// Byte length rounded to the nearest whole kilobyte.
pub fn size_in_kb(len: usize) -> u64 {
    (len as f64 / 1024.0).round() as u64
}

/// Assemble the canonical payload. Pure: all I/O happens before this call.
///
/// Returns `None` for kinds that never produce a payload (`Ignored`,
/// `DirectText`).
pub fn build(
    message: &InboundMessage,
    kind: &MessageKind,
    contact: &ResolvedContact,
    media: MediaOutcome,
) -> Option<WebhookPayload> {
    let mut payload = WebhookPayload {
        chat_id: message.from.clone(),
        message_type: message.message_type.clone(),
        phone_number: contact.phone_number.clone(),
        contact_found: contact.found,
        name: contact.name.clone(),
        payload_type: PayloadType::Text,
        message_text: None,
        caption: None,
        media_type: None,
        media_data: None,
        message: message.clone(),
    };

    match kind {
        MessageKind::Ignored | MessageKind::DirectText { .. } => return None,
        MessageKind::GroupText => {
            payload.message_text = Some(message.body.clone());
        }
        MessageKind::Image | MessageKind::ImageWithCaption { .. } => {
            let caption = match kind {
                MessageKind::ImageWithCaption { caption } => Some(caption.clone()),
                _ => None,
            };
            payload.payload_type = if caption.is_some() {
                PayloadType::ImageWithCaption
            } else {
                PayloadType::Image
            };
            payload.caption = Some(caption.is_some());
            payload.media_type = Some("image".to_string());
            match media {
                MediaOutcome::Ready(descriptor) => {
                    payload.message_text = caption;
                    payload.media_data = Some(descriptor);
                }
                MediaOutcome::Failed(_) | MediaOutcome::NotApplicable => {
                    payload.message_text = Some(MEDIA_ERROR_TEXT.to_string());
                }
            }
        }
        MessageKind::VideoWithCaption { caption } => {
            payload.payload_type = if caption.is_some() {
                PayloadType::VideoWithCaption
            } else {
                PayloadType::Video
            };
            payload.caption = Some(caption.is_some());
            payload.media_type = Some("video".to_string());
            payload.message_text = caption.clone();
        }
        MessageKind::Unsupported { declared_type } => {
            payload.payload_type = PayloadType::Unsupported;
            payload.message_text = Some(format!("Unsupported message type: {}", declared_type));
        }
    }

    Some(payload)
}
