use crate::session::{InboundMessage, Namespace, phone_from_direct_id};

/// Declared type tag for plain text.
pub const TYPE_TEXT: &str = "chat";
pub const TYPE_IMAGE: &str = "image";
pub const TYPE_VIDEO: &str = "video";

/// Canonical kind of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Sent by this account; nothing is emitted.
    Ignored,
    /// One-to-one chat. Logged only, never forwarded.
    DirectText { phone_number: String },
    GroupText,
    Image,
    ImageWithCaption { caption: String },
    /// Video whose underlying data carries a caption field. The resolved
    /// caption may still be empty, in which case it is reported as `None`.
    VideoWithCaption { caption: Option<String> },
    Unsupported { declared_type: String },
}

impl MessageKind {
    /// Whether this kind is forwarded to the webhook.
    pub fn is_dispatchable(&self) -> bool {
        matches!(
            self,
            Self::GroupText
                | Self::Image
                | Self::ImageWithCaption { .. }
                | Self::VideoWithCaption { .. }
        )
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image | Self::ImageWithCaption { .. })
    }
}

/// Classify a message. Rules are evaluated in order:
///
/// 1. self-originated → `Ignored`
/// 2. direct-namespace sender → `DirectText`
/// 3. `chat` → `GroupText`
/// 4. `image` → `Image` / `ImageWithCaption`
/// 5. `video` with a caption on the underlying data → `VideoWithCaption`
/// 6. anything else → `Unsupported`
pub fn classify(message: &InboundMessage) -> MessageKind {
    if message.from_me {
        return MessageKind::Ignored;
    }

    if Namespace::of(&message.from) == Namespace::Direct {
        return MessageKind::DirectText {
            phone_number: phone_from_direct_id(&message.from).to_string(),
        };
    }

    match message.message_type.as_str() {
        TYPE_TEXT => MessageKind::GroupText,
        TYPE_IMAGE => match image_caption(message) {
            Some(caption) => MessageKind::ImageWithCaption { caption },
            None => MessageKind::Image,
        },
        TYPE_VIDEO if message.data_caption.is_some() => MessageKind::VideoWithCaption {
            caption: video_caption(message),
        },
        other => MessageKind::Unsupported {
            declared_type: other.to_string(),
        },
    }
}

/// Explicit caption field if present (even when empty), else the body.
fn image_caption(message: &InboundMessage) -> Option<String> {
    match &message.caption {
        Some(caption) => non_empty(caption),
        None => non_empty(&message.body),
    }
}

/// Caption from the underlying data if non-empty, else the body.
fn video_caption(message: &InboundMessage) -> Option<String> {
    message
        .data_caption
        .as_deref()
        .and_then(non_empty)
        .or_else(|| non_empty(&message.body))
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
