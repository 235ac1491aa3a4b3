use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::errors::BridgeError;
use crate::pipeline::payload::WebhookPayload;
use crate::session::SessionClient;
use crate::utils::http::webhook_http_client;

/// Directive the webhook may return in its response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WebhookDirective {
    /// Kept as raw JSON so that only a literal `true` triggers deletion.
    #[serde(default, rename = "deleteMessage")]
    delete_message: Option<serde_json::Value>,
}

impl WebhookDirective {
    pub fn wants_delete(&self) -> bool {
        matches!(self.delete_message, Some(serde_json::Value::Bool(true)))
    }
}

/// Parse a 2xx response body. An empty body carries no directive.
pub fn parse_directive(body: &str) -> Result<WebhookDirective, BridgeError> {
    if body.trim().is_empty() {
        return Ok(WebhookDirective::default());
    }
    serde_json::from_str(body).map_err(|e| BridgeError::ResponseParse(e.to_string()))
}

/// Result of a single dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 2xx from the webhook. `deleted` is true only when a requested
    /// deletion actually succeeded.
    Delivered {
        delete_requested: bool,
        deleted: bool,
    },
    /// Non-success status.
    Rejected { status: u16 },
    /// Connection error, timeout or unreadable response.
    Failed { reason: String },
}

/// POSTs payloads to the webhook and acts on its directive.
///
/// Exactly one attempt per payload; failures are logged and dropped.
pub struct WebhookDispatcher {
    client: Client,
    url: String,
    session: Arc<dyn SessionClient>,
}

impl WebhookDispatcher {
    pub fn new(url: impl Into<String>, timeout: Duration, session: Arc<dyn SessionClient>) -> Self {
        Self {
            client: webhook_http_client(timeout),
            url: url.into(),
            session,
        }
    }

    pub async fn dispatch(&self, payload: &WebhookPayload) -> DispatchOutcome {
        let message_id = payload.message.id.as_str();
        debug!("posting {} to webhook", message_id);
        match self.send(payload).await {
            Ok(body) => {
                info!(
                    "webhook accepted {} ({:?}) for {}",
                    message_id, payload.payload_type, payload.chat_id
                );
                let directive = parse_directive(&body).unwrap_or_else(|e| {
                    warn!("ignoring webhook response for {}: {}", message_id, e);
                    WebhookDirective::default()
                });
                if !directive.wants_delete() {
                    return DispatchOutcome::Delivered {
                        delete_requested: false,
                        deleted: false,
                    };
                }
                let deleted = self.delete(payload).await;
                DispatchOutcome::Delivered {
                    delete_requested: true,
                    deleted,
                }
            }
            Err(BridgeError::Dispatch { status, body }) => {
                error!(
                    "webhook rejected {}: status {}, body: {}",
                    message_id, status, body
                );
                DispatchOutcome::Rejected { status }
            }
            Err(e) => {
                error!("webhook dispatch failed for {} ({}): {}", message_id, e.kind(), e);
                DispatchOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Send once and return the body of a successful response.
    async fn send(&self, payload: &WebhookPayload) -> Result<String, BridgeError> {
        let resp = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(BridgeError::Dispatch {
                status: status.as_u16(),
                body,
            });
        }

        resp.text()
            .await
            .map_err(|e| BridgeError::Transport(format!("failed to read response: {}", e)))
    }

    async fn delete(&self, payload: &WebhookPayload) -> bool {
        match self
            .session
            .delete_for_everyone(&payload.message)
            .await
            .map_err(|e| BridgeError::Deletion(e.to_string()))
        {
            Ok(()) => {
                info!("deleted message {} at webhook request", payload.message.id);
                true
            }
            Err(e) => {
                error!("{} ({})", e, payload.message.id);
                false
            }
        }
    }
}

impl std::fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookDispatcher")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
