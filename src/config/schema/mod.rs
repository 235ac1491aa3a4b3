use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::BridgeError;

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

fn default_webhook_timeout() -> u64 {
    30
}

/// Outbound webhook every dispatchable message is POSTed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Target URL. Empty means "not configured"; `serve` refuses to start.
    #[serde(default)]
    pub url: String,
    /// Whole-request timeout for a single dispatch. No retries are made.
    #[serde(default = "default_webhook_timeout", rename = "timeoutSecs")]
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: default_webhook_timeout(),
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3333
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL the webhook receiver uses to fetch cached media.
    /// Defaults to `http://localhost:<port>`.
    #[serde(default, rename = "publicUrl")]
    pub public_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

impl GatewayConfig {
    pub fn public_base_url(&self) -> String {
        match &self.public_url {
            Some(url) if !url.trim().is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("http://localhost:{}", self.port),
        }
    }
}

// ---------------------------------------------------------------------------
// Media cache
// ---------------------------------------------------------------------------

fn default_retention_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_max_media_bytes() -> usize {
    50 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Cache directory. Defaults to `$WABRIDGE_HOME/temp`.
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default = "default_retention_secs", rename = "retentionSecs")]
    pub retention_secs: u64,
    #[serde(default = "default_sweep_interval_secs", rename = "sweepIntervalSecs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_max_media_bytes", rename = "maxBytes")]
    pub max_bytes: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            dir: None,
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_bytes: default_max_media_bytes(),
        }
    }
}

impl MediaConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn resolve_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.dir {
            Some(dir) if !dir.trim().is_empty() => Ok(PathBuf::from(dir)),
            _ => Ok(crate::utils::get_wabridge_home()?.join("temp")),
        }
    }
}

// ---------------------------------------------------------------------------
// Contact directory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContactsConfig {
    /// How long a fetched directory snapshot may be reused.
    /// 0 refetches on every inbound message.
    #[serde(default, rename = "cacheTtlSecs")]
    pub cache_ttl_secs: u64,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

fn default_event_capacity() -> usize {
    1000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_secs() -> u64 {
    5
}

fn default_max_delay_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_max_attempts", rename = "maxAttempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_secs", rename = "baseDelaySecs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs", rename = "maxDelaySecs")]
    pub max_delay_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_event_capacity", rename = "eventCapacity")]
    pub event_capacity: usize,
    /// Render pairing codes as a QR code on stdout.
    #[serde(default = "default_true", rename = "printQr")]
    pub print_qr: bool,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            print_qr: true,
            reconnect: ReconnectConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub contacts: ContactsConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), BridgeError> {
        self.validate_webhook()?;
        self.validate_gateway()?;
        self.validate_media()?;
        self.validate_session()?;
        Ok(())
    }

    /// Checks that hold only for `serve`: a webhook target must exist.
    pub fn validate_for_serve(&self) -> Result<(), BridgeError> {
        self.validate()?;
        if self.webhook.url.trim().is_empty() {
            return Err(BridgeError::Config(
                "webhook.url is not set (config file or WABRIDGE_WEBHOOK_URL)".into(),
            ));
        }
        Ok(())
    }

    fn validate_webhook(&self) -> Result<(), BridgeError> {
        let w = &self.webhook;
        if !w.url.trim().is_empty() {
            let parsed = url::Url::parse(w.url.trim()).map_err(|e| {
                BridgeError::Config(format!("webhook.url is not a valid URL: {}", e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(BridgeError::Config(format!(
                    "webhook.url must use http or https, got '{}'",
                    parsed.scheme()
                )));
            }
        }
        if w.timeout_secs == 0 {
            return Err(BridgeError::Config(
                "webhook.timeoutSecs must be > 0".into(),
            ));
        }
        Ok(())
    }

    fn validate_gateway(&self) -> Result<(), BridgeError> {
        if self.gateway.port == 0 {
            return Err(BridgeError::Config("gateway.port must be > 0".into()));
        }
        if let Some(ref public) = self.gateway.public_url
            && !public.trim().is_empty()
            && url::Url::parse(public.trim()).is_err()
        {
            return Err(BridgeError::Config(format!(
                "gateway.publicUrl is not a valid URL: {}",
                public
            )));
        }
        Ok(())
    }

    fn validate_media(&self) -> Result<(), BridgeError> {
        let m = &self.media;
        if m.retention_secs == 0 {
            return Err(BridgeError::Config(
                "media.retentionSecs must be > 0".into(),
            ));
        }
        if m.sweep_interval_secs == 0 {
            return Err(BridgeError::Config(
                "media.sweepIntervalSecs must be > 0".into(),
            ));
        }
        if m.max_bytes == 0 {
            return Err(BridgeError::Config("media.maxBytes must be > 0".into()));
        }
        Ok(())
    }

    fn validate_session(&self) -> Result<(), BridgeError> {
        let s = &self.session;
        if s.event_capacity == 0 {
            return Err(BridgeError::Config(
                "session.eventCapacity must be > 0".into(),
            ));
        }
        if s.reconnect.max_delay_secs < s.reconnect.base_delay_secs {
            return Err(BridgeError::Config(
                "session.reconnect.maxDelaySecs must be >= baseDelaySecs".into(),
            ));
        }
        Ok(())
    }
}
