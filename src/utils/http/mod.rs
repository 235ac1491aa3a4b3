use reqwest::Client;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the `reqwest::Client` used for webhook calls.
///
/// Connect timeout is fixed at 10 s; `timeout` bounds the whole request
/// including reading the response body.
/// Falls back to the default client if the builder fails.
pub fn webhook_http_client(timeout: Duration) -> Client {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}
