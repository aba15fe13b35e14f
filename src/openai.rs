//! OpenAI client used by the speech-to-text fallback.

use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;
use tracing::warn;

pub type OpenAIClient = Client<OpenAIConfig>;

/// Audio uploads can be slow; allow five minutes per request.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Create an OpenAI client with the default timeout.
pub fn create_client() -> OpenAIClient {
    create_client_with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Create an OpenAI client with a custom timeout.
pub fn create_client_with_timeout(timeout: Duration) -> OpenAIClient {
    let client = Client::with_config(OpenAIConfig::default());

    match reqwest::Client::builder().timeout(timeout).build() {
        Ok(http) => client.with_http_client(http),
        Err(e) => {
            warn!("Falling back to default HTTP client for OpenAI: {}", e);
            client
        }
    }
}
