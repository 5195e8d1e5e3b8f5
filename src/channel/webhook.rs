//! Webhook channel: POSTs the JSON envelope with retries and exponential
//! backoff. Non-2xx responses and transport failures are both retryable.

use std::thread;
use std::time::Duration;

use crate::dsl::ChannelConfig;
use crate::error::{Error, Result};
use crate::review::ReviewResult;

use super::{PublishOptions, json_envelope};

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 6;
pub const SECRET_HEADER: &str = "X-SCOPEVIEW-KEY";
const INITIAL_BACKOFF_MS: u64 = 500;

#[derive(Debug)]
pub enum TransportError {
    /// Non-2xx HTTP status.
    Status(u16),
    /// Connection-level failure.
    Transport(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Status(code) => write!(f, "HTTP {code}"),
            TransportError::Transport(msg) => write!(f, "{msg}"),
        }
    }
}

/// HTTP seam for testability; the default implementation uses `ureq`.
pub trait WebhookTransport: Send + Sync {
    fn post(
        &self,
        url: &str,
        secret: &str,
        timeout: Duration,
        body: &serde_json::Value,
    ) -> std::result::Result<(), TransportError>;
}

struct UreqTransport;

impl WebhookTransport for UreqTransport {
    fn post(
        &self,
        url: &str,
        secret: &str,
        timeout: Duration,
        body: &serde_json::Value,
    ) -> std::result::Result<(), TransportError> {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        let mut request = agent.post(url);
        if !secret.is_empty() {
            request = request.set(SECRET_HEADER, secret);
        }
        match request.send_json(body) {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, _)) => Err(TransportError::Status(code)),
            Err(ureq::Error::Transport(t)) => Err(TransportError::Transport(t.to_string())),
        }
    }
}

pub struct WebhookChannel {
    url: String,
    secret: String,
    timeout: Duration,
    max_retries: u32,
    backoff_ms: u64,
    transport: Box<dyn WebhookTransport>,
}

impl WebhookChannel {
    pub fn new(config: &ChannelConfig) -> Self {
        Self::with_transport(config, Box::new(UreqTransport))
    }

    pub fn with_transport(config: &ChannelConfig, transport: Box<dyn WebhookTransport>) -> Self {
        Self {
            url: config.url.clone(),
            secret: config.header_secret.clone(),
            timeout: Duration::from_secs(if config.timeout == 0 {
                DEFAULT_TIMEOUT_SECS
            } else {
                config.timeout
            }),
            max_retries: if config.max_retries == 0 {
                DEFAULT_MAX_RETRIES
            } else {
                config.max_retries
            },
            backoff_ms: INITIAL_BACKOFF_MS,
            transport,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_fast_backoff(mut self) -> Self {
        self.backoff_ms = 1;
        self
    }

    pub fn publish(&self, result: &ReviewResult, opts: &PublishOptions) -> Result<()> {
        // The wire format is always the JSON envelope; a webhook's channel
        // format only selects which prompt instructions the rule received.
        let body = json_envelope(result, &opts.review_id);

        let mut backoff_ms = self.backoff_ms;
        for attempt in 1..=self.max_retries {
            match self.transport.post(&self.url, &self.secret, self.timeout, &body) {
                Ok(()) => {
                    tracing::info!(url = %self.url, rule = %result.reviewer_id, "webhook delivered");
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    tracing::warn!(
                        url = %self.url,
                        attempt,
                        backoff_ms,
                        error = %e,
                        "retrying webhook delivery"
                    );
                    thread::sleep(Duration::from_millis(backoff_ms));
                    backoff_ms *= 2;
                }
                Err(e) => {
                    return Err(Error::Channel(format!(
                        "webhook delivery to {} failed after {} attempts: {e}",
                        self.url, self.max_retries
                    )));
                }
            }
        }
        unreachable!()
    }

    pub fn name(&self) -> &'static str {
        "webhook"
    }
}
