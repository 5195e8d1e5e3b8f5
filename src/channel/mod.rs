//! Output channels: file, PR comment, and webhook publication of review
//! results, with per-channel formats and a fan-out publisher.

pub mod comment;
pub mod file;
pub mod webhook;

use std::sync::Arc;

use serde_json::json;

use crate::dsl::ChannelConfig;
use crate::error::{Error, Result};
use crate::review::ReviewResult;

pub use comment::{CommentChannel, GitProvider, ProviderComment};
pub use file::FileChannel;
pub use webhook::WebhookChannel;

pub const DEFAULT_MARKER_PREFIX: &str = "review_by_scopeview";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelFormat {
    Markdown,
    Json,
}

impl ChannelFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ChannelFormat::Markdown => "md",
            ChannelFormat::Json => "json",
        }
    }
}

/// Effective format: the configured one, else the per-type default
/// (webhooks default to JSON, everything else to Markdown).
pub fn effective_format(config: &ChannelConfig) -> ChannelFormat {
    match config.format.as_str() {
        "json" => ChannelFormat::Json,
        "markdown" => ChannelFormat::Markdown,
        _ if config.channel_type == "webhook" => ChannelFormat::Json,
        _ => ChannelFormat::Markdown,
    }
}

/// Inputs a channel needs beyond the result itself.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub review_id: String,
    pub repo_url: String,
    pub repo_ref: String,
    pub repo_path: String,
    pub pr_number: u64,
    pub pr_title: String,
    pub agent_name: String,
    pub model_name: String,
    /// Fallback output directory for file channels without their own.
    pub output_dir: String,
    pub overwrite: bool,
    pub marker_prefix: String,
}

pub trait Channel {
    fn publish(&self, result: &ReviewResult, opts: &PublishOptions) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Closed dispatch over the built-in channel kinds.
pub enum AnyChannel {
    File(FileChannel),
    Comment(CommentChannel),
    Webhook(WebhookChannel),
}

impl Channel for AnyChannel {
    fn publish(&self, result: &ReviewResult, opts: &PublishOptions) -> Result<()> {
        match self {
            AnyChannel::File(c) => c.publish(result, opts),
            AnyChannel::Comment(c) => c.publish(result, opts),
            AnyChannel::Webhook(c) => c.publish(result, opts),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AnyChannel::File(c) => c.name(),
            AnyChannel::Comment(c) => c.name(),
            AnyChannel::Webhook(c) => c.name(),
        }
    }
}

/// The JSON envelope POSTed to webhooks and written by JSON file channels.
pub fn json_envelope(result: &ReviewResult, review_id: &str) -> serde_json::Value {
    json!({
        "review_id": review_id,
        "rule_id": result.reviewer_id,
        "data": result.data,
        "text": result.text,
        "agent_name": result.agent_name,
        "model_name": result.model_name,
    })
}

/// Serialize a result for a channel format.
pub fn render_payload(format: ChannelFormat, result: &ReviewResult, review_id: &str) -> String {
    match format {
        ChannelFormat::Markdown => result.text.clone(),
        ChannelFormat::Json => serde_json::to_string_pretty(&json_envelope(result, review_id))
            .unwrap_or_else(|_| "{}".to_string()),
    }
}

/// Build channels from a rule's channel list, in declared order.
pub fn build_channels(
    configs: &[ChannelConfig],
    provider: Arc<dyn GitProvider>,
) -> Result<Vec<AnyChannel>> {
    configs
        .iter()
        .map(|config| match config.channel_type.as_str() {
            "file" => Ok(AnyChannel::File(FileChannel::new(config))),
            "comment" => Ok(AnyChannel::Comment(CommentChannel::new(config, provider.clone()))),
            "webhook" => Ok(AnyChannel::Webhook(WebhookChannel::new(config))),
            other => Err(Error::ConfigValidation(format!(
                "unknown channel type '{other}'"
            ))),
        })
        .collect()
}

/// Fans a result out to every channel in order. Failure of one channel
/// never prevents the others; a combined error naming the failed channels
/// is returned at the end. There is no atomicity across channels.
pub struct Publisher {
    channels: Vec<AnyChannel>,
}

impl Publisher {
    pub fn new(channels: Vec<AnyChannel>) -> Self {
        Self { channels }
    }

    pub fn publish(&self, result: &ReviewResult, opts: &PublishOptions) -> Result<()> {
        if self.channels.is_empty() {
            return Err(Error::ConfigValidation(
                "at least one output channel must be configured".to_string(),
            ));
        }

        let mut failures = Vec::new();
        for channel in &self.channels {
            if let Err(e) = channel.publish(result, opts) {
                tracing::warn!(channel = channel.name(), error = %e, "channel publish failed");
                failures.push(format!("{}: {e}", channel.name()));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Channel(failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(channel_type: &str, format: &str) -> ChannelConfig {
        ChannelConfig {
            channel_type: channel_type.into(),
            format: format.into(),
            url: "https://x.test/hook".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_format_defaults_per_type() {
        assert_eq!(effective_format(&config("file", "")), ChannelFormat::Markdown);
        assert_eq!(effective_format(&config("comment", "")), ChannelFormat::Markdown);
        assert_eq!(effective_format(&config("webhook", "")), ChannelFormat::Json);
    }

    #[test]
    fn test_explicit_format_wins() {
        assert_eq!(effective_format(&config("webhook", "markdown")), ChannelFormat::Markdown);
        assert_eq!(effective_format(&config("file", "json")), ChannelFormat::Json);
    }

    #[test]
    fn test_json_envelope_fields() {
        let result = ReviewResult {
            reviewer_id: "sec".into(),
            text: "all good".into(),
            agent_name: "claude".into(),
            model_name: "sonnet".into(),
            ..Default::default()
        };
        let envelope = json_envelope(&result, "rev-1");
        assert_eq!(envelope["review_id"], "rev-1");
        assert_eq!(envelope["rule_id"], "sec");
        assert_eq!(envelope["text"], "all good");
        assert_eq!(envelope["agent_name"], "claude");
        assert_eq!(envelope["model_name"], "sonnet");
    }

    #[test]
    fn test_render_payload_markdown_is_raw_text() {
        let result = ReviewResult {
            text: "## Findings".into(),
            ..Default::default()
        };
        assert_eq!(render_payload(ChannelFormat::Markdown, &result, "r"), "## Findings");
    }

    #[test]
    fn test_fanout_partial_failure_names_failed_channel() {
        use super::webhook::{TransportError, WebhookTransport};

        struct AlwaysFailing;
        impl WebhookTransport for AlwaysFailing {
            fn post(
                &self,
                _url: &str,
                _secret: &str,
                _timeout: std::time::Duration,
                _body: &serde_json::Value,
            ) -> std::result::Result<(), TransportError> {
                Err(TransportError::Status(500))
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let file_channel = FileChannel::new(&ChannelConfig {
            channel_type: "file".into(),
            output_dir: tmp.path().to_string_lossy().into_owned(),
            ..Default::default()
        });
        let webhook_channel = WebhookChannel::with_transport(
            &ChannelConfig {
                channel_type: "webhook".into(),
                url: "https://hooks.test/review".into(),
                max_retries: 3,
                ..Default::default()
            },
            Box::new(AlwaysFailing),
        )
        .with_fast_backoff();

        let publisher = Publisher::new(vec![
            AnyChannel::File(file_channel),
            AnyChannel::Webhook(webhook_channel),
        ]);
        let result = ReviewResult {
            reviewer_id: "sec".into(),
            text: "the review".into(),
            ..Default::default()
        };
        let opts = PublishOptions {
            repo_path: "/srv/app".into(),
            pr_number: 3,
            ..Default::default()
        };

        let err = publisher.publish(&result, &opts).unwrap_err();
        // The file was written even though the webhook kept failing.
        assert!(tmp.path().join("review-app-3-sec.md").exists());
        assert!(err.to_string().contains("webhook:"));
        assert!(!err.to_string().contains("file:"));
    }

    #[test]
    fn test_empty_publisher_is_a_validation_error() {
        let publisher = Publisher::new(vec![]);
        let err = publisher
            .publish(&ReviewResult::default(), &PublishOptions::default())
            .unwrap_err();
        assert!(
            err.to_string()
                .contains("at least one output channel must be configured")
        );
    }
}
