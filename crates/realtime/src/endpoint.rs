//! Streaming endpoint resolution.
//!
//! Channels live next to the REST API: `https://host/api` becomes
//! `wss://host/ws/threads/{channel}/?token=...`.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::ChannelId;

/// Placeholder replaced by the channel id in [`EndpointConfig::stream_path`].
pub const CHANNEL_PLACEHOLDER: &str = "{channel}";

/// Characters left unescaped when embedding a channel id in a path.
const CHANNEL_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Errors from endpoint resolution.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid base address: {0}")]
    Parse(#[from] url::ParseError),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("stream path must contain {{channel}}: {0}")]
    MissingPlaceholder(String),
}

/// How the streaming endpoint is derived from the REST base address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Path suffix stripped from the base address.
    #[serde(default = "default_rest_suffix")]
    pub rest_suffix: String,

    /// Streaming path appended to what remains; must contain `{channel}`.
    #[serde(default = "default_stream_path")]
    pub stream_path: String,

    /// Query parameter carrying the bearer credential.
    #[serde(default = "default_token_param")]
    pub token_param: String,
}

fn default_rest_suffix() -> String {
    "/api".into()
}

fn default_stream_path() -> String {
    "/ws/threads/{channel}/".into()
}

fn default_token_param() -> String {
    "token".into()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            rest_suffix: default_rest_suffix(),
            stream_path: default_stream_path(),
            token_param: default_token_param(),
        }
    }
}

/// Maps a REST base address to the streaming endpoint for `channel`.
pub fn resolve_endpoint(
    base: &str,
    channel: &ChannelId,
    token: &str,
    config: &EndpointConfig,
) -> Result<Url, EndpointError> {
    if !config.stream_path.contains(CHANNEL_PLACEHOLDER) {
        return Err(EndpointError::MissingPlaceholder(config.stream_path.clone()));
    }

    let mut url = Url::parse(base.trim())?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|()| EndpointError::UnsupportedScheme(url.scheme().to_string()))?;

    let path = url.path().trim_end_matches('/');
    let suffix = config.rest_suffix.trim_end_matches('/');
    let prefix = if suffix.is_empty() {
        path
    } else {
        path.strip_suffix(suffix).unwrap_or(path)
    };

    let segment = utf8_percent_encode(channel.as_str(), CHANNEL_SEGMENT).to_string();
    let stream_path = config.stream_path.replace(CHANNEL_PLACEHOLDER, &segment);
    let stream_path = if stream_path.starts_with('/') {
        stream_path
    } else {
        format!("/{stream_path}")
    };
    let full_path = format!("{prefix}{stream_path}");

    url.set_path(&full_path);
    url.set_query(None);
    url.set_fragment(None);
    url.query_pairs_mut().append_pair(&config.token_param, token);
    Ok(url)
}

/// Renders an endpoint for logs with the credential elided.
pub fn redacted(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}
