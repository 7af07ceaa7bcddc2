//! Watch loop: connects channels, prints events, forwards stdin lines.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use threadlink_protocol::{Payload, parse_payload};
use threadlink_realtime::endpoint::{redacted, resolve_endpoint};
use threadlink_realtime::{
    AddressProvider, ChannelEvent, ChannelHandlers, ChannelManager, ChannelState, EnvAddress,
    SessionTokenStore,
};

use crate::config::Config;

/// Runs until Ctrl-C.
pub async fn watch(config: Config, channels: Vec<String>, token: Option<String>) -> anyhow::Result<()> {
    let store = match (token, &config.token_file) {
        (Some(token), _) => SessionTokenStore::with_token(token),
        (None, Some(path)) => SessionTokenStore::from_file(path)
            .with_context(|| format!("reading token file {}", path.display()))?,
        (None, None) => SessionTokenStore::new(),
    };
    let address = EnvAddress::default().with_fallback(config.api_url.clone());

    let manager = ChannelManager::new(config.realtime.clone(), address, store);
    let mut events = manager
        .take_events()
        .context("event stream already taken")?;

    for channel in &channels {
        manager
            .connect(channel.as_str(), handlers_for(channel))
            .with_context(|| format!("connecting channel {channel}"))?;
    }
    info!(channels = channels.len(), "watching");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("SIGINT received, shutting down");
                break;
            }
            event = events.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => forward_line(&manager, &line),
                None => {
                    debug!("stdin closed, no more outbound messages");
                    stdin_open = false;
                }
            },
        }
    }

    manager.shutdown();
    Ok(())
}

/// Resolves the endpoint for `channel` with the credential left out.
pub fn endpoint(config: &Config, channel: &str) -> anyhow::Result<String> {
    let base = EnvAddress::default()
        .with_fallback(config.api_url.clone())
        .base_address();
    let url = resolve_endpoint(&base, &channel.into(), "", &config.realtime.endpoint)?;
    Ok(redacted(&url))
}

fn handlers_for(channel: &str) -> ChannelHandlers {
    let on_event = channel.to_string();
    let on_error = channel.to_string();
    let on_close = channel.to_string();
    ChannelHandlers::new(move |payload| println!("{}", event_line(&on_event, payload)))
        .on_error(move |err| warn!(channel = %on_error, "{err}"))
        .on_close(move |close| debug!(channel = %on_close, %close, "connection closed"))
}

/// One output line: `{"channel": ..., "event": ...}`.
fn event_line(channel: &str, payload: &Payload) -> String {
    serde_json::json!({ "channel": channel, "event": payload }).to_string()
}

fn log_event(event: &ChannelEvent) {
    match event {
        ChannelEvent::StateChanged { channel, state } => match state {
            ChannelState::Reconnecting { attempt, delay } => info!(
                channel = %channel,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "reconnecting"
            ),
            other => info!(channel = %channel, state = ?other, "state changed"),
        },
        ChannelEvent::Closed { channel, close } => {
            debug!(channel = %channel, code = close.code, "closed");
        }
        ChannelEvent::Exhausted { channel, attempts } => {
            warn!(channel = %channel, attempts, "gave up reconnecting");
        }
    }
}

fn forward_line(manager: &ChannelManager, line: &str) {
    match parse_line(line) {
        Ok(Some((channel, payload))) => {
            if !manager.send(channel, &payload) {
                warn!(channel, "not connected, message dropped");
            }
        }
        Ok(None) => {}
        Err(e) => warn!("ignoring input line: {e}"),
    }
}

/// Splits `<channel> <json>`. Blank lines yield `None`.
fn parse_line(line: &str) -> anyhow::Result<Option<(&str, Payload)>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (channel, json) = line
        .split_once(char::is_whitespace)
        .context("expected `<channel> <json>`")?;
    let payload = parse_payload(json.trim())?;
    Ok(Some((channel, payload)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_splits_channel_and_payload() {
        let (channel, payload) = parse_line(r#"42 {"type":"msg","body":"hi there"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(channel, "42");
        assert_eq!(payload["body"], "hi there");
    }

    #[test]
    fn parse_line_blank_is_none() {
        assert!(parse_line("   ").unwrap().is_none());
    }

    #[test]
    fn parse_line_rejects_missing_payload() {
        assert!(parse_line("42").is_err());
        assert!(parse_line("42 not-json").is_err());
        assert!(parse_line("42 [1,2]").is_err());
    }

    #[test]
    fn event_line_wraps_payload() {
        let payload = parse_payload(r#"{"type":"msg"}"#).unwrap();
        let line: serde_json::Value = serde_json::from_str(&event_line("7", &payload)).unwrap();
        assert_eq!(line["channel"], "7");
        assert_eq!(line["event"]["type"], "msg");
    }

    #[test]
    fn endpoint_hides_token() {
        let config = Config {
            api_url: "https://chat.example.com/api".into(),
            ..Config::default()
        };
        // Skip when the environment overrides the base address.
        if std::env::var(threadlink_realtime::credentials::DEFAULT_ADDRESS_VAR).is_ok() {
            return;
        }
        assert_eq!(
            endpoint(&config, "42").unwrap(),
            "wss://chat.example.com/ws/threads/42/"
        );
    }

    #[tokio::test]
    async fn watch_without_credential_fails_fast() {
        let tmp = tempfile::tempdir().unwrap();
        let token_file = tmp.path().join("token");
        std::fs::write(&token_file, "").unwrap();
        let config = Config {
            token_file: Some(token_file),
            ..Config::default()
        };
        let err = watch(config, vec!["1".into()], None).await.unwrap_err();
        assert!(format!("{err:#}").contains("no credential"));
    }
}
