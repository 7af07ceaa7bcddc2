//! Public types for the channel manager.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use threadlink_protocol::{CloseInfo, Payload};

use crate::error::ChannelError;

/// Identifier of one logical realtime conversation stream.
///
/// Opaque to the manager; uniqueness is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ChannelId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&ChannelId> for ChannelId {
    fn from(id: &ChannelId) -> Self {
        id.clone()
    }
}

macro_rules! channel_id_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ChannelId {
                fn from(id: $t) -> Self {
                    Self(id.to_string())
                }
            }
        )*
    };
}

channel_id_from_int!(i32, i64, u32, u64, usize);

/// Stable handle for one registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(uuid::Uuid);

impl ListenerId {
    pub(crate) fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Callback receiving every parsed event on a channel.
pub type EventCallback = Arc<dyn Fn(&Payload) + Send + Sync>;

/// Callback receiving errors for the connection it was registered with.
pub type ErrorCallback = Arc<dyn Fn(&ChannelError) + Send + Sync>;

/// Callback receiving close metadata for the connection it was registered with.
pub type CloseCallback = Arc<dyn Fn(&CloseInfo) + Send + Sync>;

/// Callbacks supplied to [`ChannelManager::connect`](crate::ChannelManager::connect).
///
/// `on_event` joins the channel's observer set under the [`ListenerId`]
/// assigned at construction. Clones share that id, so passing the same
/// handlers twice registers a single observer.
#[derive(Clone)]
pub struct ChannelHandlers {
    listener: ListenerId,
    pub(crate) on_event: EventCallback,
    pub(crate) on_error: Option<ErrorCallback>,
    pub(crate) on_close: Option<CloseCallback>,
}

impl ChannelHandlers {
    pub fn new(on_event: impl Fn(&Payload) + Send + Sync + 'static) -> Self {
        Self {
            listener: ListenerId::new(),
            on_event: Arc::new(on_event),
            on_error: None,
            on_close: None,
        }
    }

    pub fn on_error(mut self, on_error: impl Fn(&ChannelError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    pub fn on_close(mut self, on_close: impl Fn(&CloseInfo) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(on_close));
        self
    }

    pub fn listener_id(&self) -> ListenerId {
        self.listener
    }

    pub(crate) fn report_error(&self, err: &ChannelError) {
        if let Some(cb) = &self.on_error {
            cb(err);
        }
    }

    pub(crate) fn report_close(&self, close: &CloseInfo) {
        if let Some(cb) = &self.on_close {
            cb(close);
        }
    }
}

impl fmt::Debug for ChannelHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandlers")
            .field("listener", &self.listener)
            .field("on_error", &self.on_error.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

/// Returned from a successful `connect`: which channel, and which
/// observer was registered on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    channel: ChannelId,
    listener: ListenerId,
}

impl ChannelHandle {
    pub(crate) fn new(channel: ChannelId, listener: ListenerId) -> Self {
        Self { channel, listener }
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    pub fn listener(&self) -> ListenerId {
        self.listener
    }
}

/// Connection state for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    /// WebSocket handshake in progress.
    Connecting,
    /// Connected; events flow and `send` is accepted.
    Open,
    /// Connection lost, waiting `delay` before attempt number `attempt`.
    Reconnecting { attempt: u32, delay: Duration },
    /// No connection and no reconnect scheduled.
    Disconnected,
}

/// Events emitted by the channel manager.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Connection state changed for a channel.
    StateChanged {
        channel: ChannelId,
        state: ChannelState,
    },
    /// The channel's current connection closed.
    Closed { channel: ChannelId, close: CloseInfo },
    /// Reconnection gave up; the channel's observers were discarded.
    Exhausted { channel: ChannelId, attempts: u32 },
}

/// Bounded exponential backoff: `base_delay * 2^attempt` for attempts
/// below `max_attempts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: threadlink_protocol::constants::RECONNECT_BASE_DELAY,
            max_attempts: threadlink_protocol::constants::RECONNECT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectConfig {
    /// Delay before the given attempt (0-based), without a ceiling check.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(31)))
    }

    /// Delay before the next attempt after `attempts` consecutive failures,
    /// or `None` once the ceiling is reached.
    pub fn next_delay(&self, attempts: u32) -> Option<Duration> {
        (attempts < self.max_attempts).then(|| self.delay_for_attempt(attempts))
    }
}
