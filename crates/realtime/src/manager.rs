//! Channel manager: one WebSocket per channel, observer fan-out and
//! automatic reconnection.
//!
//! Every public operation returns without waiting on the network.
//! Connection work happens on Tokio tasks, so the manager must be used from
//! inside a Tokio runtime.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use threadlink_protocol::encode_payload;

use crate::config::RealtimeConfig;
use crate::credentials::{AddressProvider, CredentialProvider};
use crate::error::RealtimeError;
use crate::reconnection::Shared;
use crate::types::{ChannelEvent, ChannelHandle, ChannelHandlers, ChannelId, ChannelState, ListenerId};

/// Manages realtime connections for any number of channels.
///
/// Cloning is cheap; clones share the same connections and observers.
#[derive(Clone)]
pub struct ChannelManager {
    shared: Arc<Shared>,
}

impl ChannelManager {
    /// Creates a manager with no channels.
    pub fn new(
        config: RealtimeConfig,
        address: impl AddressProvider + 'static,
        credentials: impl CredentialProvider + 'static,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(config, Box::new(address), Box::new(credentials))),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.shared.take_events()
    }

    /// Connects `channel` and registers `handlers.on_event` as an observer.
    ///
    /// If the channel already has an open connection the observer joins it
    /// and no new connection is made. Otherwise any stale connection or
    /// pending reconnect is torn down and a new connection is started in
    /// the background; the retry counter starts over.
    ///
    /// Fails with [`RealtimeError::Auth`] when no credential is available,
    /// in which case nothing is registered.
    pub fn connect(
        &self,
        channel: impl Into<ChannelId>,
        handlers: ChannelHandlers,
    ) -> Result<ChannelHandle, RealtimeError> {
        let channel = channel.into();
        let url = match self.shared.resolve(&channel) {
            Ok(url) => url,
            Err(e) => {
                warn!(channel = %channel, "connect refused: {e}");
                return Err(e);
            }
        };
        let handle = ChannelHandle::new(channel.clone(), handlers.listener_id());

        let mut reg = self.shared.lock();
        reg.observers
            .entry(channel.clone())
            .or_default()
            .insert(handlers.listener_id(), handlers.on_event.clone());

        if reg.connections.get(&channel).is_some_and(|c| c.is_open()) {
            debug!(channel = %channel, listener = %handlers.listener_id(), "joined open channel");
            return Ok(handle);
        }

        reg.cancel_pending(&channel);
        let stale = reg.connections.remove(&channel);
        reg.retries.insert(channel.clone(), 0);
        self.shared.start_connection(&mut reg, channel, url, handlers);
        drop(reg);

        if let Some(stale) = stale {
            stale.close();
        }
        Ok(handle)
    }

    /// Registers an observer without starting a connection. It receives
    /// events once the channel is (or becomes) connected.
    pub fn add_listener(
        &self,
        channel: impl Into<ChannelId>,
        on_event: impl Fn(&threadlink_protocol::Payload) + Send + Sync + 'static,
    ) -> ListenerId {
        let handlers = ChannelHandlers::new(on_event);
        let id = handlers.listener_id();
        self.shared
            .lock()
            .observers
            .entry(channel.into())
            .or_default()
            .insert(id, handlers.on_event);
        id
    }

    /// Detaches one observer. The connection stays up even when the last
    /// observer leaves. Returns `false` if the observer was not registered.
    pub fn remove_listener(&self, channel: impl Into<ChannelId>, listener: ListenerId) -> bool {
        let channel = channel.into();
        let mut reg = self.shared.lock();
        let Some(set) = reg.observers.get_mut(&channel) else {
            return false;
        };
        let removed = set.remove(listener);
        if set.is_empty() {
            reg.observers.remove(&channel);
        }
        removed
    }

    /// Closes the channel with a normal closure and forgets its observers,
    /// retry counter and any pending reconnect.
    ///
    /// If a connection was live or dialing, the `on_close` of the call that
    /// created it receives code 1000 once; nothing reconnects. A channel that
    /// was only waiting to reconnect is dropped silently. Calling it on an
    /// unknown channel does nothing.
    pub fn disconnect(&self, channel: impl Into<ChannelId>) {
        let channel = channel.into();
        let connection = {
            let mut reg = self.shared.lock();
            self.shared.forget(&mut reg, &channel)
        };
        if let Some(connection) = connection {
            debug!(channel = %channel, "channel disconnected");
            connection.close_by_client();
        }
    }

    /// Disconnects every tracked channel.
    pub fn disconnect_all(&self) {
        let connections: Vec<_> = {
            let mut reg = self.shared.lock();
            reg.tracked_channels()
                .iter()
                .filter_map(|channel| self.shared.forget(&mut reg, channel))
                .collect()
        };
        debug!(closed = connections.len(), "all channels disconnected");
        for connection in connections {
            connection.close_by_client();
        }
    }

    /// Disconnects everything. The manager stays usable afterwards.
    pub fn shutdown(&self) {
        self.disconnect_all();
        info!("channel manager shut down");
    }

    /// Returns `true` if `channel` has an open connection.
    pub fn is_connected(&self, channel: impl Into<ChannelId>) -> bool {
        let channel = channel.into();
        self.shared
            .lock()
            .connections
            .get(&channel)
            .is_some_and(|c| c.is_open())
    }

    /// Serializes `payload` to JSON and queues it on the channel's open
    /// connection.
    ///
    /// Returns `false` without queueing anything if the channel is not
    /// open, the payload cannot be serialized, or the outbound queue is
    /// full.
    pub fn send<T: Serialize + ?Sized>(&self, channel: impl Into<ChannelId>, payload: &T) -> bool {
        let channel = channel.into();
        let text = match encode_payload(payload) {
            Ok(text) => text,
            Err(e) => {
                warn!(channel = %channel, "failed to encode outbound payload: {e}");
                return false;
            }
        };
        self.shared
            .lock()
            .connections
            .get(&channel)
            .is_some_and(|c| c.try_send_text(text))
    }

    /// Last known state of `channel`.
    pub fn state(&self, channel: impl Into<ChannelId>) -> ChannelState {
        self.shared.lock().state(channel.into().as_str())
    }

    /// Channels with a connection record.
    pub fn channels(&self) -> Vec<ChannelId> {
        let mut channels: Vec<ChannelId> =
            self.shared.lock().connections.keys().cloned().collect();
        channels.sort();
        channels
    }

    /// Number of observers registered on `channel`.
    pub fn observer_count(&self, channel: impl Into<ChannelId>) -> usize {
        let channel = channel.into();
        self.shared
            .lock()
            .observers
            .get(&channel)
            .map_or(0, |set| set.len())
    }
}
