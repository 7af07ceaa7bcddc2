//! Shared manager state, close handling and reconnection with exponential
//! backoff.
//!
//! Contains [`Shared`] (the registry behind every
//! [`ChannelManager`](crate::ChannelManager) clone), the [`ConnectionLink`]
//! a connection task reports through, and the delayed reconnect task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use threadlink_protocol::{CloseInfo, parse_payload};

use crate::config::RealtimeConfig;
use crate::connection::{ChannelConnection, ConnectionSettings};
use crate::credentials::{AddressProvider, CredentialProvider};
use crate::endpoint::resolve_endpoint;
use crate::error::{ChannelError, RealtimeError};
use crate::observers::{ObserverSet, dispatch};
use crate::types::{ChannelEvent, ChannelHandlers, ChannelId, ChannelState, ReconnectConfig};

const EVENT_QUEUE: usize = 64;

/// A reconnect waiting for its backoff delay to elapse.
struct PendingReconnect {
    ticket: u64,
    cancel: CancellationToken,
    handlers: ChannelHandlers,
}

/// Every per-channel map, guarded by one lock.
#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) connections: HashMap<ChannelId, ChannelConnection>,
    pub(crate) observers: HashMap<ChannelId, ObserverSet>,
    pub(crate) retries: HashMap<ChannelId, u32>,
    pending: HashMap<ChannelId, PendingReconnect>,
    states: HashMap<ChannelId, ChannelState>,
}

impl Registry {
    fn is_current(&self, channel: &ChannelId, generation: u64) -> bool {
        self.connections
            .get(channel)
            .is_some_and(|c| c.generation() == generation)
    }

    /// Cancels a scheduled reconnect for `channel`. Returns `true` if one
    /// was pending.
    pub(crate) fn cancel_pending(&mut self, channel: &ChannelId) -> bool {
        match self.pending.remove(channel) {
            Some(pending) => {
                pending.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn state(&self, channel: &str) -> ChannelState {
        self.states
            .get(channel)
            .cloned()
            .unwrap_or(ChannelState::Disconnected)
    }

    /// Every channel with a connection, observers, retry counter, pending
    /// reconnect or non-idle state.
    pub(crate) fn tracked_channels(&self) -> Vec<ChannelId> {
        let mut channels: Vec<ChannelId> = self
            .connections
            .keys()
            .chain(self.observers.keys())
            .chain(self.retries.keys())
            .chain(self.pending.keys())
            .chain(self.states.keys())
            .cloned()
            .collect();
        channels.sort();
        channels.dedup();
        channels
    }
}

/// What happened to the channel after its current connection closed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CloseOutcome {
    /// The connection had already been replaced or removed.
    Stale,
    /// Voluntary close; observers dropped.
    Terminal,
    /// Reconnect scheduled.
    Retry,
    /// Retry ceiling reached; observers dropped.
    Exhausted { attempts: u32 },
}

/// State shared by every manager clone and every connection task.
pub(crate) struct Shared {
    reconnect: ReconnectConfig,
    settings: ConnectionSettings,
    config: RealtimeConfig,
    address: Box<dyn AddressProvider>,
    credentials: Box<dyn CredentialProvider>,
    events_tx: mpsc::Sender<ChannelEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<ChannelEvent>>>,
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl Shared {
    pub(crate) fn new(
        config: RealtimeConfig,
        address: Box<dyn AddressProvider>,
        credentials: Box<dyn CredentialProvider>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        Self {
            reconnect: config.reconnect(),
            settings: config.connection_settings(),
            config,
            address,
            credentials,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            registry: Mutex::new(Registry::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn take_events(&self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Resolves the credential and the streaming endpoint for `channel`.
    pub(crate) fn resolve(&self, channel: &ChannelId) -> Result<Url, RealtimeError> {
        let token = self
            .credentials
            .token()
            .filter(|t| !t.is_empty())
            .ok_or(RealtimeError::Auth)?;
        let base = self.address.base_address();
        Ok(resolve_endpoint(&base, channel, &token, &self.config.endpoint)?)
    }

    fn publish(&self, event: ChannelEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            trace!("channel event dropped: {e}");
        }
    }

    /// Records and publishes a state change. `Disconnected` clears the entry.
    pub(crate) fn set_state(&self, reg: &mut Registry, channel: &ChannelId, state: ChannelState) {
        let previous = if state == ChannelState::Disconnected {
            reg.states.remove(channel)
        } else {
            reg.states.insert(channel.clone(), state.clone())
        };
        let unchanged = match &previous {
            Some(prev) => *prev == state,
            None => state == ChannelState::Disconnected,
        };
        if unchanged {
            return;
        }
        debug!(channel = %channel, state = ?state, "channel state changed");
        self.publish(ChannelEvent::StateChanged {
            channel: channel.clone(),
            state,
        });
    }

    /// Spawns a connection for `channel`, replacing any existing record.
    pub(crate) fn start_connection(
        self: &Arc<Self>,
        reg: &mut Registry,
        channel: ChannelId,
        url: Url,
        handlers: ChannelHandlers,
    ) {
        let link = ConnectionLink {
            shared: Arc::downgrade(self),
            channel: channel.clone(),
            generation: self.next_id(),
            handlers,
        };
        let connection = ChannelConnection::spawn(url, link, &self.settings);
        if let Some(previous) = reg.connections.insert(channel.clone(), connection) {
            previous.close();
        }
        self.set_state(reg, &channel, ChannelState::Connecting);
    }

    /// Removes every trace of `channel` without invoking any callback.
    /// Returns the connection record so it can be closed after the lock is
    /// released; once removed, its task's close report is stale.
    pub(crate) fn forget(
        &self,
        reg: &mut Registry,
        channel: &ChannelId,
    ) -> Option<ChannelConnection> {
        let had_pending = reg.cancel_pending(channel);
        let connection = reg.connections.remove(channel);
        reg.observers.remove(channel);
        reg.retries.remove(channel);
        if had_pending || connection.is_some() {
            debug!(channel = %channel, "channel forgotten");
        }
        self.set_state(reg, channel, ChannelState::Disconnected);
        connection
    }

    fn handle_close(self: &Arc<Self>, link: &ConnectionLink, close: &CloseInfo) -> CloseOutcome {
        let channel = &link.channel;
        let mut reg = self.lock();
        if !reg.is_current(channel, link.generation) {
            trace!(channel = %channel, generation = link.generation, "ignoring stale close");
            return CloseOutcome::Stale;
        }
        reg.connections.remove(channel);
        self.publish(ChannelEvent::Closed {
            channel: channel.clone(),
            close: close.clone(),
        });

        if close.is_terminal() {
            reg.observers.remove(channel);
            reg.retries.remove(channel);
            self.set_state(&mut reg, channel, ChannelState::Disconnected);
            return CloseOutcome::Terminal;
        }

        let attempts = reg.retries.get(channel).copied().unwrap_or(0);
        let Some(delay) = self.reconnect.next_delay(attempts) else {
            warn!(channel = %channel, attempts, "reconnection attempts exhausted");
            reg.observers.remove(channel);
            reg.retries.remove(channel);
            self.set_state(&mut reg, channel, ChannelState::Disconnected);
            self.publish(ChannelEvent::Exhausted {
                channel: channel.clone(),
                attempts,
            });
            return CloseOutcome::Exhausted { attempts };
        };

        let attempt = attempts.saturating_add(1);
        reg.retries.insert(channel.clone(), attempt);

        let ticket = self.next_id();
        let cancel = CancellationToken::new();
        reg.cancel_pending(channel);
        reg.pending.insert(
            channel.clone(),
            PendingReconnect {
                ticket,
                cancel: cancel.clone(),
                handlers: link.handlers.clone(),
            },
        );
        self.set_state(
            &mut reg,
            channel,
            ChannelState::Reconnecting { attempt, delay },
        );

        info!(
            channel = %channel,
            attempt,
            delay_ms = delay.as_millis() as u64,
            code = close.code,
            "scheduling reconnect"
        );
        tokio::spawn(reconnect_after(
            Arc::downgrade(self),
            channel.clone(),
            ticket,
            delay,
            cancel,
        ));
        CloseOutcome::Retry
    }

    /// Runs a due reconnect if its ticket is still the pending one.
    fn reconnect(self: &Arc<Self>, channel: ChannelId, ticket: u64) {
        let still_pending = |reg: &Registry| {
            reg.pending
                .get(&channel)
                .is_some_and(|p| p.ticket == ticket)
        };

        if !still_pending(&*self.lock()) {
            return;
        }

        // Providers run outside the lock.
        let resolved = self.resolve(&channel);

        let mut reg = self.lock();
        if !still_pending(&*reg) {
            return;
        }
        let Some(pending) = reg.pending.remove(&channel) else {
            return;
        };

        match resolved {
            Ok(url) => {
                debug!(channel = %channel, "reconnecting");
                self.start_connection(&mut reg, channel, url, pending.handlers);
            }
            Err(e) => {
                warn!(channel = %channel, "reconnect abandoned: {e}");
                reg.observers.remove(&channel);
                reg.retries.remove(&channel);
                self.set_state(&mut reg, &channel, ChannelState::Disconnected);
                drop(reg);
                pending.handlers.report_error(&ChannelError::from(e));
            }
        }
    }
}

async fn reconnect_after(
    shared: Weak<Shared>,
    channel: ChannelId,
    ticket: u64,
    delay: Duration,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(channel = %channel, "reconnect cancelled");
            return;
        }
        _ = tokio::time::sleep(delay) => {}
    }

    if let Some(shared) = shared.upgrade() {
        shared.reconnect(channel, ticket);
    }
}

/// The way back from a connection task into the manager.
///
/// Each report first checks that the connection is still the channel's
/// current record; reports from superseded connections are dropped.
pub(crate) struct ConnectionLink {
    shared: Weak<Shared>,
    channel: ChannelId,
    generation: u64,
    handlers: ChannelHandlers,
}

impl ConnectionLink {
    pub(crate) fn channel(&self) -> &ChannelId {
        &self.channel
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn handlers(&self) -> &ChannelHandlers {
        &self.handlers
    }

    /// Marks the connection open. Returns `false` if it was superseded.
    pub(crate) fn opened(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let mut reg = shared.lock();
        let Some(connection) = reg
            .connections
            .get_mut(&self.channel)
            .filter(|c| c.generation() == self.generation)
        else {
            return false;
        };
        connection.mark_open();
        reg.retries.insert(self.channel.clone(), 0);
        shared.set_state(&mut reg, &self.channel, ChannelState::Open);
        true
    }

    /// Parses one inbound text frame and fans it out.
    pub(crate) fn inbound(&self, text: &str) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let observers = {
            let reg = shared.lock();
            if !reg.is_current(&self.channel, self.generation) {
                return;
            }
            let snapshot = reg
                .observers
                .get(&self.channel)
                .map(ObserverSet::snapshot)
                .unwrap_or_default();
            snapshot
        };

        match parse_payload(text) {
            Ok(payload) => {
                trace!(channel = %self.channel, observers = observers.len(), "dispatching event");
                dispatch(&observers, &payload);
            }
            Err(e) => {
                debug!(channel = %self.channel, "dropping unparsable event: {e}");
                self.handlers
                    .report_error(&ChannelError::Parse(e.to_string()));
            }
        }
    }

    pub(crate) fn transport_error(&self, message: &str) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let current = shared.lock().is_current(&self.channel, self.generation);
        if current {
            self.handlers
                .report_error(&ChannelError::Transport(message.to_string()));
        }
    }

    /// Reports the end of the connection and applies the close policy.
    pub(crate) fn closed(&self, close: CloseInfo) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        match shared.handle_close(self, &close) {
            CloseOutcome::Stale => {}
            CloseOutcome::Terminal | CloseOutcome::Retry => self.handlers.report_close(&close),
            CloseOutcome::Exhausted { attempts } => {
                self.handlers.report_close(&close);
                self.handlers
                    .report_error(&ChannelError::ReconnectExhausted { attempts });
            }
        }
    }
}
