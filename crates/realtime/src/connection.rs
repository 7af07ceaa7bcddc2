//! One WebSocket connection for one channel.
//!
//! A [`ChannelConnection`] owns the task that dials the endpoint and runs
//! the read and write pumps. Everything the task observes is reported back
//! through its [`ConnectionLink`], which decides whether the report still
//! matters (the connection may have been superseded in the meantime).

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use threadlink_protocol::CloseInfo;

use crate::endpoint::redacted;
use crate::pumps::write::CLIENT_CLOSE_REASON;
use crate::reconnection::ConnectionLink;
use crate::types::ChannelHandlers;

/// Per-connection transport settings, derived from
/// [`RealtimeConfig`](crate::RealtimeConfig).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConnectionSettings {
    /// `None` disables keepalive pings.
    pub(crate) ping_period: Option<Duration>,
    pub(crate) pong_wait: Duration,
    pub(crate) max_message_size: usize,
    pub(crate) outbound_queue: usize,
}

/// Connection record held in the registry.
pub(crate) struct ChannelConnection {
    generation: u64,
    open: bool,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    /// Handlers of the `connect` call that created this connection.
    handlers: ChannelHandlers,
    _task: JoinHandle<()>,
}

impl ChannelConnection {
    /// Spawns the connection task. Must be called inside a Tokio runtime.
    pub(crate) fn spawn(url: Url, link: ConnectionLink, settings: &ConnectionSettings) -> Self {
        let generation = link.generation();
        let handlers = link.handlers().clone();
        let (write_tx, write_rx) = mpsc::channel(settings.outbound_queue);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_connection(
            url,
            link,
            settings.clone(),
            write_tx.clone(),
            write_rx,
            cancel.clone(),
        ));

        Self {
            generation,
            open: false,
            write_tx,
            cancel,
            handlers,
            _task: task,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open && !self.cancel.is_cancelled()
    }

    pub(crate) fn mark_open(&mut self) {
        self.open = true;
    }

    /// Queues a text frame. Fails when the connection is not open or the
    /// outbound queue is full.
    pub(crate) fn try_send_text(&self, text: String) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.write_tx.try_send(tungstenite::Message::Text(text.into())) {
            Ok(()) => true,
            Err(e) => {
                warn!("outbound queue rejected message: {e}");
                false
            }
        }
    }

    /// Starts a normal-closure shutdown of the connection task.
    pub(crate) fn close(&self) {
        self.cancel.cancel();
    }

    /// Closes on the caller's request and reports the normal closure to the
    /// creating handlers. The record must already be out of the registry:
    /// the task's own close report is then stale and nothing reconnects.
    /// Call with the registry lock released.
    pub(crate) fn close_by_client(self) {
        self.cancel.cancel();
        self.handlers
            .report_close(&CloseInfo::normal(CLIENT_CLOSE_REASON));
    }
}

impl Drop for ChannelConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_connection(
    url: Url,
    link: ConnectionLink,
    settings: ConnectionSettings,
    write_tx: mpsc::Sender<tungstenite::Message>,
    write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) {
    let shown = redacted(&url);
    let channel = link.channel().clone();

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(settings.max_message_size);
    ws_config.max_frame_size = Some(settings.max_message_size);

    debug!(channel = %channel, url = %shown, "connecting");
    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            link.closed(CloseInfo::normal(CLIENT_CLOSE_REASON));
            return;
        }
        res = tokio_tungstenite::connect_async_with_config(url.as_str(), Some(ws_config), false) => res,
    };

    let ws_stream = match connected {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!(channel = %channel, url = %shown, "connect failed: {e}");
            link.transport_error(&e.to_string());
            link.closed(CloseInfo::abnormal(e.to_string()));
            return;
        }
    };

    if !link.opened() {
        // Superseded while the handshake was in flight.
        return;
    }
    info!(channel = %channel, url = %shown, "channel connected");

    let (write, read) = ws_stream.split();

    let write_handle = tokio::spawn(crate::pumps::write::write_pump(
        write,
        write_rx,
        settings.ping_period,
        cancel.clone(),
    ));

    let close = crate::pumps::read::read_pump(
        read,
        write_tx,
        settings.pong_wait,
        cancel.clone(),
        |text| link.inbound(text),
        |err| link.transport_error(&err.to_string()),
    )
    .await;

    cancel.cancel();
    if let Ok(exit) = write_handle.await {
        debug!(channel = %channel, ?exit, "write pump stopped");
    }

    info!(channel = %channel, code = close.code, reason = %close.reason, "channel closed");
    link.closed(close);
}
