//! WebSocket read pump: dispatches incoming frames and classifies how the
//! connection ended.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use threadlink_protocol::CloseInfo;

use crate::pumps::write::CLIENT_CLOSE_REASON;

/// Reads frames until the connection ends and returns why it ended.
///
/// Any incoming frame resets a read deadline of `pong_wait`; if nothing
/// arrives within that window the connection is considered dead and the
/// result is an abnormal close. Text frames go to `on_text`, read errors to
/// `on_error` before the pump exits.
pub(crate) async fn read_pump<S, T, E>(
    mut read: S,
    write_tx: mpsc::Sender<tungstenite::Message>,
    pong_wait: Duration,
    cancel: CancellationToken,
    mut on_text: T,
    mut on_error: E,
) -> CloseInfo
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
    T: FnMut(&str),
    E: FnMut(&tungstenite::Error),
{
    let deadline = tokio::time::sleep(pong_wait);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                return CloseInfo::normal(CLIENT_CLOSE_REASON);
            }

            () = &mut deadline => {
                warn!("read deadline expired, connection dead");
                return CloseInfo::abnormal("keepalive timeout");
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + pong_wait);

                        match msg {
                            tungstenite::Message::Text(text) => on_text(text.as_str()),
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.try_send(tungstenite::Message::Pong(data));
                            }
                            tungstenite::Message::Pong(_) => trace!("received pong"),
                            tungstenite::Message::Close(frame) => {
                                let close = match frame {
                                    Some(f) => CloseInfo::new(u16::from(f.code), f.reason.as_str()),
                                    None => CloseInfo::no_status(),
                                };
                                debug!(code = close.code, reason = %close.reason, "received close frame");
                                return close;
                            }
                            _ => trace!("ignoring binary frame"),
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        on_error(&e);
                        return CloseInfo::abnormal(e.to_string());
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        return CloseInfo::abnormal("stream ended");
                    }
                }
            }
        }
    }
}
