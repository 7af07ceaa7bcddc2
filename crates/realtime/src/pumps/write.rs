//! WebSocket write pump: the only writer on the sink. Drains the outbound
//! queue, interleaves keepalive pings and finishes with a normal-closure
//! frame.

use std::time::Duration;

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Reason sent in the close frame when the client shuts a channel down.
pub(crate) const CLIENT_CLOSE_REASON: &str = "client disconnect";

/// Why the pump stopped writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteExit {
    Cancelled,
    QueueClosed,
    SinkFailed,
}

/// Writes queued frames until cancelled, pinging every `ping_period` when
/// one is set. A failed write skips the close frame.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    ping_period: Option<Duration>,
    cancel: CancellationToken,
) -> WriteExit
where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let mut keepalive = ping_period.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let exit = loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break WriteExit::Cancelled,
            () = next_tick(&mut keepalive) => tungstenite::Message::Ping(Vec::new().into()),
            msg = write_rx.recv() => match msg {
                Some(m) => m,
                None => break WriteExit::QueueClosed,
            },
        };

        trace!(kind = frame_kind(&frame), "writing frame");
        if let Err(e) = write.send(frame).await {
            warn!("WebSocket write failed: {e}");
            break WriteExit::SinkFailed;
        }
    };

    if exit != WriteExit::SinkFailed {
        let close = CloseFrame {
            code: CloseCode::Normal,
            reason: CLIENT_CLOSE_REASON.into(),
        };
        if let Err(e) = write.send(tungstenite::Message::Close(Some(close))).await {
            debug!("close frame not delivered: {e}");
        }
    }
    exit
}

async fn next_tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn frame_kind(msg: &tungstenite::Message) -> &'static str {
    match msg {
        tungstenite::Message::Text(_) => "text",
        tungstenite::Message::Binary(_) => "binary",
        tungstenite::Message::Ping(_) => "ping",
        tungstenite::Message::Pong(_) => "pong",
        tungstenite::Message::Close(_) => "close",
        tungstenite::Message::Frame(_) => "frame",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;

    type Captured = mpsc::UnboundedReceiver<tungstenite::Message>;

    fn capture() -> (
        impl SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
        Captured,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = sink::unfold(tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg);
            Ok::<_, tungstenite::Error>(tx)
        });
        (Box::pin(sink), rx)
    }

    fn drain(rx: &mut Captured) -> Vec<tungstenite::Message> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn cancel_ends_with_normal_close_frame() {
        let (sink, mut captured) = capture();
        let (_write_tx, write_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let exit = write_pump(sink, write_rx, None, cancel).await;
        assert_eq!(exit, WriteExit::Cancelled);

        match drain(&mut captured).as_slice() {
            [tungstenite::Message::Close(Some(frame))] => {
                assert_eq!(u16::from(frame.code), 1000);
                assert_eq!(frame.reason.as_str(), CLIENT_CLOSE_REASON);
            }
            other => panic!("expected a single close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn queued_frames_keep_their_order() {
        let (sink, mut captured) = capture();
        let (write_tx, write_rx) = mpsc::channel(4);
        for text in ["one", "two", "three"] {
            write_tx
                .try_send(tungstenite::Message::Text(text.into()))
                .unwrap();
        }
        drop(write_tx);

        let exit = write_pump(sink, write_rx, None, CancellationToken::new()).await;
        assert_eq!(exit, WriteExit::QueueClosed);

        let texts: Vec<String> = drain(&mut captured)
            .into_iter()
            .filter_map(|m| match m {
                tungstenite::Message::Text(t) => Some(t.as_str().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn pings_once_per_period() {
        tokio::time::pause();
        let (sink, mut captured) = capture();
        let (_write_tx, write_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(write_pump(
            sink,
            write_rx,
            Some(Duration::from_secs(5)),
            cancel.clone(),
        ));
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_secs(11)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let pings = drain(&mut captured)
            .iter()
            .filter(|m| matches!(m, tungstenite::Message::Ping(_)))
            .count();
        assert_eq!(pings, 2);

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), WriteExit::Cancelled);
    }

    #[tokio::test]
    async fn no_period_means_no_pings() {
        tokio::time::pause();
        let (sink, mut captured) = capture();
        let (write_tx, write_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(write_pump(sink, write_rx, None, cancel.clone()));
        tokio::time::advance(Duration::from_secs(600)).await;
        tokio::task::yield_now().await;
        drop(write_tx);

        assert_eq!(handle.await.unwrap(), WriteExit::QueueClosed);
        assert!(
            drain(&mut captured)
                .iter()
                .all(|m| !matches!(m, tungstenite::Message::Ping(_)))
        );
    }

    #[tokio::test]
    async fn sink_failure_skips_close_frame() {
        let attempts = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = attempts.clone();
        let failing = Box::pin(sink::unfold((), move |(), _msg: tungstenite::Message| {
            seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err::<(), _>(tungstenite::Error::ConnectionClosed) }
        }));
        let (write_tx, write_rx) = mpsc::channel(4);
        write_tx
            .try_send(tungstenite::Message::Text("lost".into()))
            .unwrap();

        let exit = write_pump(failing, write_rx, None, CancellationToken::new()).await;
        assert_eq!(exit, WriteExit::SinkFailed);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
