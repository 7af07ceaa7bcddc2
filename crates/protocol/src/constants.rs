use std::time::Duration;

/// Close code sent on a voluntary, orderly shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code sent when an endpoint is going away (server restart,
/// page navigation).
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Close frame received without a status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Connection dropped without a close frame. Never sent on the wire; used
/// locally for connect failures, read errors and keepalive timeouts.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// How often to send keepalive pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(5);

/// Read deadline: if *nothing* arrives within this window (no pong, no
/// event) the connection is considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// Maximum inbound message size in bytes (8 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Capacity of the per-connection outbound queue.
pub const WS_OUTBOUND_QUEUE: usize = 256;

/// Delay before the first reconnection attempt; doubles on each attempt.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Consecutive reconnection attempts before a channel gives up.
pub const RECONNECT_MAX_ATTEMPTS: u32 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_period_below_pong_wait() {
        assert!(WS_PING_PERIOD < WS_PONG_WAIT);
    }

    #[test]
    fn reconnect_defaults() {
        assert_eq!(RECONNECT_BASE_DELAY, Duration::from_secs(1));
        assert_eq!(RECONNECT_MAX_ATTEMPTS, 5);
    }
}
