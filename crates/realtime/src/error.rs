//! Error types for the channel manager.

use crate::endpoint::EndpointError;

/// Errors returned synchronously from [`ChannelManager`](crate::ChannelManager)
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("no credential available")]
    Auth,

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] EndpointError),
}

/// Errors delivered to a channel's `on_error` callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// No credential was available when a reconnect came due.
    #[error("no credential available")]
    Auth,

    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("reconnection gave up after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl ChannelError {
    /// Returns `true` if the channel is fully disconnected after this error.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Auth | Self::Endpoint(_) | Self::ReconnectExhausted { .. }
        )
    }
}

impl From<RealtimeError> for ChannelError {
    fn from(err: RealtimeError) -> Self {
        match err {
            RealtimeError::Auth => Self::Auth,
            RealtimeError::Endpoint(e) => Self::Endpoint(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(RealtimeError::Auth.to_string(), "no credential available");
        assert_eq!(
            ChannelError::ReconnectExhausted { attempts: 5 }.to_string(),
            "reconnection gave up after 5 attempts"
        );
        assert!(
            ChannelError::Parse("expected value".into())
                .to_string()
                .contains("expected value")
        );
    }

    #[test]
    fn only_final_errors_are_terminal() {
        assert!(ChannelError::ReconnectExhausted { attempts: 5 }.is_terminal());
        assert!(ChannelError::Auth.is_terminal());
        assert!(!ChannelError::Transport("reset".into()).is_terminal());
        assert!(!ChannelError::Parse("bad".into()).is_terminal());
    }

    #[test]
    fn realtime_error_converts_for_callbacks() {
        assert_eq!(ChannelError::from(RealtimeError::Auth), ChannelError::Auth);
        let err = RealtimeError::Endpoint(EndpointError::UnsupportedScheme("ftp".into()));
        assert!(matches!(ChannelError::from(err), ChannelError::Endpoint(m) if m.contains("ftp")));
    }
}
