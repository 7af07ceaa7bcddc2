//! Multi-channel realtime connection manager.
//!
//! Keeps one WebSocket per channel, fans inbound JSON events out to every
//! observer of that channel, and reconnects with bounded exponential
//! backoff when a connection is lost. Normal (1000) and going-away (1001)
//! closes are final; every other close is retried.

pub mod config;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod manager;
pub mod types;

mod connection;
mod observers;
mod pumps;
mod reconnection;

pub use config::RealtimeConfig;
pub use credentials::{
    AddressProvider, CredentialError, CredentialProvider, EnvAddress, SessionTokenStore,
    StaticAddress,
};
pub use endpoint::{EndpointConfig, EndpointError, resolve_endpoint};
pub use error::{ChannelError, RealtimeError};
pub use manager::ChannelManager;
pub use threadlink_protocol::{CloseInfo, Payload};
pub use types::{
    ChannelEvent, ChannelHandle, ChannelHandlers, ChannelId, ChannelState, ListenerId,
    ReconnectConfig,
};
