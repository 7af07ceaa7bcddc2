//! Wire-level definitions shared by threadlink crates: close codes,
//! keepalive and reconnect constants, and the JSON payload envelope.

pub mod close;
pub mod constants;
pub mod envelope;

pub use close::{CloseInfo, is_terminal_code};
pub use envelope::{Payload, PayloadError, encode_payload, parse_payload};
