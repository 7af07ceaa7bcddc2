//! Per-connection tasks: the read pump owns the inbound half, the write
//! pump owns the sink and sends keepalive pings itself.

pub(crate) mod read;
pub(crate) mod write;
