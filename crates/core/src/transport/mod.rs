//! Network transports: the TCP control channel and the UDP data channel.

pub mod tcp;
pub mod udp;

pub use udp::DataEndpoint;
