use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use crate::error::Result;

/// Server-side datagram endpoint for outbound media delivery.
///
/// Bound to an ephemeral port; created on PLAY acceptance, kept across
/// PAUSE, dropped on TEARDOWN. Deliberately address-only — it knows nothing
/// about sessions; the handler resolves the peer address before sending.
#[derive(Clone)]
pub struct DataEndpoint {
    socket: Arc<UdpSocket>,
}

impl DataEndpoint {
    /// Bind an ephemeral UDP socket for outbound media.
    pub fn bind() -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Send one wire packet to the peer's media address.
    pub fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<usize> {
        Ok(self.socket.send_to(payload, addr)?)
    }
}
