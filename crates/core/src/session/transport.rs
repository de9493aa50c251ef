/// Parsed client-side transport info from the `Transport` request header.
///
/// Extracts the datagram port the client wants media delivered to:
///
/// ```text
/// Transport: RTP/AVP;unicast;client_port=25000
/// ```
///
/// A `from-to` port pair (`client_port=25000-25001`) is tolerated; only the
/// first port is used, since this stack has no companion control channel on
/// the data side.
#[derive(Debug, Clone, Copy)]
pub struct TransportHeader {
    /// Client's datagram receive port.
    pub client_port: u16,
}

impl TransportHeader {
    /// Parse the `Transport` header value.
    ///
    /// Looks for `client_port=<port>` among semicolon-separated parameters.
    pub fn parse(header: &str) -> Option<Self> {
        for part in header.split(';') {
            let part = part.trim();
            if let Some(ports) = part.strip_prefix("client_port=") {
                let first = ports.split('-').next()?;
                let client_port: u16 = first.trim().parse().ok()?;
                return Some(TransportHeader { client_port });
            }
        }
        None
    }
}
