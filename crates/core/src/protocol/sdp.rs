//! Session description body for DESCRIBE responses (SDP, RFC 4566).
//!
//! ```text
//! v=0                                ← protocol version
//! o=- <session-id> 1 IN IP4 <addr>   ← owner / session identifier
//! s=<session-name>                   ← session name
//! c=IN IP4 <addr>                    ← connection address
//! t=0 0                              ← timing (permanent session)
//! m=video <port> RTP/AVP 26          ← media line: UDP port + payload type
//! a=control:streamid=0               ← control attribute
//! ```

/// Generate the session description reflecting current negotiated
/// parameters. `media_port` is the client's datagram port (0 before SETUP
/// negotiated one).
pub fn describe_body(
    session_id: u32,
    host: &str,
    media_port: u16,
    payload_type: u8,
    session_name: &str,
) -> String {
    let mut sdp: Vec<String> = Vec::new();

    sdp.push("v=0".to_string());
    sdp.push(format!("o=- {} 1 IN IP4 {}", session_id, host));
    sdp.push(format!("s={}", session_name));
    sdp.push(format!("c=IN IP4 {}", host));
    sdp.push("t=0 0".to_string());
    sdp.push(format!("m=video {} RTP/AVP {}", media_port, payload_type));
    sdp.push("a=control:streamid=0".to_string());

    format!("{}\r\n", sdp.join("\r\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_session_description() {
        let sdp = describe_body(314159, "192.168.1.50", 25000, 26, "MJPEG Session");
        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("o=- 314159 1 IN IP4 192.168.1.50\r\n"));
        assert!(sdp.contains("s=MJPEG Session\r\n"));
        assert!(sdp.contains("c=IN IP4 192.168.1.50\r\n"));
        assert!(sdp.contains("t=0 0\r\n"), "permanent session timing");
        assert!(sdp.contains("m=video 25000 RTP/AVP 26\r\n"));
        assert!(sdp.contains("a=control:streamid=0\r\n"));
        assert!(sdp.ends_with("\r\n"));
    }

    #[test]
    fn media_port_zero_before_setup() {
        let sdp = describe_body(0, "10.0.0.1", 0, 26, "Stream");
        assert!(sdp.contains("m=video 0 RTP/AVP 26\r\n"));
    }
}
