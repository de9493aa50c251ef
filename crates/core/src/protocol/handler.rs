use std::net::SocketAddr;
use std::sync::Arc;

use crate::media::demux::VideoSource;
use crate::media::fragment::FramePacketizer;
use crate::media::packet::PAYLOAD_TYPE_MJPEG;
use crate::protocol::request::Request;
use crate::protocol::response::Response;
use crate::protocol::{Method, sdp};
use crate::server::ServerConfig;
use crate::session::sender::SenderTask;
use crate::session::transport::TransportHeader;
use crate::session::{Session, SessionState};

/// Drives one connection's session through the verb transition table.
///
/// | State   | SETUP   | PLAY      | PAUSE   | TEARDOWN | DESCRIBE |
/// |---------|---------|-----------|---------|----------|----------|
/// | Init    | → Ready | ignored   | ignored | → Init   | answered |
/// | Ready   | ignored | → Playing | ignored | → Init   | answered |
/// | Playing | ignored | ignored   | → Ready | → Init   | answered |
///
/// `handle` returns `None` for verbs that are illegal in the current state:
/// no reply is written and nothing changes.
pub struct SessionHandler {
    session: Session,
    peer_addr: SocketAddr,
    config: Arc<ServerConfig>,
}

impl SessionHandler {
    pub fn new(peer_addr: SocketAddr, config: Arc<ServerConfig>) -> Self {
        SessionHandler {
            session: Session::new(),
            peer_addr,
            config,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn handle(&mut self, request: &Request) -> Option<Response> {
        let cseq = request.header("CSeq").unwrap_or("0").to_string();

        match request.method {
            Method::Setup => self.handle_setup(&cseq, request),
            Method::Play => self.handle_play(&cseq),
            Method::Pause => self.handle_pause(&cseq),
            Method::Teardown => Some(self.handle_teardown(&cseq)),
            Method::Describe => Some(self.handle_describe(&cseq, &request.resource)),
        }
    }

    fn handle_setup(&mut self, cseq: &str, request: &Request) -> Option<Response> {
        if self.session.state() != SessionState::Init {
            tracing::debug!(state = ?self.session.state(), "SETUP ignored (already set up)");
            return None;
        }

        let source = match VideoSource::open(&request.resource) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(resource = %request.resource, error = %e, "SETUP for missing source");
                return Some(Response::not_found().add_header("CSeq", cseq));
            }
        };

        let transport = request.header("Transport").and_then(TransportHeader::parse);
        let Some(transport) = transport else {
            tracing::warn!(%cseq, "SETUP missing or invalid Transport header");
            return Some(Response::server_error().add_header("CSeq", cseq));
        };

        let session_id = self.session.assign_session_id();
        self.session.set_source(source);
        self.session
            .set_peer_rtp_addr(SocketAddr::new(self.peer_addr.ip(), transport.client_port));
        self.session.set_state(SessionState::Ready);

        tracing::info!(
            session_id,
            resource = %request.resource,
            client_port = transport.client_port,
            "session set up"
        );

        Some(
            Response::ok()
                .add_header("CSeq", cseq)
                .add_header("Session", &session_id.to_string()),
        )
    }

    fn handle_play(&mut self, cseq: &str) -> Option<Response> {
        if self.session.state() != SessionState::Ready {
            tracing::debug!(state = ?self.session.state(), "PLAY ignored");
            return None;
        }

        // Both are set by the SETUP that moved us to Ready.
        let source = self.session.source()?;
        let peer = self.session.peer_rtp_addr()?;

        let endpoint = match self.session.endpoint_or_bind() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                tracing::error!(error = %e, "failed to bind data endpoint");
                return Some(Response::server_error().add_header("CSeq", cseq));
            }
        };

        let session_id = self.session.assign_session_id();
        let cancel = self.session.arm_sender();

        SenderTask {
            endpoint,
            peer,
            source,
            packetizer: FramePacketizer::with_random_ssrc().with_mtu(self.config.mtu),
            cancel,
            frame_interval: self.config.frame_interval,
            chunk_pacing: self.config.chunk_pacing,
        }
        .spawn();

        self.session.set_state(SessionState::Playing);
        tracing::info!(session_id, peer = %peer, "session playing");

        Some(
            Response::ok()
                .add_header("CSeq", cseq)
                .add_header("Session", &session_id.to_string()),
        )
    }

    fn handle_pause(&mut self, cseq: &str) -> Option<Response> {
        if self.session.state() != SessionState::Playing {
            tracing::debug!(state = ?self.session.state(), "PAUSE ignored");
            return None;
        }

        self.session.signal_sender_stop();
        self.session.set_state(SessionState::Ready);
        let session_id = self.session.assign_session_id();
        tracing::info!(session_id, "session paused");

        Some(
            Response::ok()
                .add_header("CSeq", cseq)
                .add_header("Session", &session_id.to_string()),
        )
    }

    /// TEARDOWN is accepted from any state and is idempotent: it always
    /// signals an active sender to stop, releases the data endpoint if one
    /// exists, and replies with success.
    fn handle_teardown(&mut self, cseq: &str) -> Response {
        self.session.signal_sender_stop();
        self.session.release_endpoint();
        self.session.set_state(SessionState::Init);

        let session_id = self.session.session_id().unwrap_or(0);
        tracing::info!(session_id, "session torn down");

        Response::ok()
            .add_header("CSeq", cseq)
            .add_header("Session", &session_id.to_string())
    }

    /// DESCRIBE is answered in every state and never mutates it.
    fn handle_describe(&self, cseq: &str, resource: &str) -> Response {
        let session_id = self.session.session_id().unwrap_or(0);
        let media_port = self.session.peer_rtp_addr().map(|a| a.port()).unwrap_or(0);
        let host = self.peer_addr.ip().to_string();

        let body = sdp::describe_body(
            session_id,
            &host,
            media_port,
            PAYLOAD_TYPE_MJPEG,
            &self.config.session_name,
        );

        tracing::debug!(%cseq, resource, "DESCRIBE");

        Response::ok()
            .add_header("CSeq", cseq)
            .add_header("Session", &session_id.to_string())
            .add_header("Content-Base", resource)
            .add_header("Content-Type", "application/sdp")
            .with_body(body)
    }

    /// Connection-drop cleanup: stop any sender, release the endpoint.
    pub fn shutdown(&mut self) {
        self.session.signal_sender_stop();
        self.session.release_endpoint();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::demux::{EOI, SOI};
    use std::io::Write;
    use std::path::PathBuf;

    fn test_video(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("mjstream-handler-{name}.mjpeg"));
        let mut file = std::fs::File::create(&path).unwrap();
        for body in [b"frame-one" as &[u8], b"frame-two"] {
            file.write_all(&SOI).unwrap();
            file.write_all(body).unwrap();
            file.write_all(&EOI).unwrap();
        }
        path
    }

    fn make_handler() -> SessionHandler {
        SessionHandler::new(
            "127.0.0.1:50000".parse().unwrap(),
            Arc::new(ServerConfig::default()),
        )
    }

    fn setup_request(resource: &str) -> Request {
        Request::new(Method::Setup, resource)
            .add_header("CSeq", "1")
            .add_header("Transport", "RTP/AVP;unicast;client_port=25000")
    }

    fn plain_request(method: Method, cseq: &str) -> Request {
        Request::new(method, "movie.mjpeg")
            .add_header("CSeq", cseq)
            .add_header("Session", "0")
    }

    #[test]
    fn illegal_verbs_in_init_are_ignored() {
        let mut h = make_handler();
        assert!(h.handle(&plain_request(Method::Play, "1")).is_none());
        assert!(h.handle(&plain_request(Method::Pause, "2")).is_none());
        assert_eq!(h.session().state(), SessionState::Init);
    }

    #[test]
    fn setup_missing_source_is_404_and_no_transition() {
        let mut h = make_handler();
        let resp = h.handle(&setup_request("/nonexistent.mjpeg")).unwrap();
        assert_eq!(resp.status_code, 404);
        assert_eq!(h.session().state(), SessionState::Init);
        assert!(h.session().session_id().is_none());
    }

    #[test]
    fn full_legal_transition_sequence() {
        let path = test_video("lifecycle");
        let mut h = make_handler();

        let resp = h.handle(&setup_request(path.to_str().unwrap())).unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.header("CSeq"), Some("1"));
        let session_id = h.session().session_id().unwrap();
        assert_eq!(resp.header("Session"), Some(session_id.to_string().as_str()));
        assert_eq!(h.session().state(), SessionState::Ready);

        // Second SETUP is ignored; session id untouched.
        assert!(h.handle(&setup_request(path.to_str().unwrap())).is_none());
        assert_eq!(h.session().session_id(), Some(session_id));

        let resp = h.handle(&plain_request(Method::Play, "2")).unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(h.session().state(), SessionState::Playing);

        // PLAY while playing is ignored.
        assert!(h.handle(&plain_request(Method::Play, "3")).is_none());

        let resp = h.handle(&plain_request(Method::Pause, "4")).unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(h.session().state(), SessionState::Ready);

        let resp = h.handle(&plain_request(Method::Teardown, "5")).unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(h.session().state(), SessionState::Init);

        // TEARDOWN is idempotent.
        let resp = h.handle(&plain_request(Method::Teardown, "6")).unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.header("CSeq"), Some("6"));
        assert_eq!(h.session().state(), SessionState::Init);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn describe_answered_in_every_state_without_transition() {
        let path = test_video("describe");
        let mut h = make_handler();

        for expected_state in [SessionState::Init, SessionState::Ready, SessionState::Playing] {
            let resp = h.handle(&plain_request(Method::Describe, "9")).unwrap();
            assert_eq!(resp.status_code, 200);
            assert_eq!(resp.header("Content-Type"), Some("application/sdp"));
            let body = resp.body.unwrap();
            assert!(body.starts_with("v=0\r\n"));
            assert!(body.contains("m=video"));
            assert_eq!(h.session().state(), expected_state);

            // Advance to the next state for the following iteration.
            match expected_state {
                SessionState::Init => {
                    h.handle(&setup_request(path.to_str().unwrap()));
                }
                SessionState::Ready => {
                    h.handle(&plain_request(Method::Play, "10"));
                }
                SessionState::Playing => {}
            }
        }

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn setup_without_transport_is_server_error() {
        let path = test_video("no-transport");
        let mut h = make_handler();
        let req = Request::new(Method::Setup, path.to_str().unwrap()).add_header("CSeq", "1");
        let resp = h.handle(&req).unwrap();
        assert_eq!(resp.status_code, 500);
        assert_eq!(h.session().state(), SessionState::Init);
        let _ = std::fs::remove_file(path);
    }
}
