//! Client-side session state machine.
//!
//! The client drives user-initiated verbs over the control channel and
//! correlates asynchronous replies with outstanding requests by sequence
//! number. Two long-lived tasks: the reply listener (control channel) and,
//! while playing, the datagram receiver (data channel). Cancellation is a
//! shared flag polled between bounded receive attempts, so a PAUSE or
//! TEARDOWN is noticed within one receive timeout even with no traffic.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use socket2::{Domain, Socket, Type};

use crate::error::Result;
use crate::media::demux::{DEFAULT_BUFFER_CEILING, FrameDemuxer};
use crate::media::fragment::LossStats;
use crate::media::packet::MediaPacket;
use crate::protocol::{Method, Request, Response};
use crate::session::SessionState;

/// The external display collaborator's interface.
///
/// Implementations receive completed frames, DESCRIBE bodies, and loss
/// statistics from the receiver and listener threads; they must be
/// internally synchronized.
pub trait FrameSink: Send + Sync {
    /// A complete JPEG frame was reassembled.
    fn on_frame(&self, jpeg: &[u8]);

    /// A DESCRIBE reply delivered a session description body.
    fn on_description(&self, _sdp: &str) {}

    /// Loss statistics updated (called after every decoded packet).
    fn on_loss(&self, _stats: &LossStats) {}

    /// The session ended (TEARDOWN acknowledged); release display resources.
    fn on_session_end(&self) {}
}

/// Client-side tunables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Receive poll timeout; bounds how long cancellation can go unnoticed.
    pub recv_timeout: Duration,
    /// Kernel receive buffer size hint for the data endpoint.
    pub recv_buffer_bytes: usize,
    /// Reassembly buffer ceiling before stale bytes are discarded.
    pub reassembly_ceiling: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_millis(500),
            recv_buffer_bytes: 2 * 1024 * 1024,
            reassembly_ceiling: DEFAULT_BUFFER_CEILING,
        }
    }
}

/// State shared between the verb methods, the reply listener, and the
/// datagram receiver.
struct Shared {
    state: Mutex<SessionState>,
    /// Learned from the first reply that carries one; never overwritten.
    session_id: Mutex<Option<u32>>,
    /// Outstanding request sequence numbers, evicted when the reply matches.
    pending: Mutex<HashMap<u32, Method>>,
    /// Success replies whose transition precondition was not yet met.
    deferred: Mutex<Vec<Method>>,
    data_socket: Mutex<Option<Arc<UdpSocket>>>,
    /// Token for the currently armed receiver loop; replaced on each PLAY.
    recv_cancel: Mutex<Arc<AtomicBool>>,
    teardown_acked: AtomicBool,
    ended: AtomicBool,
    stats: Mutex<LossStats>,
    sink: Arc<dyn FrameSink>,
    config: ClientConfig,
    rtp_port: u16,
}

impl Shared {
    fn new(sink: Arc<dyn FrameSink>, config: ClientConfig, rtp_port: u16) -> Self {
        Self {
            state: Mutex::new(SessionState::Init),
            session_id: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            deferred: Mutex::new(Vec::new()),
            data_socket: Mutex::new(None),
            recv_cancel: Mutex::new(Arc::new(AtomicBool::new(false))),
            teardown_acked: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            stats: Mutex::new(LossStats::new()),
            sink,
            config,
            rtp_port,
        }
    }

    /// Correlate one reply with its pending request and apply the verb's
    /// transition.
    ///
    /// A reply whose sequence number has no pending entry is dropped —
    /// already handled, or stale. A success reply arriving before its
    /// transition's precondition holds (replies can outrace each other) is
    /// parked and retried after every applied transition.
    fn handle_reply(self: &Arc<Self>, response: &Response) {
        let Some(cseq) = response.cseq() else {
            tracing::warn!("reply without CSeq dropped");
            return;
        };
        let Some(verb) = self.pending.lock().remove(&cseq) else {
            tracing::debug!(cseq, "unmatched reply dropped (stale or duplicate)");
            return;
        };

        if let Some(id) = response.session_id() {
            let mut session_id = self.session_id.lock();
            if session_id.is_none() && id != 0 {
                tracing::debug!(session_id = id, "session id learned");
                *session_id = Some(id);
            }
        }

        if response.status_code != 200 {
            tracing::warn!(cseq, status = response.status_code, verb = %verb, "request failed");
            return;
        }

        if self.apply_transition(verb, response) {
            self.retry_deferred();
        } else {
            tracing::debug!(verb = %verb, "reply deferred until its precondition holds");
            self.deferred.lock().push(verb);
        }
    }

    /// Apply a success reply's transition. Returns `false` when the
    /// precondition does not hold yet.
    fn apply_transition(self: &Arc<Self>, verb: Method, response: &Response) -> bool {
        match verb {
            Method::Setup => {
                let mut state = self.state.lock();
                if *state != SessionState::Init {
                    return false;
                }
                match self.open_data_endpoint() {
                    Ok(socket) => *self.data_socket.lock() = Some(socket),
                    Err(e) => tracing::error!(error = %e, "failed to bind data endpoint"),
                }
                *state = SessionState::Ready;
                tracing::info!("session ready");
                true
            }
            Method::Play => {
                let mut state = self.state.lock();
                if *state != SessionState::Ready {
                    return false;
                }
                let Some(socket) = self.data_socket.lock().clone() else {
                    tracing::error!("PLAY accepted but no data endpoint bound");
                    return false;
                };
                let cancel = Arc::new(AtomicBool::new(false));
                *self.recv_cancel.lock() = cancel.clone();

                let shared = self.clone();
                thread::spawn(move || shared.recv_loop(socket, cancel));

                *state = SessionState::Playing;
                tracing::info!("session playing");
                true
            }
            Method::Pause => {
                let mut state = self.state.lock();
                if *state != SessionState::Playing {
                    return false;
                }
                self.recv_cancel.lock().store(true, Ordering::SeqCst);
                *state = SessionState::Ready;
                tracing::info!("session paused");
                true
            }
            Method::Teardown => {
                let mut state = self.state.lock();
                let was_playing = *state == SessionState::Playing;
                *state = SessionState::Init;
                drop(state);

                self.teardown_acked.store(true, Ordering::SeqCst);
                self.recv_cancel.lock().store(true, Ordering::SeqCst);
                if !was_playing {
                    // No receiver loop to do the release on its way out.
                    self.release_data_endpoint();
                }
                tracing::info!("teardown acknowledged");
                true
            }
            Method::Describe => {
                if let Some(body) = &response.body {
                    self.sink.on_description(body);
                }
                true
            }
        }
    }

    fn retry_deferred(self: &Arc<Self>) {
        loop {
            let queued: Vec<Method> = self.deferred.lock().drain(..).collect();
            if queued.is_empty() {
                return;
            }
            let mut progressed = false;
            for verb in queued {
                // Only Setup/Play/Pause can defer; none of them read the
                // reply body, so a placeholder response suffices here.
                if self.apply_transition(verb, &Response::ok()) {
                    progressed = true;
                } else {
                    self.deferred.lock().push(verb);
                }
            }
            if !progressed {
                return;
            }
        }
    }

    /// Bind the datagram endpoint on the negotiated local port, with the
    /// configured kernel receive buffer and the poll timeout applied.
    fn open_data_endpoint(&self) -> Result<Arc<UdpSocket>> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
        socket.set_recv_buffer_size(self.config.recv_buffer_bytes)?;
        let addr = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), self.rtp_port);
        socket.bind(&addr.into())?;
        socket.set_read_timeout(Some(self.config.recv_timeout))?;

        tracing::debug!(port = self.rtp_port, "data endpoint bound");
        Ok(Arc::new(socket.into()))
    }

    /// Best-effort endpoint release; failures cannot affect protocol
    /// correctness and are discarded.
    fn release_data_endpoint(&self) {
        let _ = self.data_socket.lock().take();
        if !self.ended.swap(true, Ordering::SeqCst) {
            self.sink.on_session_end();
        }
    }

    /// Datagram receiver: decode, account loss, reassemble, hand frames to
    /// the sink. Runs until its cancellation token is set or the transport
    /// fails (treated identically).
    fn recv_loop(self: Arc<Self>, socket: Arc<UdpSocket>, cancel: Arc<AtomicBool>) {
        tracing::debug!("receiver loop started");
        let mut demux = FrameDemuxer::with_ceiling(self.config.reassembly_ceiling);
        let mut buf = vec![0u8; 65535];

        loop {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            match socket.recv(&mut buf) {
                Ok(n) => {
                    let packet = match MediaPacket::decode(&buf[..n]) {
                        Ok(packet) => packet,
                        Err(e) => {
                            tracing::warn!(error = %e, "dropping malformed datagram");
                            continue;
                        }
                    };

                    let snapshot = {
                        let mut stats = self.stats.lock();
                        stats.record(packet.sequence());
                        *stats
                    };
                    self.sink.on_loss(&snapshot);

                    demux.push(packet.payload());
                    while let Some(frame) = demux.next_frame() {
                        self.sink.on_frame(&frame);
                    }
                }
                Err(ref e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    // Poll timeout: loop around to observe cancellation.
                }
                Err(e) => {
                    tracing::warn!(error = %e, "data channel receive failed");
                    break;
                }
            }
        }

        if self.teardown_acked.load(Ordering::SeqCst) {
            self.release_data_endpoint();
        }
        tracing::debug!("receiver loop stopped");
    }
}

/// The streaming client: one control connection, one session.
///
/// Verb methods check the current state against the verb's precondition;
/// verbs illegal in the current state are silently dropped, never sent.
pub struct Client {
    control: TcpStream,
    resource: String,
    next_seq: AtomicU32,
    shared: Arc<Shared>,
}

impl Client {
    /// Connect the control channel and start the reply listener.
    ///
    /// `rtp_port` is the local datagram port announced to the server in
    /// SETUP's Transport header and bound when SETUP succeeds.
    pub fn connect(
        server_addr: impl ToSocketAddrs,
        resource: &str,
        rtp_port: u16,
        sink: Arc<dyn FrameSink>,
        config: ClientConfig,
    ) -> Result<Self> {
        let control = TcpStream::connect(server_addr)?;
        let shared = Arc::new(Shared::new(sink, config, rtp_port));

        let reader = control.try_clone()?;
        {
            let shared = shared.clone();
            thread::spawn(move || reply_loop(reader, shared));
        }

        Ok(Self {
            control,
            resource: resource.to_string(),
            next_seq: AtomicU32::new(0),
            shared,
        })
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    pub fn session_id(&self) -> Option<u32> {
        *self.shared.session_id.lock()
    }

    pub fn loss_stats(&self) -> LossStats {
        *self.shared.stats.lock()
    }

    /// Request session setup. Requires `Init`.
    pub fn setup(&self) -> Result<()> {
        if self.state() != SessionState::Init {
            tracing::debug!(state = ?self.state(), "SETUP dropped (precondition not met)");
            return Ok(());
        }
        let transport = format!(
            "RTP/AVP;unicast;client_port={}",
            self.shared.rtp_port
        );
        self.send(Method::Setup, &[("Transport", transport.as_str())])
    }

    /// Request playback. Requires `Ready`.
    pub fn play(&self) -> Result<()> {
        if self.state() != SessionState::Ready {
            tracing::debug!(state = ?self.state(), "PLAY dropped (precondition not met)");
            return Ok(());
        }
        self.send(Method::Play, &[("Session", &self.session_header())])
    }

    /// Request pause. Requires `Playing`.
    pub fn pause(&self) -> Result<()> {
        if self.state() != SessionState::Playing {
            tracing::debug!(state = ?self.state(), "PAUSE dropped (precondition not met)");
            return Ok(());
        }
        self.send(Method::Pause, &[("Session", &self.session_header())])
    }

    /// Request teardown. Requires not-`Init`.
    pub fn teardown(&self) -> Result<()> {
        if self.state() == SessionState::Init {
            tracing::debug!("TEARDOWN dropped (precondition not met)");
            return Ok(());
        }
        self.send(Method::Teardown, &[("Session", &self.session_header())])
    }

    /// Request the session description. Legal in every state.
    pub fn describe(&self) -> Result<()> {
        self.send(Method::Describe, &[("Accept", "application/sdp")])
    }

    fn session_header(&self) -> String {
        self.session_id().unwrap_or(0).to_string()
    }

    fn send(&self, verb: Method, headers: &[(&str, &str)]) -> Result<()> {
        let cseq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;

        let mut request =
            Request::new(verb, &self.resource).add_header("CSeq", &cseq.to_string());
        for (name, value) in headers {
            request = request.add_header(name, value);
        }

        self.shared.pending.lock().insert(cseq, verb);
        tracing::debug!(cseq, verb = %verb, "sending request");

        if let Err(e) = (&self.control).write_all(request.serialize().as_bytes()) {
            self.shared.pending.lock().remove(&cseq);
            return Err(e.into());
        }
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // Unblocks the reply listener; failures are irrelevant at this point.
        let _ = self.control.shutdown(Shutdown::Both);
    }
}

/// Reply listener: reads one response at a time off the control channel and
/// hands it to the correlation logic. Exits on transport failure or once
/// teardown has been acknowledged.
fn reply_loop(stream: TcpStream, shared: Arc<Shared>) {
    let mut reader = BufReader::new(stream);
    loop {
        let text = match read_reply(&mut reader) {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::info!("control channel closed");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "control channel read failed");
                break;
            }
        };

        match Response::parse(&text) {
            Ok(response) => shared.handle_reply(&response),
            Err(e) => tracing::warn!(error = %e, "dropping unparseable reply"),
        }

        if shared.teardown_acked.load(Ordering::SeqCst) {
            break;
        }
    }
    tracing::debug!("reply listener stopped");
}

/// Read one complete reply: status line, headers, blank line, and a body of
/// `Content-Length` bytes when present. `Ok(None)` means clean EOF.
fn read_reply(reader: &mut BufReader<TcpStream>) -> io::Result<Option<String>> {
    let mut text = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(if text.is_empty() { None } else { Some(text) });
        }
        text.push_str(&line);
        if line == "\r\n" || line == "\n" {
            break;
        }
    }

    if let Some(len) = content_length(&text) {
        if len > 0 {
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body)?;
            text.push_str(&String::from_utf8_lossy(&body));
        }
    }
    Ok(Some(text))
}

fn content_length(head: &str) -> Option<usize> {
    head.lines()
        .find(|l| l.to_ascii_lowercase().starts_with("content-length:"))
        .and_then(|l| l.split(':').nth(1))
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink;

    impl FrameSink for NullSink {
        fn on_frame(&self, _jpeg: &[u8]) {}
    }

    fn make_shared() -> Arc<Shared> {
        let config = ClientConfig {
            recv_timeout: Duration::from_millis(50),
            ..ClientConfig::default()
        };
        // Port 0: ephemeral bind, nothing ever sent to it in these tests.
        Arc::new(Shared::new(Arc::new(NullSink), config, 0))
    }

    fn ok_reply(cseq: u32, session: u32) -> Response {
        Response::parse(&format!(
            "RTSP/1.0 200 OK\r\nCSeq: {cseq}\r\nSession: {session}\r\n\r\n"
        ))
        .unwrap()
    }

    #[test]
    fn out_of_order_replies_are_deferred() {
        let shared = make_shared();
        shared.pending.lock().insert(1, Method::Setup);
        shared.pending.lock().insert(2, Method::Play);

        // PLAY's reply arrives first; its precondition (Ready) is not met.
        shared.handle_reply(&ok_reply(2, 99));
        assert_eq!(*shared.state.lock(), SessionState::Init);
        assert_eq!(shared.deferred.lock().len(), 1);

        // SETUP's reply applies, then the parked PLAY follows through.
        shared.handle_reply(&ok_reply(1, 99));
        assert_eq!(*shared.state.lock(), SessionState::Playing);
        assert!(shared.deferred.lock().is_empty());
        assert_eq!(*shared.session_id.lock(), Some(99));

        // Stop the receiver loop spawned by the PLAY transition.
        shared.pending.lock().insert(3, Method::Teardown);
        shared.handle_reply(&ok_reply(3, 99));
        assert_eq!(*shared.state.lock(), SessionState::Init);
    }

    #[test]
    fn unmatched_reply_is_dropped() {
        let shared = make_shared();
        shared.handle_reply(&ok_reply(7, 42));
        assert_eq!(*shared.state.lock(), SessionState::Init);
        assert!(shared.session_id.lock().is_none());
    }

    #[test]
    fn duplicate_reply_is_dropped_after_eviction() {
        let shared = make_shared();
        shared.pending.lock().insert(1, Method::Setup);

        shared.handle_reply(&ok_reply(1, 5));
        assert_eq!(*shared.state.lock(), SessionState::Ready);

        // Same CSeq again: the entry was evicted on match.
        shared.handle_reply(&ok_reply(1, 5));
        assert_eq!(*shared.state.lock(), SessionState::Ready);
        assert!(shared.pending.lock().is_empty());
    }

    #[test]
    fn failure_status_causes_no_transition() {
        let shared = make_shared();
        shared.pending.lock().insert(1, Method::Setup);
        let reply = Response::parse("RTSP/1.0 404 Not Found\r\nCSeq: 1\r\n\r\n").unwrap();
        shared.handle_reply(&reply);
        assert_eq!(*shared.state.lock(), SessionState::Init);
        assert!(shared.pending.lock().is_empty(), "entry still evicted");
    }

    #[test]
    fn session_id_learned_once() {
        let shared = make_shared();
        shared.pending.lock().insert(1, Method::Setup);
        shared.pending.lock().insert(2, Method::Describe);

        shared.handle_reply(&ok_reply(1, 111));
        shared.handle_reply(&ok_reply(2, 222));
        assert_eq!(*shared.session_id.lock(), Some(111));

        shared.pending.lock().insert(3, Method::Teardown);
        shared.handle_reply(&ok_reply(3, 111));
    }

    #[test]
    fn teardown_reply_is_idempotent() {
        let shared = make_shared();
        *shared.state.lock() = SessionState::Ready;

        shared.pending.lock().insert(1, Method::Teardown);
        shared.pending.lock().insert(2, Method::Teardown);

        shared.handle_reply(&ok_reply(1, 9));
        assert_eq!(*shared.state.lock(), SessionState::Init);

        shared.handle_reply(&ok_reply(2, 9));
        assert_eq!(*shared.state.lock(), SessionState::Init);
    }

    #[test]
    fn describe_hands_body_to_sink() {
        struct CaptureSink(Mutex<Option<String>>);
        impl FrameSink for CaptureSink {
            fn on_frame(&self, _jpeg: &[u8]) {}
            fn on_description(&self, sdp: &str) {
                *self.0.lock() = Some(sdp.to_string());
            }
        }

        let sink = Arc::new(CaptureSink(Mutex::new(None)));
        let shared = Arc::new(Shared::new(
            sink.clone(),
            ClientConfig::default(),
            0,
        ));
        shared.pending.lock().insert(1, Method::Describe);

        let reply = Response::parse(
            "RTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Type: application/sdp\r\n\r\nv=0\r\n",
        )
        .unwrap();
        shared.handle_reply(&reply);

        assert_eq!(sink.0.lock().as_deref(), Some("v=0\r\n"));
        assert_eq!(*shared.state.lock(), SessionState::Init, "no transition");
    }
}
