//! Server-side session state.
//!
//! One session per accepted control connection, created when the worker
//! starts and destroyed when its control loop exits. The lifecycle:
//!
//! ```text
//! SETUP    Init -> Ready     (open source, assign session id)
//! PLAY     Ready -> Playing  (bind data endpoint, start sender task)
//! PAUSE    Playing -> Ready  (signal sender, endpoint retained)
//! TEARDOWN any -> Init       (signal sender, release endpoint)
//! DESCRIBE answered in any state, no transition
//! ```
//!
//! Verbs that are illegal in the current state are ignored: no reply, no
//! state change.

pub mod sender;
pub mod transport;

use std::fs::File;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rand::Rng;

use crate::media::demux::VideoSource;
use crate::transport::DataEndpoint;

/// Protocol state shared in spirit by server and client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No source negotiated yet.
    Init,
    /// Source open, ready to stream.
    Ready,
    /// Sender task delivering media.
    Playing,
}

/// One client's streaming lifecycle, owned by its connection worker.
///
/// All fields are initialized in [`new`](Self::new); nothing is shared
/// between sessions. The video source sits behind a mutex because the
/// sender task reads frames from it while the worker retains ownership
/// across PAUSE/PLAY cycles.
pub struct Session {
    state: SessionState,
    session_id: Option<u32>,
    source: Option<Arc<Mutex<VideoSource<File>>>>,
    endpoint: Option<DataEndpoint>,
    peer_rtp_addr: Option<SocketAddr>,
    cancel: Arc<AtomicBool>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Init,
            session_id: None,
            source: None,
            endpoint: None,
            peer_rtp_addr: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_state(&mut self, state: SessionState) {
        tracing::debug!(old_state = ?self.state, new_state = ?state, "state transition");
        self.state = state;
    }

    /// Session identifier, once assigned.
    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    /// Assign (on first successful SETUP) or return the session identifier.
    /// Immutable once assigned.
    pub fn assign_session_id(&mut self) -> u32 {
        *self
            .session_id
            .get_or_insert_with(|| rand::rng().random::<u32>())
    }

    pub fn set_source(&mut self, source: VideoSource<File>) {
        self.source = Some(Arc::new(Mutex::new(source)));
    }

    pub fn source(&self) -> Option<Arc<Mutex<VideoSource<File>>>> {
        self.source.clone()
    }

    pub fn set_peer_rtp_addr(&mut self, addr: SocketAddr) {
        self.peer_rtp_addr = Some(addr);
    }

    pub fn peer_rtp_addr(&self) -> Option<SocketAddr> {
        self.peer_rtp_addr
    }

    /// Data endpoint for the sender, binding one on first use. The endpoint
    /// persists across PAUSE and is released only on TEARDOWN.
    pub fn endpoint_or_bind(&mut self) -> crate::error::Result<DataEndpoint> {
        if self.endpoint.is_none() {
            self.endpoint = Some(DataEndpoint::bind()?);
        }
        Ok(self.endpoint.as_ref().unwrap().clone())
    }

    /// Fresh cancellation token for a new sender task. The previous token
    /// stays set so an old sender still winding down keeps seeing it.
    pub fn arm_sender(&mut self) -> Arc<AtomicBool> {
        self.cancel = Arc::new(AtomicBool::new(false));
        self.cancel.clone()
    }

    /// Signal the active sender task (if any) to stop.
    pub fn signal_sender_stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Release the data endpoint. Failures cannot affect protocol
    /// correctness, so the release is unconditional and discards nothing
    /// visible to the caller.
    pub fn release_endpoint(&mut self) {
        if self.endpoint.take().is_some() {
            tracing::debug!(session_id = ?self.session_id, "data endpoint released");
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
