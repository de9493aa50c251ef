use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{Result, StreamError};
use crate::media::fragment::DEFAULT_MTU;
use crate::transport::tcp;

/// Server-level tunables used by connection workers and sender tasks.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum media payload bytes per outgoing datagram.
    pub mtu: usize,
    /// Pacing between frames on the sender task (~20 fps by default).
    pub frame_interval: Duration,
    /// Flow-smoothing delay between fragments of one frame.
    pub chunk_pacing: Duration,
    /// Accept-loop cancellation poll interval; bounds shutdown latency.
    pub poll_interval: Duration,
    /// SDP session name (`s=` line in DESCRIBE bodies).
    pub session_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            frame_interval: Duration::from_millis(50),
            chunk_pacing: Duration::from_millis(1),
            poll_interval: Duration::from_millis(50),
            session_name: "MJPEG Session".to_string(),
        }
    }
}

/// The streaming server: listens for control connections and spawns one
/// session worker per client.
///
/// Media delivery is driven entirely by the workers; the server itself only
/// owns the listener lifecycle.
pub struct Server {
    running: Arc<AtomicBool>,
    bind_addr: String,
    config: Arc<ServerConfig>,
}

impl Server {
    pub fn new(bind_addr: &str) -> Self {
        Self::with_config(bind_addr, ServerConfig::default())
    }

    pub fn with_config(bind_addr: &str, config: ServerConfig) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            bind_addr: bind_addr.to_string(),
            config: Arc::new(config),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(StreamError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let config = self.config.clone();

        tracing::info!(addr = %self.bind_addr, "control channel listening");

        thread::spawn(move || {
            tcp::accept_loop(listener, config, running);
        });

        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_twice_is_an_error() {
        let mut server = Server::new("127.0.0.1:0");
        server.start().unwrap();
        assert!(matches!(server.start(), Err(StreamError::AlreadyRunning)));
        server.stop();
        assert!(!server.is_running());
    }
}
