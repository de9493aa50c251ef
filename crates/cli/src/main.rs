use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use mjstream::{Client, ClientConfig, FrameSink, LossStats, Server, SessionState};
use parking_lot::Mutex;

#[derive(Parser)]
#[command(name = "mjstream", about = "Motion-JPEG streaming over RTSP/RTP")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the streaming server
    Serve {
        /// Bind address (host:port)
        #[arg(long, short, default_value = "0.0.0.0:8554")]
        bind: String,
    },
    /// Stream a video from a server and write frames to a cache file
    Play {
        /// Server address (host:port)
        #[arg(long, short, default_value = "127.0.0.1:8554")]
        server: String,

        /// Local UDP port for the media stream
        #[arg(long, default_value_t = 25000)]
        rtp_port: u16,

        /// Video file identifier to request
        file: String,

        /// How long to play before tearing down, in seconds
        #[arg(long, default_value_t = 10)]
        duration: u64,
    },
}

/// Hands frames to an external viewer through the filesystem: each completed
/// frame overwrites `cache-<session>.jpg`, and the file is removed when the
/// session ends. The path is only known once the session id has been learned.
struct CacheFileSink {
    path: Mutex<Option<PathBuf>>,
    frames: AtomicU64,
}

impl CacheFileSink {
    fn new() -> Self {
        Self {
            path: Mutex::new(None),
            frames: AtomicU64::new(0),
        }
    }

    fn set_session(&self, session_id: u32) {
        *self.path.lock() = Some(PathBuf::from(format!("cache-{session_id}.jpg")));
    }
}

impl FrameSink for CacheFileSink {
    fn on_frame(&self, jpeg: &[u8]) {
        let n = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(path) = self.path.lock().as_ref() {
            if let Err(e) = fs::write(path, jpeg) {
                tracing::warn!(error = %e, "failed to write frame cache");
            }
        }
        tracing::debug!(frame = n, bytes = jpeg.len(), "frame received");
    }

    fn on_description(&self, sdp: &str) {
        println!("Session description:\n{sdp}");
    }

    fn on_loss(&self, stats: &LossStats) {
        if stats.lost() > 0 {
            tracing::debug!(
                lost = stats.lost(),
                seen = stats.total_seen(),
                percent = format!("{:.1}", stats.loss_percent()),
                "packet loss"
            );
        }
    }

    fn on_session_end(&self) {
        if let Some(path) = self.path.lock().take() {
            let _ = fs::remove_file(&path);
        }
        tracing::info!("session ended");
    }
}

fn serve(bind: &str) {
    let mut server = Server::new(bind);

    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        return;
    }

    println!("Streaming server on {bind}, press Enter to stop");
    let mut input = String::new();
    let _ = io::stdin().read_line(&mut input);

    server.stop();
}

/// Poll until the client reaches `target` or the deadline passes.
fn wait_for_state(client: &Client, target: SessionState, deadline: Duration) -> bool {
    let step = Duration::from_millis(20);
    let mut waited = Duration::ZERO;
    while client.state() != target {
        if waited >= deadline {
            return false;
        }
        thread::sleep(step);
        waited += step;
    }
    true
}

fn play(server: &str, rtp_port: u16, file: &str, duration: u64) {
    let sink = Arc::new(CacheFileSink::new());

    let client = match Client::connect(server, file, rtp_port, sink.clone(), ClientConfig::default())
    {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to connect to {server}: {e}");
            return;
        }
    };

    if let Err(e) = client.setup() {
        eprintln!("SETUP failed: {e}");
        return;
    }
    if !wait_for_state(&client, SessionState::Ready, Duration::from_secs(5)) {
        eprintln!("Server did not accept the session");
        return;
    }
    if let Some(id) = client.session_id() {
        sink.set_session(id);
        println!("Session {id} established");
    }

    if let Err(e) = client.describe() {
        eprintln!("DESCRIBE failed: {e}");
    }

    if let Err(e) = client.play() {
        eprintln!("PLAY failed: {e}");
        return;
    }
    wait_for_state(&client, SessionState::Playing, Duration::from_secs(5));

    // Play half the requested time, pause briefly, then resume for the rest.
    thread::sleep(Duration::from_secs(duration / 2));

    if let Err(e) = client.pause() {
        eprintln!("PAUSE failed: {e}");
    }
    wait_for_state(&client, SessionState::Ready, Duration::from_secs(5));
    thread::sleep(Duration::from_secs(1));

    if let Err(e) = client.play() {
        eprintln!("PLAY failed: {e}");
    }
    wait_for_state(&client, SessionState::Playing, Duration::from_secs(5));

    thread::sleep(Duration::from_secs(duration - duration / 2));

    let stats = client.loss_stats();
    println!(
        "Received {} packets, lost {} ({:.1}%)",
        stats.total_seen(),
        stats.lost(),
        stats.loss_percent()
    );

    if let Err(e) = client.teardown() {
        eprintln!("TEARDOWN failed: {e}");
    }
    wait_for_state(&client, SessionState::Init, Duration::from_secs(5));
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    match args.command {
        Command::Serve { bind } => serve(&bind),
        Command::Play {
            server,
            rtp_port,
            file,
            duration,
        } => play(&server, rtp_port, &file, duration),
    }
}
