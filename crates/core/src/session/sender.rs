use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::media::demux::VideoSource;
use crate::media::fragment::FramePacketizer;
use crate::transport::DataEndpoint;

/// Everything the sender task needs, captured at PLAY time.
pub struct SenderTask<R> {
    pub endpoint: DataEndpoint,
    pub peer: SocketAddr,
    pub source: Arc<Mutex<VideoSource<R>>>,
    pub packetizer: FramePacketizer,
    pub cancel: Arc<AtomicBool>,
    /// Pacing between frames.
    pub frame_interval: Duration,
    /// Flow-smoothing delay between fragments of one frame.
    pub chunk_pacing: Duration,
}

impl<R: Read + Send + 'static> SenderTask<R> {
    /// Spawn the paced delivery loop on its own thread.
    ///
    /// The loop checks the cancellation token between frames and between
    /// fragments, so a PAUSE or TEARDOWN stops delivery mid-frame without
    /// finishing it. A send failure terminates the loop; nothing retries.
    pub fn spawn(self) -> JoinHandle<()> {
        thread::spawn(move || self.run())
    }

    fn run(self) {
        tracing::debug!(peer = %self.peer, "sender task started");

        loop {
            thread::sleep(self.frame_interval);
            if self.cancel.load(Ordering::SeqCst) {
                break;
            }

            let (frame, frame_number) = {
                let mut source = self.source.lock();
                match source.next_frame() {
                    Ok(Some(frame)) => (frame, source.frame_number()),
                    Ok(None) => {
                        tracing::info!(peer = %self.peer, "end of stream, sender stopping");
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "video source read failed, sender stopping");
                        return;
                    }
                }
            };

            let packets = self.packetizer.packetize(&frame, frame_number as u16);
            for (i, packet) in packets.iter().enumerate() {
                if self.cancel.load(Ordering::SeqCst) {
                    tracing::debug!(frame_number, "cancelled mid-frame");
                    return;
                }
                if let Err(e) = self.endpoint.send_to(packet, self.peer) {
                    tracing::warn!(error = %e, peer = %self.peer, "send failed, sender stopping");
                    return;
                }
                if i + 1 < packets.len() {
                    thread::sleep(self.chunk_pacing);
                }
            }

            tracing::trace!(frame_number, fragments = packets.len(), "frame delivered");
        }

        tracing::debug!(peer = %self.peer, "sender task stopped");
    }
}
