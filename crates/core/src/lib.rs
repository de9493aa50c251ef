pub mod client;
pub mod error;
pub mod media;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use client::{Client, ClientConfig, FrameSink};
pub use error::{Result, StreamError};
pub use media::demux::{FrameDemuxer, VideoSource};
pub use media::fragment::{FramePacketizer, LossStats};
pub use server::{Server, ServerConfig};
pub use session::SessionState;
