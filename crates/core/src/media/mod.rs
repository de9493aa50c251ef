//! Media framing: packet codec, frame demuxing, and fragmentation.
//!
//! The video payload travels as independent datagrams, each carrying a
//! 12-byte fixed header ([`packet::MediaPacket`]) followed by a fragment of
//! one JPEG frame:
//!
//! - **Sequence number** (16-bit) — the *frame* index; all fragments of a
//!   frame share it. The receiver derives loss statistics from gaps.
//! - **Marker bit** — set on the last fragment of a frame.
//! - **Payload type** — fixed to 26 (JPEG).
//!
//! [`demux::FrameDemuxer`] turns a byte stream back into discrete JPEG
//! frames by scanning for the SOI/EOI markers; it serves both the server
//! (reading a stored file through [`demux::VideoSource`]) and the client
//! (reassembling received fragment payloads).

pub mod demux;
pub mod fragment;
pub mod packet;
