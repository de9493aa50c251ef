use crate::error::{Result, StreamError};

/// Fixed header length in bytes.
pub const HEADER_LEN: usize = 12;

/// Protocol version carried in every packet (RFC 3550 §5.1).
pub const VERSION: u8 = 2;

/// Static RTP payload type for JPEG video (RFC 3551 table 5).
pub const PAYLOAD_TYPE_MJPEG: u8 = 26;

/// Fixed media packet header (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The sequence number is the index of the frame the payload belongs to,
/// not a per-packet counter — every fragment of a frame carries the same
/// value, and the marker bit distinguishes the last fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl PacketHeader {
    /// Header for one JPEG fragment: version 2, payload type 26, no
    /// padding/extension/CSRCs.
    pub fn mjpeg(sequence: u16, marker: bool, ssrc: u32) -> Self {
        Self {
            version: VERSION,
            padding: false,
            extension: false,
            csrc_count: 0,
            marker,
            payload_type: PAYLOAD_TYPE_MJPEG,
            sequence,
            timestamp: 0,
            ssrc,
        }
    }

    /// Serialize to the 12-byte network-order wire format.
    pub fn write(&self) -> [u8; HEADER_LEN] {
        let first_byte: u8 = (self.version << 6)
            | ((self.padding as u8) << 5)
            | ((self.extension as u8) << 4)
            | (self.csrc_count & 0x0f);
        let second_byte: u8 = ((self.marker as u8) << 7) | (self.payload_type & 0x7f);

        let mut header = [0u8; HEADER_LEN];
        header[0] = first_byte;
        header[1] = second_byte;
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        header
    }
}

/// Serialize a complete wire packet: 12-byte header followed by the payload
/// unmodified. There is no length prefix — the datagram boundary defines the
/// payload length.
pub fn encode(header: &PacketHeader, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(HEADER_LEN + payload.len());
    packet.extend_from_slice(&header.write());
    packet.extend_from_slice(payload);
    packet
}

/// A decoded media packet borrowing the datagram it was parsed from.
///
/// The payload is exposed as a zero-copy slice; its content is opaque to the
/// codec and never validated.
#[derive(Debug)]
pub struct MediaPacket<'a> {
    header: PacketHeader,
    payload: &'a [u8],
}

impl<'a> MediaPacket<'a> {
    /// Parse a received datagram.
    ///
    /// Fails with [`StreamError::TruncatedPacket`] when the input is shorter
    /// than the fixed header.
    pub fn decode(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(StreamError::TruncatedPacket { len: buf.len() });
        }

        let header = PacketHeader {
            version: buf[0] >> 6,
            padding: (buf[0] >> 5) & 1 == 1,
            extension: (buf[0] >> 4) & 1 == 1,
            csrc_count: buf[0] & 0x0f,
            marker: buf[1] >> 7 == 1,
            payload_type: buf[1] & 0x7f,
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        };

        Ok(Self {
            header,
            payload: &buf[HEADER_LEN..],
        })
    }

    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    pub fn sequence(&self) -> u16 {
        self.header.sequence
    }

    pub fn marker(&self) -> bool {
        self.header.marker
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}
