//! U3V stream framing: leader/payload/trailer detection within the raw byte
//! stream delivered by the stream bulk endpoint. Unlike GVSP there is no
//! missing-packet semantics at this level; a framing error aborts the frame.

use thiserror::Error;

/// Leader prefix magic (`0x4C563355`, little-endian on the wire).
pub const LEADER_MAGIC: u32 = 0x4C56_3355;
/// Trailer prefix magic (`0x54563355`, little-endian on the wire).
pub const TRAILER_MAGIC: u32 = 0x5456_3355;

/// Minimum leader size: magic + pixel format + width + height + x/y offset + timestamp.
pub const LEADER_SIZE: usize = 4 + 4 + 4 + 4 + 4 + 4 + 8;
/// Minimum trailer size: magic + payload size.
pub const TRAILER_SIZE: usize = 4 + 8;

/// Errors produced while parsing or assembling U3V stream frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("leader packet too short: {0} bytes")]
    LeaderTooShort(usize),
    #[error("trailer packet too short: {0} bytes")]
    TrailerTooShort(usize),
    #[error("expected leader magic, found {0:#010x}")]
    NotALeader(u32),
    #[error("expected trailer magic, found {0:#010x}")]
    NotATrailer(u32),
    #[error("payload chunk received before a leader for this frame")]
    PayloadBeforeLeader,
    #[error("trailer payload size {declared} does not match {received} bytes received")]
    SizeMismatch { declared: u64, received: u64 },
}

/// Fields carried by a stream leader packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderInfo {
    pub pixel_format: u32,
    pub width: u32,
    pub height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub timestamp: u64,
}

/// Fields carried by a stream trailer packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailerInfo {
    pub payload_size: u64,
}

/// Parse a leader packet, rejecting anything shorter than [`LEADER_SIZE`] or
/// not starting with [`LEADER_MAGIC`].
pub fn parse_leader(buf: &[u8]) -> Result<LeaderInfo, FrameError> {
    if buf.len() < LEADER_SIZE {
        return Err(FrameError::LeaderTooShort(buf.len()));
    }
    let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    if magic != LEADER_MAGIC {
        return Err(FrameError::NotALeader(magic));
    }
    Ok(LeaderInfo {
        pixel_format: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
        width: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
        height: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        x_offset: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
        y_offset: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
        timestamp: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
    })
}

/// Parse a trailer packet, rejecting anything shorter than [`TRAILER_SIZE`] or
/// not starting with [`TRAILER_MAGIC`].
pub fn parse_trailer(buf: &[u8]) -> Result<TrailerInfo, FrameError> {
    if buf.len() < TRAILER_SIZE {
        return Err(FrameError::TrailerTooShort(buf.len()));
    }
    let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    if magic != TRAILER_MAGIC {
        return Err(FrameError::NotATrailer(magic));
    }
    Ok(TrailerInfo {
        payload_size: u64::from_le_bytes(buf[4..12].try_into().unwrap()),
    })
}

/// Outcome of feeding a frame's worth of leader/payload/trailer chunks
/// through a [`FrameAssembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Still waiting for more payload or the trailer.
    Filling,
    /// Leader, payload, and trailer were consumed and the sizes agree.
    Complete {
        leader: LeaderInfo,
        data: Vec<u8>,
    },
    /// A framing error aborted the frame; no missing-packet recovery exists
    /// at the USB level, so the frame is dropped outright.
    Aborted(FrameError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssemblerState {
    Empty,
    Filling,
    Done,
}

/// Detects leader/payload/trailer boundaries within the stream of bulk
/// transfer chunks delivered by [`crate::stream::U3vStream`], accumulating
/// payload bytes between leader and trailer.
#[derive(Debug)]
pub struct FrameAssembler {
    state: AssemblerState,
    leader: Option<LeaderInfo>,
    data: Vec<u8>,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    /// Construct an assembler ready to receive a new frame's leader.
    pub fn new() -> Self {
        Self {
            state: AssemblerState::Empty,
            leader: None,
            data: Vec::new(),
        }
    }

    /// Feed one bulk-transfer chunk. Chunks must arrive in wire order;
    /// the caller is responsible for detecting transfer errors upstream.
    pub fn feed(&mut self, chunk: &[u8]) -> FrameOutcome {
        match self.state {
            AssemblerState::Empty | AssemblerState::Done => match parse_leader(chunk) {
                Ok(leader) => {
                    self.state = AssemblerState::Filling;
                    self.leader = Some(leader);
                    self.data.clear();
                    FrameOutcome::Filling
                }
                Err(err) => FrameOutcome::Aborted(err),
            },
            AssemblerState::Filling => {
                if let Ok(trailer) = parse_trailer(chunk) {
                    self.state = AssemblerState::Done;
                    let received = self.data.len() as u64;
                    if trailer.payload_size != received {
                        return FrameOutcome::Aborted(FrameError::SizeMismatch {
                            declared: trailer.payload_size,
                            received,
                        });
                    }
                    let leader = self.leader.take().expect("leader set while filling");
                    return FrameOutcome::Complete {
                        leader,
                        data: std::mem::take(&mut self.data),
                    };
                }
                self.data.extend_from_slice(chunk);
                FrameOutcome::Filling
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leader_bytes() -> Vec<u8> {
        let mut buf = Vec::with_capacity(LEADER_SIZE);
        buf.extend_from_slice(&LEADER_MAGIC.to_le_bytes());
        buf.extend_from_slice(&17u32.to_le_bytes()); // pixel format
        buf.extend_from_slice(&640u32.to_le_bytes()); // width
        buf.extend_from_slice(&480u32.to_le_bytes()); // height
        buf.extend_from_slice(&0u32.to_le_bytes()); // x offset
        buf.extend_from_slice(&0u32.to_le_bytes()); // y offset
        buf.extend_from_slice(&12345u64.to_le_bytes()); // timestamp
        buf
    }

    fn trailer_bytes(payload_size: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(TRAILER_SIZE);
        buf.extend_from_slice(&TRAILER_MAGIC.to_le_bytes());
        buf.extend_from_slice(&payload_size.to_le_bytes());
        buf
    }

    #[test]
    fn parses_leader_fields() {
        let leader = parse_leader(&leader_bytes()).expect("parse leader");
        assert_eq!(leader.width, 640);
        assert_eq!(leader.height, 480);
        assert_eq!(leader.timestamp, 12345);
    }

    #[test]
    fn rejects_short_or_mismatched_leader() {
        assert_eq!(parse_leader(&[0u8; 4]), Err(FrameError::LeaderTooShort(4)));
        let mut bad = leader_bytes();
        bad[0] = 0;
        assert!(matches!(parse_leader(&bad), Err(FrameError::NotALeader(_))));
    }

    #[test]
    fn assembles_frame_from_leader_payload_trailer() {
        let mut assembler = FrameAssembler::new();
        assert_eq!(assembler.feed(&leader_bytes()), FrameOutcome::Filling);

        let payload = vec![0xABu8; 1024 * 1024];
        for chunk in payload.chunks(128 * 1024) {
            assert_eq!(assembler.feed(chunk), FrameOutcome::Filling);
        }

        match assembler.feed(&trailer_bytes(payload.len() as u64)) {
            FrameOutcome::Complete { leader, data } => {
                assert_eq!(leader.width, 640);
                assert_eq!(data, payload);
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn trailer_size_mismatch_aborts_frame() {
        let mut assembler = FrameAssembler::new();
        assembler.feed(&leader_bytes());
        assembler.feed(&[0u8; 16]);
        match assembler.feed(&trailer_bytes(999)) {
            FrameOutcome::Aborted(FrameError::SizeMismatch { declared, received }) => {
                assert_eq!(declared, 999);
                assert_eq!(received, 16);
            }
            other => panic!("expected SizeMismatch abort, got {other:?}"),
        }
    }
}
