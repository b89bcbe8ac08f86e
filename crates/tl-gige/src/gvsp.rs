//! GVSP packet parsing and frame reassembly.
//!
//! A GVSP packet begins with a 16-bit status, a block id (16-bit, or 64-bit
//! for the extended packet formats), an 8-bit packet format, and a packet id
//! (24-bit, or 32-bit extended). [`Reassembler`] consumes packets in any
//! order and reconstructs frames following the `Empty -> Filling ->
//! Resending -> Complete/Aborted` state machine.

use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes};
use thiserror::Error;

use crate::nic::Iface;

/// Wire-level constants for the GVSP packet format byte and default
/// reassembly timings.
pub mod consts {
    use std::time::Duration;

    pub const LEADER: u8 = 0x01;
    pub const TRAILER: u8 = 0x02;
    pub const PAYLOAD: u8 = 0x03;
    pub const LEADER_EXT: u8 = 0x81;
    pub const TRAILER_EXT: u8 = 0x82;
    pub const PAYLOAD_EXT: u8 = 0x83;
    /// Flag bit marking a packet_format as using the 64-bit extended header.
    pub const EXTENDED_FLAG: u8 = 0x80;

    /// Default fraction of a frame's packet count that must still be
    /// outstanding before a resend is requested.
    pub const DEFAULT_PACKET_REQUEST_RATIO: f32 = 0.25;
    /// Default delay after the last received packet before a gap triggers a
    /// resend request.
    pub const DEFAULT_RESEND_DELAY: Duration = Duration::from_millis(20);
    /// Default time since the first packet of a frame after which it is
    /// abandoned regardless of completeness.
    pub const DEFAULT_FRAME_RETENTION: Duration = Duration::from_millis(100);
    /// Default number of frames kept in flight simultaneously.
    pub const DEFAULT_WINDOW: usize = 2;
}

/// Errors raised while handling GVSP packets.
#[derive(Debug, Error)]
pub enum GvspError {
    #[error("unsupported packet type: {0}")]
    Unsupported(&'static str),
    #[error("invalid packet: {0}")]
    Invalid(&'static str),
}

/// Decoded GVSP packet header, covering both the standard and extended
/// (64-bit block id / 32-bit packet id) layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub status: u16,
    pub block_id: u64,
    pub packet_format: u8,
    pub packet_id: u32,
    pub extended: bool,
}

/// Packet role carried by [`PacketHeader::packet_format`], independent of
/// standard/extended framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Leader,
    Trailer,
    Payload,
    Unknown(u8),
}

impl PacketHeader {
    /// Parse a GVSP header from the front of `buf`, returning the header and
    /// the number of bytes consumed.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), GvspError> {
        if buf.len() < 8 {
            return Err(GvspError::Invalid("packet shorter than GVSP header"));
        }
        let status = u16::from_be_bytes([buf[0], buf[1]]);
        let block_id16 = u16::from_be_bytes([buf[2], buf[3]]);
        let packet_format = buf[4];
        let packet_id24 = (u32::from(buf[5]) << 16) | (u32::from(buf[6]) << 8) | u32::from(buf[7]);
        if packet_format & consts::EXTENDED_FLAG == 0 {
            return Ok((
                Self {
                    status,
                    block_id: u64::from(block_id16),
                    packet_format,
                    packet_id: packet_id24,
                    extended: false,
                },
                8,
            ));
        }
        // Extended header: status(2) reserved(2) packet_format(1) reserved(3)
        // block_id(8) reserved(4) packet_id(4).
        if buf.len() < 24 {
            return Err(GvspError::Invalid(
                "extended packet shorter than GVSP extended header",
            ));
        }
        let block_id = u64::from_be_bytes(buf[8..16].try_into().unwrap());
        let packet_id = u32::from_be_bytes(buf[20..24].try_into().unwrap());
        Ok((
            Self {
                status,
                block_id,
                packet_format,
                packet_id,
                extended: true,
            },
            24,
        ))
    }

    pub fn kind(&self) -> PacketKind {
        match self.packet_format & !consts::EXTENDED_FLAG {
            consts::LEADER => PacketKind::Leader,
            consts::TRAILER => PacketKind::Trailer,
            consts::PAYLOAD => PacketKind::Payload,
            other => PacketKind::Unknown(other),
        }
    }
}

/// Metadata carried by a GVSP leader packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeaderInfo {
    pub payload_type: u16,
    pub timestamp: u64,
    pub pixel_format: u32,
    pub width: u32,
    pub height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
}

/// A single parsed GVSP packet (header already stripped of its framing).
#[derive(Debug, Clone)]
pub enum GvspPacket {
    Leader {
        block_id: u64,
        packet_id: u32,
        info: LeaderInfo,
    },
    Payload {
        block_id: u64,
        packet_id: u32,
        data: Bytes,
    },
    Trailer {
        block_id: u64,
        packet_id: u32,
        status: u16,
        payload_size: u64,
    },
}

fn parse_leader_body(mut body: Bytes) -> Result<LeaderInfo, GvspError> {
    if body.remaining() < 32 {
        return Err(GvspError::Invalid("leader body too short"));
    }
    let _reserved = body.get_u16();
    let payload_type = body.get_u16();
    let timestamp = body.get_u64();
    let pixel_format = body.get_u32();
    let width = body.get_u32();
    let height = body.get_u32();
    let x_offset = body.get_u32();
    let y_offset = body.get_u32();
    Ok(LeaderInfo {
        payload_type,
        timestamp,
        pixel_format,
        width,
        height,
        x_offset,
        y_offset,
    })
}

fn parse_trailer_body(mut body: Bytes) -> Result<u64, GvspError> {
    if body.remaining() < 12 {
        return Err(GvspError::Invalid("trailer body too short"));
    }
    let _reserved = body.get_u16();
    let _payload_type = body.get_u16();
    let payload_size = body.get_u64();
    Ok(payload_size)
}

/// Parse a raw UDP payload into a GVSP packet.
pub fn parse_packet(payload: &[u8]) -> Result<GvspPacket, GvspError> {
    let (header, consumed) = PacketHeader::parse(payload)?;
    let body = Bytes::copy_from_slice(&payload[consumed..]);
    match header.kind() {
        PacketKind::Leader => Ok(GvspPacket::Leader {
            block_id: header.block_id,
            packet_id: header.packet_id,
            info: parse_leader_body(body)?,
        }),
        PacketKind::Trailer => Ok(GvspPacket::Trailer {
            block_id: header.block_id,
            packet_id: header.packet_id,
            status: header.status,
            payload_size: parse_trailer_body(body)?,
        }),
        PacketKind::Payload => Ok(GvspPacket::Payload {
            block_id: header.block_id,
            packet_id: header.packet_id,
            data: body,
        }),
        PacketKind::Unknown(_) => Err(GvspError::Unsupported("unknown GVSP packet format")),
    }
}

/// A single chunk TLV entry appended after the GVSP trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRaw {
    pub id: u16,
    pub data: Bytes,
}

/// Parse a sequence of `id: u16 BE, reserved: u16 BE, length: u32 BE, data`
/// chunk entries.
pub fn parse_chunks(data: &[u8]) -> Result<Vec<ChunkRaw>, GvspError> {
    let mut buf = Bytes::copy_from_slice(data);
    let mut out = Vec::new();
    while buf.has_remaining() {
        if buf.remaining() < 8 {
            return Err(GvspError::Invalid("truncated chunk TLV header"));
        }
        let id = buf.get_u16();
        let _reserved = buf.get_u16();
        let length = buf.get_u32() as usize;
        if buf.remaining() < length {
            return Err(GvspError::Invalid("chunk TLV length exceeds buffer"));
        }
        let chunk_data = buf.copy_to_bytes(length);
        out.push(ChunkRaw { id, data: chunk_data });
    }
    Ok(out)
}

/// Destination a GVSP stream is configured to deliver packets to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDest {
    Unicast {
        dst_ip: Ipv4Addr,
        dst_port: u16,
    },
    Multicast {
        group: Ipv4Addr,
        port: u16,
        loopback: bool,
        ttl: u32,
    },
}

impl StreamDest {
    pub fn addr(&self) -> Ipv4Addr {
        match self {
            StreamDest::Unicast { dst_ip, .. } => *dst_ip,
            StreamDest::Multicast { group, .. } => *group,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            StreamDest::Unicast { dst_port, .. } => *dst_port,
            StreamDest::Multicast { port, .. } => *port,
        }
    }

    pub fn is_multicast(&self) -> bool {
        matches!(self, StreamDest::Multicast { .. })
    }
}

/// Negotiated stream configuration, echoed back to callers for diagnostics.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub dest: StreamDest,
    pub iface: Iface,
    pub packet_size: Option<u32>,
    pub packet_delay: Option<u32>,
    pub source_filter: Option<Ipv4Addr>,
    pub resend_enabled: bool,
}

/// Resend request for one or more contiguous missing-packet ranges within a
/// single frame, inclusive of both ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResendRequest {
    pub block_id: u64,
    pub ranges: Vec<(u32, u32)>,
}

/// Outcome recorded against a frame once it leaves the reassembly window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Success,
    MissingPackets,
    Aborted,
}

/// A fully- or partially-reassembled frame removed from the reassembly
/// window, in ascending packet id order.
#[derive(Debug, Clone)]
pub struct CompletedFrame {
    pub block_id: u64,
    pub outcome: FrameOutcome,
    pub leader: Option<LeaderInfo>,
    pub payload: Bytes,
    /// Bytes appended by the trailer beyond the declared image payload size,
    /// i.e. the raw chunk TLV stream (see [`parse_chunks`]).
    pub chunk_bytes: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Empty,
    Filling,
    Resending,
}

struct PendingFrame {
    state: FrameState,
    leader: Option<LeaderInfo>,
    last_payload_id: Option<u32>,
    trailer_payload_size: Option<u64>,
    payloads: BTreeMap<u32, Bytes>,
    first_seen: Instant,
    last_activity: Instant,
    requested_ranges: HashSet<(u32, u32)>,
    missed_twice: bool,
}

impl PendingFrame {
    fn new(now: Instant) -> Self {
        Self {
            state: FrameState::Empty,
            leader: None,
            last_payload_id: None,
            trailer_payload_size: None,
            payloads: BTreeMap::new(),
            first_seen: now,
            last_activity: now,
            requested_ranges: HashSet::new(),
            missed_twice: false,
        }
    }

    fn touch(&mut self, now: Instant) {
        self.last_activity = now;
        if self.state == FrameState::Empty {
            self.state = FrameState::Filling;
        }
    }

    fn is_complete(&self) -> bool {
        match self.last_payload_id {
            Some(last) => self.leader.is_some() && self.payloads.len() as u32 == last,
            None => false,
        }
    }

    fn missing_ranges(&self) -> Vec<(u32, u32)> {
        let Some(last) = self.last_payload_id else {
            return Vec::new();
        };
        let mut ranges = Vec::new();
        let mut run_start: Option<u32> = None;
        for id in 1..=last {
            if self.payloads.contains_key(&id) {
                if let Some(start) = run_start.take() {
                    ranges.push((start, id - 1));
                }
            } else if run_start.is_none() {
                run_start = Some(id);
            }
        }
        if let Some(start) = run_start {
            ranges.push((start, last));
        }
        ranges
    }

    fn into_completed(self, block_id: u64, outcome: FrameOutcome) -> CompletedFrame {
        let expected_image_len = self.trailer_payload_size.unwrap_or(u64::MAX);
        let mut payload = Vec::new();
        let mut chunk_bytes = Vec::new();
        for (_, bytes) in self.payloads {
            if (payload.len() as u64) < expected_image_len {
                let room = (expected_image_len - payload.len() as u64) as usize;
                if bytes.len() <= room {
                    payload.extend_from_slice(&bytes);
                } else {
                    payload.extend_from_slice(&bytes[..room]);
                    chunk_bytes.extend_from_slice(&bytes[room..]);
                }
            } else {
                chunk_bytes.extend_from_slice(&bytes);
            }
        }
        CompletedFrame {
            block_id,
            outcome,
            leader: self.leader,
            payload: Bytes::from(payload),
            chunk_bytes: Bytes::from(chunk_bytes),
        }
    }
}

/// Tunable parameters of the reassembly engine: resend ratio, resend delay,
/// frame retention, and in-flight window size.
#[derive(Debug, Clone, Copy)]
pub struct ReassemblyConfig {
    /// Fraction of a frame's known packet count that must still be missing
    /// before a resend is requested. `0.0` disables resends entirely.
    pub packet_request_ratio: f32,
    pub resend_delay: Duration,
    pub frame_retention: Duration,
    pub window: usize,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            packet_request_ratio: consts::DEFAULT_PACKET_REQUEST_RATIO,
            resend_delay: consts::DEFAULT_RESEND_DELAY,
            frame_retention: consts::DEFAULT_FRAME_RETENTION,
            window: consts::DEFAULT_WINDOW,
        }
    }
}

/// GVSP frame reassembly engine. Accepts packets in arbitrary order (within
/// the configured window) and emits [`CompletedFrame`]s plus
/// [`ResendRequest`]s for the caller to transmit as `PACKETRESEND_CMD`.
pub struct Reassembler {
    cfg: ReassemblyConfig,
    frames: BTreeMap<u64, PendingFrame>,
    head: Option<u64>,
}

impl Reassembler {
    pub fn new(cfg: ReassemblyConfig) -> Self {
        Self {
            cfg,
            frames: BTreeMap::new(),
            head: None,
        }
    }

    /// Feed one raw GVSP datagram into the engine. Returns any frames that
    /// completed or were retired as a result.
    pub fn ingest(&mut self, now: Instant, raw: &[u8]) -> Result<Vec<CompletedFrame>, GvspError> {
        let packet = parse_packet(raw)?;
        let block_id = match &packet {
            GvspPacket::Leader { block_id, .. }
            | GvspPacket::Payload { block_id, .. }
            | GvspPacket::Trailer { block_id, .. } => *block_id,
        };

        if self.head.is_none() {
            self.head = Some(block_id);
        }

        let frame = self
            .frames
            .entry(block_id)
            .or_insert_with(|| PendingFrame::new(now));
        frame.touch(now);

        match packet {
            GvspPacket::Leader { info, .. } => frame.leader = Some(info),
            GvspPacket::Trailer {
                packet_id,
                payload_size,
                ..
            } => {
                frame.last_payload_id = Some(packet_id.saturating_sub(1));
                frame.trailer_payload_size = Some(payload_size);
            }
            GvspPacket::Payload {
                packet_id, data, ..
            } => {
                frame.payloads.insert(packet_id, data);
            }
        }

        Ok(self.drain(now))
    }

    /// Compute resend requests for frames whose gaps have persisted past
    /// `resend_delay`. Each contiguous gap is requested at most once; a
    /// second miss of the same range marks the frame `MissingPackets` once
    /// it is retired.
    pub fn pending_resends(&mut self, now: Instant) -> Vec<ResendRequest> {
        if self.cfg.packet_request_ratio <= 0.0 {
            return Vec::new();
        }
        let mut out = Vec::new();
        for (&block_id, frame) in self.frames.iter_mut() {
            let Some(last) = frame.last_payload_id else {
                continue;
            };
            if frame.state == FrameState::Empty {
                continue;
            }
            if now.duration_since(frame.last_activity) < self.cfg.resend_delay {
                continue;
            }
            let missing = (last as usize).saturating_sub(frame.payloads.len());
            if missing == 0 {
                continue;
            }
            let threshold = (last as f32 * self.cfg.packet_request_ratio).ceil() as usize;
            if missing < threshold.max(1) {
                continue;
            }
            let ranges = frame.missing_ranges();
            let fresh: Vec<(u32, u32)> = ranges
                .into_iter()
                .filter(|range| !frame.requested_ranges.contains(range))
                .collect();
            if fresh.is_empty() {
                if !frame.requested_ranges.is_empty() {
                    frame.missed_twice = true;
                }
                continue;
            }
            for range in &fresh {
                frame.requested_ranges.insert(*range);
            }
            frame.state = FrameState::Resending;
            out.push(ResendRequest {
                block_id,
                ranges: fresh,
            });
        }
        out
    }

    /// Retire frames that exceeded `frame_retention` without completing.
    pub fn expire(&mut self, now: Instant) -> Vec<CompletedFrame> {
        self.drain(now)
    }

    fn drain(&mut self, now: Instant) -> Vec<CompletedFrame> {
        let mut finished = Vec::new();
        let mut done_ids = Vec::new();
        for (&block_id, frame) in self.frames.iter() {
            if frame.is_complete() {
                done_ids.push((block_id, FrameOutcome::Success));
            } else if now.duration_since(frame.first_seen) >= self.cfg.frame_retention {
                let outcome = if frame.missed_twice {
                    FrameOutcome::MissingPackets
                } else {
                    FrameOutcome::Aborted
                };
                done_ids.push((block_id, outcome));
            }
        }
        for (block_id, outcome) in done_ids {
            if let Some(frame) = self.frames.remove(&block_id) {
                finished.push(frame.into_completed(block_id, outcome));
            }
        }
        while self.frames.len() > self.cfg.window.max(1) {
            let Some(&oldest) = self.frames.keys().next() else {
                break;
            };
            if let Some(frame) = self.frames.remove(&oldest) {
                finished.push(frame.into_completed(oldest, FrameOutcome::Aborted));
            }
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leader_packet(block_id: u16) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&block_id.to_be_bytes());
        buf.push(consts::LEADER);
        buf.extend_from_slice(&[0, 0, 0]); // packet_id = 0
        buf.extend_from_slice(&0u16.to_be_bytes()); // reserved
        buf.extend_from_slice(&0u16.to_be_bytes()); // payload_type
        buf.extend_from_slice(&0u64.to_be_bytes()); // timestamp
        buf.extend_from_slice(&0x0101_0001u32.to_be_bytes()); // pixel format (Mono8)
        buf.extend_from_slice(&1400u32.to_be_bytes()); // width
        buf.extend_from_slice(&100u32.to_be_bytes()); // height
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf
    }

    fn payload_packet(block_id: u16, packet_id: u32, data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&block_id.to_be_bytes());
        buf.push(consts::PAYLOAD);
        buf.extend_from_slice(&packet_id.to_be_bytes()[1..]);
        buf.extend_from_slice(data);
        buf
    }

    fn trailer_packet(block_id: u16, packet_id: u32, payload_size: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&block_id.to_be_bytes());
        buf.push(consts::TRAILER);
        buf.extend_from_slice(&packet_id.to_be_bytes()[1..]);
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&payload_size.to_be_bytes());
        buf
    }

    #[test]
    fn reassembles_in_order_frame() {
        let cfg = ReassemblyConfig::default();
        let mut engine = Reassembler::new(cfg);
        let now = Instant::now();
        let mut completed = Vec::new();
        completed.extend(engine.ingest(now, &leader_packet(7)).unwrap());
        for id in 1..=100u32 {
            let data = vec![id as u8; 1400];
            completed.extend(engine.ingest(now, &payload_packet(7, id, &data)).unwrap());
        }
        completed.extend(
            engine
                .ingest(now, &trailer_packet(7, 101, 140_000))
                .unwrap(),
        );
        assert_eq!(completed.len(), 1);
        let frame = &completed[0];
        assert_eq!(frame.block_id, 7);
        assert_eq!(frame.outcome, FrameOutcome::Success);
        assert_eq!(frame.payload.len(), 140_000);
    }

    #[test]
    fn reassembles_permuted_frame() {
        let cfg = ReassemblyConfig::default();
        let mut engine = Reassembler::new(cfg);
        let now = Instant::now();
        let mut packets = vec![trailer_packet(7, 101, 200)];
        for id in (1..=100u32).rev() {
            packets.push(payload_packet(7, id, &[id as u8, id as u8]));
        }
        packets.push(leader_packet(7));

        let mut completed = Vec::new();
        for packet in packets {
            completed.extend(engine.ingest(now, &packet).unwrap());
        }
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].outcome, FrameOutcome::Success);
        assert_eq!(completed[0].payload.len(), 200);
        for (idx, byte) in completed[0].payload.chunks(2).enumerate() {
            assert_eq!(byte, &[(idx + 1) as u8, (idx + 1) as u8]);
        }
    }

    #[test]
    fn requests_resend_for_gap_past_threshold() {
        let cfg = ReassemblyConfig {
            resend_delay: Duration::from_millis(0),
            ..ReassemblyConfig::default()
        };
        let mut engine = Reassembler::new(cfg);
        let now = Instant::now();
        engine.ingest(now, &leader_packet(3)).unwrap();
        engine.ingest(now, &trailer_packet(3, 11, 1000)).unwrap();
        for id in [1u32, 2, 3, 8, 9, 10] {
            engine
                .ingest(now, &payload_packet(3, id, &[0u8; 100]))
                .unwrap();
        }
        let resends = engine.pending_resends(now + Duration::from_millis(1));
        assert_eq!(resends.len(), 1);
        assert_eq!(resends[0].block_id, 3);
        assert_eq!(resends[0].ranges, vec![(4, 7)]);
    }

    #[test]
    fn zero_ratio_disables_resend() {
        let cfg = ReassemblyConfig {
            packet_request_ratio: 0.0,
            resend_delay: Duration::from_millis(0),
            ..ReassemblyConfig::default()
        };
        let mut engine = Reassembler::new(cfg);
        let now = Instant::now();
        engine.ingest(now, &leader_packet(3)).unwrap();
        engine.ingest(now, &trailer_packet(3, 11, 1000)).unwrap();
        engine
            .ingest(now, &payload_packet(3, 1, &[0u8; 100]))
            .unwrap();
        assert!(engine
            .pending_resends(now + Duration::from_millis(50))
            .is_empty());
    }

    #[test]
    fn aborts_frame_past_retention() {
        let cfg = ReassemblyConfig {
            frame_retention: Duration::from_millis(10),
            ..ReassemblyConfig::default()
        };
        let mut engine = Reassembler::new(cfg);
        let now = Instant::now();
        engine.ingest(now, &leader_packet(9)).unwrap();
        engine
            .ingest(now, &payload_packet(9, 1, &[1u8; 10]))
            .unwrap();
        let expired = engine.expire(now + Duration::from_millis(11));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].outcome, FrameOutcome::Aborted);
    }

    #[test]
    fn chunk_tlv_round_trips() {
        let mut data = Vec::new();
        data.extend_from_slice(&7u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&4u32.to_be_bytes());
        data.extend_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
        let chunks = parse_chunks(&data).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, 7);
        assert_eq!(chunks[0].data.len(), 4);
    }

    #[test]
    fn rejects_unknown_packet_format() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.push(0x7F);
        buf.extend_from_slice(&[0, 0, 0]);
        let err = parse_packet(&buf).unwrap_err();
        assert!(matches!(err, GvspError::Unsupported(_)));
    }
}
