//! USB3 Vision control channel: request/acknowledgement framing over a bulk
//! endpoint, mirroring GVCP's retry/timeout state machine (`tl_gige::gvcp`)
//! but little-endian and magic-prefixed instead of UDP/big-endian.

#[cfg(feature = "usb")]
use std::time::Duration;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use genicp::{GenCpError, OpCode, StatusCode};
use thiserror::Error;
#[cfg(feature = "usb")]
use tracing::{debug, trace, warn};

/// U3V control protocol constants.
pub mod consts {
    use std::time::Duration;

    /// Magic prefix of a control command packet.
    pub const MAGIC_CMD: u32 = 0x4356_3355;
    /// Magic prefix of a control acknowledgement packet.
    pub const MAGIC_ACK: u32 = 0x4356_3341;

    /// Size of the wire header (magic + flags + command + length + request id).
    pub const HEADER_SIZE: usize = 12;

    /// Maximum number of bytes requested per `ReadMem` transaction.
    pub const GENCP_MAX_BLOCK: usize = 512;
    /// Additional bytes that accompany a `WriteMem` block.
    pub const GENCP_WRITE_OVERHEAD: usize = 8;

    /// Default timeout for a control transaction (mirrors GVCP's T_ack).
    pub const CONTROL_TIMEOUT: Duration = Duration::from_millis(1000);
    /// Maximum number of automatic retries for a control transaction.
    pub const MAX_RETRIES: usize = 6;
    /// Base delay used for retry backoff.
    pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(20);
    /// Upper bound for the random jitter added to the retry delay (inclusive).
    pub const RETRY_JITTER: Duration = Duration::from_millis(10);
}

bitflags! {
    /// Flags carried by a U3V control command. Bit positions are specific to
    /// U3V and distinct from `genicp::CommandFlags`' GVCP bit layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct U3vFlags: u16 {
        /// Request an acknowledgement for this command (bit 14).
        const ACK_REQUIRED = 0x4000;
    }
}

/// U3V control command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub flags: U3vFlags,
    pub opcode: OpCode,
    pub length: u16,
    pub request_id: u16,
}

/// U3V control acknowledgement header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckHeader {
    pub status: StatusCode,
    pub opcode: OpCode,
    pub length: u16,
    pub request_id: u16,
}

/// A framed U3V control command.
#[derive(Debug, Clone)]
pub struct U3vCmd {
    pub header: CommandHeader,
    pub payload: Bytes,
}

/// A framed U3V control acknowledgement.
#[derive(Debug, Clone)]
pub struct U3vAck {
    pub header: AckHeader,
    pub payload: Bytes,
}

/// Encode a control command into its little-endian, magic-prefixed wire form.
pub fn encode_cmd(cmd: &U3vCmd) -> Bytes {
    debug_assert_eq!(cmd.header.length as usize, cmd.payload.len());
    let mut buf = BytesMut::with_capacity(consts::HEADER_SIZE + cmd.payload.len());
    buf.put_u32_le(consts::MAGIC_CMD);
    buf.put_u16_le(cmd.header.flags.bits());
    buf.put_u16_le(cmd.header.opcode.command_code());
    buf.put_u16_le(cmd.header.length);
    buf.put_u16_le(cmd.header.request_id);
    buf.extend_from_slice(&cmd.payload);
    buf.freeze()
}

/// Decode a control acknowledgement from its wire form.
pub fn decode_ack(buf: &[u8]) -> Result<U3vAck, U3vError> {
    if buf.len() < consts::HEADER_SIZE {
        return Err(GenCpError::InvalidPacket("too short").into());
    }
    let mut cursor = buf;
    let magic = cursor.get_u32_le();
    if magic != consts::MAGIC_ACK {
        return Err(U3vError::Protocol(format!(
            "expected ack magic {:#010x}, got {magic:#010x}",
            consts::MAGIC_ACK
        )));
    }
    let status_raw = cursor.get_u16_le();
    let opcode_raw = cursor.get_u16_le();
    let length = cursor.get_u16_le();
    let request_id = cursor.get_u16_le();

    let expected = consts::HEADER_SIZE + length as usize;
    if buf.len() != expected {
        return Err(GenCpError::InvalidPacket("length mismatch").into());
    }

    let opcode = opcode_from_ack_code(opcode_raw)?;
    let status = StatusCode::from_raw(status_raw);
    let payload = Bytes::copy_from_slice(&buf[consts::HEADER_SIZE..]);
    Ok(U3vAck {
        header: AckHeader {
            status,
            opcode,
            length,
            request_id,
        },
        payload,
    })
}

fn opcode_from_ack_code(code: u16) -> Result<OpCode, U3vError> {
    match code {
        0x0085 => Ok(OpCode::ReadMem),
        0x0087 => Ok(OpCode::WriteMem),
        other => Err(GenCpError::UnknownOpcode(other).into()),
    }
}

/// Errors that can occur while operating the U3V control channel.
#[derive(Debug, Error)]
pub enum U3vError {
    #[error("GenCP: {0}")]
    GenCp(#[from] GenCpError),
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("timeout waiting for acknowledgement")]
    Timeout,
    #[error("device reported status {0:?}")]
    Status(StatusCode),
    #[cfg(feature = "usb")]
    #[error("usb: {0}")]
    Usb(#[from] rusb::Error),
}

/// USB3 Vision control handle, built over a pair of bulk endpoints.
#[cfg(feature = "usb")]
pub struct U3vControl {
    handle: rusb::DeviceHandle<rusb::GlobalContext>,
    control_in_ep: u8,
    control_out_ep: u8,
    request_id: u16,
    rng: fastrand::Rng,
}

#[cfg(feature = "usb")]
impl U3vControl {
    /// Wrap an already-opened device handle, given the control in/out bulk
    /// endpoint addresses (read from the device's interface descriptor).
    pub fn new(
        handle: rusb::DeviceHandle<rusb::GlobalContext>,
        control_in_ep: u8,
        control_out_ep: u8,
    ) -> Self {
        Self {
            handle,
            control_in_ep,
            control_out_ep,
            request_id: 1,
            rng: fastrand::Rng::new(),
        }
    }

    fn next_request_id(&mut self) -> u16 {
        let id = self.request_id;
        self.request_id = self.request_id.wrapping_add(1);
        if self.request_id == 0 {
            self.request_id = 1;
        }
        id
    }

    fn transact_with_retry(&mut self, opcode: OpCode, payload: Bytes) -> Result<U3vAck, U3vError> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let request_id = self.next_request_id();
            let cmd = U3vCmd {
                header: CommandHeader {
                    flags: U3vFlags::ACK_REQUIRED,
                    opcode,
                    length: payload.len() as u16,
                    request_id,
                },
                payload: payload.clone(),
            };
            let encoded = encode_cmd(&cmd);
            trace!(request_id, opcode = ?opcode, bytes = encoded.len(), attempt, "sending U3V control command");

            let send_result = self.handle.write_bulk(
                self.control_out_ep,
                &encoded,
                consts::CONTROL_TIMEOUT,
            );
            if let Err(err) = send_result {
                if attempt >= consts::MAX_RETRIES {
                    return Err(err.into());
                }
                warn!(request_id, ?opcode, attempt, error = %err, "write failed, retrying");
                self.backoff(attempt);
                continue;
            }

            let mut buf = vec![0u8; consts::HEADER_SIZE + consts::GENCP_MAX_BLOCK + consts::GENCP_WRITE_OVERHEAD];
            match self
                .handle
                .read_bulk(self.control_in_ep, &mut buf, consts::CONTROL_TIMEOUT)
            {
                Ok(len) => {
                    let ack = decode_ack(&buf[..len])?;
                    if ack.header.request_id != request_id {
                        debug!(request_id, got = ack.header.request_id, attempt, "ack id mismatch");
                        if attempt >= consts::MAX_RETRIES {
                            return Err(U3vError::Protocol("acknowledgement id mismatch".into()));
                        }
                        self.backoff(attempt);
                        continue;
                    }
                    match ack.header.status {
                        StatusCode::Success => return Ok(ack),
                        StatusCode::DeviceBusy if attempt < consts::MAX_RETRIES => {
                            warn!(request_id, attempt, "device busy, retrying");
                            self.backoff(attempt);
                            continue;
                        }
                        other => return Err(U3vError::Status(other)),
                    }
                }
                Err(rusb::Error::Timeout) => {
                    if attempt >= consts::MAX_RETRIES {
                        return Err(U3vError::Timeout);
                    }
                    warn!(request_id, ?opcode, attempt, "command timeout, retrying");
                    self.backoff(attempt);
                }
                Err(err) => {
                    if attempt >= consts::MAX_RETRIES {
                        return Err(err.into());
                    }
                    warn!(request_id, ?opcode, attempt, error = %err, "receive error, retrying");
                    self.backoff(attempt);
                }
            }
        }
    }

    fn backoff(&mut self, attempt: usize) {
        let multiplier = 1u32 << (attempt.saturating_sub(1)).min(3);
        let base_ms = consts::RETRY_BASE_DELAY.as_millis() as u64;
        let base = Duration::from_millis(base_ms.saturating_mul(multiplier as u64).max(base_ms));
        let jitter_ms = self.rng.u64(..=consts::RETRY_JITTER.as_millis() as u64);
        let delay = base + Duration::from_millis(jitter_ms);
        debug!(attempt, delay = ?delay, "u3v control retry backoff");
        std::thread::sleep(delay);
    }

    /// Read a block of memory from the device, chunked and retried.
    pub fn read_mem(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, U3vError> {
        let mut remaining = len;
        let mut offset = 0usize;
        let mut data = Vec::with_capacity(len);
        while remaining > 0 {
            let chunk = remaining.min(consts::GENCP_MAX_BLOCK);
            let mut payload = BytesMut::with_capacity(12);
            payload.put_u64(addr + offset as u64);
            payload.put_u32(chunk as u32);
            let ack = self.transact_with_retry(OpCode::ReadMem, payload.freeze())?;
            if ack.payload.len() != chunk {
                return Err(U3vError::Protocol(format!(
                    "expected {chunk} bytes but device returned {}",
                    ack.payload.len()
                )));
            }
            data.extend_from_slice(&ack.payload);
            remaining -= chunk;
            offset += chunk;
        }
        Ok(data)
    }

    /// Write a block of memory to the device, chunked and retried.
    pub fn write_mem(&mut self, addr: u64, data: &[u8]) -> Result<(), U3vError> {
        let mut offset = 0usize;
        while offset < data.len() {
            let chunk =
                (data.len() - offset).min(consts::GENCP_MAX_BLOCK - consts::GENCP_WRITE_OVERHEAD);
            if chunk == 0 {
                return Err(U3vError::Protocol("write chunk size is zero".into()));
            }
            let mut payload = BytesMut::with_capacity(consts::GENCP_WRITE_OVERHEAD + chunk);
            payload.put_u64(addr + offset as u64);
            payload.extend_from_slice(&data[offset..offset + chunk]);
            let ack = self.transact_with_retry(OpCode::WriteMem, payload.freeze())?;
            if !ack.payload.is_empty() {
                return Err(U3vError::Protocol(
                    "write acknowledgement carried unexpected payload".into(),
                ));
            }
            offset += chunk;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_read_mem_roundtrip() {
        let mut payload = BytesMut::with_capacity(12);
        payload.put_u64(0x1000);
        payload.put_u32(64);
        let payload = payload.freeze();
        let cmd = U3vCmd {
            header: CommandHeader {
                flags: U3vFlags::ACK_REQUIRED,
                opcode: OpCode::ReadMem,
                length: payload.len() as u16,
                request_id: 7,
            },
            payload,
        };
        let encoded = encode_cmd(&cmd);
        assert_eq!(&encoded[0..4], &consts::MAGIC_CMD.to_le_bytes());
        assert_eq!(&encoded[4..6], &U3vFlags::ACK_REQUIRED.bits().to_le_bytes());
        assert_eq!(&encoded[6..8], &OpCode::ReadMem.command_code().to_le_bytes());
        assert_eq!(&encoded[8..10], &(cmd.payload.len() as u16).to_le_bytes());
        assert_eq!(&encoded[10..12], &7u16.to_le_bytes());
    }

    #[test]
    fn decode_rejects_wrong_magic() {
        let mut buf = BytesMut::with_capacity(consts::HEADER_SIZE);
        buf.put_u32_le(0xDEAD_BEEF);
        buf.put_u16_le(0);
        buf.put_u16_le(0x0085);
        buf.put_u16_le(0);
        buf.put_u16_le(1);
        assert!(matches!(decode_ack(&buf), Err(U3vError::Protocol(_))));
    }

    #[test]
    fn decode_read_mem_ack() {
        let payload = vec![0xAAu8; 4];
        let mut buf = BytesMut::with_capacity(consts::HEADER_SIZE + payload.len());
        buf.put_u32_le(consts::MAGIC_ACK);
        buf.put_u16_le(0x0000);
        buf.put_u16_le(0x0085);
        buf.put_u16_le(payload.len() as u16);
        buf.put_u16_le(0x4242);
        buf.extend_from_slice(&payload);
        let ack = decode_ack(&buf).expect("decode");
        assert_eq!(ack.header.status, StatusCode::Success);
        assert_eq!(ack.header.opcode, OpCode::ReadMem);
        assert_eq!(ack.header.request_id, 0x4242);
        assert_eq!(&ack.payload[..], &payload[..]);
    }
}
