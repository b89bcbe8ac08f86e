//! USB3 Vision stream: a ring of always-resubmitted bulk transfers feeding
//! [`crate::frame::FrameAssembler`].

use std::time::Duration;

use crate::frame::{FrameAssembler, FrameOutcome, LeaderInfo};

/// Default number of concurrently submitted bulk transfers.
pub const DEFAULT_N_SUBMITS: usize = 8;
/// Default size of each submitted bulk transfer (bytes).
pub const DEFAULT_MAX_TRANSFER_SIZE: usize = 1 << 20;

/// USB transfer submission strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbMode {
    /// Issue one transfer at a time; diagnostic use only.
    Sync,
    /// Keep the full ring of `N_submits` transfers always in flight.
    Async,
}

impl Default for UsbMode {
    fn default() -> Self {
        UsbMode::Async
    }
}

/// Configuration for the stream submission pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub mode: UsbMode,
    pub n_submits: usize,
    pub max_transfer_size: usize,
    /// Timeout applied to each bulk transfer.
    pub transfer_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            mode: UsbMode::default(),
            n_submits: DEFAULT_N_SUBMITS,
            max_transfer_size: DEFAULT_MAX_TRANSFER_SIZE,
            transfer_timeout: Duration::from_secs(1),
        }
    }
}

/// A completed stream buffer, produced once a leader/payload/trailer
/// sequence has been fully assembled.
#[derive(Debug, Clone)]
pub struct StreamFrame {
    pub leader: LeaderInfo,
    pub data: Vec<u8>,
}

/// Drives bulk-transfer chunks through a [`FrameAssembler`], yielding
/// completed frames and dropping aborted ones. Transport-agnostic: the
/// actual bulk transfer submission lives in [`UsbStreamEndpoint`] (feature
/// `usb`/`async`), this type only owns the reassembly logic so it can be
/// exercised without a real device.
#[derive(Debug, Default)]
pub struct StreamReassembler {
    assembler: FrameAssembler,
    aborted: u64,
    completed: u64,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one bulk-transfer chunk, returning a completed frame if this
    /// chunk was the trailer that closed one out.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<StreamFrame> {
        match self.assembler.feed(chunk) {
            FrameOutcome::Filling => None,
            FrameOutcome::Complete { leader, data } => {
                self.completed += 1;
                Some(StreamFrame { leader, data })
            }
            FrameOutcome::Aborted(err) => {
                self.aborted += 1;
                tracing::debug!(error = %err, "u3v frame aborted");
                None
            }
        }
    }

    /// Number of frames completed so far.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Number of frames aborted by a framing error so far.
    pub fn aborted(&self) -> u64 {
        self.aborted
    }
}

#[cfg(all(feature = "usb", feature = "async"))]
pub use usb_pipeline::U3vStream;

#[cfg(all(feature = "usb", feature = "async"))]
mod usb_pipeline {
    use super::{StreamConfig, StreamFrame, StreamReassembler};
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex};
    use tokio::task::JoinHandle;
    use tracing::{trace, warn};

    /// Ring of `N_submits` always-resubmitted bulk transfers on the stream
    /// endpoint, feeding completed frames to an output channel.
    pub struct U3vStream {
        workers: Vec<JoinHandle<()>>,
        output: mpsc::Receiver<StreamFrame>,
    }

    impl U3vStream {
        /// Start the submission ring against the given stream bulk-in
        /// endpoint. Each of `config.n_submits` workers performs
        /// always-resubmitted blocking reads via `spawn_blocking`, feeding a
        /// shared [`StreamReassembler`] under mutual exclusion.
        pub fn start(
            handle: rusb::DeviceHandle<rusb::GlobalContext>,
            stream_in_ep: u8,
            config: StreamConfig,
        ) -> Self {
            let handle = Arc::new(handle);
            let reassembler = Arc::new(Mutex::new(StreamReassembler::new()));
            let (tx, rx) = mpsc::channel(config.n_submits.max(1) * 2);

            let worker_count = match config.mode {
                super::UsbMode::Sync => 1,
                super::UsbMode::Async => config.n_submits.max(1),
            };

            let mut workers = Vec::with_capacity(worker_count);
            for worker_id in 0..worker_count {
                let handle = Arc::clone(&handle);
                let reassembler = Arc::clone(&reassembler);
                let tx = tx.clone();
                let max_transfer_size = config.max_transfer_size;
                let timeout = config.transfer_timeout;
                workers.push(tokio::task::spawn_blocking(move || loop {
                    let mut buf = vec![0u8; max_transfer_size];
                    match handle.read_bulk(stream_in_ep, &mut buf, timeout) {
                        Ok(len) => {
                            buf.truncate(len);
                            let frame = {
                                let mut guard = reassembler.blocking_lock();
                                guard.feed(&buf)
                            };
                            if let Some(frame) = frame {
                                if tx.blocking_send(frame).is_err() {
                                    break;
                                }
                            }
                        }
                        Err(rusb::Error::Timeout) => {
                            trace!(worker_id, "stream transfer timed out, resubmitting");
                        }
                        Err(err) => {
                            warn!(worker_id, error = %err, "stream transfer failed, resubmitting");
                        }
                    }
                }));
            }

            Self {
                workers,
                output: rx,
            }
        }

        /// Receive the next completed frame, awaiting until one arrives or
        /// every submission worker has stopped.
        pub async fn recv(&mut self) -> Option<StreamFrame> {
            self.output.recv().await
        }
    }

    impl Drop for U3vStream {
        fn drop(&mut self) {
            for worker in self.workers.drain(..) {
                worker.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{LEADER_MAGIC, TRAILER_MAGIC};

    fn leader_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&LEADER_MAGIC.to_le_bytes());
        buf.extend_from_slice(&17u32.to_le_bytes());
        buf.extend_from_slice(&width.to_le_bytes());
        buf.extend_from_slice(&height.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf
    }

    fn trailer_bytes(payload_size: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&TRAILER_MAGIC.to_le_bytes());
        buf.extend_from_slice(&payload_size.to_le_bytes());
        buf
    }

    #[test]
    fn reassembler_yields_one_frame_per_leader_trailer_pair() {
        let mut reassembler = StreamReassembler::new();
        assert!(reassembler.feed(&leader_bytes(640, 480)).is_none());

        let payload = vec![0x11u8; 8 * (1 << 20)];
        for chunk in payload.chunks(1 << 20) {
            assert!(reassembler.feed(chunk).is_none());
        }

        let frame = reassembler
            .feed(&trailer_bytes(payload.len() as u64))
            .expect("frame completes on trailer");
        assert_eq!(frame.leader.width, 640);
        assert_eq!(frame.leader.height, 480);
        assert_eq!(frame.data.len(), payload.len());
        assert_eq!(reassembler.completed(), 1);
        assert_eq!(reassembler.aborted(), 0);
    }

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = StreamConfig::default();
        assert_eq!(cfg.mode, UsbMode::Async);
        assert_eq!(cfg.n_submits, DEFAULT_N_SUBMITS);
        assert_eq!(cfg.max_transfer_size, DEFAULT_MAX_TRANSFER_SIZE);
    }
}
