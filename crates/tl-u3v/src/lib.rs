#![cfg_attr(docsrs, feature(doc_cfg))]
//! USB3 Vision transport layer: control channel framing over a bulk
//! endpoint (mirrors `tl_gige::gvcp`'s retry/timeout state machine) and a
//! stream submission ring detecting leader/payload/trailer framing within
//! the raw byte stream delivered by the stream bulk endpoint.
//!
//! The wire codecs and frame reassembly logic always compile; the device
//! handles that actually talk to `libusb` (`U3vControl`, `U3vStream`)
//! require the `usb` (and, for streaming, additionally `async`) Cargo
//! features so a pure-GigE build never pulls in libusb.

pub mod control;
pub mod discovery;
pub mod frame;
pub mod stream;

pub use control::{AckHeader, CommandHeader, U3vAck, U3vCmd, U3vError, U3vFlags};
pub use discovery::DeviceInfo;
pub use frame::{FrameAssembler, FrameError, FrameOutcome, LeaderInfo, TrailerInfo};
pub use stream::{StreamConfig, StreamFrame, StreamReassembler, UsbMode};

#[cfg(feature = "usb")]
pub use control::U3vControl;

#[cfg(feature = "usb")]
pub use discovery::discover;

#[cfg(all(feature = "usb", feature = "async"))]
pub use stream::U3vStream;
