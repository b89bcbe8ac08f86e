#![cfg_attr(docsrs, feature(doc_cfg))]
//! `genicam-rs`: workspace aggregator.
//!
//! Downstream consumers that want the whole stack (GenApi nodemap,
//! transports, naming tables) without wiring up `genicam`, `tl-gige`,
//! `genapi-core` and friends individually can depend on this crate alone.
//! Everything here is a re-export; the actual implementations live in the
//! workspace members under `crates/`.

pub use genapi_core as genapi;
pub use genicam;
pub use genicam::gige;
pub use genicam::{Camera, GenicamError, InterfaceRegistry};
pub use sfnc;
pub use tl_gige;

/// Install a `tracing_subscriber` formatter reading `RUST_LOG`, the same
/// call every bundled example makes before discovering or opening a camera.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}
