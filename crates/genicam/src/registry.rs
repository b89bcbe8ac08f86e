//! Discovery cache for the transports this facade exposes.
//!
//! GV/U3V interface singletons are discovery caches, not ambient global
//! state: [`InterfaceRegistry`] is constructed explicitly and threaded into
//! whatever opens cameras. [`default`] offers a process-wide instance purely
//! as a convenience wrapper for callers that don't need more than one.

use std::sync::OnceLock;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::{gige, GenicamError};

#[cfg(feature = "usb")]
use crate::u3v;

/// Default timeout applied to a GigE Vision broadcast discovery round.
pub const DEFAULT_GIGE_TIMEOUT: Duration = Duration::from_millis(500);

/// Per-transport discovery caches, refreshed on demand.
#[derive(Debug)]
pub struct InterfaceRegistry {
    gige: Vec<gige::DeviceInfo>,
    #[cfg(feature = "usb")]
    u3v: Vec<u3v::DeviceInfo>,
    gige_timeout: Duration,
}

impl InterfaceRegistry {
    /// Build an empty registry. Call [`InterfaceRegistry::refresh`] to
    /// populate it before reading back any devices.
    pub fn new(gige_timeout: Duration) -> Self {
        Self {
            gige: Vec::new(),
            #[cfg(feature = "usb")]
            u3v: Vec::new(),
            gige_timeout,
        }
    }

    /// Re-run discovery on every compiled-in transport, replacing the
    /// previous cache on success. A transport that fails to discover leaves
    /// the registry's other caches untouched and returns the error.
    pub async fn refresh(&mut self) -> Result<(), GenicamError> {
        self.gige = gige::discover(self.gige_timeout)
            .await
            .map_err(|err| GenicamError::transport(err.to_string()))?;

        #[cfg(feature = "usb")]
        {
            self.u3v = u3v::discover().map_err(|err| GenicamError::transport(err.to_string()))?;
        }

        Ok(())
    }

    /// GigE Vision devices found by the last [`InterfaceRegistry::refresh`].
    pub fn gige_devices(&self) -> &[gige::DeviceInfo] {
        &self.gige
    }

    /// USB3 Vision devices found by the last [`InterfaceRegistry::refresh`].
    #[cfg(feature = "usb")]
    pub fn u3v_devices(&self) -> &[u3v::DeviceInfo] {
        &self.u3v
    }
}

static DEFAULT: OnceLock<Mutex<InterfaceRegistry>> = OnceLock::new();

/// Process-wide registry, lazily built on first use with
/// [`DEFAULT_GIGE_TIMEOUT`]. A convenience wrapper, not the primary API:
/// prefer constructing an [`InterfaceRegistry`] explicitly and passing it
/// down to whatever opens cameras.
pub fn default() -> &'static Mutex<InterfaceRegistry> {
    DEFAULT.get_or_init(|| Mutex::new(InterfaceRegistry::new(DEFAULT_GIGE_TIMEOUT)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registry_starts_empty() {
        let registry = InterfaceRegistry::new(DEFAULT_GIGE_TIMEOUT);
        assert!(registry.gige_devices().is_empty());
    }

    #[tokio::test]
    async fn default_registry_is_reachable_from_multiple_callers() {
        let first = default() as *const Mutex<InterfaceRegistry>;
        let second = default() as *const Mutex<InterfaceRegistry>;
        assert_eq!(first, second);
    }
}
