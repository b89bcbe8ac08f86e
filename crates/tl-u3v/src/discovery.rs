//! USB3 Vision device discovery: enumerate attached USB devices and keep
//! only those exposing a USB3 Vision control interface.

#[cfg(feature = "usb")]
use crate::control::U3vError;

/// Interface class/subclass/protocol triplet identifying a USB3 Vision
/// control interface, per the USB3 Vision device class definition.
#[cfg(feature = "usb")]
const U3V_INTERFACE_CLASS: u8 = 0xEF;
#[cfg(feature = "usb")]
const U3V_INTERFACE_SUBCLASS: u8 = 0x05;
#[cfg(feature = "usb")]
const U3V_INTERFACE_PROTOCOL: u8 = 0x00;

/// Information about a discovered USB3 Vision device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_number: u8,
    pub address: u8,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
}

/// Enumerate attached USB devices and return those advertising a USB3
/// Vision control interface (class `0xEF`, subclass `0x05`).
#[cfg(feature = "usb")]
pub fn discover() -> Result<Vec<DeviceInfo>, U3vError> {
    let mut found = Vec::new();
    for device in rusb::devices()?.iter() {
        let config = match device.active_config_descriptor() {
            Ok(config) => config,
            Err(_) => continue,
        };
        let is_u3v = config.interfaces().any(|iface| {
            iface.descriptors().any(|desc| {
                desc.class_code() == U3V_INTERFACE_CLASS
                    && desc.sub_class_code() == U3V_INTERFACE_SUBCLASS
                    && desc.protocol_code() == U3V_INTERFACE_PROTOCOL
            })
        });
        if !is_u3v {
            continue;
        }

        let desc = device.device_descriptor()?;
        let (manufacturer, model, serial_number) = match device.open() {
            Ok(handle) => {
                let languages = handle.read_languages(crate::control::consts::CONTROL_TIMEOUT).unwrap_or_default();
                let lang = languages.first().copied();
                let read = |index: Option<u8>| -> Option<String> {
                    let (index, lang) = (index?, lang?);
                    handle
                        .read_string_descriptor(lang, index, crate::control::consts::CONTROL_TIMEOUT)
                        .ok()
                };
                (
                    read(desc.manufacturer_string_index()),
                    read(desc.product_string_index()),
                    read(desc.serial_number_string_index()),
                )
            }
            Err(_) => (None, None, None),
        };

        found.push(DeviceInfo {
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            bus_number: device.bus_number(),
            address: device.address(),
            manufacturer,
            model,
            serial_number,
        });
    }
    Ok(found)
}
