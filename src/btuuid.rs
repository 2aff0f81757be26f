//! Attribute UUID strings
//!
//! Backends report service and characteristic UUIDs as text and the GATT tree compares them byte for byte: `"180a"`
//! and `"180A"` are different UUIDs. [`GattUuid`] converts from [`uuid::Uuid`] into the canonical text form used by
//! the platform stacks: the short upper-case hex form for UUIDs built on the Bluetooth Base UUID, the upper-case
//! hyphenated form otherwise.

use uuid::Uuid;

/// This is the Bluetooth Base UUID. It is used with 16-bit and 32-bit UUIDs
/// [defined](https://www.bluetooth.com/specifications/assigned-numbers/) by the Bluetooth SIG.
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// The textual UUID of a GATT service or characteristic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct GattUuid(String);

impl GattUuid {
    /// Wraps `uuid` without normalizing it.
    pub fn new(uuid: impl Into<String>) -> Self {
        GattUuid(uuid.into())
    }

    /// Creates the short form of a 16-bit Bluetooth UUID, e.g. `180F`
    pub fn from_u16(uuid: u16) -> Self {
        GattUuid(format!("{uuid:04X}"))
    }

    /// Creates the short form of a 32-bit Bluetooth UUID
    pub fn from_u32(uuid: u32) -> Self {
        GattUuid(format!("{uuid:08X}"))
    }

    /// The UUID text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the text back into a 128-bit [`Uuid`], expanding short forms with the Bluetooth Base UUID.
    ///
    /// Returns `None` if the text is neither a 4 or 8 digit hex number nor a full UUID.
    pub fn to_uuid(&self) -> Option<Uuid> {
        let text = self.0.as_str();
        match text.len() {
            4 => u16::from_str_radix(text, 16)
                .ok()
                .map(|x| Uuid::from_u128(((x as u128) << 96) | BLUETOOTH_BASE_UUID)),
            8 => u32::from_str_radix(text, 16)
                .ok()
                .map(|x| Uuid::from_u128(((x as u128) << 96) | BLUETOOTH_BASE_UUID)),
            _ => Uuid::parse_str(text).ok(),
        }
    }
}

impl From<Uuid> for GattUuid {
    fn from(uuid: Uuid) -> Self {
        let u = uuid.as_u128();
        if (u & ((1 << 96) - 1)) == BLUETOOTH_BASE_UUID {
            let short = (u >> 96) as u32;
            match u16::try_from(short) {
                Ok(short) => GattUuid::from_u16(short),
                Err(_) => GattUuid::from_u32(short),
            }
        } else {
            GattUuid(format!("{:X}", uuid.hyphenated()))
        }
    }
}

impl From<&str> for GattUuid {
    fn from(uuid: &str) -> Self {
        GattUuid(uuid.to_owned())
    }
}

impl From<String> for GattUuid {
    fn from(uuid: String) -> Self {
        GattUuid(uuid)
    }
}

impl AsRef<str> for GattUuid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for GattUuid {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for GattUuid {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for GattUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bluetooth GATT Service 16-bit UUIDs
pub mod services {
    #![allow(missing_docs)]

    pub const GENERIC_ACCESS: &str = "1800";
    pub const GENERIC_ATTRIBUTE: &str = "1801";
    pub const HEALTH_THERMOMETER: &str = "1809";
    pub const DEVICE_INFORMATION: &str = "180A";
    pub const HEART_RATE: &str = "180D";
    pub const BATTERY: &str = "180F";
}

/// Bluetooth GATT Characteristic 16-bit UUIDs
pub mod characteristics {
    #![allow(missing_docs)]

    pub const DEVICE_NAME: &str = "2A00";
    pub const BATTERY_LEVEL: &str = "2A19";
    pub const TEMPERATURE_MEASUREMENT: &str = "2A1C";
    pub const MODEL_NUMBER_STRING: &str = "2A24";
    pub const MANUFACTURER_NAME_STRING: &str = "2A29";
    pub const HEART_RATE_MEASUREMENT: &str = "2A37";
}
