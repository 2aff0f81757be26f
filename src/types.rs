use num_enum::FromPrimitive;
use smallvec::SmallVec;

/// An opaque backend-assigned identifier.
///
/// The registry only ever compares cookies for equality; the value means something to the backend that issued it
/// (a pointer, a handle, an index into a platform table).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cookie(u64);

impl Cookie {
    /// Creates a cookie from its raw value
    pub const fn new(raw: u64) -> Self {
        Cookie(raw)
    }

    /// The raw value handed out by the backend
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for Cookie {
    fn from(raw: u64) -> Self {
        Cookie(raw)
    }
}

impl std::fmt::Debug for Cookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cookie({:#x})", self.0)
    }
}

impl std::fmt::Display for Cookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A 48-bit Bluetooth hardware address, most significant octet first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// The address octets
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        MacAddr(octets)
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Manufacturer specific data taken verbatim from an advertisement. See the Bluetooth Core Specification Supplement
/// §A.1.4 for details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ManufacturerData(SmallVec<[u8; 16]>);

impl ManufacturerData {
    /// Copies `data` into a new buffer
    pub fn new(data: &[u8]) -> Self {
        ManufacturerData(SmallVec::from_slice(data))
    }

    /// The payload, including the leading company identifier
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The payload length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Company identifier, stored little-endian in the first two octets. Identifiers are assigned
    /// [here](https://www.bluetooth.com/specifications/assigned-numbers/company-identifiers/).
    pub fn company_id(&self) -> Option<u16> {
        match self.0.as_slice() {
            [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }
}

impl From<&[u8]> for ManufacturerData {
    fn from(data: &[u8]) -> Self {
        ManufacturerData::new(data)
    }
}

impl From<Vec<u8>> for ManufacturerData {
    fn from(data: Vec<u8>) -> Self {
        ManufacturerData(SmallVec::from_vec(data))
    }
}

/// The application's permission to use Bluetooth, as reported by the backend.
///
/// Backends report a raw integer; values outside the known range are kept in [`AuthorizationStatus::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(i32)]
pub enum AuthorizationStatus {
    /// The user has not been asked yet, or the backend does not report authorization
    NotDetermined = 0,
    /// Bluetooth use is restricted by policy
    Restricted = 1,
    /// The user denied access
    Denied = 2,
    /// Access is allowed
    AllowedAlways = 3,
    /// A backend-specific value
    #[num_enum(catch_all)]
    Other(i32),
}

impl AuthorizationStatus {
    /// The raw value as reported by the backend
    pub fn raw(self) -> i32 {
        match self {
            AuthorizationStatus::NotDetermined => 0,
            AuthorizationStatus::Restricted => 1,
            AuthorizationStatus::Denied => 2,
            AuthorizationStatus::AllowedAlways => 3,
            AuthorizationStatus::Other(raw) => raw,
        }
    }
}
