/// The number of peripherals a [`Manager`][crate::Manager] tracks unless configured otherwise
pub const DEFAULT_MAX_PERIPHERALS: usize = 48;

/// Settings for [`Manager::init`][crate::Manager::init]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// How many peripherals may be registered at once. Discovery of further cookies is rejected with
    /// [`ErrorKind::RegistryFull`][crate::error::ErrorKind::RegistryFull].
    pub max_peripherals: usize,
}

impl Config {
    /// Sets [`max_peripherals`][Config::max_peripherals].
    pub fn with_max_peripherals(mut self, max_peripherals: usize) -> Self {
        self.max_peripherals = max_peripherals;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_peripherals: DEFAULT_MAX_PERIPHERALS,
        }
    }
}
