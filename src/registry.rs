//! The bounded, ordered peripheral array.
//!
//! Membership checks are linear. The registry is small (48 entries by default) and its order is observable:
//! applications iterate it by index, so removal shifts later entries down instead of leaving holes.

use crate::error::ErrorKind;
use crate::{Cookie, Error, Peripheral, Result};

pub(crate) struct Registry {
    peripherals: Vec<Peripheral>,
    capacity: usize,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Registry {
            peripherals: Vec::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.peripherals.len()
    }

    pub fn get(&self, index: usize) -> Option<&Peripheral> {
        self.peripherals.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peripheral> {
        self.peripherals.iter()
    }

    /// Finds the live peripheral registered under `cookie`. Peripherals whose release is underway are skipped.
    pub fn find_by_cookie(&self, cookie: Cookie) -> Option<&Peripheral> {
        self.peripherals
            .iter()
            .find(|x| x.cookie() == cookie && !x.0.is_releasing())
    }

    /// The entry holding `cookie`, including one whose release is underway.
    pub fn holder_of(&self, cookie: Cookie) -> Option<&Peripheral> {
        self.peripherals.iter().find(|x| x.cookie() == cookie)
    }

    pub fn position(&self, peripheral: &Peripheral) -> Option<usize> {
        self.peripherals.iter().position(|x| x == peripheral)
    }

    /// Appends `peripheral`, rejecting it if the registry is at capacity.
    pub fn push(&mut self, peripheral: Peripheral) -> Result<()> {
        if self.peripherals.len() >= self.capacity {
            return Err(Error::new(
                ErrorKind::RegistryFull,
                None,
                format!(
                    "{} peripherals already registered, rejecting cookie {}",
                    self.capacity,
                    peripheral.cookie()
                ),
            ));
        }
        self.peripherals
            .try_reserve(1)
            .map_err(|err| Error::out_of_memory(err, "peripheral registry"))?;
        self.peripherals.push(peripheral);
        Ok(())
    }

    /// Removes the entry at `index`, keeping the relative order of the rest.
    pub fn remove(&mut self, index: usize) -> Peripheral {
        self.peripherals.remove(index)
    }
}
