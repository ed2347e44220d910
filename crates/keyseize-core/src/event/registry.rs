// Keyseize Device Registry
// Authoritative map of devices currently owned by the session

use indexmap::IndexMap;

use crate::platform::DeviceIdentity;

/// Ownership map from device identity to its seized handle.
///
/// An identity is present iff the session holds exclusive access to it and
/// its input is routed. Iteration follows attach order.
#[derive(Debug)]
pub struct Registry<H> {
    devices: IndexMap<DeviceIdentity, H>,
}

impl<H> Registry<H> {
    pub fn new() -> Self {
        Self {
            devices: IndexMap::new(),
        }
    }

    /// Insert a handle, returning the entry it replaced
    pub fn insert(&mut self, identity: DeviceIdentity, handle: H) -> Option<H> {
        self.devices.insert(identity, handle)
    }

    /// Stop tracking `identity`, handing its handle back to the caller
    pub fn remove(&mut self, identity: &DeviceIdentity) -> Option<H> {
        self.devices.shift_remove(identity)
    }

    pub fn contains(&self, identity: &DeviceIdentity) -> bool {
        self.devices.contains_key(identity)
    }

    pub fn get_mut(&mut self, identity: &DeviceIdentity) -> Option<&mut H> {
        self.devices.get_mut(identity)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn identities(&self) -> impl Iterator<Item = &DeviceIdentity> {
        self.devices.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeviceIdentity, &H)> {
        self.devices.iter()
    }

    /// Remove every entry, oldest first
    pub fn drain(&mut self) -> impl Iterator<Item = (DeviceIdentity, H)> + '_ {
        self.devices.drain(..)
    }
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}
