// Keyseize Platform Layer - Scripted Platform
// In-memory device set and notification script for tests and dry runs

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;

use super::{DeviceHandle, DeviceIdentity, Platform};
use crate::event::{EventBatch, Notification, Registry, SetupError};
use crate::input::DeviceClass;

#[derive(Debug, Clone, Default)]
struct MockDevice {
    name: Option<String>,
    fail_create: bool,
    fail_seize: bool,
    fail_schedule: bool,
    vanished: bool,
}

/// Device set and call record shared between a [`MockPlatform`] and the
/// handles it creates.
#[derive(Debug, Default)]
pub struct MockState {
    devices: IndexMap<DeviceIdentity, MockDevice>,
    seized: HashSet<DeviceIdentity>,
    created: HashMap<DeviceIdentity, usize>,
    seizes: HashMap<DeviceIdentity, usize>,
    closes: HashMap<DeviceIdentity, usize>,
    calls: HashMap<DeviceIdentity, Vec<&'static str>>,
    install_fails: bool,
}

impl MockState {
    fn device_mut(&mut self, identity: &DeviceIdentity) -> &mut MockDevice {
        self.devices.entry(identity.clone()).or_default()
    }

    fn record(&mut self, identity: &DeviceIdentity, call: &'static str) {
        self.calls.entry(identity.clone()).or_default().push(call);
    }

    fn flag(&self, identity: &DeviceIdentity, get: impl Fn(&MockDevice) -> bool) -> bool {
        self.devices.get(identity).is_some_and(get)
    }

    /// Make handle creation fail for this device
    pub fn fail_create(&mut self, identity: &DeviceIdentity) {
        self.device_mut(identity).fail_create = true;
    }

    /// Make the exclusive open fail with EBUSY
    pub fn fail_seize(&mut self, identity: &DeviceIdentity) {
        self.device_mut(identity).fail_seize = true;
    }

    pub fn fail_schedule(&mut self, identity: &DeviceIdentity) {
        self.device_mut(identity).fail_schedule = true;
    }

    /// Make `install` fail as if no notification channel could be created
    pub fn fail_install(&mut self) {
        self.install_fails = true;
    }

    /// Mark the device as physically gone; closing its handles fails
    pub fn vanish(&mut self, identity: &DeviceIdentity) {
        self.device_mut(identity).vanished = true;
    }

    pub fn is_seized(&self, identity: &DeviceIdentity) -> bool {
        self.seized.contains(identity)
    }

    /// Successful exclusive opens
    pub fn seizes(&self, identity: &DeviceIdentity) -> usize {
        self.seizes.get(identity).copied().unwrap_or(0)
    }

    pub fn closes(&self, identity: &DeviceIdentity) -> usize {
        self.closes.get(identity).copied().unwrap_or(0)
    }

    /// Handles created and not yet closed
    pub fn open_handles(&self, identity: &DeviceIdentity) -> usize {
        let created = self.created.get(identity).copied().unwrap_or(0);
        created.saturating_sub(self.closes(identity))
    }

    /// Platform and handle calls made for a device, in order
    pub fn calls(&self, identity: &DeviceIdentity) -> Vec<&'static str> {
        self.calls.get(identity).cloned().unwrap_or_default()
    }
}

/// Platform whose devices and notifications are scripted up front.
///
/// Each `wait` delivers the next scripted batch; once the script is
/// exhausted it delivers [`Notification::Interrupted`].
#[derive(Debug, Default)]
pub struct MockPlatform {
    state: Rc<RefCell<MockState>>,
    script: VecDeque<Vec<Notification>>,
    installed: bool,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared state, usable after the platform moved into a monitor
    pub fn state(&self) -> Rc<RefCell<MockState>> {
        Rc::clone(&self.state)
    }

    /// Add a device that is connected before the session starts
    pub fn connect(&self, identity: DeviceIdentity, name: &str) {
        let mut state = self.state.borrow_mut();
        let device = state.device_mut(&identity);
        device.name = Some(name.to_string());
        device.vanished = false;
    }

    /// Add a connected device whose product name cannot be read
    pub fn connect_unnamed(&self, identity: DeviceIdentity) {
        let mut state = self.state.borrow_mut();
        let device = state.device_mut(&identity);
        device.name = None;
        device.vanished = false;
    }

    /// Queue the notifications delivered by one wakeup
    pub fn push_batch(&mut self, batch: Vec<Notification>) {
        self.script.push_back(batch);
    }

    /// Queue a hot-plug of a new device
    pub fn plug(&mut self, identity: DeviceIdentity, name: &str) {
        self.connect(identity.clone(), name);
        self.push_batch(vec![Notification::matched([identity])]);
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }
}

impl Platform for MockPlatform {
    type Handle = MockHandle;

    fn install(&mut self, class: DeviceClass) -> Result<Vec<DeviceIdentity>, SetupError> {
        let state = self.state.borrow();
        if state.install_fails {
            return Err(SetupError::Monitor(io::Error::new(
                io::ErrorKind::Other,
                "notification channel unavailable",
            )));
        }
        log::debug!("mock: subscribed to class {:?}", class);
        self.installed = true;

        Ok(state
            .devices
            .iter()
            .filter(|(_, device)| !device.vanished)
            .map(|(identity, _)| identity.clone())
            .collect())
    }

    fn product_name(&mut self, identity: &DeviceIdentity) -> io::Result<String> {
        self.state
            .borrow()
            .devices
            .get(identity)
            .and_then(|device| device.name.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no product property"))
    }

    fn create_handle(&mut self, identity: &DeviceIdentity) -> io::Result<MockHandle> {
        let mut state = self.state.borrow_mut();
        state.record(identity, "create");
        if state.flag(identity, |d| d.fail_create || d.vanished) {
            return Err(io::Error::from_raw_os_error(libc::ENOENT));
        }
        *state.created.entry(identity.clone()).or_default() += 1;

        Ok(MockHandle {
            device: identity.clone(),
            route: None,
            state: Rc::clone(&self.state),
            seized: false,
            scheduled: false,
            closed: false,
        })
    }

    fn wait(
        &mut self,
        _owned: &mut Registry<MockHandle>,
        _timeout: Duration,
        batch: &mut EventBatch<Notification>,
    ) -> io::Result<()> {
        match self.script.pop_front() {
            Some(notifications) => batch.extend(notifications),
            None => batch.push(Notification::Interrupted),
        }
        Ok(())
    }
}

/// Handle onto a scripted device
#[derive(Debug)]
pub struct MockHandle {
    device: DeviceIdentity,
    route: Option<DeviceIdentity>,
    state: Rc<RefCell<MockState>>,
    seized: bool,
    scheduled: bool,
    closed: bool,
}

impl MockHandle {
    /// Identity this handle's input is routed to
    pub fn route(&self) -> Option<&DeviceIdentity> {
        self.route.as_ref()
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }
}

impl DeviceHandle for MockHandle {
    fn register_input(&mut self, identity: &DeviceIdentity) {
        self.state.borrow_mut().record(&self.device, "register_input");
        self.route = Some(identity.clone());
    }

    fn seize(&mut self) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.record(&self.device, "seize");
        if state.flag(&self.device, |d| d.fail_seize) || state.seized.contains(&self.device) {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }
        state.seized.insert(self.device.clone());
        *state.seizes.entry(self.device.clone()).or_default() += 1;
        self.seized = true;
        Ok(())
    }

    fn schedule(&mut self) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.record(&self.device, "schedule");
        if state.flag(&self.device, |d| d.fail_schedule) {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        self.scheduled = true;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "handle already closed",
            ));
        }
        self.closed = true;
        self.scheduled = false;

        let mut state = self.state.borrow_mut();
        state.record(&self.device, "close");
        *state.closes.entry(self.device.clone()).or_default() += 1;
        if std::mem::take(&mut self.seized) {
            state.seized.remove(&self.device);
        }
        if state.flag(&self.device, |d| d.vanished) {
            return Err(io::Error::from_raw_os_error(libc::ENODEV));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> DeviceIdentity {
        DeviceIdentity::new(format!("/dev/input/event{}", n))
    }

    #[test]
    fn test_install_lists_connected_devices() {
        let mut platform = MockPlatform::new();
        platform.connect(id(1), "A");
        platform.connect(id(2), "B");
        let connected = platform.install(DeviceClass::KEYBOARD).unwrap();
        assert_eq!(connected, vec![id(1), id(2)]);
        assert!(platform.is_installed());
    }

    #[test]
    fn test_second_seize_of_same_device_is_busy() {
        let mut platform = MockPlatform::new();
        platform.connect(id(1), "A");
        let mut first = platform.create_handle(&id(1)).unwrap();
        let mut second = platform.create_handle(&id(1)).unwrap();
        first.seize().unwrap();
        let err = second.seize().unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBUSY));
    }

    #[test]
    fn test_close_of_vanished_device_fails_but_releases() {
        let mut platform = MockPlatform::new();
        platform.connect(id(1), "A");
        let mut handle = platform.create_handle(&id(1)).unwrap();
        handle.seize().unwrap();
        platform.state().borrow_mut().vanish(&id(1));

        assert!(handle.close().is_err());
        assert!(!platform.state().borrow().is_seized(&id(1)));
    }

    #[test]
    fn test_double_close_is_an_error() {
        let mut platform = MockPlatform::new();
        platform.connect(id(1), "A");
        let mut handle = platform.create_handle(&id(1)).unwrap();
        handle.close().unwrap();
        assert!(handle.close().is_err());
        assert_eq!(platform.state().borrow().closes(&id(1)), 1);
    }

    #[test]
    fn test_exhausted_script_interrupts() {
        let mut platform = MockPlatform::new();
        platform.plug(id(4), "A");
        let mut registry = Registry::new();
        let mut batch = EventBatch::new();

        platform
            .wait(&mut registry, Duration::ZERO, &mut batch)
            .unwrap();
        platform
            .wait(&mut registry, Duration::ZERO, &mut batch)
            .unwrap();
        assert_eq!(
            batch.into_vec(),
            vec![Notification::matched([id(4)]), Notification::Interrupted]
        );
    }
}
