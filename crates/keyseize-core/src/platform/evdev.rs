// Keyseize Platform Layer - evdev/udev
// Linux device access: evdev grabs, udev hotplug, poll(2) run loop

use std::collections::HashMap;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use evdev::{Device, EventType, InputEvent, MiscType};

use super::{DeviceHandle, DeviceIdentity, Platform};
use crate::event::{EventBatch, Notification, Registry, SetupError};
use crate::input::{DeviceCapabilities, DeviceClass, RawValue, Usage, KEY_REPEAT_VALUE};

/// Directory holding evdev nodes
const INPUT_DIR: &str = "/dev/input";

/// Keyboard-class device found by a scan
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub name: Option<String>,
}

fn is_event_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("event"))
}

fn capabilities(device: &Device) -> DeviceCapabilities {
    let keys = device
        .supported_keys()
        .into_iter()
        .flat_map(|keys| keys.iter())
        .map(|key| key.code());
    DeviceCapabilities::new(device.supported_events().contains(EventType::KEY), keys)
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Linux platform backed by evdev nodes and udev notifications.
///
/// The run loop is a `poll(2)` over the udev monitor socket and every
/// scheduled device. Shutdown is requested by clearing `running`, which is
/// observed on the next wakeup.
pub struct EvdevPlatform {
    running: Arc<AtomicBool>,
    class: DeviceClass,
    monitor: Option<udev::MonitorSocket>,
    /// Product names captured when a candidate was classified
    names: HashMap<DeviceIdentity, Option<String>>,
}

impl EvdevPlatform {
    pub fn new(running: Arc<AtomicBool>) -> Self {
        Self {
            running,
            class: DeviceClass::KEYBOARD,
            monitor: None,
            names: HashMap::new(),
        }
    }

    /// List keyboard-class devices without seizing anything.
    pub fn list_devices(class: DeviceClass) -> Result<Vec<DeviceInfo>, SetupError> {
        let mut devices = Vec::new();
        for path in Self::event_nodes()? {
            match Device::open(&path) {
                Ok(device) if class.admits(&capabilities(&device)) => devices.push(DeviceInfo {
                    name: device.name().map(str::to_owned),
                    path,
                }),
                Ok(_) => {}
                Err(e) => log::warn!("{}: open failed: {}", path.display(), e),
            }
        }
        Ok(devices)
    }

    fn event_nodes() -> Result<Vec<PathBuf>, SetupError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(INPUT_DIR)
            .map_err(SetupError::Enumerate)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_event_node(path))
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Open a node read-only and decide whether it belongs to the class.
    ///
    /// Remembers the product name of admitted devices for the matcher.
    fn classify(&mut self, path: &Path) -> Option<DeviceIdentity> {
        let device = match Device::open(path) {
            Ok(device) => device,
            Err(e) => {
                log::warn!("{}: open failed: {}", path.display(), e);
                return None;
            }
        };
        if !self.class.admits(&capabilities(&device)) {
            return None;
        }

        let identity = DeviceIdentity::new(path);
        self.names
            .insert(identity.clone(), device.name().map(str::to_owned));
        Some(identity)
    }

    fn drain_monitor(&mut self, batch: &mut EventBatch<Notification>) {
        let events: Vec<(udev::EventType, PathBuf)> = match &mut self.monitor {
            Some(monitor) => monitor
                .iter()
                .filter_map(|event| {
                    let devnode = event.devnode()?.to_path_buf();
                    Some((event.event_type(), devnode))
                })
                .collect(),
            None => return,
        };

        for (event_type, devnode) in events {
            if !is_event_node(&devnode) {
                continue;
            }
            match event_type {
                udev::EventType::Add => {
                    if let Some(identity) = self.classify(&devnode) {
                        Notification::matched([identity]).coalesce_into(batch);
                    }
                }
                udev::EventType::Remove => {
                    let identity = DeviceIdentity::new(devnode);
                    self.names.remove(&identity);
                    Notification::terminated([identity]).coalesce_into(batch);
                }
                _ => {}
            }
        }
    }

    fn interrupted(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }
}

impl Platform for EvdevPlatform {
    type Handle = EvdevHandle;

    fn install(&mut self, class: DeviceClass) -> Result<Vec<DeviceIdentity>, SetupError> {
        self.class = class;

        // Subscribe before scanning so nothing plugged in between is missed
        let monitor = udev::MonitorBuilder::new()
            .and_then(|builder| builder.match_subsystem("input"))
            .and_then(|builder| builder.listen())
            .map_err(SetupError::Monitor)?;
        set_nonblocking(monitor.as_raw_fd()).map_err(SetupError::Monitor)?;
        self.monitor = Some(monitor);

        let candidates = Self::event_nodes()?
            .iter()
            .filter_map(|path| self.classify(path))
            .collect();
        Ok(candidates)
    }

    fn product_name(&mut self, identity: &DeviceIdentity) -> io::Result<String> {
        if !self.names.contains_key(identity) {
            let device = Device::open(identity.path())?;
            self.names
                .insert(identity.clone(), device.name().map(str::to_owned));
        }
        self.names
            .get(identity)
            .cloned()
            .flatten()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "device reports no name"))
    }

    fn create_handle(&mut self, identity: &DeviceIdentity) -> io::Result<EvdevHandle> {
        Device::open(identity.path()).map(EvdevHandle::new)
    }

    fn wait(
        &mut self,
        owned: &mut Registry<EvdevHandle>,
        timeout: Duration,
        batch: &mut EventBatch<Notification>,
    ) -> io::Result<()> {
        if self.interrupted() {
            batch.push(Notification::Interrupted);
            return Ok(());
        }

        let mut poll_fds = Vec::with_capacity(owned.len() + 1);
        if let Some(monitor) = &self.monitor {
            poll_fds.push(libc::pollfd {
                fd: monitor.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            });
        }
        let device_offset = poll_fds.len();
        let mut polled = Vec::with_capacity(owned.len());
        for (identity, handle) in owned.iter().filter(|(_, handle)| handle.scheduled) {
            poll_fds.push(libc::pollfd {
                fd: handle.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            });
            polled.push(identity.clone());
        }

        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let poll_result = unsafe {
            libc::poll(
                poll_fds.as_mut_ptr(),
                poll_fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        if poll_result < 0 {
            let err = io::Error::last_os_error();
            // EINTR just means a signal arrived; the running flag decides
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }

        if poll_result > 0 {
            // Input first: anything read from a node was produced before a
            // removal reported in the same wakeup.
            let mut values = Vec::new();
            for (pollfd, identity) in poll_fds[device_offset..].iter().zip(&polled) {
                let Some(handle) = owned.get_mut(identity) else {
                    continue;
                };
                if pollfd.revents & libc::POLLIN != 0 {
                    if let Err(e) = handle.read_values(&mut values) {
                        log::debug!("{}: read failed: {}", identity, e);
                        handle.scheduled = false;
                    }
                    for raw in values.drain(..) {
                        batch.push(Notification::Input(identity.clone(), raw));
                    }
                } else if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                    // Stop polling a hung-up node until its removal arrives
                    log::debug!("{}: device hung up", identity);
                    handle.scheduled = false;
                }
            }

            let monitor_ready = device_offset > 0 && poll_fds[0].revents & libc::POLLIN != 0;
            if monitor_ready {
                self.drain_monitor(batch);
            }
        }

        if self.interrupted() {
            batch.push(Notification::Interrupted);
        }
        Ok(())
    }
}

/// Exclusive handle onto one evdev node
pub struct EvdevHandle {
    device: Device,
    route: Option<DeviceIdentity>,
    grabbed: bool,
    scheduled: bool,
    closed: bool,
    /// HID usage announced by the last `MSC_SCAN`, consumed by the next key
    pending_scan: Option<u32>,
}

impl EvdevHandle {
    fn new(device: Device) -> Self {
        Self {
            device,
            route: None,
            grabbed: false,
            scheduled: false,
            closed: false,
            pending_scan: None,
        }
    }

    /// Read every pending key transition.
    fn read_values(&mut self, out: &mut Vec<RawValue>) -> io::Result<()> {
        if self.route.is_none() {
            return Ok(());
        }
        match self.device.fetch_events() {
            Ok(events) => {
                decode_events(events, &mut self.pending_scan, out);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Turn a stream of evdev events into key transitions.
///
/// Only `EV_KEY` changes become values; kernel autorepeat is not a hardware
/// transition and is skipped. An `MSC_SCAN` applies to the key event that
/// follows it within the same frame. `pending_scan` carries a scan across
/// reads that split a frame.
fn decode_events(
    events: impl IntoIterator<Item = InputEvent>,
    pending_scan: &mut Option<u32>,
    out: &mut Vec<RawValue>,
) {
    for event in events {
        match event.event_type() {
            EventType::MISC if event.code() == MiscType::MSC_SCAN.0 => {
                *pending_scan = Some(event.value() as u32);
            }
            EventType::SYNCHRONIZATION => *pending_scan = None,
            EventType::KEY => {
                let scan = pending_scan.take();
                if event.value() == KEY_REPEAT_VALUE {
                    continue;
                }
                let code = event.code();
                let usage = scan
                    .and_then(Usage::from_scan)
                    .unwrap_or_else(|| Usage::from_key_code(code));
                let mut raw = RawValue::new(usage.page, usage.usage, i64::from(event.value()))
                    .with_native_code(code);
                if let Some(scan) = scan {
                    raw = raw.with_scan_code(scan);
                }
                out.push(raw);
            }
            _ => {}
        }
    }
}

impl AsRawFd for EvdevHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.device.as_raw_fd()
    }
}

impl DeviceHandle for EvdevHandle {
    fn register_input(&mut self, identity: &DeviceIdentity) {
        self.route = Some(identity.clone());
    }

    fn seize(&mut self) -> io::Result<()> {
        self.device.grab()?;
        self.grabbed = true;
        Ok(())
    }

    fn schedule(&mut self) -> io::Result<()> {
        set_nonblocking(self.device.as_raw_fd())?;
        self.scheduled = true;
        Ok(())
    }

    /// Ungrab the node. The descriptor itself closes when the handle drops,
    /// which also releases the grab if the ungrab failed.
    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::Other, "handle already closed"));
        }
        self.closed = true;
        self.scheduled = false;
        if std::mem::take(&mut self.grabbed) {
            self.device.ungrab()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: u16 = 30;
    const KEY_LEFTSHIFT: u16 = 42;

    fn scan(value: u32) -> InputEvent {
        InputEvent::new(EventType::MISC, MiscType::MSC_SCAN.0, value as i32)
    }

    fn key(code: u16, value: i32) -> InputEvent {
        InputEvent::new(EventType::KEY, code, value)
    }

    fn syn() -> InputEvent {
        InputEvent::new(EventType::SYNCHRONIZATION, 0, 0)
    }

    fn decode(events: Vec<InputEvent>) -> Vec<RawValue> {
        let mut pending_scan = None;
        let mut out = Vec::new();
        decode_events(events, &mut pending_scan, &mut out);
        out
    }

    #[test]
    fn test_scan_is_paired_with_following_key() {
        let values = decode(vec![scan(0x0007_0004), key(KEY_A, 1), syn()]);
        assert_eq!(
            values,
            vec![RawValue::new(0x07, 0x04, 1)
                .with_native_code(KEY_A)
                .with_scan_code(0x0007_0004)]
        );
    }

    #[test]
    fn test_key_without_scan_uses_code_table() {
        let values = decode(vec![key(KEY_LEFTSHIFT, 0), syn()]);
        assert_eq!(
            values,
            vec![RawValue::new(0x07, 0xE1, 0).with_native_code(KEY_LEFTSHIFT)]
        );
    }

    #[test]
    fn test_scan_without_page_falls_back_to_code_table() {
        // AT keyboards report set-1 scancodes
        let values = decode(vec![scan(0x1e), key(KEY_A, 1), syn()]);
        assert_eq!(
            values,
            vec![RawValue::new(0x07, 0x04, 1)
                .with_native_code(KEY_A)
                .with_scan_code(0x1e)]
        );
    }

    #[test]
    fn test_autorepeat_is_skipped() {
        let values = decode(vec![
            scan(0x0007_0004),
            key(KEY_A, KEY_REPEAT_VALUE),
            syn(),
            key(KEY_A, 0),
            syn(),
        ]);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, 0);
        assert_eq!(values[0].scan_code, None);
    }

    #[test]
    fn test_sync_discards_stray_scan() {
        let values = decode(vec![scan(0x000C_00E9), syn(), key(KEY_A, 1), syn()]);
        assert_eq!(values.len(), 1);
        assert_eq!((values[0].usage_page, values[0].usage), (0x07, 0x04));
        assert_eq!(values[0].scan_code, None);
    }

    #[test]
    fn test_two_keys_in_one_frame_keep_their_own_scans() {
        let values = decode(vec![
            scan(0x0007_00E1),
            key(KEY_LEFTSHIFT, 1),
            scan(0x0007_0004),
            key(KEY_A, 1),
            syn(),
        ]);
        let usages: Vec<_> = values.iter().map(|v| (v.usage, v.native_code)).collect();
        assert_eq!(
            usages,
            vec![(0xE1, Some(KEY_LEFTSHIFT)), (0x04, Some(KEY_A))]
        );
    }

    #[test]
    fn test_scan_split_across_reads_is_kept() {
        let mut pending_scan = None;
        let mut out = Vec::new();
        decode_events(vec![scan(0x0007_0004)], &mut pending_scan, &mut out);
        assert!(out.is_empty());
        decode_events(vec![key(KEY_A, 1), syn()], &mut pending_scan, &mut out);
        assert_eq!(out[0].scan_code, Some(0x0007_0004));
        assert_eq!(pending_scan, None);
    }

    #[test]
    fn test_is_event_node() {
        assert!(is_event_node(Path::new("/dev/input/event3")));
        assert!(!is_event_node(Path::new("/dev/input/mouse0")));
        assert!(!is_event_node(Path::new("/dev/input/js0")));
        assert!(!is_event_node(Path::new("/dev/input/by-id")));
    }

    #[test]
    fn test_interrupted_platform_reports_immediately() {
        let running = Arc::new(AtomicBool::new(false));
        let mut platform = EvdevPlatform::new(running);
        let mut registry = Registry::new();
        let mut batch = EventBatch::new();
        platform
            .wait(&mut registry, Duration::from_secs(10), &mut batch)
            .unwrap();
        assert_eq!(batch.into_vec(), vec![Notification::Interrupted]);
    }

    #[test]
    fn test_list_devices_does_not_fail_without_access() {
        // Sandboxes may hide /dev/input entirely
        match EvdevPlatform::list_devices(DeviceClass::KEYBOARD) {
            Ok(devices) => {
                for device in &devices {
                    println!("  {} ({:?})", device.path.display(), device.name);
                }
            }
            Err(SetupError::Enumerate(e)) => {
                println!("Skipping test: {}", e);
            }
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }
}
