// Keyseize Monitor Loop
// Device lifecycle and key event dispatch on a single run loop

use std::time::Duration;

use super::batch::{batch_config, EventBatch};
use super::notification::Notification;
use super::registry::Registry;
use crate::input::{translate, DeviceMatcher, RawValue};
use crate::output::KeySink;
use crate::platform::{
    CloseError, DeviceAccessError, DeviceHandle, DeviceIdentity, MetadataLookupError, Platform,
};

/// Wakeup interval when nothing arrives; bounds how long a shutdown request
/// can go unnoticed.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Session-fatal failures while setting up monitoring
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Product filter must not be empty")]
    EmptyProductFilter,

    #[error("Failed to create device notification channel: {0}")]
    Monitor(#[source] std::io::Error),

    #[error("Failed to enumerate input devices: {0}")]
    Enumerate(#[source] std::io::Error),
}

/// Result type for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors that end a monitoring session
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a candidate did not become owned
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error("{identity}: product {product:?} rejected by device filter")]
    Rejected {
        identity: DeviceIdentity,
        product: String,
    },

    #[error(transparent)]
    Metadata(#[from] MetadataLookupError),

    #[error(transparent)]
    Access(#[from] DeviceAccessError),
}

/// One monitoring session.
///
/// Owns the matcher, the platform's notification channel, the registry of
/// seized devices and the transport sink. Every notification is dispatched
/// from the thread calling [`MonitorLoop::run`], which is why the registry
/// needs no lock.
pub struct MonitorLoop<P: Platform, S: KeySink> {
    platform: P,
    matcher: DeviceMatcher,
    registry: Registry<P::Handle>,
    /// Detached handles awaiting release
    pending_close: Vec<(DeviceIdentity, P::Handle)>,
    sink: S,
    poll_interval: Duration,
    installed: bool,
}

impl<P: Platform, S: KeySink> MonitorLoop<P, S> {
    pub fn new(platform: P, matcher: DeviceMatcher, sink: S) -> Self {
        Self {
            platform,
            matcher,
            registry: Registry::new(),
            pending_close: Vec::new(),
            sink,
            poll_interval: DEFAULT_POLL_INTERVAL,
            installed: false,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn registry(&self) -> &Registry<P::Handle> {
        &self.registry
    }

    pub fn matcher(&self) -> &DeviceMatcher {
        &self.matcher
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Number of detached handles not yet released
    pub fn pending_close_count(&self) -> usize {
        self.pending_close.len()
    }

    /// Install lifecycle subscriptions and attach every keyboard already
    /// connected, through the same path used for hot-plugged devices.
    pub fn start(&mut self) -> Result<(), SetupError> {
        if self.installed {
            return Ok(());
        }
        let connected = self.platform.install(self.matcher.class())?;
        self.installed = true;

        log::debug!("{} keyboard-class device(s) connected", connected.len());
        self.on_matched(connected);
        Ok(())
    }

    /// Run until interrupted, then release every owned device.
    ///
    /// Setup failures are returned before any device is seized. A failing
    /// wait ends the session after teardown.
    pub fn run(&mut self) -> MonitorResult<()> {
        self.start()?;
        log::info!("Monitoring {} keyboard(s)", self.registry.len());

        let mut batch = EventBatch::with_capacity(batch_config::DEFAULT_READ_BATCH);
        let result = loop {
            match self.run_once(&mut batch) {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        self.teardown();
        result
    }

    /// Wait for one wakeup and dispatch what it delivered.
    ///
    /// Returns `false` once the session has been interrupted.
    pub fn run_once(&mut self, batch: &mut EventBatch<Notification>) -> MonitorResult<bool> {
        self.platform
            .wait(&mut self.registry, self.poll_interval, batch)?;

        let mut keep_running = true;
        for notification in batch.drain() {
            if !self.dispatch(notification) {
                keep_running = false;
                break;
            }
        }

        self.close_pending();
        Ok(keep_running)
    }

    /// Handle one notification. Returns `false` on interruption.
    pub fn dispatch(&mut self, notification: Notification) -> bool {
        match notification {
            Notification::Matched(identities) => {
                log::info!("Keyboard plugged: {} device(s)", identities.len());
                self.on_matched(identities);
            }
            Notification::Terminated(identities) => {
                log::info!("Keyboard unplugged: {} device(s)", identities.len());
                for identity in &identities {
                    self.detach(identity);
                }
            }
            Notification::Input(identity, raw) => self.on_input(&identity, &raw),
            Notification::Interrupted => return false,
        }
        true
    }

    fn on_matched(&mut self, identities: impl IntoIterator<Item = DeviceIdentity>) {
        for identity in identities {
            match self.attach(&identity) {
                Ok(()) => {}
                Err(e @ AttachError::Rejected { .. }) => log::debug!("{}", e),
                Err(e) => log::warn!("{}", e),
            }
        }
    }

    /// Claim a candidate device.
    ///
    /// The input route is registered before the exclusive open so a seized
    /// device never delivers into nothing. Failures leave the registry
    /// without an entry for `identity`; nothing is retried.
    ///
    /// An identity that is already owned keeps its current handle: the grab
    /// it holds is the only one the device allows, and giving it up for a
    /// fresh open that may fail would hand the keyboard back to the desktop.
    pub fn attach(&mut self, identity: &DeviceIdentity) -> Result<(), AttachError> {
        if self.registry.contains(identity) {
            log::debug!("{}: already owned", identity);
            return Ok(());
        }

        let product = self
            .platform
            .product_name(identity)
            .map_err(|source| MetadataLookupError {
                identity: identity.clone(),
                source,
            })?;

        if !self.matcher.matches(&product) {
            return Err(AttachError::Rejected {
                identity: identity.clone(),
                product,
            });
        }

        let mut handle =
            self.platform
                .create_handle(identity)
                .map_err(|source| DeviceAccessError::HandleCreation {
                    identity: identity.clone(),
                    source,
                })?;

        handle.register_input(identity);

        if let Err(source) = handle.seize() {
            if let Err(e) = handle.close() {
                log::debug!("{}: close after failed open: {}", identity, e);
            }
            return Err(DeviceAccessError::Open {
                identity: identity.clone(),
                source,
            }
            .into());
        }

        if let Err(source) = handle.schedule() {
            self.release(identity, handle);
            return Err(DeviceAccessError::Schedule {
                identity: identity.clone(),
                source,
            }
            .into());
        }

        self.registry.insert(identity.clone(), handle);
        log::info!("Seized {} ({})", identity, product);
        Ok(())
    }

    /// Stop tracking a device.
    ///
    /// The handle is not closed here: a vanished device may refuse the
    /// close. It moves to the pending list and is released at the end of the
    /// current dispatch cycle. Returns whether the identity was owned.
    pub fn detach(&mut self, identity: &DeviceIdentity) -> bool {
        match self.registry.remove(identity) {
            Some(handle) => {
                log::info!("Released {}", identity);
                self.pending_close.push((identity.clone(), handle));
                true
            }
            None => false,
        }
    }

    fn on_input(&mut self, identity: &DeviceIdentity, raw: &RawValue) {
        if !self.registry.contains(identity) {
            log::trace!("{}: input from unowned device dropped", identity);
            return;
        }
        let event = translate(raw);
        if let Err(e) = self.sink.send(event) {
            log::warn!("{}: transport: {}", identity, e);
        }
    }

    fn close_pending(&mut self) {
        for (identity, handle) in std::mem::take(&mut self.pending_close) {
            self.release(&identity, handle);
        }
    }

    fn release(&self, identity: &DeviceIdentity, mut handle: P::Handle) {
        if let Err(source) = handle.close() {
            let err = CloseError {
                identity: identity.clone(),
                source,
            };
            log::warn!("{}", err);
        }
    }

    /// Release every owned and pending device, logging close failures.
    ///
    /// Safe to call more than once; also runs on drop.
    pub fn teardown(&mut self) {
        let owned: Vec<_> = self.registry.drain().collect();
        if !owned.is_empty() {
            log::info!("Releasing {} keyboard(s)", owned.len());
        }
        self.pending_close.extend(owned);
        self.close_pending();
    }
}

/// Devices MUST be released when the session ends, otherwise seized
/// keyboards stay unusable. Drop guarantees this on early return and panic.
impl<P: Platform, S: KeySink> Drop for MonitorLoop<P, S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{KeyEvent, Transition, VIRTUAL_KEYBOARD_NAME};
    use crate::output::TransportError;
    use crate::platform::{MockPlatform, MockState};

    #[derive(Default)]
    struct Recorder {
        events: Vec<KeyEvent>,
    }

    impl KeySink for Recorder {
        fn send(&mut self, event: KeyEvent) -> Result<(), TransportError> {
            self.events.push(event);
            Ok(())
        }
    }

    struct FailingSink;

    impl KeySink for FailingSink {
        fn send(&mut self, _event: KeyEvent) -> Result<(), TransportError> {
            Err(TransportError::Disconnected)
        }
    }

    fn id(n: u32) -> DeviceIdentity {
        DeviceIdentity::new(format!("/dev/input/event{}", n))
    }

    fn monitor(
        platform: MockPlatform,
        product: Option<&str>,
    ) -> MonitorLoop<MockPlatform, Recorder> {
        MonitorLoop::new(
            platform,
            DeviceMatcher::new(product).unwrap(),
            Recorder::default(),
        )
    }

    #[test]
    fn test_attach_requires_match_and_open() {
        let platform = MockPlatform::new();
        platform.connect(id(1), "Good Keyboard");
        platform.connect(id(2), "Busy Keyboard");
        platform.connect(id(3), VIRTUAL_KEYBOARD_NAME);
        platform.state().borrow_mut().fail_seize(&id(2));

        let mut monitor = monitor(platform, None);
        monitor.start().unwrap();

        let owned: Vec<_> = monitor.registry().identities().cloned().collect();
        assert_eq!(owned, vec![id(1)]);
    }

    #[test]
    fn test_attach_reports_each_failure_kind() {
        let platform = MockPlatform::new();
        platform.connect(id(1), "Acme Keyboard");
        platform.connect_unnamed(id(2));
        platform.connect(id(3), "Acme Keyboard");
        platform.connect(id(4), "Other Keyboard");
        platform.state().borrow_mut().fail_create(&id(3));

        let mut monitor = monitor(platform, Some("Acme Keyboard"));
        assert!(monitor.attach(&id(1)).is_ok());
        assert!(matches!(
            monitor.attach(&id(2)),
            Err(AttachError::Metadata(_))
        ));
        assert!(matches!(
            monitor.attach(&id(3)),
            Err(AttachError::Access(DeviceAccessError::HandleCreation { .. }))
        ));
        assert!(matches!(
            monitor.attach(&id(4)),
            Err(AttachError::Rejected { .. })
        ));
        assert_eq!(monitor.registry().len(), 1);
    }

    #[test]
    fn test_failed_open_is_closed_and_not_owned() {
        let platform = MockPlatform::new();
        platform.connect(id(1), "Keyboard");
        platform.state().borrow_mut().fail_seize(&id(1));
        let state = platform.state();

        let mut monitor = monitor(platform, None);
        assert!(matches!(
            monitor.attach(&id(1)),
            Err(AttachError::Access(DeviceAccessError::Open { .. }))
        ));
        assert!(!monitor.registry().contains(&id(1)));
        assert_eq!(state.borrow().closes(&id(1)), 1);
    }

    #[test]
    fn test_failed_schedule_is_released() {
        let platform = MockPlatform::new();
        platform.connect(id(1), "Keyboard");
        platform.state().borrow_mut().fail_schedule(&id(1));
        let state = platform.state();

        let mut monitor = monitor(platform, None);
        assert!(matches!(
            monitor.attach(&id(1)),
            Err(AttachError::Access(DeviceAccessError::Schedule { .. }))
        ));
        assert!(!state.borrow().is_seized(&id(1)));
    }

    #[test]
    fn test_input_route_registered_before_seize() {
        let platform = MockPlatform::new();
        platform.connect(id(1), "Keyboard");
        let state = platform.state();

        let mut monitor = monitor(platform, None);
        monitor.attach(&id(1)).unwrap();
        assert_eq!(
            state.borrow().calls(&id(1)),
            vec!["create", "register_input", "seize", "schedule"]
        );
    }

    #[test]
    fn test_detach_is_idempotent() {
        let platform = MockPlatform::new();
        platform.connect(id(1), "Keyboard");

        let mut monitor = monitor(platform, None);
        monitor.attach(&id(1)).unwrap();
        assert!(monitor.detach(&id(1)));
        assert!(!monitor.registry().contains(&id(1)));
        assert!(!monitor.detach(&id(1)));
        assert_eq!(monitor.pending_close_count(), 1);
    }

    #[test]
    fn test_reattach_keeps_existing_handle() {
        let platform = MockPlatform::new();
        platform.connect(id(1), "Keyboard");
        let state = platform.state();

        let mut monitor = monitor(platform, None);
        monitor.attach(&id(1)).unwrap();
        monitor.attach(&id(1)).unwrap();

        assert_eq!(monitor.registry().len(), 1);
        assert_eq!(state.borrow().seizes(&id(1)), 1);
        assert_eq!(state.borrow().closes(&id(1)), 0);
        assert_eq!(state.borrow().open_handles(&id(1)), 1);
    }

    #[test]
    fn test_reattach_survives_failing_reopen() {
        let injections: [fn(&mut MockState, &DeviceIdentity); 2] =
            [MockState::fail_create, MockState::fail_seize];
        for inject in injections {
            let platform = MockPlatform::new();
            platform.connect(id(1), "Keyboard");
            let state = platform.state();

            let mut monitor = monitor(platform, None);
            monitor.attach(&id(1)).unwrap();
            inject(&mut *state.borrow_mut(), &id(1));

            assert!(monitor.attach(&id(1)).is_ok());
            assert!(monitor.registry().contains(&id(1)));
            assert!(state.borrow().is_seized(&id(1)));
            assert_eq!(state.borrow().open_handles(&id(1)), 1);
        }
    }

    #[test]
    fn test_owned_handle_is_routed_and_scheduled() {
        let platform = MockPlatform::new();
        platform.connect(id(1), "Keyboard");

        let mut monitor = monitor(platform, None);
        monitor.attach(&id(1)).unwrap();

        let (identity, handle) = monitor.registry().iter().next().unwrap();
        assert_eq!(handle.route(), Some(identity));
        assert!(handle.is_scheduled());
    }

    #[test]
    fn test_input_for_unowned_device_is_dropped() {
        let platform = MockPlatform::new();
        let mut monitor = monitor(platform, None);
        assert!(monitor.dispatch(Notification::Input(id(7), RawValue::new(0x07, 0x04, 1))));
        assert!(monitor.sink().events.is_empty());
    }

    #[test]
    fn test_transport_failure_does_not_stop_dispatch() {
        let platform = MockPlatform::new();
        platform.connect(id(1), "Keyboard");
        let mut monitor = MonitorLoop::new(platform, DeviceMatcher::new(None).unwrap(), FailingSink);
        monitor.attach(&id(1)).unwrap();
        assert!(monitor.dispatch(Notification::Input(id(1), RawValue::new(0x07, 0x04, 1))));
        assert!(monitor.registry().contains(&id(1)));
    }

    #[test]
    fn test_interrupt_stops_run_and_releases_devices() {
        let mut platform = MockPlatform::new();
        platform.connect(id(1), "Keyboard");
        platform.connect(id(2), "Keyboard");
        platform.push_batch(vec![
            Notification::Input(id(1), RawValue::new(0x07, 0x04, 1)),
            Notification::Interrupted,
            Notification::Input(id(1), RawValue::new(0x07, 0x04, 0)),
        ]);
        let state = platform.state();

        let mut monitor = monitor(platform, None);
        monitor.run().unwrap();

        assert!(monitor.registry().is_empty());
        assert_eq!(
            monitor.sink().events,
            vec![KeyEvent::new(Transition::Down, 0x07, 0x04)]
        );
        assert!(!state.borrow().is_seized(&id(1)));
        assert!(!state.borrow().is_seized(&id(2)));
    }

    #[test]
    fn test_setup_failure_aborts_before_seizing() {
        let platform = MockPlatform::new();
        platform.connect(id(1), "Keyboard");
        platform.state().borrow_mut().fail_install();
        let state = platform.state();

        let mut monitor = monitor(platform, None);
        assert!(matches!(monitor.run(), Err(MonitorError::Setup(_))));
        assert_eq!(state.borrow().seizes(&id(1)), 0);
    }

    #[test]
    fn test_teardown_twice_is_harmless() {
        let platform = MockPlatform::new();
        platform.connect(id(1), "Keyboard");
        let state = platform.state();

        let mut monitor = monitor(platform, None);
        monitor.start().unwrap();
        monitor.teardown();
        monitor.teardown();
        assert_eq!(state.borrow().closes(&id(1)), 1);
    }

    #[test]
    fn test_drop_releases_devices() {
        let platform = MockPlatform::new();
        platform.connect(id(1), "Keyboard");
        let state = platform.state();

        {
            let mut monitor = monitor(platform, None);
            monitor.start().unwrap();
            assert!(state.borrow().is_seized(&id(1)));
        }
        assert!(!state.borrow().is_seized(&id(1)));
    }
}
