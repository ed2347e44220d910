// Keyseize Core Library
// Exclusive keyboard monitoring: discovery, hot-plug, seizing and key event delivery

pub mod event;
pub mod input;
pub mod output;
pub mod platform;

#[cfg(feature = "evdev-backend")]
pub mod settings;

pub use event::{
    AttachError, MonitorError, MonitorLoop, MonitorResult, Notification, Registry, SetupError,
    DEFAULT_POLL_INTERVAL,
};
pub use input::{DeviceMatcher, KeyEvent, RawValue, Transition, VIRTUAL_KEYBOARD_NAME};
pub use output::{ChannelSink, KeySink, OutputFormat, PipeSink, TextSink, TransportError};
pub use platform::{
    CloseError, DeviceAccessError, DeviceHandle, DeviceIdentity, MetadataLookupError, Platform,
};

#[cfg(feature = "evdev-backend")]
pub use platform::EvdevPlatform;
#[cfg(feature = "evdev-backend")]
pub use settings::{Settings, SettingsError};

#[cfg(feature = "evdev-backend")]
use std::sync::atomic::AtomicBool;
#[cfg(feature = "evdev-backend")]
use std::sync::Arc;

/// Seize every matching keyboard and forward its key transitions to `sink`
/// until `running` is cleared.
///
/// Blocks the calling thread for the whole session. `product` restricts
/// monitoring to keyboards advertising exactly that product name.
#[cfg(feature = "evdev-backend")]
pub fn monitor_kb<S: KeySink>(
    product: Option<&str>,
    sink: S,
    running: Arc<AtomicBool>,
) -> MonitorResult<()> {
    monitor_kb_with_interval(product, sink, running, DEFAULT_POLL_INTERVAL)
}

/// [`monitor_kb`] with an explicit run loop wakeup interval
#[cfg(feature = "evdev-backend")]
pub fn monitor_kb_with_interval<S: KeySink>(
    product: Option<&str>,
    sink: S,
    running: Arc<AtomicBool>,
    poll_interval: std::time::Duration,
) -> MonitorResult<()> {
    let matcher = DeviceMatcher::new(product)?;
    let platform = EvdevPlatform::new(running);
    MonitorLoop::new(platform, matcher, sink)
        .with_poll_interval(poll_interval)
        .run()
}
