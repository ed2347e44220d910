// Keyseize Platform Layer
// OS seam for device discovery, exclusive access and input delivery

#[cfg(feature = "evdev-backend")]
pub mod evdev;
pub mod mock;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::event::{EventBatch, Notification, Registry, SetupError};
use crate::input::DeviceClass;

#[cfg(feature = "evdev-backend")]
pub use self::evdev::{DeviceInfo, EvdevHandle, EvdevPlatform};
pub use mock::{MockHandle, MockPlatform, MockState};

/// OS-assigned identity of one connected input device.
///
/// Valid for the connected lifetime of the device. Once a Terminated
/// notification names it, it is dropped from every map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIdentity(PathBuf);

impl DeviceIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Device node backing this identity
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Errors opening or scheduling a single candidate device.
///
/// These never abort a monitoring session; the device is simply not owned.
#[derive(Debug, thiserror::Error)]
pub enum DeviceAccessError {
    #[error("{identity}: handle creation failed: {source}")]
    HandleCreation {
        identity: DeviceIdentity,
        #[source]
        source: io::Error,
    },

    #[error("{identity}: exclusive open failed: {source}")]
    Open {
        identity: DeviceIdentity,
        #[source]
        source: io::Error,
    },

    #[error("{identity}: scheduling on run loop failed: {source}")]
    Schedule {
        identity: DeviceIdentity,
        #[source]
        source: io::Error,
    },
}

/// Failure to release one device handle
#[derive(Debug, thiserror::Error)]
#[error("{identity}: close failed: {source}")]
pub struct CloseError {
    pub identity: DeviceIdentity,
    #[source]
    pub source: io::Error,
}

/// A candidate's identifying metadata could not be read
#[derive(Debug, thiserror::Error)]
#[error("{identity}: product name lookup failed: {source}")]
pub struct MetadataLookupError {
    pub identity: DeviceIdentity,
    #[source]
    pub source: io::Error,
}

/// An opened device handle.
///
/// The monitor drives every handle through the same sequence:
/// `register_input` -> `seize` -> `schedule`, then exactly one `close`.
pub trait DeviceHandle {
    /// Route this handle's input values to `identity`.
    fn register_input(&mut self, identity: &DeviceIdentity);

    /// Open the device exclusively so no other reader receives its events.
    fn seize(&mut self) -> io::Result<()>;

    /// Start delivering input for this handle on the run loop.
    fn schedule(&mut self) -> io::Result<()>;

    /// Release exclusive access. A second close reports an error.
    fn close(&mut self) -> io::Result<()>;
}

/// Device discovery, lifecycle notification and input delivery for one OS.
///
/// All methods are called from the thread running the monitor loop.
pub trait Platform {
    type Handle: DeviceHandle;

    /// Create the notification channel bound to the calling thread,
    /// subscribe to Matched and Terminated notifications for `class`, and
    /// return the candidates of that class that are already connected.
    fn install(&mut self, class: DeviceClass) -> Result<Vec<DeviceIdentity>, SetupError>;

    /// Advertised product name of a candidate
    fn product_name(&mut self, identity: &DeviceIdentity) -> io::Result<String>;

    /// Create a fresh, not yet seized, handle for a candidate
    fn create_handle(&mut self, identity: &DeviceIdentity) -> io::Result<Self::Handle>;

    /// Block for up to `timeout` and push every notification that arrived.
    ///
    /// `owned` holds the scheduled handles whose input must be collected.
    /// An error here is unrecoverable for the session.
    fn wait(
        &mut self,
        owned: &mut Registry<Self::Handle>,
        timeout: Duration,
        batch: &mut EventBatch<Notification>,
    ) -> io::Result<()>;
}
