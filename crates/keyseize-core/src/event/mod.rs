// Keyseize Event Handling
// Device registry, notifications and the monitor loop

pub mod batch;
pub mod r#loop;
pub mod notification;
pub mod registry;

pub use batch::{batch_config, EventBatch};
pub use notification::{IdentityBatch, Notification};
pub use r#loop::{
    AttachError, MonitorError, MonitorLoop, MonitorResult, SetupError, DEFAULT_POLL_INTERVAL,
};
pub use registry::Registry;
