// Keyseize Input Layer
// Device classification, matching and key event translation

mod device;
mod event;
mod filter;
pub mod usage;

pub use device::{is_keyboard, DeviceCapabilities, DeviceClass};
pub use event::{translate, KeyEvent, RawValue, Transition, KEY_REPEAT_VALUE};
pub use filter::{DeviceMatcher, VIRTUAL_KEYBOARD_NAME};
pub use usage::Usage;
