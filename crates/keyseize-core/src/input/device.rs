// Keyseize Input Layer - Device Classification
// Decides which evdev nodes belong to the keyboard class

use std::collections::HashSet;

/// HID Generic Desktop usage page
pub const PAGE_GENERIC_DESKTOP: u32 = 0x01;

/// HID Generic Desktop "Keyboard" usage
pub const USAGE_GD_KEYBOARD: u32 = 0x06;

// KEY_Q..KEY_Y, KEY_A, KEY_Z, KEY_SPACE
const TYPING_KEYS: [u16; 9] = [16, 17, 18, 19, 20, 21, 30, 44, 57];

/// What a node reports it can emit
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    pub has_key_events: bool,
    keys: HashSet<u16>,
}

impl DeviceCapabilities {
    pub fn new(has_key_events: bool, keys: impl IntoIterator<Item = u16>) -> Self {
        Self {
            has_key_events,
            keys: keys.into_iter().collect(),
        }
    }

    pub fn supports(&self, code: u16) -> bool {
        self.keys.contains(&code)
    }

    fn supports_all(&self, codes: &[u16]) -> bool {
        codes.iter().all(|code| self.keys.contains(code))
    }
}

/// Whether a node can type text.
///
/// Power buttons, lid switches, mice and media remotes also report key
/// events, so the letter row and space bar are probed rather than the event
/// type alone.
pub fn is_keyboard(capabilities: &DeviceCapabilities) -> bool {
    capabilities.has_key_events && capabilities.supports_all(&TYPING_KEYS)
}

/// The class of input devices a monitoring session considers at all.
///
/// Both the initial scan and the hot-plug subscription are restricted to this
/// class before any product-name matching happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceClass {
    pub usage_page: u32,
    pub usage: u32,
}

impl DeviceClass {
    /// Generic Desktop / Keyboard
    pub const KEYBOARD: DeviceClass = DeviceClass {
        usage_page: PAGE_GENERIC_DESKTOP,
        usage: USAGE_GD_KEYBOARD,
    };

    /// evdev has no device-level usage, so the keyboard class is recognised
    /// by its key set. Other classes admit nothing.
    pub fn admits(&self, capabilities: &DeviceCapabilities) -> bool {
        *self == Self::KEYBOARD && is_keyboard(capabilities)
    }
}

impl Default for DeviceClass {
    fn default() -> Self {
        Self::KEYBOARD
    }
}
