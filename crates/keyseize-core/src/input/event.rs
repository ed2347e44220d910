// Keyseize Input Layer - Key Events
// Raw element values and the normalized key event handed to the transport

use strum_macros::{AsRefStr, Display};

/// Kernel autorepeat value for EV_KEY events
pub const KEY_REPEAT_VALUE: i32 = 2;

/// Direction of a key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Transition {
    Up,
    Down,
}

impl Transition {
    /// Interpret an element's integer value.
    ///
    /// Any non-zero value means the element is asserted.
    pub fn from_value(value: i64) -> Self {
        if value != 0 {
            Transition::Down
        } else {
            Transition::Up
        }
    }

    /// Integer state carried on the wire: 1 for down, 0 for up
    pub fn state(self) -> u64 {
        match self {
            Transition::Up => 0,
            Transition::Down => 1,
        }
    }
}

/// One value change reported by an owned device, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawValue {
    pub usage_page: u32,
    pub usage: u32,
    pub value: i64,
    /// Platform key code the value was decoded from (diagnostics only)
    pub native_code: Option<u16>,
    /// Hardware scan code reported alongside the value (diagnostics only)
    pub scan_code: Option<u32>,
}

impl RawValue {
    pub fn new(usage_page: u32, usage: u32, value: i64) -> Self {
        Self {
            usage_page,
            usage,
            value,
            native_code: None,
            scan_code: None,
        }
    }

    pub fn with_native_code(mut self, code: u16) -> Self {
        self.native_code = Some(code);
        self
    }

    pub fn with_scan_code(mut self, scan: u32) -> Self {
        self.scan_code = Some(scan);
        self
    }
}

/// Normalized key transition delivered to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub transition: Transition,
    pub usage_page: u32,
    pub usage: u32,
}

impl KeyEvent {
    pub fn new(transition: Transition, usage_page: u32, usage: u32) -> Self {
        Self {
            transition,
            usage_page,
            usage,
        }
    }
}

impl From<RawValue> for KeyEvent {
    fn from(raw: RawValue) -> Self {
        KeyEvent::new(Transition::from_value(raw.value), raw.usage_page, raw.usage)
    }
}

/// Translate a raw value into the event forwarded to the transport.
pub fn translate(raw: &RawValue) -> KeyEvent {
    log::trace!(
        "value: {} page: {:#x} usage: {:#x} code: {:?} scan: {:?}",
        raw.value,
        raw.usage_page,
        raw.usage,
        raw.native_code,
        raw.scan_code
    );
    KeyEvent::from(*raw)
}
