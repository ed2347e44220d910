// Keyseize Input Layer - HID Usages
// Translation of Linux key codes to HID usage page / usage pairs

/// HID Keyboard/Keypad usage page
pub const PAGE_KEYBOARD: u32 = 0x07;

/// HID Consumer usage page (media keys)
pub const PAGE_CONSUMER: u32 = 0x0C;

/// Vendor-defined page used for key codes that have no HID equivalent.
///
/// The usage on this page is the raw Linux key code.
pub const PAGE_UNMAPPED: u32 = 0xFF00;

/// A usage page / usage pair identifying a device element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Usage {
    pub page: u32,
    pub usage: u32,
}

impl Usage {
    pub const fn new(page: u32, usage: u32) -> Self {
        Self { page, usage }
    }

    /// Decode an `MSC_SCAN` value reported by the kernel HID layer.
    ///
    /// USB and Bluetooth keyboards report `page << 16 | usage`. AT keyboards
    /// report raw set-1 scancodes with no page, which yield `None`.
    pub fn from_scan(scan: u32) -> Option<Self> {
        let page = scan >> 16;
        if page == 0 {
            return None;
        }
        Some(Self::new(page, scan & 0xFFFF))
    }

    /// Translate a Linux key code (input-event-codes.h) to its HID usage.
    ///
    /// Codes with no standard usage land on [`PAGE_UNMAPPED`].
    pub fn from_key_code(code: u16) -> Self {
        if let Some(usage) = keyboard_usage(code) {
            return Self::new(PAGE_KEYBOARD, usage);
        }
        if let Some(usage) = consumer_usage(code) {
            return Self::new(PAGE_CONSUMER, usage);
        }
        Self::new(PAGE_UNMAPPED, u32::from(code))
    }
}

fn keyboard_usage(code: u16) -> Option<u32> {
    let usage = match code {
        // Letters: KEY_A..KEY_Z are not contiguous in evdev
        30 => 0x04, // A
        48 => 0x05, // B
        46 => 0x06, // C
        32 => 0x07, // D
        18 => 0x08, // E
        33 => 0x09, // F
        34 => 0x0A, // G
        35 => 0x0B, // H
        23 => 0x0C, // I
        36 => 0x0D, // J
        37 => 0x0E, // K
        38 => 0x0F, // L
        50 => 0x10, // M
        49 => 0x11, // N
        24 => 0x12, // O
        25 => 0x13, // P
        16 => 0x14, // Q
        19 => 0x15, // R
        31 => 0x16, // S
        20 => 0x17, // T
        22 => 0x18, // U
        47 => 0x19, // V
        17 => 0x1A, // W
        45 => 0x1B, // X
        21 => 0x1C, // Y
        44 => 0x1D, // Z

        // Digit row: KEY_1..KEY_0 are 2..11, HID 1..0 are 0x1E..0x27
        2..=11 => 0x1E + u32::from(code - 2),

        1 => 0x29,  // ESC
        12 => 0x2D, // MINUS
        13 => 0x2E, // EQUAL
        14 => 0x2A, // BACKSPACE
        15 => 0x2B, // TAB
        26 => 0x2F, // LEFTBRACE
        27 => 0x30, // RIGHTBRACE
        28 => 0x28, // ENTER
        39 => 0x33, // SEMICOLON
        40 => 0x34, // APOSTROPHE
        41 => 0x35, // GRAVE
        43 => 0x31, // BACKSLASH
        51 => 0x36, // COMMA
        52 => 0x37, // DOT
        53 => 0x38, // SLASH
        57 => 0x2C, // SPACE
        58 => 0x39, // CAPSLOCK

        // F1..F10 are contiguous in both tables
        59..=68 => 0x3A + u32::from(code - 59),
        87 => 0x44, // F11
        88 => 0x45, // F12
        // F13..F24
        183..=194 => 0x68 + u32::from(code - 183),

        99 => 0x46,  // SYSRQ / Print Screen
        70 => 0x47,  // SCROLLLOCK
        119 => 0x48, // PAUSE
        110 => 0x49, // INSERT
        102 => 0x4A, // HOME
        104 => 0x4B, // PAGEUP
        111 => 0x4C, // DELETE
        107 => 0x4D, // END
        109 => 0x4E, // PAGEDOWN
        106 => 0x4F, // RIGHT
        105 => 0x50, // LEFT
        108 => 0x51, // DOWN
        103 => 0x52, // UP

        69 => 0x53,  // NUMLOCK
        98 => 0x54,  // KPSLASH
        55 => 0x55,  // KPASTERISK
        74 => 0x56,  // KPMINUS
        78 => 0x57,  // KPPLUS
        96 => 0x58,  // KPENTER
        79 => 0x59,  // KP1
        80 => 0x5A,  // KP2
        81 => 0x5B,  // KP3
        75 => 0x5C,  // KP4
        76 => 0x5D,  // KP5
        77 => 0x5E,  // KP6
        71 => 0x5F,  // KP7
        72 => 0x60,  // KP8
        73 => 0x61,  // KP9
        82 => 0x62,  // KP0
        83 => 0x63,  // KPDOT
        86 => 0x64,  // 102ND
        127 => 0x65, // COMPOSE / Application
        116 => 0x66, // POWER
        117 => 0x67, // KPEQUAL
        113 => 0x7F, // MUTE
        115 => 0x80, // VOLUMEUP
        114 => 0x81, // VOLUMEDOWN
        121 => 0x85, // KPCOMMA
        89 => 0x87,  // RO (International1)
        124 => 0x89, // YEN (International3)
        122 => 0x90, // HANGEUL (Lang1)
        123 => 0x91, // HANJA (Lang2)

        29 => 0xE0,  // LEFTCTRL
        42 => 0xE1,  // LEFTSHIFT
        56 => 0xE2,  // LEFTALT
        125 => 0xE3, // LEFTMETA
        97 => 0xE4,  // RIGHTCTRL
        54 => 0xE5,  // RIGHTSHIFT
        100 => 0xE6, // RIGHTALT
        126 => 0xE7, // RIGHTMETA

        _ => return None,
    };
    Some(usage)
}

fn consumer_usage(code: u16) -> Option<u32> {
    let usage = match code {
        163 => 0xB5, // NEXTSONG
        165 => 0xB6, // PREVIOUSSONG
        166 => 0xB7, // STOPCD
        164 => 0xCD, // PLAYPAUSE
        224 => 0x70, // BRIGHTNESSDOWN
        225 => 0x6F, // BRIGHTNESSUP
        _ => return None,
    };
    Some(usage)
}
