// Keyseize Input Layer - Device Filtering
// Product-name matching and self-exclusion

use super::device::DeviceClass;
use crate::event::SetupError;

/// Product name of the virtual keyboard that downstream consumers create.
///
/// Seizing it would feed our own synthetic output back into the monitor, so
/// it is rejected under every filter configuration.
pub const VIRTUAL_KEYBOARD_NAME: &str = "Keyseize Virtual Keyboard";

/// Decides whether a discovered keyboard-class device should be claimed.
///
/// Comparison is exact and case-sensitive against the advertised product
/// string; no whitespace or case normalisation is performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMatcher {
    class: DeviceClass,
    product: Option<String>,
}

impl DeviceMatcher {
    /// Build a matcher for keyboard-class devices, optionally restricted to
    /// a single product name.
    pub fn new(product: Option<&str>) -> Result<Self, SetupError> {
        if product.is_some_and(str::is_empty) {
            return Err(SetupError::EmptyProductFilter);
        }

        Ok(Self {
            class: DeviceClass::KEYBOARD,
            product: product.map(str::to_owned),
        })
    }

    /// Device class used for the initial scan and the hot-plug subscription
    pub fn class(&self) -> DeviceClass {
        self.class
    }

    /// Configured product filter, if any
    pub fn product(&self) -> Option<&str> {
        self.product.as_deref()
    }

    /// Check a candidate's product name against the matcher.
    pub fn matches(&self, product_name: &str) -> bool {
        if product_name == VIRTUAL_KEYBOARD_NAME {
            return false;
        }

        match &self.product {
            Some(product) => product_name == product,
            None => true,
        }
    }
}
