// Keyseize Notifications
// Tagged messages delivered from the platform to the dispatcher

use smallvec::SmallVec;

use super::EventBatch;
use crate::input::RawValue;
use crate::platform::DeviceIdentity;

/// Identities reported together by one lifecycle notification
pub type IdentityBatch = SmallVec<[DeviceIdentity; 4]>;

/// One message on the notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Keyboard-class devices became visible
    Matched(IdentityBatch),
    /// Devices are gone
    Terminated(IdentityBatch),
    /// An owned device reported a value change
    Input(DeviceIdentity, RawValue),
    /// The session was asked to stop
    Interrupted,
}

impl Notification {
    pub fn matched(identities: impl IntoIterator<Item = DeviceIdentity>) -> Self {
        Notification::Matched(identities.into_iter().collect())
    }

    pub fn terminated(identities: impl IntoIterator<Item = DeviceIdentity>) -> Self {
        Notification::Terminated(identities.into_iter().collect())
    }

    /// Append to the batch, merging into a trailing notification of the same kind.
    ///
    /// Merging only with the last entry keeps add/remove ordering intact when
    /// a device node is removed and re-added within one wakeup.
    pub fn coalesce_into(self, batch: &mut EventBatch<Notification>) {
        let unmerged = match (batch.last_mut(), self) {
            (Some(Notification::Matched(ids)), Notification::Matched(more))
            | (Some(Notification::Terminated(ids)), Notification::Terminated(more)) => {
                ids.extend(more);
                None
            }
            (_, other) => Some(other),
        };
        if let Some(notification) = unmerged {
            batch.push(notification);
        }
    }
}
