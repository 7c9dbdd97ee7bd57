//! Non-blocking location source used at capture finalization.

use crate::model::trial::LocationStamp;
use log::warn;
use std::sync::{Arc, Mutex};

/// Supplies the most recent geolocation fix without blocking.
pub trait LocationProvider {
    fn current_fix(&self) -> Option<LocationStamp>;
}

/// Shared cache of the latest fix pushed by the host's location service.
///
/// Clones share the same slot, so the host keeps one handle for updates and
/// hands another to the capture session.
#[derive(Debug, Clone, Default)]
pub struct LatestFix {
    slot: Arc<Mutex<Option<LocationStamp>>>,
}

impl LatestFix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, stamp: LocationStamp) {
        match self.slot.lock() {
            Ok(mut slot) => *slot = Some(stamp),
            Err(_) => warn!("event=location_update module=capture status=error reason=poisoned"),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

impl LocationProvider for LatestFix {
    fn current_fix(&self) -> Option<LocationStamp> {
        self.slot.lock().ok().and_then(|slot| *slot)
    }
}

impl LocationProvider for Option<LocationStamp> {
    fn current_fix(&self) -> Option<LocationStamp> {
        *self
    }
}
