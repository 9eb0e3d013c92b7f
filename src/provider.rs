use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::registry::PubSub;

/// Supplies one registry to every connector mounted beneath it.
///
/// The core is fixed for the provider's lifetime. Handing it a different core
/// keeps the original and logs a warning the first time it happens.
#[derive(Debug)]
pub struct PubSubProvider {
    core: PubSub,
    warned_core_change: AtomicBool,
}

impl PubSubProvider {
    pub fn new(core: PubSub) -> Self {
        Self {
            core,
            warned_core_change: AtomicBool::new(false),
        }
    }

    pub fn core(&self) -> &PubSub {
        &self.core
    }

    /// Called when the provider is re-rendered with `next`.
    ///
    /// Returns `true` when this call emitted the "core changed" warning.
    pub fn set_core(&self, next: &PubSub) -> bool {
        if self.core.ptr_eq(next) {
            return false;
        }
        if self.warned_core_change.swap(true, Ordering::SeqCst) {
            return false;
        }
        warn!("PubSubProvider currently can't dynamically change the pubsub core!");
        true
    }
}
