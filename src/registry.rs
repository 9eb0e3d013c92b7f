use std::{
    fmt,
    sync::{Arc, Weak},
};

use dashmap::DashMap;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    adapter::{Adapter, DefaultAdapter},
    config::PubSubConfig,
    subscription::Subscription,
    PubSubError, PubSubResult,
};

/// Identity a [`Subscription`] is bound to, usually one mounted component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh unique owner id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for OwnerId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

struct PubSubInner {
    subscribers: DashMap<OwnerId, Subscription>,
    adapter: Arc<dyn Adapter>,
}

/// Registry mapping each owner to its [`Subscription`].
///
/// Clones share the same map. Registering an owner twice hands back the same
/// subscription; unregistering removes every listener the owner added.
#[derive(Clone)]
pub struct PubSub {
    inner: Arc<PubSubInner>,
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new()
    }
}

impl PubSub {
    /// Registry backed by a fresh [`DefaultAdapter`].
    pub fn new() -> Self {
        Self::with_adapter(Arc::new(DefaultAdapter::new()))
    }

    pub fn with_config(config: &PubSubConfig) -> Self {
        Self::with_adapter(Arc::new(DefaultAdapter::with_config(config)))
    }

    pub fn with_adapter(adapter: Arc<dyn Adapter>) -> Self {
        Self {
            inner: Arc::new(PubSubInner {
                subscribers: DashMap::new(),
                adapter,
            }),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn register(&self, owner: &OwnerId) -> PubSubResult<Subscription> {
        validate_owner("PubSub::register", owner)?;

        let subscription = self
            .inner
            .subscribers
            .entry(owner.clone())
            .or_insert_with(|| {
                debug!("creating subscription for {}", owner);
                let registry = Arc::downgrade(&self.inner);
                let owner = owner.clone();
                Subscription::new(self.inner.adapter.clone(), move || {
                    unregister_from(&registry, &owner)
                })
            })
            .clone();
        Ok(subscription)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn unregister(&self, owner: &OwnerId) -> PubSubResult<()> {
        validate_owner("PubSub::unregister", owner)?;

        // エントリを先に外してから購読を解除する
        match self.inner.subscribers.remove(owner) {
            Some((_, subscription)) => subscription.remove_all(),
            None => {
                warn!("{} is NOT registered to PubSub", owner);
                Ok(())
            }
        }
    }

    pub fn is_registered(&self, owner: &OwnerId) -> bool {
        self.inner.subscribers.contains_key(owner)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    pub fn adapter(&self) -> Arc<dyn Adapter> {
        self.inner.adapter.clone()
    }

    pub fn ptr_eq(&self, other: &PubSub) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for PubSub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PubSub")
            .field("subscribers", &self.inner.subscribers.len())
            .finish()
    }
}

fn unregister_from(registry: &Weak<PubSubInner>, owner: &OwnerId) -> PubSubResult<()> {
    match registry.upgrade() {
        Some(inner) => PubSub { inner }.unregister(owner),
        None => {
            debug!("registry dropped before {} unsubscribed", owner);
            Ok(())
        }
    }
}

fn validate_owner(call: &str, owner: &OwnerId) -> PubSubResult<()> {
    if owner.is_empty() {
        return Err(PubSubError::invalid_argument(
            call,
            "owner",
            "expected a non-empty owner id",
        ));
    }
    Ok(())
}
