//! # Subscription
//!
//! Per-owner bookkeeping of the tokens obtained from one adapter. Every
//! [`Subscription::add`] is tracked so that the owner can drop all of its
//! listeners in one call ([`Subscription::remove_all`]) when it goes away.

use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    adapter::{Adapter, Callback, Token},
    error::validate_action,
    value::Value,
    PubSubError, PubSubResult,
};

type UnsubscribeOwner = Box<dyn Fn() -> PubSubResult<()> + Send + Sync>;

struct SubscriptionInner {
    adapter: Arc<dyn Adapter>,
    tokens: Mutex<Vec<Token>>,
    unsubscribe: UnsubscribeOwner,
}

/// Handle shared between a registry entry and the owner it was created for.
///
/// Clones share the same token list; [`Subscription::ptr_eq`] tells whether
/// two handles refer to the same subscription.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    /// Creates a subscription bound to `adapter`.
    ///
    /// `unsubscribe` is what [`Subscription::unsubscribe`] runs; the registry
    /// binds it to `unregister(owner)`.
    pub fn new<F>(adapter: Arc<dyn Adapter>, unsubscribe: F) -> Self
    where
        F: Fn() -> PubSubResult<()> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(SubscriptionInner {
                adapter,
                tokens: Mutex::new(Vec::new()),
                unsubscribe: Box::new(unsubscribe),
            }),
        }
    }

    /// Subscribes `callback` to `action` and tracks the resulting token.
    pub fn add(&self, action: &str, callback: Callback) -> PubSubResult<UnsubscribeHandle> {
        validate_action("Subscription::add", action)?;

        let token = self.inner.adapter.subscribe(action, callback)?;
        self.inner.tokens.lock().push(token.clone());
        trace!("added {:?}", token);

        Ok(UnsubscribeHandle {
            token,
            subscription: Arc::downgrade(&self.inner),
        })
    }

    /// Unsubscribes every tracked token, then empties the list.
    ///
    /// Calling it again right away is a no-op. Every token is handed to the
    /// adapter even if an earlier one failed; the first failure is returned.
    pub fn remove_all(&self) -> PubSubResult<()> {
        let tokens = std::mem::take(&mut *self.inner.tokens.lock());
        if tokens.is_empty() {
            return Ok(());
        }

        debug!("removing {} subscriptions", tokens.len());
        let mut first_error = None;
        for token in &tokens {
            if let Err(e) = self.inner.adapter.unsubscribe(token) {
                warn!("failed to unsubscribe {:?}: {}", token, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn publish(&self, action: &str, args: &[Value]) -> PubSubResult<()> {
        validate_action("Subscription::publish", action)?;
        self.inner.adapter.publish(action, args)
    }

    /// Runs the owner-level unsubscribe bound at creation.
    pub fn unsubscribe(&self) -> PubSubResult<()> {
        (self.inner.unsubscribe)()
    }

    /// Tokens currently tracked, in subscription order.
    pub fn subscriptions(&self) -> Vec<Token> {
        self.inner.tokens.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tokens.lock().is_empty()
    }

    pub fn ptr_eq(&self, other: &Subscription) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subscriptions", &*self.inner.tokens.lock())
            .finish()
    }
}

/// Returned by [`Subscription::add`]; removes exactly that one listener.
#[derive(Debug, Clone)]
pub struct UnsubscribeHandle {
    token: Token,
    subscription: Weak<SubscriptionInner>,
}

impl UnsubscribeHandle {
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Removes the token from the subscription and from the adapter.
    ///
    /// Fails with [`PubSubError::TokenNotFound`] when the token is no longer
    /// tracked, e.g. on a second call or after `remove_all`.
    pub fn unsubscribe(&self) -> PubSubResult<()> {
        let not_found = || PubSubError::TokenNotFound {
            action: self.token.action().to_string(),
        };
        let inner = self.subscription.upgrade().ok_or_else(not_found)?;

        {
            let mut tokens = inner.tokens.lock();
            let idx = tokens
                .iter()
                .position(|token| token == &self.token)
                .ok_or_else(not_found)?;
            tokens.remove(idx);
        }

        inner.adapter.unsubscribe(&self.token)
    }
}
