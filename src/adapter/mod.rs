//! # Adapter
//!
//! The transport contract the rest of the crate is built on. An adapter only
//! has to subscribe a callback to an action, remove it again given the
//! [`Token`] it handed out, and deliver published arguments to every
//! callback of an action.
//!
//! [`DefaultAdapter`] is the in-memory implementation used when a registry is
//! created without an explicit adapter.

pub mod default_adapter;

pub use default_adapter::DefaultAdapter;

use std::{fmt, sync::Arc};

use mockall::automock;
use uuid::Uuid;

use crate::{value::Value, PubSubResult};

/// Listener invoked synchronously with the published arguments.
pub type Callback = Arc<dyn Fn(&[Value]) -> PubSubResult<()> + Send + Sync>;

/// Wraps a closure into a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&[Value]) -> PubSubResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Opaque subscription handle returned by [`Adapter::subscribe`].
///
/// Tokens compare by identity: two subscriptions of the same callback to the
/// same action still produce distinct tokens.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Token {
    id: Uuid,
    action: Arc<str>,
}

impl Token {
    pub fn new(action: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: Arc::from(action),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({}, {})", self.action, self.id)
    }
}

/// Transport contract consumed by [`Subscription`](crate::Subscription) and
/// [`PubSub`](crate::PubSub).
#[automock]
pub trait Adapter: Send + Sync {
    /// Registers `callback` for `action` and returns the token needed to remove it.
    fn subscribe(&self, action: &str, callback: Callback) -> PubSubResult<Token>;

    /// Removes the callback bound to `token`.
    fn unsubscribe(&self, token: &Token) -> PubSubResult<()>;

    /// Delivers `args` to every callback currently subscribed to `action`.
    fn publish(&self, action: &str, args: &[Value]) -> PubSubResult<()>;
}
