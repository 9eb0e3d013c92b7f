//! # pubsub-connector
//!
//! Publish/subscribe plumbing for component trees. Components subscribe to
//! named actions through a per-owner [`Subscription`], receive published
//! payloads as derived props through a [`PubSubConnector`], and publish
//! actions back through the same subscription.
//!
//! Layers, leaves first:
//! - [`Adapter`]: transport contract, with the in-memory [`DefaultAdapter`]
//! - [`Subscription`]: the tokens one owner holds on an adapter
//! - [`PubSub`]: registry mapping owners to subscriptions
//! - [`PubSubProvider`]: supplies one registry to a subtree
//! - [`PubSubConnector`]: derives props for a wrapped [`Component`]

pub mod adapter;
pub mod config;
pub mod connector;
pub mod error;
pub mod provider;
pub mod registry;
pub mod subscription;
pub mod value;

// Re-exports
pub use adapter::{callback, Adapter, Callback, DefaultAdapter, Token};
pub use config::{ConnectorOptions, FailurePolicy, PubSubConfig};
pub use connector::{
    publish_method, BoundMethod, Component, ConnectedComponent, ConnectedProps, MappingEntry,
    MountScope, Notifier, OwnProps, Prop, PubSubConnector, PublishMapping, PublishProps,
    Publisher, SubscriptionMapping, Transformer,
};
pub use error::*;
pub use provider::PubSubProvider;
pub use registry::{OwnerId, PubSub};
pub use subscription::{Subscription, UnsubscribeHandle};
pub use value::{props, shallow_equal, Props, Value};

#[cfg(test)]
#[ctor::ctor]
fn init_tests() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
