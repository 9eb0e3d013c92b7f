//! # Connector
//!
//! Wraps a [`Component`] so that it receives props derived from subscribed
//! actions and from the publish capability of its own [`Subscription`].
//!
//! A [`PubSubConnector`] is the reusable declaration (mappings and options);
//! [`PubSubConnector::mount`] produces one [`ConnectedComponent`] per mounted
//! component, each with its own subscription and derived state.
//!
//! ```no_run
//! use pubsub_connector::{
//!     Component, ConnectedProps, ConnectorOptions, MountScope, PubSub, PubSubConnector,
//!     SubscriptionMapping, Props,
//! };
//!
//! struct Conversation;
//!
//! impl Component for Conversation {
//!     type Output = Option<String>;
//!
//!     fn render(&mut self, props: &ConnectedProps) -> Self::Output {
//!         props
//!             .value("lastMessage")
//!             .and_then(|v| v.as_str())
//!             .map(str::to_string)
//!     }
//! }
//!
//! let registry = PubSub::new();
//! let connector = PubSubConnector::new(
//!     Some(SubscriptionMapping::from_entries([("TALK", "lastMessage")])),
//!     None,
//!     ConnectorOptions::default(),
//! )?;
//! let mut conversation =
//!     connector.mount(Conversation, Props::new(), MountScope::with_registry(&registry))?;
//! conversation.subscription().publish("TALK", &["hi".into()])?;
//! assert_eq!(conversation.render(), Some("hi".to_string()));
//! # Ok::<(), pubsub_connector::PubSubError>(())
//! ```
//!
//! [`Subscription`]: crate::Subscription

pub mod instance;
pub mod mapping;
pub mod props;

pub use instance::{ConnectedComponent, Notifier, OwnProps};
pub use mapping::{
    publish_method, Accessor, MappingEntry, PublishMapping, PublishMethod, SubscriptionMapping,
    Transformer,
};
pub use props::{BoundMethod, ConnectedProps, Prop, PublishProps, Publisher};

pub use crate::config::ConnectorOptions;

use std::sync::Arc;

use crate::{
    config::PubSubConfig,
    provider::PubSubProvider,
    registry::PubSub,
    value::Props,
    PubSubError, PubSubResult,
};

/// Something a connector can wrap.
pub trait Component {
    type Output;

    fn display_name(&self) -> String {
        "Component".to_string()
    }

    fn render(&mut self, props: &ConnectedProps) -> Self::Output;
}

/// Where a mounting component looks for its registry.
///
/// An explicit registry wins over the provider's.
#[derive(Debug, Clone, Copy, Default)]
pub struct MountScope<'a> {
    pub registry: Option<&'a PubSub>,
    pub provider: Option<&'a PubSubProvider>,
}

impl<'a> MountScope<'a> {
    pub fn with_registry(registry: &'a PubSub) -> Self {
        Self {
            registry: Some(registry),
            provider: None,
        }
    }

    pub fn with_provider(provider: &'a PubSubProvider) -> Self {
        Self {
            registry: None,
            provider: Some(provider),
        }
    }

    fn resolve(&self) -> Option<PubSub> {
        self.registry
            .or_else(|| self.provider.map(PubSubProvider::core))
            .cloned()
    }
}

#[derive(Debug)]
pub(crate) struct ConnectorDef {
    pub(crate) subscriptions: Option<SubscriptionMapping>,
    pub(crate) publish: PublishMapping,
    pub(crate) options: ConnectorOptions,
}

/// Reusable connector declaration. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PubSubConnector {
    def: Arc<ConnectorDef>,
}

impl PubSubConnector {
    /// Validates the mappings once; mounting never re-checks their shape.
    pub fn new(
        subscriptions: Option<SubscriptionMapping>,
        publish: Option<PublishMapping>,
        options: ConnectorOptions,
    ) -> PubSubResult<Self> {
        if let Some(mapping) = &subscriptions {
            mapping.validate()?;
        }
        let publish = publish.unwrap_or_default();
        publish.validate()?;

        Ok(Self {
            def: Arc::new(ConnectorDef {
                subscriptions,
                publish,
                options,
            }),
        })
    }

    /// Same as [`PubSubConnector::new`] with the options of `config`.
    pub fn from_config(
        subscriptions: Option<SubscriptionMapping>,
        publish: Option<PublishMapping>,
        config: &PubSubConfig,
    ) -> PubSubResult<Self> {
        Self::new(subscriptions, publish, config.connector)
    }

    pub fn options(&self) -> ConnectorOptions {
        self.def.options
    }

    pub fn mount<C: Component>(
        &self,
        component: C,
        own_props: Props,
        scope: MountScope<'_>,
    ) -> PubSubResult<ConnectedComponent<C>> {
        let Some(registry) = scope.resolve() else {
            return Err(PubSubError::MissingRegistry {
                connector: connector_name(&component.display_name()),
            });
        };
        ConnectedComponent::mount(self.def.clone(), component, own_props, registry)
    }
}

pub(crate) fn connector_name(component: &str) -> String {
    format!("PubSubConnector({})", component)
}
