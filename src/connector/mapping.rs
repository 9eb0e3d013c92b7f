//! Declarative mappings consumed by [`PubSubConnector`](super::PubSubConnector).
//!
//! Whether a mapping depends on the owner props is declared by the
//! constructor used (`new` / `with_props`, `from_fn` / `from_fn_with_props`),
//! never inferred from the closure.

use std::{collections::HashSet, fmt, sync::Arc};

use crate::{
    subscription::Subscription,
    value::{Props, Value},
    PubSubError, PubSubResult,
};

use super::{
    instance::{Notifier, OwnProps},
    props::{BoundMethod, Prop, PublishProps, Publisher},
};

type TransformFn = Arc<dyn Fn(&[Value], &Props) -> PubSubResult<Props> + Send + Sync>;

/// Turns the arguments of one published action into a partial props update.
#[derive(Clone)]
pub struct Transformer {
    f: TransformFn,
    depends_on_props: bool,
    initial_values: Vec<Value>,
}

impl Transformer {
    /// Transformer that only looks at the event arguments.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> PubSubResult<Props> + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(move |args, _| f(args)),
            depends_on_props: false,
            initial_values: Vec::new(),
        }
    }

    /// Transformer that also receives the current owner props.
    ///
    /// It is re-invoked with the last arguments of its action whenever the
    /// owner props change.
    pub fn with_props<F>(f: F) -> Self
    where
        F: Fn(&[Value], &Props) -> PubSubResult<Props> + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(f),
            depends_on_props: true,
            initial_values: Vec::new(),
        }
    }

    /// Arguments replayed on mount when `force_initial_values` is set.
    pub fn initial_values(mut self, values: Vec<Value>) -> Self {
        self.initial_values = values;
        self
    }

    pub fn depends_on_props(&self) -> bool {
        self.depends_on_props
    }

    /// Runs the transformer and checks it produced at least one property.
    pub(crate) fn apply(&self, action: &str, args: &[Value], props: &Props) -> PubSubResult<Props> {
        let update = (self.f)(args, props)?;
        if update.is_empty() {
            return Err(PubSubError::InvalidMappingResult {
                action: action.to_string(),
                reason: "expected a mapping with at least one property".to_string(),
            });
        }
        Ok(update)
    }
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer")
            .field("depends_on_props", &self.depends_on_props)
            .field("initial_values", &self.initial_values)
            .finish()
    }
}

/// What one action of a static mapping turns into.
#[derive(Clone, Debug)]
pub enum MappingEntry {
    /// The first event argument becomes the prop of that name.
    Alias(String),
    Transform(Transformer),
}

impl MappingEntry {
    pub fn alias(name: impl Into<String>) -> Self {
        MappingEntry::Alias(name.into())
    }

    pub(crate) fn depends_on_props(&self) -> bool {
        match self {
            MappingEntry::Alias(_) => false,
            MappingEntry::Transform(t) => t.depends_on_props(),
        }
    }

    pub(crate) fn initial_values(&self) -> &[Value] {
        match self {
            MappingEntry::Alias(_) => &[],
            MappingEntry::Transform(t) => &t.initial_values,
        }
    }

    /// Partial props update produced by one event.
    pub(crate) fn apply(&self, action: &str, args: &[Value], props: &Props) -> PubSubResult<Props> {
        match self {
            MappingEntry::Alias(name) => {
                let payload = args.first().cloned().unwrap_or(Value::Null);
                Ok(Props::from([(name.clone(), payload)]))
            }
            MappingEntry::Transform(t) => t.apply(action, args, props),
        }
    }
}

impl From<&str> for MappingEntry {
    fn from(name: &str) -> Self {
        MappingEntry::alias(name)
    }
}

impl From<String> for MappingEntry {
    fn from(name: String) -> Self {
        MappingEntry::Alias(name)
    }
}

impl From<Transformer> for MappingEntry {
    fn from(transformer: Transformer) -> Self {
        MappingEntry::Transform(transformer)
    }
}

/// Pure accessor returned by an initializer: owner props in, derived props out.
pub type Accessor = Box<dyn Fn(&Props) -> PubSubResult<Props> + Send + Sync>;

type InitializerFn =
    Arc<dyn Fn(&Subscription, Notifier, OwnProps) -> PubSubResult<Accessor> + Send + Sync>;

/// How a connected component derives props from subscribed actions.
#[derive(Clone)]
pub enum SubscriptionMapping {
    /// Action name to alias or transformer, in declaration order.
    Static(Vec<(String, MappingEntry)>),
    /// Runs once per mount and does its own `add` calls.
    Initializer(InitializerFn),
}

impl SubscriptionMapping {
    pub fn from_entries<K, E, I>(entries: I) -> Self
    where
        K: Into<String>,
        E: Into<MappingEntry>,
        I: IntoIterator<Item = (K, E)>,
    {
        SubscriptionMapping::Static(
            entries
                .into_iter()
                .map(|(action, entry)| (action.into(), entry.into()))
                .collect(),
        )
    }

    pub fn initializer<F>(f: F) -> Self
    where
        F: Fn(&Subscription, Notifier, OwnProps) -> PubSubResult<Accessor> + Send + Sync + 'static,
    {
        SubscriptionMapping::Initializer(Arc::new(f))
    }

    pub(crate) fn validate(&self) -> PubSubResult<()> {
        let SubscriptionMapping::Static(entries) = self else {
            return Ok(());
        };

        let mut seen = HashSet::new();
        for (action, entry) in entries {
            if action.is_empty() {
                return Err(invalid_mapping("mapped action names must be non-empty"));
            }
            if !seen.insert(action.as_str()) {
                return Err(invalid_mapping(format!(
                    "action '{}' is mapped more than once",
                    action
                )));
            }
            if let MappingEntry::Alias(name) = entry {
                if name.is_empty() {
                    return Err(invalid_mapping(format!(
                        "alias for action '{}' must be a non-empty prop name",
                        action
                    )));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SubscriptionMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionMapping::Static(entries) => f.debug_tuple("Static").field(entries).finish(),
            SubscriptionMapping::Initializer(_) => f.write_str("Initializer(..)"),
        }
    }
}

/// Method exposed to the component; receives the publisher and its call arguments.
pub type PublishMethod = Arc<dyn Fn(&Publisher, &[Value]) -> PubSubResult<()> + Send + Sync>;

/// Wraps a closure into a [`PublishMethod`].
pub fn publish_method<F>(f: F) -> PublishMethod
where
    F: Fn(&Publisher, &[Value]) -> PubSubResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

type PublishFn = Arc<dyn Fn(&Publisher, &Props) -> PublishProps + Send + Sync>;

/// How a connected component derives props from the publish capability.
#[derive(Clone, Default)]
pub enum PublishMapping {
    /// `{ publish }`.
    #[default]
    Passthrough,
    Methods(Vec<(String, PublishMethod)>),
    Custom {
        f: PublishFn,
        depends_on_props: bool,
    },
}

impl PublishMapping {
    pub fn methods<K, I>(methods: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, PublishMethod)>,
    {
        PublishMapping::Methods(
            methods
                .into_iter()
                .map(|(name, method)| (name.into(), method))
                .collect(),
        )
    }

    /// Computed once per mount.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Publisher) -> PublishProps + Send + Sync + 'static,
    {
        PublishMapping::Custom {
            f: Arc::new(move |publisher, _| f(publisher)),
            depends_on_props: false,
        }
    }

    /// Recomputed every time the owner props change.
    pub fn from_fn_with_props<F>(f: F) -> Self
    where
        F: Fn(&Publisher, &Props) -> PublishProps + Send + Sync + 'static,
    {
        PublishMapping::Custom {
            f: Arc::new(f),
            depends_on_props: true,
        }
    }

    pub fn depends_on_props(&self) -> bool {
        match self {
            PublishMapping::Custom {
                depends_on_props, ..
            } => *depends_on_props,
            _ => false,
        }
    }

    pub(crate) fn compute(&self, publisher: &Publisher, props: &Props) -> PublishProps {
        match self {
            PublishMapping::Passthrough => {
                PublishProps::from([("publish".to_string(), Prop::Publish(publisher.clone()))])
            }
            PublishMapping::Methods(methods) => methods
                .iter()
                .map(|(name, method)| {
                    (
                        name.clone(),
                        Prop::Method(BoundMethod::new(name, publisher.clone(), method.clone())),
                    )
                })
                .collect(),
            PublishMapping::Custom { f, .. } => f(publisher, props),
        }
    }

    pub(crate) fn validate(&self) -> PubSubResult<()> {
        if let PublishMapping::Methods(methods) = self {
            if methods.iter().any(|(name, _)| name.is_empty()) {
                return Err(invalid_mapping("publish method names must be non-empty"));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PublishMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishMapping::Passthrough => f.write_str("Passthrough"),
            PublishMapping::Methods(methods) => f
                .debug_tuple("Methods")
                .field(&methods.iter().map(|(name, _)| name).collect::<Vec<_>>())
                .finish(),
            PublishMapping::Custom {
                depends_on_props, ..
            } => f
                .debug_struct("Custom")
                .field("depends_on_props", depends_on_props)
                .finish(),
        }
    }
}

fn invalid_mapping(reason: impl Into<String>) -> PubSubError {
    PubSubError::InvalidMapping {
        reason: reason.into(),
    }
}
