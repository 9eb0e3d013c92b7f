use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    subscription::Subscription,
    value::{Props, Value},
    PubSubResult,
};

use super::mapping::PublishMethod;

/// Publishing half of a [`Subscription`], handed to publish mappings.
#[derive(Clone)]
pub struct Publisher {
    subscription: Subscription,
}

impl Publisher {
    pub(crate) fn new(subscription: Subscription) -> Self {
        Self { subscription }
    }

    pub fn publish(&self, action: &str, args: &[Value]) -> PubSubResult<()> {
        self.subscription.publish(action, args)
    }
}

impl PartialEq for Publisher {
    fn eq(&self, other: &Self) -> bool {
        self.subscription.ptr_eq(&other.subscription)
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Publisher")
    }
}

/// A [`PublishMethod`] bound to the publisher of one mounted component.
#[derive(Clone)]
pub struct BoundMethod {
    name: String,
    publisher: Publisher,
    method: PublishMethod,
}

impl BoundMethod {
    pub(crate) fn new(name: &str, publisher: Publisher, method: PublishMethod) -> Self {
        Self {
            name: name.to_string(),
            publisher,
            method,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> PubSubResult<()> {
        (self.method)(&self.publisher, args)
    }
}

impl PartialEq for BoundMethod {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.publisher == other.publisher
            && Arc::ptr_eq(&self.method, &other.method)
    }
}

impl fmt::Debug for BoundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoundMethod({})", self.name)
    }
}

/// One prop as seen by the wrapped component.
#[derive(Clone, Debug, PartialEq)]
pub enum Prop {
    Value(Value),
    Publish(Publisher),
    Method(BoundMethod),
}

impl Prop {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Prop::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Value> for Prop {
    fn from(value: Value) -> Self {
        Prop::Value(value)
    }
}

impl From<&str> for Prop {
    fn from(value: &str) -> Self {
        Prop::Value(value.into())
    }
}

impl From<Publisher> for Prop {
    fn from(publisher: Publisher) -> Self {
        Prop::Publish(publisher)
    }
}

/// Props produced by a publish mapping.
pub type PublishProps = HashMap<String, Prop>;

/// Everything the wrapped component receives on render.
#[derive(Clone, Debug)]
pub struct ConnectedProps {
    pub_sub: Subscription,
    props: HashMap<String, Prop>,
}

impl ConnectedProps {
    /// Own props, then subscribed props, then publish props; later sources win.
    pub(crate) fn merge(
        pub_sub: Subscription,
        own: &Props,
        subscribed: &Props,
        publish: &PublishProps,
    ) -> Self {
        let mut props: HashMap<String, Prop> = own
            .iter()
            .chain(subscribed.iter())
            .map(|(k, v)| (k.clone(), Prop::Value(v.clone())))
            .collect();
        props.extend(publish.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { pub_sub, props }
    }

    pub fn pub_sub(&self) -> &Subscription {
        &self.pub_sub
    }

    pub fn get(&self, key: &str) -> Option<&Prop> {
        self.props.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.get(key).and_then(Prop::as_value)
    }

    pub fn publisher(&self, key: &str) -> Option<&Publisher> {
        match self.get(key) {
            Some(Prop::Publish(p)) => Some(p),
            _ => None,
        }
    }

    pub fn method(&self, key: &str) -> Option<&BoundMethod> {
        match self.get(key) {
            Some(Prop::Method(m)) => Some(m),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.props.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Prop)> {
        self.props.iter()
    }
}
