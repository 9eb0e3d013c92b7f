use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tracing::{debug, error, instrument, trace, warn};

use crate::{
    adapter::{callback, Callback},
    registry::{OwnerId, PubSub},
    subscription::Subscription,
    value::{clean_empty_keys, shallow_equal, Props, Value},
    PubSubError, PubSubResult,
};

use super::{
    connector_name,
    mapping::{Accessor, MappingEntry, SubscriptionMapping},
    props::{ConnectedProps, PublishProps, Publisher},
    Component, ConnectorDef,
};

/// State shared between a mounted component and the callbacks it subscribed.
pub(crate) struct InstanceState {
    mounted: bool,
    own_props: Props,
    subscribed: Props,
    subscriptions_changed: bool,
    last_args: HashMap<String, Vec<Value>>,
    revision: u64,
}

impl InstanceState {
    fn new(own_props: Props) -> Self {
        Self {
            mounted: true,
            own_props,
            subscribed: Props::new(),
            subscriptions_changed: false,
            last_args: HashMap::new(),
            revision: 0,
        }
    }

    /// Merges `update` into the subscribed props. A `Null` value removes its key.
    fn merge_subscribed(&mut self, update: Props) -> bool {
        let mut changed = false;
        for (key, value) in update {
            if value.is_null() {
                changed |= self.subscribed.remove(&key).is_some();
            } else if self.subscribed.get(&key) != Some(&value) {
                self.subscribed.insert(key, value);
                changed = true;
            }
        }
        changed
    }

    fn notify(&mut self, update: Props) -> bool {
        if !self.mounted {
            trace!("ignoring notification after unmount");
            return false;
        }
        // 値が同じでも通知は再描画の対象になる
        let changed = self.merge_subscribed(update);
        self.subscriptions_changed = true;
        self.revision += 1;
        changed
    }
}

/// Handed to a subscription initializer; pushes partial updates into the
/// derived props of the component it was created for.
#[derive(Clone)]
pub struct Notifier {
    state: Weak<Mutex<InstanceState>>,
}

impl Notifier {
    fn new(state: &Arc<Mutex<InstanceState>>) -> Self {
        Self {
            state: Arc::downgrade(state),
        }
    }

    /// Marks the component for render. Returns whether the derived props changed.
    pub fn notify(&self, update: Props) -> bool {
        match self.state.upgrade() {
            Some(state) => state.lock().notify(update),
            None => false,
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Notifier")
    }
}

/// Read access to the current owner props of a mounted component.
#[derive(Clone)]
pub struct OwnProps {
    state: Weak<Mutex<InstanceState>>,
}

impl OwnProps {
    fn new(state: &Arc<Mutex<InstanceState>>) -> Self {
        Self {
            state: Arc::downgrade(state),
        }
    }

    pub fn get(&self) -> Props {
        self.state
            .upgrade()
            .map(|state| state.lock().own_props.clone())
            .unwrap_or_default()
    }
}

impl fmt::Debug for OwnProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OwnProps")
    }
}

struct MappedSubscription {
    action: String,
    entry: MappingEntry,
    callback: Callback,
}

/// A component mounted through a [`PubSubConnector`](super::PubSubConnector).
///
/// Owns the per-mount subscription and the derived props. Unmounting, either
/// explicitly or on drop, releases every listener the mount added.
pub struct ConnectedComponent<C> {
    display_name: String,
    component: C,
    def: Arc<ConnectorDef>,
    registry: PubSub,
    owner: OwnerId,
    subscription: Subscription,
    publisher: Publisher,
    state: Arc<Mutex<InstanceState>>,
    mapped: Vec<MappedSubscription>,
    accessor: Option<Accessor>,
    publish_props: PublishProps,
    props_changed: bool,
    unmounted: bool,
}

impl<C: Component> ConnectedComponent<C> {
    #[instrument(level = "debug", skip_all, fields(component = %component.display_name()))]
    pub(crate) fn mount(
        def: Arc<ConnectorDef>,
        component: C,
        own_props: Props,
        registry: PubSub,
    ) -> PubSubResult<Self> {
        let display_name = connector_name(&component.display_name());
        let owner = OwnerId::generate();
        let subscription = registry.register(&owner)?;
        debug!("{} registered as {}", display_name, owner);

        let mut connected = Self {
            display_name,
            component,
            def,
            registry,
            owner,
            publisher: Publisher::new(subscription.clone()),
            subscription,
            state: Arc::new(Mutex::new(InstanceState::new(own_props.clone()))),
            mapped: Vec::new(),
            accessor: None,
            publish_props: PublishProps::new(),
            // 初回は必ず描画する
            props_changed: true,
            unmounted: false,
        };

        if let Err(e) = connected.initialize(&own_props) {
            warn!("mounting {} failed: {}", connected.display_name, e);
            if let Err(cleanup) = connected.unmount() {
                warn!("cleanup of {} failed: {}", connected.display_name, cleanup);
            }
            return Err(e);
        }
        Ok(connected)
    }

    fn initialize(&mut self, own_props: &Props) -> PubSubResult<()> {
        let def = self.def.clone();
        match &def.subscriptions {
            Some(SubscriptionMapping::Static(entries)) => {
                for (action, entry) in entries {
                    self.subscribe_entry(action, entry)?;
                }
            }
            Some(SubscriptionMapping::Initializer(init)) => {
                let accessor = init(
                    &self.subscription,
                    Notifier::new(&self.state),
                    OwnProps::new(&self.state),
                )?;
                let mut mapped = accessor(own_props)?;
                clean_empty_keys(&mut mapped);
                self.state.lock().subscribed = mapped;
                self.accessor = Some(accessor);
            }
            None => {}
        }

        self.publish_props = def.publish.compute(&self.publisher, own_props);

        if def.options.force_initial_values {
            self.invoke_initial_values()?;
        }
        Ok(())
    }

    fn subscribe_entry(&mut self, action: &str, entry: &MappingEntry) -> PubSubResult<()> {
        let callback = entry_callback(
            action,
            entry.clone(),
            Arc::downgrade(&self.state),
            self.def.options.own_props,
        );
        self.subscription.add(action, callback.clone())?;
        self.mapped.push(MappedSubscription {
            action: action.to_string(),
            entry: entry.clone(),
            callback,
        });
        Ok(())
    }

    fn invoke_initial_values(&self) -> PubSubResult<()> {
        for mapped in &self.mapped {
            trace!("replaying initial values of {}", mapped.action);
            (mapped.callback)(mapped.entry.initial_values())?;
        }
        Ok(())
    }

    /// Hands new owner props to the component.
    ///
    /// Returns whether the component has to render again.
    #[instrument(level = "debug", skip_all, fields(component = %self.display_name))]
    pub fn receive_props(&mut self, next: Props) -> PubSubResult<bool> {
        if self.unmounted {
            warn!("{} received props after unmount", self.display_name);
            return Ok(false);
        }

        let previous = {
            let mut state = self.state.lock();
            if shallow_equal(&state.own_props, &next) {
                None
            } else {
                Some(std::mem::replace(&mut state.own_props, next.clone()))
            }
        };

        if let Some(previous) = previous {
            // 失敗しても部分的な更新は描画対象
            self.props_changed = true;
            if let Err(e) = self.apply_own_props(&next) {
                warn!("{} rejected new props: {}", self.display_name, e);
                self.state.lock().own_props = previous;
                return Err(e);
            }
        }

        Ok(self.needs_render())
    }

    /// Recomputes everything derived from the owner props.
    ///
    /// On error the caller restores the previous owner props so the same
    /// props can be handed in again.
    fn apply_own_props(&mut self, next: &Props) -> PubSubResult<()> {
        if self.def.publish.depends_on_props() {
            self.update_publish_props(next);
        }
        if let Some(accessor) = &self.accessor {
            let update = accessor(next)?;
            self.state.lock().merge_subscribed(update);
        }
        if self.def.options.own_props {
            self.reinvoke_props_dependent()?;
        }
        Ok(())
    }

    fn update_publish_props(&mut self, props: &Props) -> bool {
        let next = self.def.publish.compute(&self.publisher, props);
        if shallow_equal(&next, &self.publish_props) {
            return false;
        }
        trace!("publish props of {} changed", self.display_name);
        self.publish_props = next;
        true
    }

    fn reinvoke_props_dependent(&self) -> PubSubResult<()> {
        for mapped in self.mapped.iter().filter(|m| m.entry.depends_on_props()) {
            let args = self.state.lock().last_args.get(&mapped.action).cloned();
            if let Some(args) = args {
                (mapped.callback)(&args)?;
            }
        }
        Ok(())
    }

    pub fn needs_render(&self) -> bool {
        self.props_changed || self.state.lock().subscriptions_changed
    }

    pub fn render(&mut self) -> C::Output {
        let props = {
            let mut state = self.state.lock();
            state.subscriptions_changed = false;
            self.merged_props(&state)
        };
        self.props_changed = false;
        self.component.render(&props)
    }

    pub fn render_if_needed(&mut self) -> Option<C::Output> {
        if self.needs_render() {
            Some(self.render())
        } else {
            None
        }
    }

    /// Props the wrapped component would receive if rendered now.
    pub fn connected_props(&self) -> ConnectedProps {
        self.merged_props(&self.state.lock())
    }

    fn merged_props(&self, state: &InstanceState) -> ConnectedProps {
        ConnectedProps::merge(
            self.subscription.clone(),
            &state.own_props,
            &state.subscribed,
            &self.publish_props,
        )
    }

    pub fn wrapped_instance(&self) -> PubSubResult<&C> {
        if !self.def.options.with_ref {
            return Err(self.ref_not_enabled());
        }
        Ok(&self.component)
    }

    pub fn wrapped_instance_mut(&mut self) -> PubSubResult<&mut C> {
        if !self.def.options.with_ref {
            return Err(self.ref_not_enabled());
        }
        Ok(&mut self.component)
    }

    fn ref_not_enabled(&self) -> PubSubError {
        PubSubError::RefNotEnabled {
            connector: self.display_name.clone(),
        }
    }
}

impl<C> ConnectedComponent<C> {
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn registry(&self) -> &PubSub {
        &self.registry
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn own_props(&self) -> Props {
        self.state.lock().own_props.clone()
    }

    pub fn subscribed_props(&self) -> Props {
        self.state.lock().subscribed.clone()
    }

    pub fn publish_props(&self) -> &PublishProps {
        &self.publish_props
    }

    /// Number of notifications received while mounted.
    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    pub fn has_subscriptions(&self) -> bool {
        match &self.def.subscriptions {
            Some(SubscriptionMapping::Static(_)) => !self.mapped.is_empty(),
            Some(SubscriptionMapping::Initializer(_)) => true,
            None => false,
        }
    }

    pub fn is_mounted(&self) -> bool {
        !self.unmounted
    }

    /// Removes every listener of this mount and unregisters its owner.
    ///
    /// Only the first call does anything.
    #[instrument(level = "debug", skip_all, fields(component = %self.display_name))]
    pub fn unmount(&mut self) -> PubSubResult<()> {
        if self.unmounted {
            debug!("{} is already unmounted", self.display_name);
            return Ok(());
        }
        self.unmounted = true;

        {
            let mut state = self.state.lock();
            state.mounted = false;
            state.last_args.clear();
        }
        self.mapped.clear();
        self.accessor = None;

        self.subscription.unsubscribe()
    }
}

impl<C> Drop for ConnectedComponent<C> {
    fn drop(&mut self) {
        if let Err(e) = self.unmount() {
            error!("failed to unmount {}: {}", self.display_name, e);
        }
    }
}

impl<C> fmt::Debug for ConnectedComponent<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectedComponent")
            .field("display_name", &self.display_name)
            .field("owner", &self.owner)
            .field("mounted", &!self.unmounted)
            .finish()
    }
}

fn entry_callback(
    action: &str,
    entry: MappingEntry,
    state: Weak<Mutex<InstanceState>>,
    own_props: bool,
) -> Callback {
    let action = action.to_string();
    callback(move |args| {
        let Some(state) = state.upgrade() else {
            return Ok(());
        };

        let props = if own_props {
            state.lock().own_props.clone()
        } else {
            Props::new()
        };
        // 変換中はロックを持たない
        let update = entry.apply(&action, args, &props)?;

        let mut state = state.lock();
        if own_props && entry.depends_on_props() {
            state.last_args.insert(action.clone(), args.to_vec());
        }
        state.notify(update);
        Ok(())
    })
}
