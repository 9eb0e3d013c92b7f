use dashmap::DashMap;
use tracing::{debug, info, instrument, trace, warn};

use super::{Adapter, Callback, Token};
use crate::{
    config::{FailurePolicy, PubSubConfig},
    error::validate_action,
    value::Value,
    PubSubError, PubSubResult,
};

struct Listener {
    token: Token,
    callback: Callback,
}

/// In-memory adapter: a mapping from action name to its ordered listeners.
///
/// Listeners of one action run in subscription order, synchronously, inside
/// the `publish` call. `publish` iterates over a snapshot of the listener list,
/// so a listener may subscribe, unsubscribe or publish again while it runs.
pub struct DefaultAdapter {
    actions: DashMap<String, Vec<Listener>>,
    failure_policy: FailurePolicy,
    report_missing_listeners: bool,
}

impl Default for DefaultAdapter {
    fn default() -> Self {
        Self::with_config(&PubSubConfig::default())
    }
}

impl DefaultAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &PubSubConfig) -> Self {
        Self {
            actions: DashMap::new(),
            failure_policy: config.failure_policy,
            report_missing_listeners: config.report_missing_listeners,
        }
    }

    /// Number of listeners currently subscribed to `action`.
    pub fn listener_count(&self, action: &str) -> usize {
        self.actions
            .get(action)
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    /// Actions with at least one listener.
    pub fn actions(&self) -> Vec<String> {
        self.actions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn snapshot(&self, action: &str) -> Vec<Callback> {
        self.actions
            .get(action)
            .map(|listeners| {
                listeners
                    .iter()
                    .map(|listener| listener.callback.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Adapter for DefaultAdapter {
    fn subscribe(&self, action: &str, callback: Callback) -> PubSubResult<Token> {
        validate_action("DefaultAdapter::subscribe", action)?;

        let token = Token::new(action);
        self.actions
            .entry(action.to_string())
            .or_default()
            .push(Listener {
                token: token.clone(),
                callback,
            });
        trace!("subscribed {:?}", token);
        Ok(token)
    }

    fn unsubscribe(&self, token: &Token) -> PubSubResult<()> {
        if token.action().is_empty() {
            return Err(PubSubError::invalid_argument(
                "DefaultAdapter::unsubscribe",
                "token",
                "expected a token bound to a non-empty action",
            ));
        }

        let removed = match self.actions.get_mut(token.action()) {
            Some(mut listeners) => {
                match listeners.iter().position(|listener| &listener.token == token) {
                    Some(idx) => {
                        listeners.remove(idx);
                        true
                    }
                    None => false,
                }
            }
            None => false,
        };

        if !removed {
            warn!("You're unsubscribing an unrecognized token {:?}", token);
            return Ok(());
        }

        // 空になったアクションは削除する
        self.actions
            .remove_if(token.action(), |_, listeners| listeners.is_empty());
        trace!("unsubscribed {:?}", token);
        Ok(())
    }

    #[instrument(level = "debug", skip(self, args))]
    fn publish(&self, action: &str, args: &[Value]) -> PubSubResult<()> {
        validate_action("DefaultAdapter::publish", action)?;

        let callbacks = self.snapshot(action);
        if callbacks.is_empty() {
            if self.report_missing_listeners {
                info!("The action '{}' being published has no listeners", action);
            }
            return Ok(());
        }

        trace!("publishing {} to {} listeners: {:?}", action, callbacks.len(), args);
        match self.failure_policy {
            FailurePolicy::AbortBatch => {
                for callback in callbacks {
                    callback(args)?;
                }
                Ok(())
            }
            FailurePolicy::Isolate => {
                let mut first_error = None;
                for (idx, callback) in callbacks.iter().enumerate() {
                    if let Err(e) = callback(args) {
                        warn!("listener #{} for '{}' failed: {}", idx, action, e);
                        first_error.get_or_insert(e);
                    }
                }
                match first_error {
                    Some(e) => {
                        debug!("publish of '{}' finished with failures", action);
                        Err(e)
                    }
                    None => Ok(()),
                }
            }
        }
    }
}
