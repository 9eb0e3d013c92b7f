use thiserror::Error;

/// Errors raised by the adapter, subscription, registry and connector layers.
///
/// Contract violations (bad arguments, malformed mappings) are always returned
/// to the caller. Benign teardown races are not errors at all: they are logged
/// through `tracing` and treated as no-ops.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PubSubError {
    #[error("'{call}' received an invalid '{argument}': {reason}")]
    InvalidArgument {
        call: String,
        argument: String,
        reason: String,
    },

    #[error("unsubscribing an unrecognized token for action '{action}'")]
    TokenNotFound { action: String },

    #[error(
        "Could not find a pubsub registry for \"{connector}\". Either mount it under a \
         PubSubProvider, or explicitly pass a registry to \"{connector}\"."
    )]
    MissingRegistry { connector: String },

    #[error("invalid subscription mapping: {reason}")]
    InvalidMapping { reason: String },

    #[error("transformer for action '{action}' returned an invalid result: {reason}")]
    InvalidMappingResult { action: String, reason: String },

    #[error(
        "To access the wrapped instance of \"{connector}\", specify `with_ref: true` in the \
         connector options."
    )]
    RefNotEnabled { connector: String },

    #[error("listener for action '{action}' failed: {message}")]
    Listener { action: String, message: String },
}

pub type PubSubResult<T> = Result<T, PubSubError>;

impl PubSubError {
    pub fn invalid_argument(call: &str, argument: &str, reason: impl Into<String>) -> Self {
        PubSubError::InvalidArgument {
            call: call.to_string(),
            argument: argument.to_string(),
            reason: reason.into(),
        }
    }

    pub fn listener(action: &str, message: impl Into<String>) -> Self {
        PubSubError::Listener {
            action: action.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("PubSub error: {0}")]
    PubSub(#[from] PubSubError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}

/// Rejects empty action names with an error naming the offending call.
pub(crate) fn validate_action(call: &str, action: &str) -> PubSubResult<()> {
    if action.is_empty() {
        return Err(PubSubError::invalid_argument(
            call,
            "action",
            "expected a non-empty action name",
        ));
    }
    Ok(())
}
