use crate::broker_client::BrokerError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    KubeError {
        #[from]
        source: kube::Error,
    },

    #[error("Invalid user input: {0}")]
    UserInputError(String),

    #[error("Failed to parse DateTime: {source}")]
    ChronoError {
        #[from]
        source: chrono::ParseError,
    },

    #[error("Out of range: {source}")]
    OutOfRangeError {
        #[from]
        source: chrono::OutOfRangeError,
    },

    #[error("Json error: {source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },

    #[error("Parse duration: {source}")]
    ParseDurationError {
        #[from]
        source: parse_duration::parse::Error,
    },

    #[error("Broker error: {source}")]
    Broker {
        #[from]
        source: BrokerError,
    },

    /// A reference, secret, or parameter could not be resolved. Always a terminal condition for
    /// the object being reconciled -- cleared only by a spec edit.
    #[error("Terminal condition: {reason}: {message}")]
    Terminal { reason: &'static str, message: String },
}

impl Error {
    pub fn terminal(reason: &'static str, message: impl Into<String>) -> Self {
        Error::Terminal {
            reason,
            message: message.into(),
        }
    }

    /// Classifies this error per §7/§9's `ReconcileError::Terminal`/`Retriable` sentinel: a
    /// terminal outcome is cleared only by a generation bump, never by blind retry.
    pub fn is_terminal(&self) -> bool {
        match self {
            Error::Terminal { .. } => true,
            Error::Broker { source } => source.is_terminal(),
            Error::UserInputError(_) => true,
            _ => false,
        }
    }
}
