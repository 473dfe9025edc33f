/// Errors surfaced by the broker HTTP client. Classification into terminal/retriable drives the
/// `ReconcileError::Terminal`/`Retriable` split described in §7/§9.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// HTTP status error with the broker's own error code/description, per §4.1's response
    /// taxonomy.
    #[error("broker returned HTTP {status} ({error_code:?}): {description:?}")]
    Http {
        status: u16,
        error_code: Option<String>,
        description: Option<String>,
    },

    /// Connection, DNS, or other non-HTTP transport failure. Always retriable.
    #[error("transport error: {source}")]
    Transport {
        #[from]
        source: reqwest::Error,
    },

    /// The caller-supplied timeout elapsed before the broker responded. For Provision this is
    /// treated as an ambiguous outcome that triggers orphan mitigation (§4.1, §4.5).
    #[error("broker request timed out")]
    Timeout,

    /// The response body could not be parsed as the expected JSON shape.
    #[error("malformed broker response: {source}")]
    Decode {
        #[from]
        source: serde_json::Error,
    },
}

impl BrokerError {
    /// `true` for outcomes where the broker's effect is unknowable and a Provision must enter
    /// orphan mitigation rather than being retried in place (§4.5 "ambiguous outcome").
    pub fn is_ambiguous(&self) -> bool {
        match self {
            BrokerError::Timeout => true,
            BrokerError::Transport { .. } => true,
            BrokerError::Http { status, .. } => (500..600).contains(status),
            BrokerError::Decode { .. } => false,
        }
    }

    /// `true` if the broker's rejection is definitive and retrying the same request would not
    /// help (§4.1: HTTP 400 is terminal; 408/5xx and transport errors are retriable). `410` is
    /// excluded: it's neither terminal nor retriable in the usual sense -- callers must check
    /// `is_gone()` first and handle it per the calling context (spec.md:56,119).
    pub fn is_terminal(&self) -> bool {
        match self {
            BrokerError::Http { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 410 && *status != 422
            }
            BrokerError::Decode { .. } => true,
            BrokerError::Timeout | BrokerError::Transport { .. } => false,
        }
    }

    /// `true` if this is a `410 Gone` response, whose meaning depends on the calling context
    /// (success during deprovision/unbind polling, terminal failure during provision polling).
    pub fn is_gone(&self) -> bool {
        matches!(self, BrokerError::Http { status: 410, .. })
    }

    /// `true` if this is a `422 ConcurrencyError`, retriable per §4.1/§7.
    pub fn is_concurrency_error(&self) -> bool {
        matches!(
            self,
            BrokerError::Http { status: 422, error_code, .. }
                if error_code.as_deref() == Some("ConcurrencyError")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> BrokerError {
        BrokerError::Http { status, error_code: None, description: None }
    }

    #[test]
    fn is_gone_true_only_for_410() {
        assert!(http(410).is_gone());
        assert!(!http(409).is_gone());
        assert!(!http(500).is_gone());
    }

    #[test]
    fn is_terminal_excludes_410() {
        assert!(!http(410).is_terminal());
        assert!(http(400).is_terminal());
        assert!(!http(408).is_terminal());
        assert!(!http(422).is_terminal());
        assert!(!http(500).is_terminal());
    }
}
