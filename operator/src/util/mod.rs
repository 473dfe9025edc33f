use std::time::Duration;

pub mod finalizer;
pub mod reasons;

mod error;
mod feature_gates;

pub use error::*;
pub use feature_gates::FeatureGates;

/// Floor for broker polling and controller resync, matching the teacher's fixed probe interval.
/// Configured intervals below this are silently raised to it (§4.4, §5).
pub const POLL_INTERVAL: Duration = Duration::from_secs(12);

/// Default wall-clock retry budget for an in-progress operation (§4.5), overridable via the
/// `RECONCILIATION_RETRY_DURATION` environment variable.
pub const DEFAULT_RETRY_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Name of the kubernetes resource manager used for server-side-apply status patches.
pub const MANAGER_NAME: &str = "servicecatalog-operator";

/// Version advertised to brokers in the `X-Broker-API-Version` header.
pub const BROKER_API_VERSION: &str = "2.17";
