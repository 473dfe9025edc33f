//! Stable reason strings reported on `status.conditions[].reason`. Event reasons are part of the
//! public contract and must not drift (§7), so each one lives here as a named constant instead of
//! being inlined at each call site.

pub const PENDING: &str = "Pending";
pub const TERMINATING: &str = "Terminating";

pub mod broker {
    pub const ERROR_FETCHING_CATALOG: &str = "ErrorFetchingCatalog";
    pub const FETCHED_CATALOG: &str = "FetchedCatalog";
}

pub mod instance {
    pub const PROVISIONING: &str = "Provisioning";
    pub const UPDATING: &str = "Updating";
    pub const DEPROVISIONING: &str = "Deprovisioning";
    pub const PROVISIONED_SUCCESSFULLY: &str = "ProvisionedSuccessfully";
    pub const UPDATED_SUCCESSFULLY: &str = "UpdatedSuccessfully";
    pub const DEPROVISIONED_SUCCESSFULLY: &str = "DeprovisionedSuccessfully";
    pub const STARTING_ORPHAN_MITIGATION: &str = "StartingInstanceOrphanMitigation";
    pub const ERROR_RECONCILIATION_RETRY_TIMEOUT: &str = "ErrorReconciliationRetryTimeout";
    pub const DEPROVISION_BLOCKED_BY_CREDENTIALS: &str = "DeprovisionBlockedByCredentials";
    pub const ERROR_NONEXISTENT_SERVICE_CLASS: &str = "ErrorNonexistentClusterServiceClass";
    pub const ERROR_NONEXISTENT_SERVICE_PLAN: &str = "ErrorNonexistentClusterServicePlan";
    pub const ERROR_WITH_PARAMETERS: &str = "ErrorWithParameters";
    pub const ERROR_BROKER_RETRIABLE: &str = "ErrorCallingBroker";
    pub const ERROR_BROKER_TERMINAL: &str = "ErrorBrokerRejectedRequest";
}

pub mod binding {
    pub const BINDING: &str = "Binding";
    pub const UNBINDING: &str = "Unbinding";
    pub const BOUND_SUCCESSFULLY: &str = "BoundSuccessfully";
    pub const UNBOUND_SUCCESSFULLY: &str = "UnboundSuccessfully";
    pub const STARTING_ORPHAN_MITIGATION: &str = "StartingBindingOrphanMitigation";
    pub const ERROR_RECONCILIATION_RETRY_TIMEOUT: &str = "ErrorReconciliationRetryTimeout";
    pub const ERROR_SERVICE_INSTANCE_NOT_READY: &str = "ErrorServiceInstanceNotReady";
    pub const ERROR_WITH_PARAMETERS: &str = "ErrorWithParameters";
    pub const ERROR_BROKER_RETRIABLE: &str = "ErrorCallingBroker";
    pub const ERROR_BROKER_TERMINAL: &str = "ErrorBrokerRejectedRequest";
}
