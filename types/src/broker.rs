use crate::conditions::Conditions;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Reference to a Secret carrying the broker's authentication material.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct BrokerAuthInfo {
    /// Name of the Secret, in the Broker's own namespace for namespaced brokers.
    #[serde(rename = "secretName")]
    pub secret_name: String,

    /// Either "basic" (expects `username`/`password` keys) or "bearer" (expects a `token` key).
    pub kind: BrokerAuthKind,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum BrokerAuthKind {
    Basic,
    Bearer,
}

/// How often the broker's catalog is re-fetched. `Manual` still gets re-fetched on every
/// controller resync — see SPEC_FULL.md §4.4 and §9 for why this is documented, not a bug.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub enum RelistBehavior {
    Manual,
    Duration { seconds: u64 },
}

impl Default for RelistBehavior {
    fn default() -> Self {
        RelistBehavior::Duration { seconds: 900 }
    }
}

/// Filters restricting which catalog entries a Broker is allowed to publish into the cluster.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct CatalogRestrictions {
    #[serde(rename = "serviceClassSelector", skip_serializing_if = "Option::is_none")]
    pub service_class_selector: Option<Vec<String>>,
    #[serde(rename = "servicePlanSelector", skip_serializing_if = "Option::is_none")]
    pub service_plan_selector: Option<Vec<String>>,
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "servicecatalog.example.dev",
    version = "v1",
    kind = "ServiceBroker",
    plural = "servicebrokers",
    derive = "PartialEq",
    status = "ServiceBrokerStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.lastConditionState\", \"name\": \"STATUS\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".spec.url\", \"name\": \"URL\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }")]
pub struct ServiceBrokerSpec {
    pub url: String,

    pub auth: Option<BrokerAuthInfo>,

    /// PEM-encoded CA bundle used to verify the broker's TLS certificate. Omit to use the
    /// system trust store.
    #[serde(rename = "caBundle", skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,

    #[serde(rename = "relistBehavior", default)]
    pub relist_behavior: RelistBehavior,

    /// Bumped by users to force an immediate relist regardless of `relistBehavior`.
    #[serde(rename = "relistRequests", default)]
    pub relist_requests: i64,

    #[serde(rename = "catalogRestrictions", skip_serializing_if = "Option::is_none")]
    pub catalog_restrictions: Option<CatalogRestrictions>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ServiceBrokerStatus {
    #[serde(default)]
    pub conditions: Conditions,

    #[serde(rename = "lastConditionState", skip_serializing_if = "Option::is_none")]
    pub last_condition_state: Option<String>,

    /// Value of `spec.relistRequests` last acted upon, so bumping the counter again triggers
    /// another relist.
    #[serde(rename = "reconciledRelistRequests", default)]
    pub reconciled_relist_requests: i64,

    #[serde(rename = "lastCatalogRetrievalTime", skip_serializing_if = "Option::is_none")]
    pub last_catalog_retrieval_time: Option<String>,

    #[serde(rename = "observedGeneration", default)]
    pub observed_generation: i64,

    #[serde(rename = "reconciledGeneration", default)]
    pub reconciled_generation: i64,

    #[serde(rename = "lastUpdated", skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// Short phase summary, derived from `status.conditions`, used only for `FromStr`/`Display`
/// convenience in logs -- not stored directly on the CRD (the conditions list is authoritative).
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, JsonSchema)]
pub enum BrokerPhase {
    Pending,
    Ready,
    ErrorFetchingCatalog,
    Terminating,
}

impl FromStr for BrokerPhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(BrokerPhase::Pending),
            "Ready" => Ok(BrokerPhase::Ready),
            "ErrorFetchingCatalog" => Ok(BrokerPhase::ErrorFetchingCatalog),
            "Terminating" => Ok(BrokerPhase::Terminating),
            _ => Err(()),
        }
    }
}

impl fmt::Display for BrokerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerPhase::Pending => write!(f, "Pending"),
            BrokerPhase::Ready => write!(f, "Ready"),
            BrokerPhase::ErrorFetchingCatalog => write!(f, "ErrorFetchingCatalog"),
            BrokerPhase::Terminating => write!(f, "Terminating"),
        }
    }
}
