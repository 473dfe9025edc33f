use crate::conditions::Conditions;
use crate::parameters::{ParametersFrom, PropertiesSnapshot};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifies a (class, plan) pair by exactly one of the four combinations SPEC_FULL.md §3
/// describes. The Reference Resolver (§4.3) turns whichever of these is populated into concrete
/// `ServiceClass`/`ServicePlan` names.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct PlanReference {
    #[serde(rename = "clusterServiceClassExternalName", skip_serializing_if = "Option::is_none")]
    pub cluster_service_class_external_name: Option<String>,
    #[serde(rename = "clusterServicePlanExternalName", skip_serializing_if = "Option::is_none")]
    pub cluster_service_plan_external_name: Option<String>,

    #[serde(rename = "clusterServiceClassName", skip_serializing_if = "Option::is_none")]
    pub cluster_service_class_name: Option<String>,
    #[serde(rename = "clusterServicePlanName", skip_serializing_if = "Option::is_none")]
    pub cluster_service_plan_name: Option<String>,

    #[serde(rename = "serviceClassExternalName", skip_serializing_if = "Option::is_none")]
    pub service_class_external_name: Option<String>,
    #[serde(rename = "servicePlanExternalName", skip_serializing_if = "Option::is_none")]
    pub service_plan_external_name: Option<String>,

    #[serde(rename = "serviceClassName", skip_serializing_if = "Option::is_none")]
    pub service_class_name: Option<String>,
    #[serde(rename = "servicePlanName", skip_serializing_if = "Option::is_none")]
    pub service_plan_name: Option<String>,
}

impl PlanReference {
    /// `true` once the resolver has written concrete internal names back to spec (either of the
    /// `*Name` pairs, cluster-scoped or namespaced).
    pub fn is_resolved(&self) -> bool {
        (self.cluster_service_class_name.is_some() && self.cluster_service_plan_name.is_some())
            || (self.service_class_name.is_some() && self.service_plan_name.is_some())
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum InstanceOperation {
    Provision,
    Update,
    Deprovision,
}

impl fmt::Display for InstanceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceOperation::Provision => write!(f, "Provision"),
            InstanceOperation::Update => write!(f, "Update"),
            InstanceOperation::Deprovision => write!(f, "Deprovision"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ProvisionStatus {
    Provisioned,
    NotProvisioned,
}

impl Default for ProvisionStatus {
    fn default() -> Self {
        ProvisionStatus::NotProvisioned
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum DeprovisionStatus {
    Required,
    NotRequired,
    Succeeded,
    Failed,
}

impl Default for DeprovisionStatus {
    fn default() -> Self {
        DeprovisionStatus::NotRequired
    }
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "servicecatalog.example.dev",
    version = "v1",
    kind = "ServiceInstance",
    plural = "serviceinstances",
    derive = "PartialEq",
    status = "ServiceInstanceStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.lastConditionState\", \"name\": \"STATUS\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".spec.planReference.clusterServicePlanExternalName\", \"name\": \"PLAN\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".spec.planReference.clusterServiceClassExternalName\", \"name\": \"CLASS\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }")]
pub struct ServiceInstanceSpec {
    #[serde(rename = "planReference")]
    pub plan_reference: PlanReference,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    #[serde(rename = "parametersFrom", default, skip_serializing_if = "Vec::is_empty")]
    pub parameters_from: Vec<ParametersFrom>,

    /// Bumped by the user to force the next reconcile to re-send parameters even if nothing else
    /// about the plan reference or inline parameters changed (e.g. after editing a referenced
    /// Secret, which alone does not bump `metadata.generation`).
    #[serde(rename = "updateRequests", default)]
    pub update_requests: i64,

    /// Opaque broker-assigned ID. Immutable once a provision has been attempted.
    #[serde(rename = "externalID", skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ServiceInstanceStatus {
    #[serde(rename = "observedGeneration", default)]
    pub observed_generation: i64,

    #[serde(rename = "reconciledGeneration", default)]
    pub reconciled_generation: i64,

    #[serde(default)]
    pub conditions: Conditions,

    #[serde(rename = "lastConditionState", skip_serializing_if = "Option::is_none")]
    pub last_condition_state: Option<String>,

    #[serde(rename = "currentOperation", skip_serializing_if = "Option::is_none")]
    pub current_operation: Option<InstanceOperation>,

    #[serde(rename = "operationStartTime", skip_serializing_if = "Option::is_none")]
    pub operation_start_time: Option<String>,

    #[serde(rename = "asyncOpInProgress", default)]
    pub async_op_in_progress: bool,

    #[serde(rename = "orphanMitigationInProgress", default)]
    pub orphan_mitigation_in_progress: bool,

    #[serde(rename = "lastOperation", skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<String>,

    #[serde(rename = "provisionStatus", default)]
    pub provision_status: ProvisionStatus,

    #[serde(rename = "deprovisionStatus", default)]
    pub deprovision_status: DeprovisionStatus,

    #[serde(rename = "inProgressProperties", skip_serializing_if = "Option::is_none")]
    pub in_progress_properties: Option<PropertiesSnapshot>,

    #[serde(rename = "externalProperties", skip_serializing_if = "Option::is_none")]
    pub external_properties: Option<PropertiesSnapshot>,

    /// `spec.updateRequests` as of the last successful Provision/Update. Compared against the
    /// current spec value in `needs_update` so bumping `updateRequests` alone (with plan and
    /// parameters otherwise unchanged) still forces an Update.
    #[serde(rename = "lastUpdateRequests", default)]
    pub last_update_requests: i64,

    /// Count of consecutive retriable failures for the in-progress operation. Reset whenever
    /// `currentOperation` changes. Used to compute the retry budget (§4.5) without a side channel.
    #[serde(rename = "reconcileRetries", default)]
    pub reconcile_retries: i64,

    #[serde(rename = "firstRetriableFailureAt", skip_serializing_if = "Option::is_none")]
    pub first_retriable_failure_at: Option<String>,

    #[serde(rename = "lastUpdated", skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}
