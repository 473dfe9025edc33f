use crate::conditions::Conditions;
use crate::parameters::{ParametersFrom, PropertiesSnapshot};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One step of the ordered transform pipeline applied to a Bind response's credentials map on
/// initial successful Bind (§4.6, §9 "transform list applied on initial write only").
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum SecretTransform {
    RenameKey { from: String, to: String },
    AddKey { key: String, value: String },
    AddKeysFrom { secret_name: String },
    RemoveKey { key: String },
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "servicecatalog.example.dev",
    version = "v1",
    kind = "ServiceBinding",
    plural = "servicebindings",
    derive = "PartialEq",
    status = "ServiceBindingStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.lastConditionState\", \"name\": \"STATUS\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".spec.instanceRef\", \"name\": \"INSTANCE\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }")]
pub struct ServiceBindingSpec {
    /// Name of the parent ServiceInstance, in this ServiceBinding's namespace. Immutable.
    #[serde(rename = "instanceRef")]
    pub instance_ref: String,

    #[serde(rename = "secretName")]
    pub secret_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    #[serde(rename = "parametersFrom", default, skip_serializing_if = "Vec::is_empty")]
    pub parameters_from: Vec<ParametersFrom>,

    #[serde(rename = "secretTransforms", default, skip_serializing_if = "Vec::is_empty")]
    pub secret_transforms: Vec<SecretTransform>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum BindingOperation {
    Bind,
    Unbind,
}

impl fmt::Display for BindingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingOperation::Bind => write!(f, "Bind"),
            BindingOperation::Unbind => write!(f, "Unbind"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum UnbindStatus {
    Required,
    NotRequired,
    Succeeded,
    Failed,
}

impl Default for UnbindStatus {
    fn default() -> Self {
        UnbindStatus::NotRequired
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ServiceBindingStatus {
    #[serde(rename = "observedGeneration", default)]
    pub observed_generation: i64,

    #[serde(rename = "reconciledGeneration", default)]
    pub reconciled_generation: i64,

    #[serde(default)]
    pub conditions: Conditions,

    #[serde(rename = "lastConditionState", skip_serializing_if = "Option::is_none")]
    pub last_condition_state: Option<String>,

    #[serde(rename = "currentOperation", skip_serializing_if = "Option::is_none")]
    pub current_operation: Option<BindingOperation>,

    #[serde(rename = "operationStartTime", skip_serializing_if = "Option::is_none")]
    pub operation_start_time: Option<String>,

    #[serde(rename = "asyncOpInProgress", default)]
    pub async_op_in_progress: bool,

    #[serde(rename = "orphanMitigationInProgress", default)]
    pub orphan_mitigation_in_progress: bool,

    #[serde(rename = "lastOperation", skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<String>,

    #[serde(rename = "unbindStatus", default)]
    pub unbind_status: UnbindStatus,

    #[serde(rename = "inProgressProperties", skip_serializing_if = "Option::is_none")]
    pub in_progress_properties: Option<PropertiesSnapshot>,

    #[serde(rename = "externalProperties", skip_serializing_if = "Option::is_none")]
    pub external_properties: Option<PropertiesSnapshot>,

    #[serde(rename = "reconcileRetries", default)]
    pub reconcile_retries: i64,

    #[serde(rename = "firstRetriableFailureAt", skip_serializing_if = "Option::is_none")]
    pub first_retriable_failure_at: Option<String>,

    #[serde(rename = "lastUpdated", skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}
