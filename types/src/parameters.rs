use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One `{secretName, secretKey}` pair contributing additional parameters, merged on top of (never
/// overlapping with) the inline `parameters` blob. See the Parameter Resolver, SPEC_FULL.md §4.2.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct ParametersFrom {
    #[serde(rename = "secretName")]
    pub secret_name: String,

    #[serde(rename = "secretKey")]
    pub secret_key: String,
}

/// Snapshot of the plan + parameters a reconcile pass has sent to (or acknowledged from) the
/// broker. Used as both `inProgressProperties` (last-sent) and `externalProperties`
/// (last-acknowledged) on [`crate::instance::ServiceInstanceStatus`] and
/// [`crate::binding::ServiceBindingStatus`].
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct PropertiesSnapshot {
    #[serde(rename = "planID", skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,

    /// Redacted merged parameters (secret-sourced top-level keys replaced with `"<redacted>"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    #[serde(rename = "parameterChecksum", skip_serializing_if = "Option::is_none")]
    pub parameter_checksum: Option<String>,
}
