use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A catalog entry published by a [`ServiceBroker`](crate::broker::ServiceBroker). Created,
/// updated, and flagged exclusively by the Broker Reconciler -- never directly editable by users.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "servicecatalog.example.dev",
    version = "v1",
    kind = "ServiceClass",
    plural = "serviceclasses",
    derive = "PartialEq",
    status = "ServiceClassStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".spec.externalName\", \"name\": \"EXTERNAL-NAME\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".spec.brokerName\", \"name\": \"BROKER\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }")]
pub struct ServiceClassSpec {
    /// Broker-assigned, stable identifier. Immutable once set.
    #[serde(rename = "externalID")]
    pub external_id: String,

    #[serde(rename = "externalName")]
    pub external_name: String,

    #[serde(rename = "brokerName")]
    pub broker_name: String,

    pub bindable: bool,

    #[serde(rename = "defaultParameters", skip_serializing_if = "Option::is_none")]
    pub default_parameters: Option<Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ServiceClassStatus {
    /// `true` once the class has disappeared from the broker's most recent catalog fetch. Not
    /// deleted outright so in-flight deprovisions can still reference it.
    #[serde(rename = "removedFromBrokerCatalog", default)]
    pub removed_from_broker_catalog: bool,
}

/// A specific tier of a [`ServiceClass`]. Same lifecycle rules as `ServiceClass`.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "servicecatalog.example.dev",
    version = "v1",
    kind = "ServicePlan",
    plural = "serviceplans",
    derive = "PartialEq",
    status = "ServicePlanStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".spec.externalName\", \"name\": \"EXTERNAL-NAME\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".spec.serviceClassRef\", \"name\": \"CLASS\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }")]
pub struct ServicePlanSpec {
    #[serde(rename = "externalID")]
    pub external_id: String,

    #[serde(rename = "externalName")]
    pub external_name: String,

    #[serde(rename = "serviceClassRef")]
    pub service_class_ref: String,

    #[serde(rename = "brokerName")]
    pub broker_name: String,

    pub bindable: Option<bool>,

    #[serde(rename = "defaultParameters", skip_serializing_if = "Option::is_none")]
    pub default_parameters: Option<Value>,

    /// JSON-schema validating provision/update parameters, verbatim from the broker's catalog.
    #[serde(rename = "instanceCreateParameterSchema", skip_serializing_if = "Option::is_none")]
    pub instance_create_parameter_schema: Option<Value>,

    #[serde(rename = "instanceUpdateParameterSchema", skip_serializing_if = "Option::is_none")]
    pub instance_update_parameter_schema: Option<Value>,

    #[serde(rename = "bindingCreateParameterSchema", skip_serializing_if = "Option::is_none")]
    pub binding_create_parameter_schema: Option<Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ServicePlanStatus {
    #[serde(rename = "removedFromBrokerCatalog", default)]
    pub removed_from_broker_catalog: bool,
}

/// Whether a plan reference resolved to cluster-scoped or namespaced catalog entities (§9:
/// "Dynamic dispatch"). Kept out of the wire types -- it is derived from which fields of
/// [`crate::instance::PlanReference`] are populated, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogScope {
    Cluster,
    Namespaced,
}
