use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Deserialize, Debug, Clone)]
pub struct Catalog {
    pub services: Vec<CatalogService>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CatalogService {
    pub id: String,
    pub name: String,
    pub bindable: bool,
    #[serde(default)]
    pub plans: Vec<CatalogPlan>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CatalogPlan {
    pub id: String,
    pub name: String,
    pub bindable: Option<bool>,
    #[serde(default)]
    pub schemas: Option<Value>,
}

#[derive(Serialize, Debug, Clone)]
pub struct ProvisionRequest {
    pub service_id: String,
    pub plan_id: String,
    pub organization_guid: String,
    pub space_guid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    pub accepts_incomplete: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct UpdateInstanceRequest {
    pub service_id: String,
    pub plan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    pub previous_values: PreviousValues,
    pub accepts_incomplete: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct PreviousValues {
    pub plan_id: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct OperationResponse {
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub dashboard_url: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct BindRequest {
    pub service_id: String,
    pub plan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    pub accepts_incomplete: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct BindResponse {
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub credentials: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastOperationState {
    InProgress,
    Succeeded,
    Failed,
    /// The broker reported `410 Gone` rather than a body. Distinct from `Failed` because its
    /// meaning depends on which operation is being polled (§4.5).
    Gone,
}

#[derive(Deserialize, Debug, Clone)]
struct LastOperationResponseWire {
    state: String,
    #[serde(default)]
    #[allow(dead_code)]
    description: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LastOperationResponse {
    pub state: LastOperationState,
    pub description: Option<String>,
}

pub fn parse_last_operation(body: &[u8]) -> Result<LastOperationResponse, serde_json::Error> {
    let wire: LastOperationResponseWire = serde_json::from_slice(body)?;
    let state = match wire.state.as_str() {
        "in progress" => LastOperationState::InProgress,
        "succeeded" => LastOperationState::Succeeded,
        _ => LastOperationState::Failed,
    };
    Ok(LastOperationResponse {
        state,
        description: wire.description,
    })
}
