use crate::broker_client::{self, BrokerClient, LastOperationState, OperationResponse};
use crate::references;
use crate::util::{reasons, Error, DEFAULT_RETRY_DURATION};
use chrono::Utc;
use kube::api::Api;
use kube::{Client, Resource, ResourceExt};
use reqwest::StatusCode;
use servicecatalog_types::*;
use std::sync::Arc;

/// Sets up the initial status object so the rest of reconciliation can assume its presence.
pub async fn pending(client: Client, instance: &ServiceInstance) -> Result<ServiceInstance, Error> {
    Ok(servicecatalog_types::patch_status(client, instance, |status: &mut ServiceInstanceStatus| {
        status.conditions.set(
            ConditionType::Ready,
            ConditionStatus::Unknown,
            reasons::PENDING,
            "waiting for reference resolution",
            &Utc::now().to_rfc3339(),
        );
        status.last_condition_state = status.conditions.last_condition_state();
    })
    .await?)
}

/// Resolves the plan reference and writes it back to spec (§4.3). The only reconciler write to
/// spec, as opposed to status.
pub async fn resolve_references(
    client: Client,
    namespace: &str,
    instance: &ServiceInstance,
) -> Result<(), Error> {
    let resolved = references::resolve_plan_reference(
        client.clone(),
        namespace,
        &instance.spec.plan_reference,
    )
    .await?;
    let mut plan_reference = instance.spec.plan_reference.clone();
    references::apply_resolution(&mut plan_reference, &resolved);
    references::patch_plan_reference::<ServiceInstance>(client, namespace, &instance.name_any(), &plan_reference)
        .await
}

/// Fetches the `ServiceBroker` owning a resolved class/plan pair, so its pooled HTTP client can be
/// obtained.
pub async fn load_broker(client: Client, namespace: &str, broker_name: &str) -> Result<ServiceBroker, Error> {
    let api: Api<ServiceBroker> = Api::namespaced(client, namespace);
    Ok(api.get(broker_name).await?)
}

pub struct ResolvedClassPlan {
    pub class: ServiceClass,
    pub plan: ServicePlan,
}

pub async fn load_class_plan(
    client: Client,
    namespace: &str,
    plan_reference: &PlanReference,
) -> Result<ResolvedClassPlan, Error> {
    let class_name = plan_reference
        .service_class_name
        .as_ref()
        .or(plan_reference.cluster_service_class_name.as_ref())
        .ok_or_else(|| Error::terminal(reasons::instance::ERROR_NONEXISTENT_SERVICE_CLASS, "unresolved class reference"))?;
    let plan_name = plan_reference
        .service_plan_name
        .as_ref()
        .or(plan_reference.cluster_service_plan_name.as_ref())
        .ok_or_else(|| Error::terminal(reasons::instance::ERROR_NONEXISTENT_SERVICE_PLAN, "unresolved plan reference"))?;

    let class_api: Api<ServiceClass> = Api::namespaced(client.clone(), namespace);
    let plan_api: Api<ServicePlan> = Api::namespaced(client, namespace);
    let class = class_api.get(class_name).await.map_err(|e| match e {
        kube::Error::Api(ae) if ae.code == 404 => {
            Error::terminal(reasons::instance::ERROR_NONEXISTENT_SERVICE_CLASS, "referenced ServiceClass does not exist")
        }
        e => Error::from(e),
    })?;
    let plan = plan_api.get(plan_name).await.map_err(|e| match e {
        kube::Error::Api(ae) if ae.code == 404 => {
            Error::terminal(reasons::instance::ERROR_NONEXISTENT_SERVICE_PLAN, "referenced ServicePlan does not exist")
        }
        e => Error::from(e),
    })?;
    Ok(ResolvedClassPlan { class, plan })
}

/// Builds the snapshot that will become `inProgressProperties` (and, on success,
/// `externalProperties`) for the plan/parameters this reconcile is about to send to the broker.
pub fn desired_snapshot(plan: &ServicePlan, parameters: &crate::parameters::ResolvedParameters) -> PropertiesSnapshot {
    PropertiesSnapshot {
        plan_id: Some(plan.spec.external_id.clone()),
        parameters: Some(parameters.redacted.clone()),
        parameter_checksum: Some(parameters.checksum.clone()),
    }
}

/// `true` if the plan or parameters currently desired differ from what was last sent to the
/// broker, or the user has bumped `spec.updateRequests` since, i.e. an Update is owed (§4.5).
pub fn needs_update(instance: &ServiceInstance, desired: &PropertiesSnapshot) -> bool {
    let status = match instance.status.as_ref() {
        Some(status) => status,
        None => return true,
    };
    match status.external_properties.as_ref() {
        Some(external) => {
            external.plan_id != desired.plan_id
                || external.parameter_checksum != desired.parameter_checksum
                || status.last_update_requests != instance.spec.update_requests
        }
        None => true,
    }
}

/// First pass of the two-pass operation pattern (§4.5): persists `currentOperation`,
/// `operationStartTime`, and `inProgressProperties` without making the broker call yet.
pub async fn begin_operation(
    client: Client,
    instance: &ServiceInstance,
    operation: InstanceOperation,
    snapshot: PropertiesSnapshot,
) -> Result<ServiceInstance, Error> {
    let now = Utc::now().to_rfc3339();
    Ok(servicecatalog_types::patch_status(client, instance, |status: &mut ServiceInstanceStatus| {
        status.current_operation = Some(operation);
        status.operation_start_time = Some(now.clone());
        status.in_progress_properties = Some(snapshot);
        status.reconcile_retries = 0;
        status.first_retriable_failure_at = None;
        status.async_op_in_progress = false;
        status.orphan_mitigation_in_progress = false;
        status.conditions.set(
            ConditionType::Ready,
            ConditionStatus::False,
            match operation {
                InstanceOperation::Provision => reasons::instance::PROVISIONING,
                InstanceOperation::Update => reasons::instance::UPDATING,
                InstanceOperation::Deprovision => reasons::instance::DEPROVISIONING,
            },
            "operation in progress",
            &now,
        );
        status.last_condition_state = status.conditions.last_condition_state();
    })
    .await?)
}

/// Second pass: makes the Provision call and interprets the result (§4.5's orphan-mitigation
/// rules).
pub async fn call_provision(
    client: Client,
    broker_client: &Arc<dyn BrokerClient>,
    instance: &ServiceInstance,
    class: &ServiceClass,
    plan: &ServicePlan,
    parameters: &crate::parameters::ResolvedParameters,
) -> Result<ServiceInstance, Error> {
    let instance_id = instance.spec.external_id.clone().unwrap_or_else(|| instance.name_any());
    let req = broker_client::ProvisionRequest {
        service_id: class.spec.external_id.clone(),
        plan_id: plan.spec.external_id.clone(),
        organization_guid: instance.namespace().unwrap_or_default(),
        space_guid: instance.uid().unwrap_or_default(),
        parameters: Some(parameters.merged.clone()),
        accepts_incomplete: true,
    };
    match broker_client.provision(&instance_id, &req).await {
        Ok((status, response)) => handle_provision_response(client, instance, status, response, parameters).await,
        Err(e) if e.is_ambiguous() => start_orphan_mitigation(client, instance, &e.to_string()).await,
        Err(e) if e.is_terminal() => fail_terminal(client, instance, reasons::instance::ERROR_BROKER_TERMINAL, &e.to_string()).await,
        Err(e) => retry_or_fail(client, instance, &e.to_string()).await,
    }
}

async fn handle_provision_response(
    client: Client,
    instance: &ServiceInstance,
    status: StatusCode,
    response: OperationResponse,
    parameters: &crate::parameters::ResolvedParameters,
) -> Result<ServiceInstance, Error> {
    let now = Utc::now().to_rfc3339();
    if status == StatusCode::OK || status == StatusCode::CREATED {
        let snapshot = instance.status.as_ref().and_then(|s| s.in_progress_properties.clone());
        let update_requests = instance.spec.update_requests;
        let reason = match instance.status.as_ref().and_then(|s| s.current_operation) {
            Some(InstanceOperation::Update) => reasons::instance::UPDATED_SUCCESSFULLY,
            _ => reasons::instance::PROVISIONED_SUCCESSFULLY,
        };
        return Ok(servicecatalog_types::patch_status(client, instance, |s: &mut ServiceInstanceStatus| {
            s.provision_status = ProvisionStatus::Provisioned;
            s.external_properties = snapshot;
            s.last_update_requests = update_requests;
            s.current_operation = None;
            s.operation_start_time = None;
            s.async_op_in_progress = false;
            s.reconcile_retries = 0;
            s.first_retriable_failure_at = None;
            s.conditions.set(ConditionType::Ready, ConditionStatus::True, reason, "operation completed", &now);
            s.last_condition_state = s.conditions.last_condition_state();
        })
        .await?);
    }
    if status == StatusCode::ACCEPTED {
        return Ok(servicecatalog_types::patch_status(client, instance, |s: &mut ServiceInstanceStatus| {
            s.async_op_in_progress = true;
            s.last_operation = response.operation.clone();
        })
        .await?);
    }
    // 2xx other than 200/201/202: ambiguous, broker may hold state.
    let _ = parameters;
    start_orphan_mitigation(client, instance, &format!("unexpected status {}", status)).await
}

/// Puts the instance into orphan mitigation (§4.5): Ready=False with
/// `StartingInstanceOrphanMitigation`, `OrphanMitigation` condition True.
pub async fn start_orphan_mitigation(client: Client, instance: &ServiceInstance, message: &str) -> Result<ServiceInstance, Error> {
    let now = Utc::now().to_rfc3339();
    Ok(servicecatalog_types::patch_status(client, instance, |s: &mut ServiceInstanceStatus| {
        s.orphan_mitigation_in_progress = true;
        s.async_op_in_progress = false;
        s.conditions.set(
            ConditionType::Ready,
            ConditionStatus::False,
            reasons::instance::STARTING_ORPHAN_MITIGATION,
            message,
            &now,
        );
        s.conditions.set(
            ConditionType::OrphanMitigation,
            ConditionStatus::True,
            reasons::instance::STARTING_ORPHAN_MITIGATION,
            message,
            &now,
        );
        s.last_condition_state = s.conditions.last_condition_state();
    })
    .await?)
}

pub async fn call_deprovision(
    client: Client,
    broker_client: &Arc<dyn BrokerClient>,
    instance: &ServiceInstance,
    class: &ServiceClass,
    plan: &ServicePlan,
) -> Result<ServiceInstance, Error> {
    let instance_id = instance.spec.external_id.clone().unwrap_or_else(|| instance.name_any());
    let orphan_mitigation = instance.status.as_ref().map_or(false, |s| s.orphan_mitigation_in_progress);
    match broker_client
        .deprovision(&instance_id, &class.spec.external_id, &plan.spec.external_id)
        .await
    {
        Ok((status, response)) => handle_deprovision_response(client, instance, status, response, orphan_mitigation).await,
        // A direct (non-poll) 410 means the instance is already gone broker-side, same as during
        // polling (spec.md:56) -- route through the response handler's existing GONE branch.
        Err(e) if e.is_gone() => handle_deprovision_response(client, instance, StatusCode::GONE, OperationResponse::default(), orphan_mitigation).await,
        Err(e) if e.is_terminal() => fail_terminal(client, instance, reasons::instance::ERROR_BROKER_TERMINAL, &e.to_string()).await,
        Err(e) => retry_or_fail(client, instance, &e.to_string()).await,
    }
}

async fn handle_deprovision_response(
    client: Client,
    instance: &ServiceInstance,
    status: StatusCode,
    response: OperationResponse,
    orphan_mitigation: bool,
) -> Result<ServiceInstance, Error> {
    let now = Utc::now().to_rfc3339();
    if status == StatusCode::OK || status == StatusCode::GONE {
        return Ok(servicecatalog_types::patch_status(client, instance, |s: &mut ServiceInstanceStatus| {
            s.deprovision_status = DeprovisionStatus::Succeeded;
            s.provision_status = ProvisionStatus::NotProvisioned;
            s.orphan_mitigation_in_progress = false;
            s.current_operation = None;
            s.operation_start_time = None;
            s.async_op_in_progress = false;
            s.conditions.set(ConditionType::Ready, ConditionStatus::False, reasons::instance::DEPROVISIONED_SUCCESSFULLY, "deprovisioned", &now);
            if orphan_mitigation {
                s.conditions.set(ConditionType::OrphanMitigation, ConditionStatus::False, reasons::instance::DEPROVISIONED_SUCCESSFULLY, "deprovisioned", &now);
            }
            s.last_condition_state = s.conditions.last_condition_state();
        })
        .await?);
    }
    if status == StatusCode::ACCEPTED {
        return Ok(servicecatalog_types::patch_status(client, instance, |s: &mut ServiceInstanceStatus| {
            s.async_op_in_progress = true;
            s.last_operation = response.operation.clone();
        })
        .await?);
    }
    retry_or_fail(client, instance, &format!("unexpected deprovision status {}", status)).await
}

pub async fn call_update(
    client: Client,
    broker_client: &Arc<dyn BrokerClient>,
    instance: &ServiceInstance,
    class: &ServiceClass,
    plan: &ServicePlan,
    parameters: &crate::parameters::ResolvedParameters,
) -> Result<ServiceInstance, Error> {
    let instance_id = instance.spec.external_id.clone().unwrap_or_else(|| instance.name_any());
    let previous_plan_id = instance
        .status
        .as_ref()
        .and_then(|s| s.external_properties.as_ref())
        .and_then(|p| p.plan_id.clone())
        .unwrap_or_default();
    let req = broker_client::UpdateInstanceRequest {
        service_id: class.spec.external_id.clone(),
        plan_id: plan.spec.external_id.clone(),
        parameters: Some(parameters.merged.clone()),
        previous_values: broker_client::PreviousValues { plan_id: previous_plan_id },
        accepts_incomplete: true,
    };
    match broker_client.update_instance(&instance_id, &req).await {
        Ok((status, response)) => handle_provision_response(client, instance, status, response, parameters).await,
        Err(e) if e.is_ambiguous() => start_orphan_mitigation(client, instance, &e.to_string()).await,
        Err(e) if e.is_terminal() => fail_terminal(client, instance, reasons::instance::ERROR_BROKER_TERMINAL, &e.to_string()).await,
        Err(e) => retry_or_fail(client, instance, &e.to_string()).await,
    }
}

/// Polls an in-flight async operation. `Gone` is success for deprovision, terminal failure for
/// provision (§4.5, §9).
pub async fn poll_operation(
    client: Client,
    broker_client: &Arc<dyn BrokerClient>,
    instance: &ServiceInstance,
) -> Result<ServiceInstance, Error> {
    let instance_id = instance.spec.external_id.clone().unwrap_or_else(|| instance.name_any());
    let operation = instance.status.as_ref().and_then(|s| s.last_operation.as_deref());
    let current_operation = instance.status.as_ref().and_then(|s| s.current_operation);
    let poll = broker_client.poll_instance_operation(&instance_id, operation).await;
    let now = Utc::now().to_rfc3339();
    match poll {
        Ok(response) => match response.state {
            LastOperationState::Succeeded => match current_operation {
                Some(InstanceOperation::Deprovision) => {
                    Ok(servicecatalog_types::patch_status(client, instance, |s: &mut ServiceInstanceStatus| {
                        s.deprovision_status = DeprovisionStatus::Succeeded;
                        s.provision_status = ProvisionStatus::NotProvisioned;
                        s.async_op_in_progress = false;
                        s.current_operation = None;
                        s.operation_start_time = None;
                        s.conditions.set(ConditionType::Ready, ConditionStatus::False, reasons::instance::DEPROVISIONED_SUCCESSFULLY, "deprovisioned", &now);
                        s.last_condition_state = s.conditions.last_condition_state();
                    })
                    .await?)
                }
                _ => {
                    let snapshot = instance.status.as_ref().and_then(|s| s.in_progress_properties.clone());
                    let reason = match current_operation {
                        Some(InstanceOperation::Update) => reasons::instance::UPDATED_SUCCESSFULLY,
                        _ => reasons::instance::PROVISIONED_SUCCESSFULLY,
                    };
                    let update_requests = instance.spec.update_requests;
                    Ok(servicecatalog_types::patch_status(client, instance, |s: &mut ServiceInstanceStatus| {
                        s.provision_status = ProvisionStatus::Provisioned;
                        s.external_properties = snapshot;
                        s.last_update_requests = update_requests;
                        s.async_op_in_progress = false;
                        s.current_operation = None;
                        s.operation_start_time = None;
                        s.conditions.set(ConditionType::Ready, ConditionStatus::True, reason, "operation completed", &now);
                        s.last_condition_state = s.conditions.last_condition_state();
                    })
                    .await?)
                }
            },
            LastOperationState::Gone => match current_operation {
                Some(InstanceOperation::Deprovision) => {
                    Ok(servicecatalog_types::patch_status(client, instance, |s: &mut ServiceInstanceStatus| {
                        s.deprovision_status = DeprovisionStatus::Succeeded;
                        s.provision_status = ProvisionStatus::NotProvisioned;
                        s.async_op_in_progress = false;
                        s.current_operation = None;
                        s.operation_start_time = None;
                        s.conditions.set(ConditionType::Ready, ConditionStatus::False, reasons::instance::DEPROVISIONED_SUCCESSFULLY, "deprovisioned (410 Gone)", &now);
                        s.last_condition_state = s.conditions.last_condition_state();
                    })
                    .await?)
                }
                // Gone during a provision poll is terminal failure, not success (§4.5, §9).
                _ => fail_terminal(client, instance, reasons::instance::ERROR_BROKER_TERMINAL, "broker reported 410 Gone for in-progress provision").await,
            },
            LastOperationState::InProgress => Ok(instance.clone()),
            LastOperationState::Failed => match current_operation {
                Some(InstanceOperation::Provision) => start_orphan_mitigation(client, instance, response.description.as_deref().unwrap_or("provision failed")).await,
                _ => retry_or_fail(client, instance, response.description.as_deref().unwrap_or("operation failed")).await,
            },
        },
        Err(e) if e.is_terminal() => fail_terminal(client, instance, reasons::instance::ERROR_BROKER_TERMINAL, &e.to_string()).await,
        Err(e) => retry_or_fail(client, instance, &e.to_string()).await,
    }
}

/// Counts a retriable failure against the retry budget (§4.5). Past `RECONCILIATION_RETRY_DURATION`
/// the failure becomes terminal, flipping Provision into orphan mitigation first.
pub async fn retry_or_fail(client: Client, instance: &ServiceInstance, message: &str) -> Result<ServiceInstance, Error> {
    let now = Utc::now();
    let started: chrono::DateTime<Utc> = instance
        .status
        .as_ref()
        .and_then(|s| s.operation_start_time.as_ref())
        .map(|t| t.parse::<chrono::DateTime<Utc>>())
        .transpose()?
        .unwrap_or(now);
    let budget = retry_budget();
    if (now - started).to_std().unwrap_or_default() > budget {
        if instance.status.as_ref().and_then(|s| s.current_operation) == Some(InstanceOperation::Provision) {
            return start_orphan_mitigation(client, instance, "reconciliation retry timeout exceeded").await;
        }
        return fail_terminal(client, instance, reasons::instance::ERROR_RECONCILIATION_RETRY_TIMEOUT, message).await;
    }
    let now_str = now.to_rfc3339();
    Ok(servicecatalog_types::patch_status(client, instance, |s: &mut ServiceInstanceStatus| {
        s.reconcile_retries += 1;
        if s.first_retriable_failure_at.is_none() {
            s.first_retriable_failure_at = Some(now_str.clone());
        }
        s.conditions.set(ConditionType::Ready, ConditionStatus::False, reasons::instance::ERROR_BROKER_RETRIABLE, message, &now_str);
        s.last_condition_state = s.conditions.last_condition_state();
    })
    .await?)
}

pub async fn fail_terminal(client: Client, instance: &ServiceInstance, reason: &'static str, message: &str) -> Result<ServiceInstance, Error> {
    let now = Utc::now().to_rfc3339();
    Ok(servicecatalog_types::patch_status(client, instance, |s: &mut ServiceInstanceStatus| {
        s.current_operation = None;
        s.async_op_in_progress = false;
        s.orphan_mitigation_in_progress = false;
        s.conditions.set(ConditionType::Ready, ConditionStatus::False, reason, message, &now);
        s.conditions.set(ConditionType::Failed, ConditionStatus::True, reason, message, &now);
        s.last_condition_state = s.conditions.last_condition_state();
    })
    .await?)
}

pub fn retry_budget() -> std::time::Duration {
    match std::env::var("RECONCILIATION_RETRY_DURATION") {
        Ok(value) => parse_duration::parse(&value).unwrap_or(DEFAULT_RETRY_DURATION),
        Err(_) => DEFAULT_RETRY_DURATION,
    }
}

/// Records that this generation's spec has been fully accounted for without anything left to send
/// to the broker (e.g. a no-op spec edit, or a `currentOperation` that neither needs provisioning
/// nor updating).
pub async fn ack_generation(client: Client, instance: &ServiceInstance) -> Result<ServiceInstance, Error> {
    let generation = instance.meta().generation.unwrap_or(0);
    Ok(servicecatalog_types::patch_status(client, instance, |s: &mut ServiceInstanceStatus| {
        s.observed_generation = generation;
        s.reconciled_generation = generation;
    })
    .await?)
}

/// Lists `ServiceBinding`s in the instance's namespace still pointing at it via `instanceRef`
/// (§4.5/§4.6: an instance cannot be deprovisioned while bindings still reference it).
pub async fn deprovision_blocked_by_bindings(client: Client, namespace: &str, instance_name: &str) -> Result<bool, Error> {
    let api: Api<ServiceBinding> = Api::namespaced(client, namespace);
    let blocking = api
        .list(&kube::api::ListParams::default())
        .await?
        .items
        .into_iter()
        .any(|b| b.spec.instance_ref == instance_name);
    Ok(blocking)
}

/// Records that deletion is waiting on outstanding `ServiceBinding`s, without starting Deprovision.
pub async fn deprovision_blocked(client: Client, instance: &ServiceInstance) -> Result<ServiceInstance, Error> {
    let now = Utc::now().to_rfc3339();
    Ok(servicecatalog_types::patch_status(client, instance, |s: &mut ServiceInstanceStatus| {
        s.conditions.set(
            ConditionType::Ready,
            ConditionStatus::False,
            reasons::instance::DEPROVISION_BLOCKED_BY_CREDENTIALS,
            "ServiceBindings still reference this instance",
            &now,
        );
        s.last_condition_state = s.conditions.last_condition_state();
    })
    .await?)
}

/// Moves a deletion-requested instance into Deprovision, resetting the operation window (§4.5
/// "Concurrency with deletion").
pub async fn start_deprovision(client: Client, instance: &ServiceInstance) -> Result<ServiceInstance, Error> {
    let now = Utc::now().to_rfc3339();
    Ok(servicecatalog_types::patch_status(client, instance, |s: &mut ServiceInstanceStatus| {
        s.current_operation = Some(InstanceOperation::Deprovision);
        s.operation_start_time = Some(now.clone());
        s.reconcile_retries = 0;
        s.first_retriable_failure_at = None;
        s.async_op_in_progress = false;
        s.deprovision_status = DeprovisionStatus::Required;
        s.conditions.set(ConditionType::Ready, ConditionStatus::False, reasons::instance::DEPROVISIONING, "deprovisioning", &now);
        s.last_condition_state = s.conditions.last_condition_state();
    })
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn needs_update_true_when_no_external_properties_yet() {
        let instance = ServiceInstance::new("my-instance", Default::default());
        let desired = desired_snapshot(&plan("svc-1"), &resolved("abc"));
        assert!(needs_update(&instance, &desired));
    }

    #[test]
    fn needs_update_false_when_unchanged() {
        let mut instance = ServiceInstance::new("my-instance", Default::default());
        let desired = desired_snapshot(&plan("svc-1"), &resolved("abc"));
        instance.status = Some(ServiceInstanceStatus {
            external_properties: Some(desired.clone()),
            ..Default::default()
        });
        assert!(!needs_update(&instance, &desired));
    }

    #[test]
    fn needs_update_true_on_checksum_change() {
        let mut instance = ServiceInstance::new("my-instance", Default::default());
        let previous = desired_snapshot(&plan("svc-1"), &resolved("abc"));
        instance.status = Some(ServiceInstanceStatus {
            external_properties: Some(previous),
            ..Default::default()
        });
        let desired = desired_snapshot(&plan("svc-1"), &resolved("xyz"));
        assert!(needs_update(&instance, &desired));
    }

    #[test]
    fn needs_update_true_on_update_requests_change() {
        let mut instance = ServiceInstance::new("my-instance", ServiceInstanceSpec {
            update_requests: 1,
            ..Default::default()
        });
        let desired = desired_snapshot(&plan("svc-1"), &resolved("abc"));
        instance.status = Some(ServiceInstanceStatus {
            external_properties: Some(desired.clone()),
            last_update_requests: 0,
            ..Default::default()
        });
        assert!(needs_update(&instance, &desired));
    }

    #[test]
    fn retry_budget_defaults_when_env_unset() {
        std::env::remove_var("RECONCILIATION_RETRY_DURATION");
        assert_eq!(retry_budget(), DEFAULT_RETRY_DURATION);
    }
}
