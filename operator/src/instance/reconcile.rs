use crate::broker_client::{self, BrokerClientPool};
use crate::util::{finalizer, Error, FeatureGates, FINALIZER_NAME, POLL_INTERVAL};
use futures::stream::StreamExt;
use kube::runtime::controller::Action;
use kube::{api::ListParams, client::Client, runtime::Controller, Resource, ResourceExt};
use servicecatalog_types::*;
use std::sync::Arc;
use tokio::time::Duration;

use super::actions;

/// Entrypoint for the `ServiceInstance` controller (§4.5).
pub async fn run(client: Client, feature_gates: FeatureGates) -> Result<(), Error> {
    tracing::info!("starting ServiceInstance controller");

    let api: kube::Api<ServiceInstance> = kube::Api::all(client.clone());
    let context = Arc::new(ContextData::new(client, feature_gates));

    Controller::new(api, ListParams::default())
        .run(reconcile, on_error, context)
        .for_each(|result| async move {
            if let Err(error) = result {
                tracing::warn!(?error, "instance reconciliation error");
            }
        })
        .await;
    Ok(())
}

struct ContextData {
    client: Client,
    pool: BrokerClientPool,
    feature_gates: FeatureGates,
}

impl ContextData {
    fn new(client: Client, feature_gates: FeatureGates) -> Self {
        ContextData {
            client,
            pool: BrokerClientPool::new(),
            feature_gates,
        }
    }
}

async fn reconcile(instance: Arc<ServiceInstance>, context: Arc<ContextData>) -> Result<Action, Error> {
    let client = context.client.clone();
    let namespace = instance.namespace().ok_or_else(|| {
        Error::UserInputError("ServiceInstance resource must be namespaced".to_owned())
    })?;
    let name = instance.name_any();

    if instance.meta().deletion_timestamp.is_some() {
        return reconcile_deletion(client, &context.pool, context.feature_gates, &instance).await;
    }

    if instance.status.is_none() {
        actions::pending(client, &instance).await?;
        return Ok(Action::requeue(Duration::ZERO));
    }
    if !instance.finalizers().iter().any(|f| f == FINALIZER_NAME) {
        finalizer::add::<ServiceInstance>(client, &name, &namespace).await?;
        return Ok(Action::requeue(Duration::ZERO));
    }

    let status = instance.status.as_ref().unwrap();

    // In-flight work always takes priority over noticing a new generation: finish what the
    // broker already knows about before starting something else.
    if status.async_op_in_progress {
        let broker_client = broker_client_for(client.clone(), &context.pool, context.feature_gates, &namespace, &instance).await?;
        actions::poll_operation(client, &broker_client, &instance).await?;
        return Ok(Action::requeue(POLL_INTERVAL));
    }
    if status.orphan_mitigation_in_progress {
        let broker_client = broker_client_for(client.clone(), &context.pool, context.feature_gates, &namespace, &instance).await?;
        let ResolvedPair { class, plan } = resolved_class_plan(client.clone(), &namespace, &instance).await?;
        actions::call_deprovision(client, &broker_client, &instance, &class, &plan).await?;
        return Ok(Action::requeue(POLL_INTERVAL));
    }

    let generation = instance.meta().generation.unwrap_or(0);
    if status.observed_generation >= generation {
        return Ok(Action::requeue(POLL_INTERVAL));
    }

    if !instance.spec.plan_reference.is_resolved() {
        actions::resolve_references(client, &namespace, &instance).await?;
        return Ok(Action::requeue(Duration::ZERO));
    }

    let ResolvedPair { class, plan } = resolved_class_plan(client.clone(), &namespace, &instance).await?;
    let parameters = crate::parameters::resolve(
        client.clone(),
        &namespace,
        instance.spec.parameters.as_ref(),
        &instance.spec.parameters_from,
    )
    .await?;
    let desired = actions::desired_snapshot(&plan, &parameters);

    match status.provision_status {
        ProvisionStatus::NotProvisioned => {
            if status.current_operation == Some(InstanceOperation::Provision) {
                let broker_client = broker_client_for(client.clone(), &context.pool, context.feature_gates, &namespace, &instance).await?;
                actions::call_provision(client, &broker_client, &instance, &class, &plan, &parameters).await?;
            } else {
                actions::begin_operation(client, &instance, InstanceOperation::Provision, desired).await?;
            }
            Ok(Action::requeue(Duration::ZERO))
        }
        ProvisionStatus::Provisioned if actions::needs_update(&instance, &desired) => {
            if status.current_operation == Some(InstanceOperation::Update) {
                let broker_client = broker_client_for(client.clone(), &context.pool, context.feature_gates, &namespace, &instance).await?;
                actions::call_update(client, &broker_client, &instance, &class, &plan, &parameters).await?;
            } else {
                actions::begin_operation(client, &instance, InstanceOperation::Update, desired).await?;
            }
            Ok(Action::requeue(Duration::ZERO))
        }
        ProvisionStatus::Provisioned => {
            actions::ack_generation(client, &instance).await?;
            Ok(Action::requeue(POLL_INTERVAL))
        }
    }
}

struct ResolvedPair {
    class: ServiceClass,
    plan: ServicePlan,
}

async fn resolved_class_plan(client: Client, namespace: &str, instance: &ServiceInstance) -> Result<ResolvedPair, Error> {
    let loaded = actions::load_class_plan(client, namespace, &instance.spec.plan_reference).await?;
    Ok(ResolvedPair { class: loaded.class, plan: loaded.plan })
}

async fn broker_client_for(
    client: Client,
    pool: &BrokerClientPool,
    feature_gates: FeatureGates,
    namespace: &str,
    instance: &ServiceInstance,
) -> Result<Arc<dyn broker_client::BrokerClient>, Error> {
    let loaded = actions::load_class_plan(client.clone(), namespace, &instance.spec.plan_reference).await?;
    let broker = actions::load_broker(client.clone(), namespace, &loaded.class.spec.broker_name).await?;
    broker_client::client_for(client, pool, &broker, feature_gates).await
}

async fn reconcile_deletion(client: Client, pool: &BrokerClientPool, feature_gates: FeatureGates, instance: &ServiceInstance) -> Result<Action, Error> {
    let namespace = instance.namespace().unwrap();
    let name = instance.name_any();
    let status = match instance.status.as_ref() {
        Some(s) => s,
        None => {
            finalizer::delete::<ServiceInstance>(client, &name, &namespace).await?;
            return Ok(Action::await_change());
        }
    };

    if matches!(status.deprovision_status, DeprovisionStatus::NotRequired | DeprovisionStatus::Succeeded) {
        finalizer::delete::<ServiceInstance>(client, &name, &namespace).await?;
        return Ok(Action::await_change());
    }

    if status.async_op_in_progress {
        let broker_client = broker_client_for(client.clone(), pool, feature_gates, &namespace, instance).await?;
        actions::poll_operation(client, &broker_client, instance).await?;
        return Ok(Action::requeue(POLL_INTERVAL));
    }

    // A binding still referencing this instance blocks deprovision outright, before any broker
    // call or operation-window bookkeeping (§4.5/§4.6).
    if status.current_operation != Some(InstanceOperation::Deprovision)
        && actions::deprovision_blocked_by_bindings(client.clone(), &namespace, &name).await?
    {
        actions::deprovision_blocked(client, instance).await?;
        return Ok(Action::requeue(POLL_INTERVAL));
    }

    let ResolvedPair { class, plan } = resolved_class_plan(client.clone(), &namespace, instance).await?;
    let broker_client = broker_client_for(client.clone(), pool, feature_gates, &namespace, instance).await?;

    // Mid-operation deletion: whatever was in flight (Provision or Update) is abandoned in favor
    // of Deprovision, with a fresh operation window (§4.5 "Concurrency with deletion"). Orphan
    // mitigation already in progress is itself a deprovision and simply continues below.
    if status.current_operation != Some(InstanceOperation::Deprovision) {
        actions::start_deprovision(client.clone(), instance).await?;
        return Ok(Action::requeue(Duration::ZERO));
    }

    actions::call_deprovision(client, &broker_client, instance, &class, &plan).await?;
    Ok(Action::requeue(POLL_INTERVAL))
}

fn on_error(instance: Arc<ServiceInstance>, error: &Error, _context: Arc<ContextData>) -> Action {
    tracing::error!(?error, name = %instance.name_any(), "instance reconciliation failed");
    Action::requeue(Duration::from_secs(5))
}
