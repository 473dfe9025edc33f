use crate::broker_client::{self, BrokerClientPool};
use crate::util::{finalizer, Error, FeatureGates, FINALIZER_NAME, POLL_INTERVAL};
use futures::stream::StreamExt;
use kube::runtime::controller::Action;
use kube::{api::ListParams, client::Client, runtime::Controller, Resource, ResourceExt};
use servicecatalog_types::*;
use std::sync::Arc;
use tokio::time::Duration;

use super::actions;

/// Entrypoint for the `ServiceBinding` controller (§4.6).
pub async fn run(client: Client, feature_gates: FeatureGates) -> Result<(), Error> {
    tracing::info!("starting ServiceBinding controller");

    let api: kube::Api<ServiceBinding> = kube::Api::all(client.clone());
    let context = Arc::new(ContextData::new(client, feature_gates));

    Controller::new(api, ListParams::default())
        .run(reconcile, on_error, context)
        .for_each(|result| async move {
            if let Err(error) = result {
                tracing::warn!(?error, "binding reconciliation error");
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

async fn reconcile(binding: Arc<ServiceBinding>, context: Arc<ContextData>) -> Result<Action, Error> {
    let client = context.client.clone();
    let namespace = binding.namespace().ok_or_else(|| {
        Error::UserInputError("ServiceBinding resource must be namespaced".to_owned())
    })?;
    let name = binding.name_any();

    if binding.meta().deletion_timestamp.is_some() {
        return reconcile_deletion(client, &context.pool, context.feature_gates, &binding).await;
    }

    if binding.status.is_none() {
        actions::pending(client, &binding).await?;
        return Ok(Action::requeue(Duration::ZERO));
    }
    if !binding.finalizers().iter().any(|f| f == FINALIZER_NAME) {
        finalizer::add::<ServiceBinding>(client, &name, &namespace).await?;
        return Ok(Action::requeue(Duration::ZERO));
    }

    let status = binding.status.as_ref().unwrap();

    if status.async_op_in_progress {
        let broker_client = broker_client_for(client.clone(), &context.pool, context.feature_gates, &namespace, &binding).await?;
        actions::poll_operation(client, &broker_client, &binding).await?;
        return Ok(Action::requeue(POLL_INTERVAL));
    }
    if status.orphan_mitigation_in_progress {
        let broker_client = broker_client_for(client.clone(), &context.pool, context.feature_gates, &namespace, &binding).await?;
        let ResolvedPair { class, plan } = resolved_class_plan(client.clone(), &namespace, &binding).await?;
        actions::call_unbind(client, &broker_client, &binding, &class, &plan).await?;
        return Ok(Action::requeue(POLL_INTERVAL));
    }

    let generation = binding.meta().generation.unwrap_or(0);
    if status.observed_generation >= generation && status.external_properties.is_some() {
        return Ok(Action::requeue(POLL_INTERVAL));
    }

    let instance = match actions::load_ready_instance(client.clone(), &namespace, &binding.spec.instance_ref).await? {
        Some(instance) => instance,
        None => {
            actions::instance_not_ready(client, &binding).await?;
            return Ok(Action::requeue(POLL_INTERVAL));
        }
    };

    let loaded = crate::instance::load_class_plan(client.clone(), &namespace, &instance.spec.plan_reference).await?;
    let parameters = crate::parameters::resolve(
        client.clone(),
        &namespace,
        binding.spec.parameters.as_ref(),
        &binding.spec.parameters_from,
    )
    .await?;
    let desired = actions::desired_snapshot(&loaded.plan, &parameters);
    let is_initial = status.external_properties.is_none();

    if is_initial || actions::needs_rebind(&binding, &desired) {
        if status.current_operation == Some(BindingOperation::Bind) {
            let broker = actions::load_broker_for(client.clone(), &namespace, &loaded.class).await?;
            let broker_client = broker_client::client_for(client.clone(), &context.pool, &broker, context.feature_gates).await?;
            actions::call_bind(client, &broker_client, &binding, &loaded.class, &loaded.plan, &parameters, is_initial).await?;
        } else {
            actions::begin_operation(client, &binding, BindingOperation::Bind, Some(desired)).await?;
        }
        return Ok(Action::requeue(Duration::ZERO));
    }

    actions::ack_generation(client, &binding).await?;
    Ok(Action::requeue(POLL_INTERVAL))
}

struct ResolvedPair {
    class: ServiceClass,
    plan: ServicePlan,
}

async fn resolved_class_plan(client: Client, namespace: &str, binding: &ServiceBinding) -> Result<ResolvedPair, Error> {
    let instance = actions::load_ready_instance(client.clone(), namespace, &binding.spec.instance_ref)
        .await?
        .ok_or_else(|| Error::terminal(reasons_instance_not_ready(), "parent ServiceInstance is not Ready"))?;
    let loaded = crate::instance::load_class_plan(client, namespace, &instance.spec.plan_reference).await?;
    Ok(ResolvedPair { class: loaded.class, plan: loaded.plan })
}

fn reasons_instance_not_ready() -> &'static str {
    crate::util::reasons::binding::ERROR_SERVICE_INSTANCE_NOT_READY
}

async fn broker_client_for(
    client: Client,
    pool: &BrokerClientPool,
    feature_gates: FeatureGates,
    namespace: &str,
    binding: &ServiceBinding,
) -> Result<Arc<dyn broker_client::BrokerClient>, Error> {
    let ResolvedPair { class, .. } = resolved_class_plan(client.clone(), namespace, binding).await?;
    let broker = actions::load_broker_for(client.clone(), namespace, &class).await?;
    broker_client::client_for(client, pool, &broker, feature_gates).await
}

async fn reconcile_deletion(client: Client, pool: &BrokerClientPool, feature_gates: FeatureGates, binding: &ServiceBinding) -> Result<Action, Error> {
    let namespace = binding.namespace().unwrap();
    let name = binding.name_any();
    let status = match binding.status.as_ref() {
        Some(s) => s,
        None => {
            finalizer::delete::<ServiceBinding>(client, &name, &namespace).await?;
            return Ok(Action::await_change());
        }
    };

    if matches!(status.unbind_status, UnbindStatus::NotRequired | UnbindStatus::Succeeded) {
        finalizer::delete::<ServiceBinding>(client, &name, &namespace).await?;
        return Ok(Action::await_change());
    }

    if status.async_op_in_progress {
        let broker_client = broker_client_for(client.clone(), pool, feature_gates, &namespace, binding).await?;
        actions::poll_operation(client, &broker_client, binding).await?;
        return Ok(Action::requeue(POLL_INTERVAL));
    }

    let ResolvedPair { class, plan } = resolved_class_plan(client.clone(), &namespace, binding).await?;
    let broker_client = broker_client_for(client.clone(), pool, feature_gates, &namespace, binding).await?;

    if status.current_operation != Some(BindingOperation::Unbind) {
        actions::start_unbind(client.clone(), binding).await?;
        return Ok(Action::requeue(Duration::ZERO));
    }

    actions::call_unbind(client, &broker_client, binding, &class, &plan).await?;
    Ok(Action::requeue(POLL_INTERVAL))
}

fn on_error(binding: Arc<ServiceBinding>, error: &Error, _context: Arc<ContextData>) -> Action {
    tracing::error!(?error, name = %binding.name_any(), "binding reconciliation failed");
    Action::requeue(Duration::from_secs(5))
}
