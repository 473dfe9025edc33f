use crate::broker_client::BrokerClientPool;
use crate::util::{finalizer, Error, FeatureGates, FINALIZER_NAME};
use futures::stream::StreamExt;
use kube::runtime::controller::Action;
use kube::{api::ListParams, client::Client, runtime::Controller, Api, Resource, ResourceExt};
use servicecatalog_types::*;
use std::sync::Arc;
use tokio::time::Duration;

use super::actions;

/// Entrypoint for the `ServiceBroker` controller (§4.4).
pub async fn run(client: Client, feature_gates: FeatureGates) -> Result<(), Error> {
    tracing::info!("starting ServiceBroker controller");

    let api: Api<ServiceBroker> = Api::all(client.clone());
    let context = Arc::new(ContextData::new(client.clone(), feature_gates));

    Controller::new(api, ListParams::default())
        .owns(Api::<ServiceClass>::all(client.clone()), ListParams::default())
        .owns(Api::<ServicePlan>::all(client), ListParams::default())
        .run(reconcile, on_error, context)
        .for_each(|result| async move {
            if let Err(error) = result {
                tracing::warn!(?error, "broker reconciliation error");
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

#[derive(Debug, PartialEq)]
enum BrokerAction {
    Pending,
    AddFinalizer,
    Delete,
    FetchCatalog,
}

async fn reconcile(broker: Arc<ServiceBroker>, context: Arc<ContextData>) -> Result<Action, Error> {
    let client = context.client.clone();
    let namespace = broker.namespace().ok_or_else(|| {
        Error::UserInputError("ServiceBroker resource must be namespaced".to_owned())
    })?;
    let name = broker.name_any();

    let action = determine_action(&broker);
    tracing::debug!(%namespace, %name, ?action, "broker action");

    Ok(match action {
        BrokerAction::Pending => {
            finalizer::add::<ServiceBroker>(client.clone(), &name, &namespace).await?;
            actions::pending(client, &broker).await?;
            Action::requeue(Duration::ZERO)
        }
        BrokerAction::AddFinalizer => {
            finalizer::add::<ServiceBroker>(client, &name, &namespace).await?;
            Action::requeue(Duration::ZERO)
        }
        BrokerAction::Delete => {
            actions::delete_owned_catalog(client.clone(), &namespace, &name).await?;
            context.pool.evict(&crate::broker_client::BrokerKey {
                namespace: namespace.clone(),
                name: name.clone(),
            });
            finalizer::delete::<ServiceBroker>(client, &name, &namespace).await?;
            Action::await_change()
        }
        BrokerAction::FetchCatalog => {
            let updated = actions::fetch_catalog(client, &context.pool, &broker, context.feature_gates).await?;
            Action::requeue(actions::relist_interval(&updated))
        }
    })
}

fn determine_action(broker: &ServiceBroker) -> BrokerAction {
    if broker.meta().deletion_timestamp.is_some() {
        return BrokerAction::Delete;
    }
    if broker.status.is_none() {
        return BrokerAction::Pending;
    }
    if !broker.finalizers().iter().any(|f| f == FINALIZER_NAME) {
        return BrokerAction::AddFinalizer;
    }
    BrokerAction::FetchCatalog
}

fn on_error(broker: Arc<ServiceBroker>, error: &Error, _context: Arc<ContextData>) -> Action {
    tracing::error!(?error, name = %broker.name_any(), "broker reconciliation failed");
    Action::requeue(Duration::from_secs(5))
}
