use crate::broker_client::{self, BrokerClient, BrokerClientPool};
use crate::util::{reasons, Error, POLL_INTERVAL};
use chrono::Utc;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use servicecatalog_types::*;
use std::collections::HashMap;
use std::time::Duration;

/// Gives the `ServiceBroker` a finalizer and a default status, unblocking the rest of
/// reconciliation.
pub async fn pending(client: Client, broker: &ServiceBroker) -> Result<ServiceBroker, Error> {
    Ok(patch_status(client, broker, |status| {
        status.conditions.set(
            ConditionType::Ready,
            ConditionStatus::Unknown,
            reasons::PENDING,
            "waiting for first catalog fetch",
            &Utc::now().to_rfc3339(),
        );
        status.last_condition_state = status.conditions.last_condition_state();
    })
    .await?)
}

async fn patch_status(
    client: Client,
    broker: &ServiceBroker,
    f: impl FnOnce(&mut ServiceBrokerStatus),
) -> Result<ServiceBroker, kube::Error> {
    servicecatalog_types::patch_status(client, broker, f).await
}

/// Fetches the catalog, diffs it against stored `ServiceClass`/`ServicePlan` objects, and updates
/// the broker's Ready condition accordingly (§4.4 step 3-4).
pub async fn fetch_catalog(
    client: Client,
    pool: &BrokerClientPool,
    broker: &ServiceBroker,
    feature_gates: crate::util::FeatureGates,
) -> Result<ServiceBroker, Error> {
    let namespace = broker.namespace().unwrap();
    let name = broker.name_any();

    let broker_client = match broker_client::client_for(client.clone(), pool, broker, feature_gates).await {
        Ok(c) => c,
        Err(e) => {
            return Ok(patch_status(client, broker, |status| {
                status.conditions.set(
                    ConditionType::Ready,
                    ConditionStatus::False,
                    reasons::broker::ERROR_FETCHING_CATALOG,
                    &e.to_string(),
                    &Utc::now().to_rfc3339(),
                );
                status.last_condition_state = status.conditions.last_condition_state();
            })
            .await?);
        }
    };

    let catalog = match broker_client.get_catalog().await {
        Ok(catalog) => catalog,
        Err(e) => {
            return Ok(patch_status(client, broker, |status| {
                status.conditions.set(
                    ConditionType::Ready,
                    ConditionStatus::False,
                    reasons::broker::ERROR_FETCHING_CATALOG,
                    &e.to_string(),
                    &Utc::now().to_rfc3339(),
                );
                status.last_condition_state = status.conditions.last_condition_state();
            })
            .await?);
        }
    };

    reconcile_catalog(client.clone(), &namespace, &name, broker, &catalog).await?;

    let now = Utc::now().to_rfc3339();
    Ok(patch_status(client, broker, |status| {
        status.conditions.set(
            ConditionType::Ready,
            ConditionStatus::True,
            reasons::broker::FETCHED_CATALOG,
            "catalog fetched successfully",
            &now,
        );
        status.last_condition_state = status.conditions.last_condition_state();
        status.last_catalog_retrieval_time = Some(now.clone());
        status.reconciled_relist_requests = broker.spec.relist_requests;
        status.reconciled_generation = broker.meta().generation.unwrap_or(0);
        status.observed_generation = broker.meta().generation.unwrap_or(0);
    })
    .await?)
}

/// Creates/updates `ServiceClass`/`ServicePlan` objects for each catalog entry, and marks any
/// stored entry absent from the fetch as `removedFromBrokerCatalog` (never deleted outright, so
/// in-flight deprovisions can still reference them).
async fn reconcile_catalog(
    client: Client,
    namespace: &str,
    broker_name: &str,
    broker: &ServiceBroker,
    catalog: &broker_client::Catalog,
) -> Result<(), Error> {
    let restrictions = broker.spec.catalog_restrictions.as_ref();
    let class_api: Api<ServiceClass> = Api::namespaced(client.clone(), namespace);
    let plan_api: Api<ServicePlan> = Api::namespaced(client.clone(), namespace);

    let owned_selector = format!("{}={}", OWNER_LABEL, broker_name);
    let existing_classes: HashMap<String, ServiceClass> = class_api
        .list(&ListParams::default().labels(&owned_selector))
        .await?
        .items
        .into_iter()
        .map(|c| (c.spec.external_id.clone(), c))
        .collect();
    let existing_plans: HashMap<String, ServicePlan> = plan_api
        .list(&ListParams::default().labels(&owned_selector))
        .await?
        .items
        .into_iter()
        .map(|p| (p.spec.external_id.clone(), p))
        .collect();

    let mut seen_classes = std::collections::HashSet::new();
    let mut seen_plans = std::collections::HashSet::new();

    for service in &catalog.services {
        if let Some(restrictions) = restrictions {
            if let Some(selector) = &restrictions.service_class_selector {
                if !selector.iter().any(|s| s == &service.id || s == &service.name) {
                    continue;
                }
            }
        }
        seen_classes.insert(service.id.clone());
        let class_name = slug(&service.id);
        let hash = crate::references::label_hash(&[&service.name]);
        let spec = ServiceClassSpec {
            external_id: service.id.clone(),
            external_name: service.name.clone(),
            broker_name: broker_name.to_owned(),
            bindable: service.bindable,
            default_parameters: None,
        };
        upsert_class(&class_api, &class_name, broker_name, &hash, spec).await?;

        for plan in &service.plans {
            if let Some(restrictions) = restrictions {
                if let Some(selector) = &restrictions.service_plan_selector {
                    if !selector.iter().any(|s| s == &plan.id || s == &plan.name) {
                        continue;
                    }
                }
            }
            seen_plans.insert(plan.id.clone());
            let plan_name = slug(&plan.id);
            let plan_hash = crate::references::label_hash(&[&plan.name, broker_name, &class_name]);
            let spec = ServicePlanSpec {
                external_id: plan.id.clone(),
                external_name: plan.name.clone(),
                service_class_ref: class_name.clone(),
                broker_name: broker_name.to_owned(),
                bindable: plan.bindable,
                default_parameters: None,
                instance_create_parameter_schema: schema_pointer(
                    &plan.schemas,
                    "/service_instance/create/parameters",
                ),
                instance_update_parameter_schema: schema_pointer(
                    &plan.schemas,
                    "/service_instance/update/parameters",
                ),
                binding_create_parameter_schema: schema_pointer(
                    &plan.schemas,
                    "/service_binding/create/parameters",
                ),
            };
            upsert_plan(&plan_api, &plan_name, broker_name, &plan_hash, spec).await?;
        }
    }

    for (external_id, class) in &existing_classes {
        if !seen_classes.contains(external_id) && !class.status.as_ref().map_or(false, |s| s.removed_from_broker_catalog) {
            servicecatalog_types::patch_status(client.clone(), class, |status: &mut ServiceClassStatus| {
                status.removed_from_broker_catalog = true;
            })
            .await?;
        }
    }
    for (external_id, plan) in &existing_plans {
        if !seen_plans.contains(external_id) && !plan.status.as_ref().map_or(false, |s| s.removed_from_broker_catalog) {
            servicecatalog_types::patch_status(client.clone(), plan, |status: &mut ServicePlanStatus| {
                status.removed_from_broker_catalog = true;
            })
            .await?;
        }
    }

    Ok(())
}

/// Label carried by every `ServiceClass`/`ServicePlan` naming its owning broker, used to scope the
/// catalog diff to this broker's own entries.
pub const OWNER_LABEL: &str = "servicecatalog.example.dev/broker-name";

fn slug(external_id: &str) -> String {
    external_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

fn schema_pointer(schemas: &Option<serde_json::Value>, pointer: &str) -> Option<serde_json::Value> {
    schemas.as_ref()?.pointer(pointer).cloned()
}

async fn upsert_class(
    api: &Api<ServiceClass>,
    name: &str,
    broker_name: &str,
    hash: &str,
    spec: ServiceClassSpec,
) -> Result<(), Error> {
    let object = serde_json::json!({
        "apiVersion": "servicecatalog.example.dev/v1",
        "kind": "ServiceClass",
        "metadata": {
            "name": name,
            "labels": { OWNER_LABEL: broker_name, crate::references::EXTERNAL_NAME_HASH_LABEL: hash },
        },
        "spec": spec,
    });
    api.patch(
        name,
        &PatchParams::apply(crate::util::MANAGER_NAME).force(),
        &Patch::Apply(&object),
    )
    .await?;
    Ok(())
}

async fn upsert_plan(
    api: &Api<ServicePlan>,
    name: &str,
    broker_name: &str,
    hash: &str,
    spec: ServicePlanSpec,
) -> Result<(), Error> {
    let object = serde_json::json!({
        "apiVersion": "servicecatalog.example.dev/v1",
        "kind": "ServicePlan",
        "metadata": {
            "name": name,
            "labels": { OWNER_LABEL: broker_name, crate::references::EXTERNAL_NAME_HASH_LABEL: hash },
        },
        "spec": spec,
    });
    api.patch(
        name,
        &PatchParams::apply(crate::util::MANAGER_NAME).force(),
        &Patch::Apply(&object),
    )
    .await?;
    Ok(())
}

/// Deletes every `ServiceClass`/`ServicePlan` this broker owns, then the finalizer (§4.4 step 1).
pub async fn delete_owned_catalog(client: Client, namespace: &str, broker_name: &str) -> Result<(), Error> {
    let class_api: Api<ServiceClass> = Api::namespaced(client.clone(), namespace);
    let plan_api: Api<ServicePlan> = Api::namespaced(client.clone(), namespace);
    let selector = format!("{}={}", OWNER_LABEL, broker_name);
    let dp = kube::api::DeleteParams::default();
    for class in class_api.list(&ListParams::default().labels(&selector)).await?.items {
        class_api.delete(&class.name_any(), &dp).await?;
    }
    for plan in plan_api.list(&ListParams::default().labels(&selector)).await?.items {
        plan_api.delete(&plan.name_any(), &dp).await?;
    }
    Ok(())
}

/// Effective relist delay, floored at the controller's own resync interval (§4.4: "the minimum
/// effective interval equals the controller resync interval").
pub fn relist_interval(broker: &ServiceBroker) -> Duration {
    match &broker.spec.relist_behavior {
        RelistBehavior::Duration { seconds } => Duration::from_secs(*seconds).max(POLL_INTERVAL),
        RelistBehavior::Manual => Duration::from_secs(24 * 60 * 60),
    }
}
