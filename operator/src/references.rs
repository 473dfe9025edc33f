//! Reference Resolver (§4.3): resolves a [`PlanReference`] against the cached catalog, writing
//! concrete internal names back to spec on success.

use crate::util::{reasons, Error};
use kube::api::{Api, ListParams, Patch, PatchParams};
use servicecatalog_types::{CatalogScope, PlanReference, ServiceClass, ServicePlan};
use sha2::{Digest, Sha256};

/// `sha2::Sha256` over the UTF-8 concatenation of the label's components joined with `\0`,
/// matching the wire-label convention in §6 ("each holding a SHA of the referenced string"). Used
/// both as the value the (out-of-scope) webhook would write and as the label-selector value the
/// resolver queries with, so the resolver never needs to list-and-filter client-side.
pub fn label_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("\0").as_bytes());
    hex::encode(hasher.finalize())
}

pub struct Resolved {
    pub class_name: String,
    pub plan_name: String,
}

/// Selected by which of [`PlanReference`]'s four shapes is populated (§9 "Dynamic dispatch").
#[async_trait::async_trait]
pub trait CatalogLookup: Send + Sync {
    fn scope(&self) -> CatalogScope;

    /// Looked up by external name alone: the `ServiceInstance`/`ServiceBinding` spec has no way to
    /// name a broker before the class is resolved, so ambiguity across brokers surfaces as the
    /// same "zero or more than one match" error a same-broker collision would (§4.3).
    async fn find_class_by_external_name(
        &self,
        client: kube::Client,
        namespace: &str,
        external_name: &str,
    ) -> Result<ServiceClass, Error>;

    async fn find_plan_by_external_name(
        &self,
        client: kube::Client,
        namespace: &str,
        broker_name: &str,
        class_name: &str,
        external_name: &str,
    ) -> Result<ServicePlan, Error>;
}

pub struct Namespaced;

#[async_trait::async_trait]
impl CatalogLookup for Namespaced {
    fn scope(&self) -> CatalogScope {
        CatalogScope::Namespaced
    }

    async fn find_class_by_external_name(
        &self,
        client: kube::Client,
        namespace: &str,
        external_name: &str,
    ) -> Result<ServiceClass, Error> {
        let hash = label_hash(&[external_name]);
        let api: Api<ServiceClass> = Api::namespaced(client, namespace);
        find_exactly_one(
            &api,
            &hash,
            reasons::instance::ERROR_NONEXISTENT_SERVICE_CLASS,
            external_name,
        )
        .await
    }

    async fn find_plan_by_external_name(
        &self,
        client: kube::Client,
        namespace: &str,
        broker_name: &str,
        class_name: &str,
        external_name: &str,
    ) -> Result<ServicePlan, Error> {
        let hash = label_hash(&[external_name, broker_name, class_name]);
        let api: Api<ServicePlan> = Api::namespaced(client, namespace);
        find_exactly_one(
            &api,
            &hash,
            reasons::instance::ERROR_NONEXISTENT_SERVICE_PLAN,
            external_name,
        )
        .await
    }
}

/// Cluster-scoped catalog entities are modeled as `ServiceClass`/`ServicePlan` resources in a
/// well-known namespace (§9: a single scope-parameterized kind rather than doubling every CRD).
pub struct ClusterScoped {
    pub namespace: String,
}

#[async_trait::async_trait]
impl CatalogLookup for ClusterScoped {
    fn scope(&self) -> CatalogScope {
        CatalogScope::Cluster
    }

    async fn find_class_by_external_name(
        &self,
        client: kube::Client,
        _namespace: &str,
        external_name: &str,
    ) -> Result<ServiceClass, Error> {
        Namespaced
            .find_class_by_external_name(client, &self.namespace, external_name)
            .await
    }

    async fn find_plan_by_external_name(
        &self,
        client: kube::Client,
        _namespace: &str,
        broker_name: &str,
        class_name: &str,
        external_name: &str,
    ) -> Result<ServicePlan, Error> {
        Namespaced
            .find_plan_by_external_name(client, &self.namespace, broker_name, class_name, external_name)
            .await
    }
}

/// Name of the label a `ServiceClass`/`ServicePlan` carries, holding [`label_hash`] of its own
/// external name plus owning broker/class (§4.3, §6).
pub const EXTERNAL_NAME_HASH_LABEL: &str = "servicecatalog.example.dev/external-name-hash";

async fn find_exactly_one<T>(
    api: &Api<T>,
    hash: &str,
    not_found_reason: &'static str,
    external_name: &str,
) -> Result<T, Error>
where
    T: Clone
        + std::fmt::Debug
        + for<'de> serde::Deserialize<'de>
        + serde::Serialize
        + kube::Resource<Scope = kube::core::NamespaceResourceScope>,
    <T as kube::Resource>::DynamicType: Default,
{
    let selector = format!("{}={}", EXTERNAL_NAME_HASH_LABEL, hash);
    let items = api
        .list(&ListParams::default().labels(&selector))
        .await?
        .items;
    match items.len() {
        1 => Ok(items.into_iter().next().unwrap()),
        0 => Err(Error::terminal(
            not_found_reason,
            format!("no catalog entry found for external name {}", external_name),
        )),
        _ => Err(Error::terminal(
            not_found_reason,
            format!(
                "ambiguous catalog entry for external name {}: {} matches",
                external_name,
                items.len()
            ),
        )),
    }
}

/// Chooses a [`CatalogLookup`] implementation from which of [`PlanReference`]'s shapes is
/// populated, and writes the resolved internal names back to the instance/binding's spec -- the
/// only path that writes to spec (rather than status) during reconciliation (§4.3).
pub async fn resolve_plan_reference(
    client: kube::Client,
    namespace: &str,
    plan_reference: &PlanReference,
) -> Result<Resolved, Error> {
    if let (Some(class_name), Some(plan_name)) = (
        &plan_reference.service_class_name,
        &plan_reference.service_plan_name,
    ) {
        return Ok(Resolved {
            class_name: class_name.clone(),
            plan_name: plan_name.clone(),
        });
    }
    if let (Some(class_name), Some(plan_name)) = (
        &plan_reference.cluster_service_class_name,
        &plan_reference.cluster_service_plan_name,
    ) {
        return Ok(Resolved {
            class_name: class_name.clone(),
            plan_name: plan_name.clone(),
        });
    }

    let lookup: Box<dyn CatalogLookup> = if plan_reference.cluster_service_class_external_name.is_some() {
        Box::new(ClusterScoped {
            namespace: namespace.to_owned(),
        })
    } else {
        Box::new(Namespaced)
    };

    let class_external_name = plan_reference
        .cluster_service_class_external_name
        .as_ref()
        .or(plan_reference.service_class_external_name.as_ref())
        .ok_or_else(|| {
            Error::terminal(
                reasons::instance::ERROR_NONEXISTENT_SERVICE_CLASS,
                "plan reference has no recognizable shape".to_owned(),
            )
        })?;
    let plan_external_name = plan_reference
        .cluster_service_plan_external_name
        .as_ref()
        .or(plan_reference.service_plan_external_name.as_ref())
        .ok_or_else(|| {
            Error::terminal(
                reasons::instance::ERROR_NONEXISTENT_SERVICE_PLAN,
                "plan reference has no recognizable shape".to_owned(),
            )
        })?;

    let class = lookup
        .find_class_by_external_name(client.clone(), namespace, class_external_name)
        .await?;
    let class_name = class.metadata.name.clone().unwrap();
    let plan = lookup
        .find_plan_by_external_name(client, namespace, &class.spec.broker_name, &class_name, plan_external_name)
        .await?;

    Ok(Resolved {
        class_name,
        plan_name: plan.metadata.name.clone().unwrap(),
    })
}

/// Writes the resolved internal names back into the plan reference (spec mutation), preserving
/// cluster vs. namespaced shape.
pub fn apply_resolution(plan_reference: &mut PlanReference, resolved: &Resolved) {
    if plan_reference.cluster_service_class_external_name.is_some() {
        plan_reference.cluster_service_class_name = Some(resolved.class_name.clone());
        plan_reference.cluster_service_plan_name = Some(resolved.plan_name.clone());
    } else {
        plan_reference.service_class_name = Some(resolved.class_name.clone());
        plan_reference.service_plan_name = Some(resolved.plan_name.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_hash_is_order_sensitive() {
        assert_ne!(label_hash(&["a", "b"]), label_hash(&["b", "a"]));
    }

    #[test]
    fn label_hash_is_stable() {
        assert_eq!(label_hash(&["my-plan", "my-broker", "my-class"]), label_hash(&["my-plan", "my-broker", "my-class"]));
    }

    #[test]
    fn class_hash_ignores_broker() {
        // A class is looked up by external name alone, independent of which broker serves it
        // (see resolve_plan_reference's doc comment) -- two different brokers' hashes must never
        // be computed differently for the same class lookup.
        assert_eq!(label_hash(&["my-db"]), label_hash(&["my-db"]));
    }
}

/// Persists `plan_reference`'s resolved names to the instance's spec via a JSON merge patch.
pub async fn patch_plan_reference<T>(
    client: kube::Client,
    namespace: &str,
    name: &str,
    plan_reference: &PlanReference,
) -> Result<(), Error>
where
    T: Clone
        + std::fmt::Debug
        + for<'de> serde::Deserialize<'de>
        + serde::Serialize
        + kube::Resource<Scope = kube::core::NamespaceResourceScope>,
    <T as kube::Resource>::DynamicType: Default,
{
    let api: Api<T> = Api::namespaced(client, namespace);
    let patch = serde_json::json!({ "spec": { "planReference": plan_reference } });
    api.patch(
        name,
        &PatchParams::apply(crate::util::MANAGER_NAME),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}
