use crate::binding::{ServiceBinding, ServiceBindingStatus};
use crate::broker::{ServiceBroker, ServiceBrokerStatus};
use crate::catalog::{ServiceClass, ServiceClassStatus, ServicePlan, ServicePlanStatus};
use crate::instance::{ServiceInstance, ServiceInstanceStatus};
use kube::{
    api::{Patch, PatchParams, Resource},
    core::NamespaceResourceScope,
    Api, Client, Error,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{clone::Clone, fmt::Debug};

/// Name reported to the API server as the field manager for every status patch this operator
/// makes. Used consistently across all five reconciled kinds.
pub const MANAGER_NAME: &str = "servicecatalog-operator";

pub trait Object<S: Status> {
    /// Returns a mutable reference to the status object, initializing it with the default value
    /// if it does not exist.
    fn mut_status(&mut self) -> &mut S;
}

pub trait Status {
    fn set_last_updated(&mut self, last_updated: String);
}

macro_rules! impl_object {
    ($kind:ty, $status:ty) => {
        impl Object<$status> for $kind {
            fn mut_status(&mut self) -> &mut $status {
                if self.status.is_some() {
                    return self.status.as_mut().unwrap();
                }
                self.status = Some(Default::default());
                self.status.as_mut().unwrap()
            }
        }
    };
}

impl_object!(ServiceBroker, ServiceBrokerStatus);
impl_object!(ServiceClass, ServiceClassStatus);
impl_object!(ServicePlan, ServicePlanStatus);
impl_object!(ServiceInstance, ServiceInstanceStatus);
impl_object!(ServiceBinding, ServiceBindingStatus);

impl Status for ServiceBrokerStatus {
    fn set_last_updated(&mut self, last_updated: String) {
        self.last_updated = Some(last_updated);
    }
}

impl Status for ServiceInstanceStatus {
    fn set_last_updated(&mut self, last_updated: String) {
        self.last_updated = Some(last_updated);
    }
}

impl Status for ServiceBindingStatus {
    fn set_last_updated(&mut self, last_updated: String) {
        self.last_updated = Some(last_updated);
    }
}

// ServiceClass/ServicePlan statuses carry no `lastUpdated` field (they have no user-facing
// conditions timeline to timestamp); no-op so the same generic `patch_status` helper still
// compiles against them.
impl Status for ServiceClassStatus {
    fn set_last_updated(&mut self, _last_updated: String) {}
}

impl Status for ServicePlanStatus {
    fn set_last_updated(&mut self, _last_updated: String) {}
}

/// Patches the resource's status subresource with the result of `f`, computed as a JSON Merge
/// Patch diff between the unmodified and modified object so only changed fields are sent. Mirrors
/// the teacher's `patch_status` helper, generalized across all five reconciled kinds via the
/// `Object`/`Status` traits above.
pub async fn patch_status<
    S: Status,
    T: Clone + Resource + Object<S> + Serialize + DeserializeOwned + Debug,
>(
    client: Client,
    instance: &T,
    f: impl FnOnce(&mut S),
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Resource<Scope = NamespaceResourceScope>,
{
    let patch = Patch::Json::<T>({
        let mut modified = instance.clone();
        let status = modified.mut_status();
        f(status);
        status.set_last_updated(chrono::Utc::now().to_rfc3339());
        json_patch::diff(
            &serde_json::to_value(instance).unwrap(),
            &serde_json::to_value(&modified).unwrap(),
        )
    });
    let name = instance.meta().name.as_deref().unwrap();
    let namespace = instance.meta().namespace.as_deref().unwrap();
    let api: Api<T> = Api::namespaced(client, namespace);
    Ok(api
        .patch_status(name, &PatchParams::apply(MANAGER_NAME), &patch)
        .await?)
}
