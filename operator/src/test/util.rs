use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use kube::{client::Client, Api};
use servicecatalog_types::*;

/// Prefix of every namespace a test creates for itself.
pub const NAMESPACE_PREFIX: &str = "servicecatalog-test-";

/// All errors possible during testing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    KubeError {
        #[from]
        source: kube::Error,
    },
    #[error("operator error: {source}")]
    Operator {
        #[from]
        source: crate::util::Error,
    },
}

/// Creates a namespace with a random suffix and returns its short UID and full name, mirroring
/// the teacher's `create_test_namespace` so tests run concurrently without colliding.
pub async fn create_test_namespace(client: Client) -> Result<(String, String), Error> {
    let uid = uuid::Uuid::new_v4().to_string().split('-').next().unwrap().to_string();
    let name = format!("{}{}", NAMESPACE_PREFIX, uid);
    let namespace_api: Api<Namespace> = Api::all(client);
    namespace_api
        .create(
            &Default::default(),
            &Namespace {
                metadata: ObjectMeta { name: Some(name.clone()), ..Default::default() },
                ..Default::default()
            },
        )
        .await?;
    Ok((uid, name))
}

pub async fn delete_namespace(client: Client, name: &str) -> Result<(), Error> {
    let namespace_api: Api<Namespace> = Api::all(client);
    namespace_api.delete(name, &Default::default()).await?;
    Ok(())
}

pub async fn cleanup(client: Client, namespace: &str) -> Result<(), Error> {
    delete_namespace(client, namespace).await
}

/// Creates a `ServiceClass`/`ServicePlan` pair directly (bypassing the Broker Reconciler, which
/// isn't under test here), both pointing at a broker named `test-broker` that is never actually
/// created -- the scenarios drive `instance`/`binding` action functions directly with a
/// `MockBrokerClient`, so nothing ever dereferences `brokerName` against a real `ServiceBroker`.
pub async fn create_class_and_plan(
    client: Client,
    namespace: &str,
    suffix: &str,
) -> Result<(ServiceClass, ServicePlan), Error> {
    let class_api: Api<ServiceClass> = Api::namespaced(client.clone(), namespace);
    let class = class_api
        .create(
            &Default::default(),
            &ServiceClass::new(
                &format!("test-class-{}", suffix),
                ServiceClassSpec {
                    external_id: format!("class-ext-{}", suffix),
                    external_name: "test-service".to_owned(),
                    broker_name: "test-broker".to_owned(),
                    bindable: true,
                    default_parameters: None,
                },
            ),
        )
        .await?;

    let plan_api: Api<ServicePlan> = Api::namespaced(client, namespace);
    let plan = plan_api
        .create(
            &Default::default(),
            &ServicePlan::new(
                &format!("test-plan-{}", suffix),
                ServicePlanSpec {
                    external_id: format!("plan-ext-{}", suffix),
                    external_name: "standard".to_owned(),
                    service_class_ref: class.metadata.name.clone().unwrap(),
                    broker_name: "test-broker".to_owned(),
                    bindable: None,
                    default_parameters: None,
                    instance_create_parameter_schema: None,
                    instance_update_parameter_schema: None,
                    binding_create_parameter_schema: None,
                },
            ),
        )
        .await?;

    Ok((class, plan))
}

/// Creates an additional `ServicePlan` under an already-created `ServiceClass`, for scenarios
/// that need two plans to exercise a plan change (e.g. Update).
pub async fn create_plan(client: Client, namespace: &str, class: &ServiceClass, suffix: &str) -> Result<ServicePlan, Error> {
    let plan_api: Api<ServicePlan> = Api::namespaced(client, namespace);
    Ok(plan_api
        .create(
            &Default::default(),
            &ServicePlan::new(
                &format!("test-plan-{}", suffix),
                ServicePlanSpec {
                    external_id: format!("plan-ext-{}", suffix),
                    external_name: "standard".to_owned(),
                    service_class_ref: class.metadata.name.clone().unwrap(),
                    broker_name: "test-broker".to_owned(),
                    bindable: None,
                    default_parameters: None,
                    instance_create_parameter_schema: None,
                    instance_update_parameter_schema: None,
                    binding_create_parameter_schema: None,
                },
            ),
        )
        .await?)
}

pub fn resolved_parameters() -> crate::parameters::ResolvedParameters {
    crate::parameters::ResolvedParameters {
        merged: serde_json::json!({}),
        redacted: serde_json::json!({}),
        checksum: "test-checksum".to_owned(),
    }
}
