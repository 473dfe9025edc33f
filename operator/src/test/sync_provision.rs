//! Scenario: a plan with no broker-side async work provisions synchronously, then deprovisions
//! synchronously on delete.

use super::util::*;
use crate::broker_client::{Catalog, MockBrokerClient, OperationResponse, RecordedCall};
use crate::instance::actions;
use kube::{client::Client, Api, ResourceExt};
use reqwest::StatusCode;
use servicecatalog_types::*;
use std::sync::Arc;

#[tokio::test]
async fn sync_provision_then_delete() -> Result<(), Error> {
    let client: Client = Client::try_default().await.unwrap();
    let (uid, namespace) = create_test_namespace(client.clone()).await?;
    let (class, plan) = create_class_and_plan(client.clone(), &namespace, &uid).await?;

    let instance_api: Api<ServiceInstance> = Api::namespaced(client.clone(), &namespace);
    let instance = instance_api
        .create(
            &Default::default(),
            &ServiceInstance::new(
                "test-instance",
                ServiceInstanceSpec {
                    plan_reference: PlanReference {
                        service_class_name: Some(class.metadata.name.clone().unwrap()),
                        service_plan_name: Some(plan.metadata.name.clone().unwrap()),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            ),
        )
        .await?;
    let instance = actions::pending(client.clone(), &instance).await?;

    let parameters = resolved_parameters();
    let desired = actions::desired_snapshot(&plan, &parameters);
    let instance =
        actions::begin_operation(client.clone(), &instance, InstanceOperation::Provision, desired.clone()).await?;

    let mock = Arc::new(MockBrokerClient::new(Catalog { services: Vec::new() }));
    mock.push_provision(Ok((StatusCode::CREATED, OperationResponse::default())));
    let broker_client: Arc<dyn crate::broker_client::BrokerClient> = mock.clone();

    let instance = actions::call_provision(client.clone(), &broker_client, &instance, &class, &plan, &parameters).await?;
    let status = instance.status.as_ref().unwrap();
    assert_eq!(status.provision_status, ProvisionStatus::Provisioned);
    assert!(status.conditions.is_true(ConditionType::Ready));
    assert_eq!(status.external_properties, Some(desired));
    assert_eq!(
        mock.calls(),
        vec![RecordedCall::Provision {
            instance_id: instance.name_any(),
            service_id: class.spec.external_id.clone(),
            plan_id: plan.spec.external_id.clone(),
        }]
    );

    let instance = actions::start_deprovision(client.clone(), &instance).await?;
    mock.push_deprovision(Ok((StatusCode::OK, OperationResponse::default())));
    let instance = actions::call_deprovision(client.clone(), &broker_client, &instance, &class, &plan).await?;
    let status = instance.status.as_ref().unwrap();
    assert_eq!(status.deprovision_status, DeprovisionStatus::Succeeded);
    assert_eq!(status.provision_status, ProvisionStatus::NotProvisioned);
    assert!(!status.conditions.is_true(ConditionType::Ready));
    assert_eq!(
        mock.calls().last().unwrap(),
        &RecordedCall::Deprovision {
            instance_id: instance.name_any(),
            service_id: class.spec.external_id.clone(),
            plan_id: plan.spec.external_id.clone(),
        }
    );

    cleanup(client, &namespace).await?;
    Ok(())
}
