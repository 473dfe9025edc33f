//! Scenario: the broker accepts a Provision asynchronously (202 + `operation`), and a later poll
//! reports it as succeeded.

use super::util::*;
use crate::broker_client::{Catalog, LastOperationResponse, LastOperationState, MockBrokerClient, OperationResponse, RecordedCall};
use crate::instance::actions;
use kube::{client::Client, Api, ResourceExt};
use reqwest::StatusCode;
use servicecatalog_types::*;
use std::sync::Arc;

#[tokio::test]
async fn async_provision_then_poll() -> Result<(), Error> {
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
    mock.push_provision(Ok((
        StatusCode::ACCEPTED,
        OperationResponse { operation: Some("op-1".to_owned()), dashboard_url: None },
    )));
    let broker_client: Arc<dyn crate::broker_client::BrokerClient> = mock.clone();

    let instance = actions::call_provision(client.clone(), &broker_client, &instance, &class, &plan, &parameters).await?;
    let status = instance.status.as_ref().unwrap();
    assert!(status.async_op_in_progress);
    assert_eq!(status.last_operation.as_deref(), Some("op-1"));
    assert_eq!(status.provision_status, ProvisionStatus::NotProvisioned);

    mock.push_poll_instance(Ok(LastOperationResponse { state: LastOperationState::Succeeded, description: None }));
    let instance = actions::poll_operation(client.clone(), &broker_client, &instance).await?;
    let status = instance.status.as_ref().unwrap();
    assert_eq!(status.provision_status, ProvisionStatus::Provisioned);
    assert!(!status.async_op_in_progress);
    assert!(status.conditions.is_true(ConditionType::Ready));
    assert_eq!(status.external_properties, Some(desired));
    assert_eq!(
        mock.calls().last().unwrap(),
        &RecordedCall::PollInstance { instance_id: instance.name_any() }
    );

    cleanup(client, &namespace).await?;
    Ok(())
}
