//! Scenario: an already-provisioned instance is moved to a different plan, driving `needs_update`
//! true and sending an `UpdateInstance` call with the correct `previous_values.plan_id`.

use super::util::*;
use crate::broker_client::{Catalog, MockBrokerClient, OperationResponse, RecordedCall};
use crate::instance::actions;
use crate::util::reasons;
use kube::{client::Client, Api, ResourceExt};
use reqwest::StatusCode;
use servicecatalog_types::*;
use std::sync::Arc;

#[tokio::test]
async fn update_with_plan_change() -> Result<(), Error> {
    let client: Client = Client::try_default().await.unwrap();
    let (uid, namespace) = create_test_namespace(client.clone()).await?;
    let (class, plan_a) = create_class_and_plan(client.clone(), &namespace, &format!("{}-a", uid)).await?;
    let plan_b = create_plan(client.clone(), &namespace, &class, &format!("{}-b", uid)).await?;

    let instance_api: Api<ServiceInstance> = Api::namespaced(client.clone(), &namespace);
    let instance = instance_api
        .create(
            &Default::default(),
            &ServiceInstance::new(
                "test-instance",
                ServiceInstanceSpec {
                    plan_reference: PlanReference {
                        service_class_name: Some(class.metadata.name.clone().unwrap()),
                        service_plan_name: Some(plan_a.metadata.name.clone().unwrap()),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            ),
        )
        .await?;
    let instance = actions::pending(client.clone(), &instance).await?;

    let parameters = resolved_parameters();
    let desired_a = actions::desired_snapshot(&plan_a, &parameters);
    let instance =
        actions::begin_operation(client.clone(), &instance, InstanceOperation::Provision, desired_a.clone()).await?;

    let mock = Arc::new(MockBrokerClient::new(Catalog { services: Vec::new() }));
    mock.push_provision(Ok((StatusCode::CREATED, OperationResponse::default())));
    let broker_client: Arc<dyn crate::broker_client::BrokerClient> = mock.clone();
    let instance = actions::call_provision(client.clone(), &broker_client, &instance, &class, &plan_a, &parameters).await?;

    let desired_b = actions::desired_snapshot(&plan_b, &parameters);
    assert!(actions::needs_update(&instance, &desired_b));

    let instance =
        actions::begin_operation(client.clone(), &instance, InstanceOperation::Update, desired_b.clone()).await?;
    mock.push_update(Ok((StatusCode::OK, OperationResponse::default())));
    let instance = actions::call_update(client.clone(), &broker_client, &instance, &class, &plan_b, &parameters).await?;

    let status = instance.status.as_ref().unwrap();
    assert_eq!(status.external_properties, Some(desired_b));
    assert_eq!(status.conditions.get(ConditionType::Ready).unwrap().reason, reasons::instance::UPDATED_SUCCESSFULLY);
    assert_eq!(
        mock.calls().last().unwrap(),
        &RecordedCall::UpdateInstance {
            instance_id: instance.name_any(),
            plan_id: plan_b.spec.external_id.clone(),
            previous_plan_id: plan_a.spec.external_id.clone(),
        }
    );

    cleanup(client, &namespace).await?;
    Ok(())
}
