use kube::CustomResourceExt;
use servicecatalog_types::*;
use std::fs;

fn main() {
    fs::create_dir_all("../crds").unwrap();
    fs::write(
        "../crds/servicecatalog.example.dev_servicebroker_crd.yaml",
        serde_yaml::to_string(&ServiceBroker::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/servicecatalog.example.dev_serviceclass_crd.yaml",
        serde_yaml::to_string(&ServiceClass::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/servicecatalog.example.dev_serviceplan_crd.yaml",
        serde_yaml::to_string(&ServicePlan::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/servicecatalog.example.dev_serviceinstance_crd.yaml",
        serde_yaml::to_string(&ServiceInstance::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/servicecatalog.example.dev_servicebinding_crd.yaml",
        serde_yaml::to_string(&ServiceBinding::crd()).unwrap(),
    )
    .unwrap();
}
