use super::client::BrokerClient;
use super::error::BrokerError;
use super::types::*;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Mutex;

/// One recorded call into [`MockBrokerClient`], used by reconciler tests to assert the exact
/// sequence of broker interactions a scenario produces (§8: "verified by recorded broker call
/// log").
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    GetCatalog,
    Provision { instance_id: String, service_id: String, plan_id: String },
    UpdateInstance { instance_id: String, plan_id: String, previous_plan_id: String },
    Deprovision { instance_id: String, service_id: String, plan_id: String },
    PollInstance { instance_id: String },
    Bind { instance_id: String, binding_id: String },
    Unbind { instance_id: String, binding_id: String },
    PollBinding { instance_id: String, binding_id: String },
}

type Responder<T> = Box<dyn Fn() -> Result<T, BrokerError> + Send + Sync>;

/// In-memory, call-recording stand-in for [`BrokerClient`]. No HTTP mocking crate is present
/// anywhere in the retrieved corpus, so each scripted response is a boxed closure installed by the
/// test, returned in sequence -- the last-installed responder repeats once exhausted.
pub struct MockBrokerClient {
    calls: Mutex<Vec<RecordedCall>>,
    catalog: Responder<Catalog>,
    provision: Mutex<Vec<Responder<(StatusCode, OperationResponse)>>>,
    update: Mutex<Vec<Responder<(StatusCode, OperationResponse)>>>,
    deprovision: Mutex<Vec<Responder<(StatusCode, OperationResponse)>>>,
    poll_instance: Mutex<Vec<Responder<LastOperationResponse>>>,
    bind: Mutex<Vec<Responder<(StatusCode, BindResponse)>>>,
    unbind: Mutex<Vec<Responder<(StatusCode, OperationResponse)>>>,
    poll_binding: Mutex<Vec<Responder<LastOperationResponse>>>,
}

impl MockBrokerClient {
    pub fn new(catalog: Catalog) -> Self {
        MockBrokerClient {
            calls: Mutex::new(Vec::new()),
            catalog: Box::new(move || Ok(catalog.clone())),
            provision: Mutex::new(Vec::new()),
            update: Mutex::new(Vec::new()),
            deprovision: Mutex::new(Vec::new()),
            poll_instance: Mutex::new(Vec::new()),
            bind: Mutex::new(Vec::new()),
            unbind: Mutex::new(Vec::new()),
            poll_binding: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn push_provision(&self, result: Result<(StatusCode, OperationResponse), BrokerError>) {
        self.provision.lock().unwrap().push(Box::new(move || clone_result(&result)));
    }

    pub fn push_update(&self, result: Result<(StatusCode, OperationResponse), BrokerError>) {
        self.update.lock().unwrap().push(Box::new(move || clone_result(&result)));
    }

    pub fn push_deprovision(&self, result: Result<(StatusCode, OperationResponse), BrokerError>) {
        self.deprovision.lock().unwrap().push(Box::new(move || clone_result(&result)));
    }

    pub fn push_poll_instance(&self, result: Result<LastOperationResponse, BrokerError>) {
        self.poll_instance.lock().unwrap().push(Box::new(move || clone_result(&result)));
    }

    pub fn push_bind(&self, result: Result<(StatusCode, BindResponse), BrokerError>) {
        self.bind.lock().unwrap().push(Box::new(move || clone_result(&result)));
    }

    pub fn push_unbind(&self, result: Result<(StatusCode, OperationResponse), BrokerError>) {
        self.unbind.lock().unwrap().push(Box::new(move || clone_result(&result)));
    }

    pub fn push_poll_binding(&self, result: Result<LastOperationResponse, BrokerError>) {
        self.poll_binding.lock().unwrap().push(Box::new(move || clone_result(&result)));
    }
}

fn clone_result<T: Clone>(result: &Result<T, BrokerError>) -> Result<T, BrokerError> {
    match result {
        Ok(v) => Ok(v.clone()),
        Err(e) => Err(clone_err(e)),
    }
}

fn clone_err(e: &BrokerError) -> BrokerError {
    match e {
        BrokerError::Http { status, error_code, description } => BrokerError::Http {
            status: *status,
            error_code: error_code.clone(),
            description: description.clone(),
        },
        BrokerError::Timeout => BrokerError::Timeout,
        BrokerError::Transport { .. } => BrokerError::Timeout,
        BrokerError::Decode { .. } => BrokerError::Timeout,
    }
}

fn next<T>(queue: &Mutex<Vec<Responder<T>>>) -> Result<T, BrokerError> {
    let mut queue = queue.lock().unwrap();
    if queue.len() > 1 {
        (queue.remove(0))()
    } else {
        queue.first().expect("no responder scripted for this call")()
    }
}

#[async_trait]
impl BrokerClient for MockBrokerClient {
    async fn get_catalog(&self) -> Result<Catalog, BrokerError> {
        self.calls.lock().unwrap().push(RecordedCall::GetCatalog);
        (self.catalog)()
    }

    async fn provision(
        &self,
        instance_id: &str,
        req: &ProvisionRequest,
    ) -> Result<(StatusCode, OperationResponse), BrokerError> {
        self.calls.lock().unwrap().push(RecordedCall::Provision {
            instance_id: instance_id.to_owned(),
            service_id: req.service_id.clone(),
            plan_id: req.plan_id.clone(),
        });
        next(&self.provision)
    }

    async fn update_instance(
        &self,
        instance_id: &str,
        req: &UpdateInstanceRequest,
    ) -> Result<(StatusCode, OperationResponse), BrokerError> {
        self.calls.lock().unwrap().push(RecordedCall::UpdateInstance {
            instance_id: instance_id.to_owned(),
            plan_id: req.plan_id.clone(),
            previous_plan_id: req.previous_values.plan_id.clone(),
        });
        next(&self.update)
    }

    async fn deprovision(
        &self,
        instance_id: &str,
        service_id: &str,
        plan_id: &str,
    ) -> Result<(StatusCode, OperationResponse), BrokerError> {
        self.calls.lock().unwrap().push(RecordedCall::Deprovision {
            instance_id: instance_id.to_owned(),
            service_id: service_id.to_owned(),
            plan_id: plan_id.to_owned(),
        });
        next(&self.deprovision)
    }

    async fn poll_instance_operation(
        &self,
        instance_id: &str,
        _operation: Option<&str>,
    ) -> Result<LastOperationResponse, BrokerError> {
        self.calls.lock().unwrap().push(RecordedCall::PollInstance {
            instance_id: instance_id.to_owned(),
        });
        next(&self.poll_instance)
    }

    async fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
        _req: &BindRequest,
    ) -> Result<(StatusCode, BindResponse), BrokerError> {
        self.calls.lock().unwrap().push(RecordedCall::Bind {
            instance_id: instance_id.to_owned(),
            binding_id: binding_id.to_owned(),
        });
        next(&self.bind)
    }

    async fn unbind(
        &self,
        instance_id: &str,
        binding_id: &str,
        _service_id: &str,
        _plan_id: &str,
    ) -> Result<(StatusCode, OperationResponse), BrokerError> {
        self.calls.lock().unwrap().push(RecordedCall::Unbind {
            instance_id: instance_id.to_owned(),
            binding_id: binding_id.to_owned(),
        });
        next(&self.unbind)
    }

    async fn poll_binding_operation(
        &self,
        instance_id: &str,
        binding_id: &str,
        _operation: Option<&str>,
    ) -> Result<LastOperationResponse, BrokerError> {
        self.calls.lock().unwrap().push(RecordedCall::PollBinding {
            instance_id: instance_id.to_owned(),
            binding_id: binding_id.to_owned(),
        });
        next(&self.poll_binding)
    }
}
