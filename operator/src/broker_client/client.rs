use super::error::BrokerError;
use super::types::*;
use crate::util::BROKER_API_VERSION;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;

/// Credentials resolved from a Broker's auth secret by the caller. The client never reads Secrets
/// itself -- that stays a reconciler-side responsibility (§4.1, §9 "no ambient in-memory state").
#[derive(Clone, Debug)]
pub enum BrokerAuth {
    Basic { username: String, password: String },
    Bearer { token: String },
}

/// One broker endpoint's connection details: base URL, TLS trust material, and credentials.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub base_url: String,
    pub auth: Option<BrokerAuth>,
    pub timeout: Duration,
    pub originating_identity: Option<String>,
}

/// Typed operations against the Open Service Broker API (§4.1). Exposed as a trait so reconciler
/// unit tests can substitute a recording mock instead of making real HTTP calls.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn get_catalog(&self) -> Result<Catalog, BrokerError>;

    async fn provision(
        &self,
        instance_id: &str,
        req: &ProvisionRequest,
    ) -> Result<(StatusCode, OperationResponse), BrokerError>;

    async fn update_instance(
        &self,
        instance_id: &str,
        req: &UpdateInstanceRequest,
    ) -> Result<(StatusCode, OperationResponse), BrokerError>;

    async fn deprovision(
        &self,
        instance_id: &str,
        service_id: &str,
        plan_id: &str,
    ) -> Result<(StatusCode, OperationResponse), BrokerError>;

    async fn poll_instance_operation(
        &self,
        instance_id: &str,
        operation: Option<&str>,
    ) -> Result<LastOperationResponse, BrokerError>;

    async fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
        req: &BindRequest,
    ) -> Result<(StatusCode, BindResponse), BrokerError>;

    async fn unbind(
        &self,
        instance_id: &str,
        binding_id: &str,
        service_id: &str,
        plan_id: &str,
    ) -> Result<(StatusCode, OperationResponse), BrokerError>;

    async fn poll_binding_operation(
        &self,
        instance_id: &str,
        binding_id: &str,
        operation: Option<&str>,
    ) -> Result<LastOperationResponse, BrokerError>;
}

/// `reqwest`-backed implementation of [`BrokerClient`]. Wraps every call in its own
/// `tokio::time::timeout` rather than relying solely on `reqwest`'s connect/read timeouts, so a
/// timeout is always observable as [`BrokerError::Timeout`] regardless of where in the request
/// lifecycle it occurs (§4.1).
pub struct HttpBrokerClient {
    http: reqwest::Client,
    config: BrokerConfig,
}

impl HttpBrokerClient {
    pub fn new(config: BrokerConfig) -> Self {
        HttpBrokerClient {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut builder = self
            .http
            .request(method, url)
            .header("X-Broker-API-Version", BROKER_API_VERSION);
        if let Some(identity) = &self.config.originating_identity {
            builder = builder.header("X-Broker-API-Originating-Identity", identity);
        }
        builder = match &self.config.auth {
            Some(BrokerAuth::Basic { username, password }) => {
                builder.basic_auth(username, Some(password))
            }
            Some(BrokerAuth::Bearer { token }) => builder.bearer_auth(token),
            None => builder,
        };
        builder
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<(StatusCode, bytes::Bytes), BrokerError> {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = timeout(self.config.timeout, builder.send())
            .await
            .map_err(|_| BrokerError::Timeout)??;
        let status = response.status();
        let body = response.bytes().await?;
        if status.is_client_error() || status.is_server_error() {
            let parsed: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            return Err(BrokerError::Http {
                status: status.as_u16(),
                error_code: parsed
                    .get("error")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                description: parsed
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            });
        }
        Ok((status, body))
    }
}

#[async_trait]
impl BrokerClient for HttpBrokerClient {
    async fn get_catalog(&self) -> Result<Catalog, BrokerError> {
        let (_, body) = self
            .send::<()>(reqwest::Method::GET, "/v2/catalog", None)
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn provision(
        &self,
        instance_id: &str,
        req: &ProvisionRequest,
    ) -> Result<(StatusCode, OperationResponse), BrokerError> {
        let path = format!(
            "/v2/service_instances/{}?accepts_incomplete=true",
            instance_id
        );
        let (status, body) = self.send(reqwest::Method::PUT, &path, Some(req)).await?;
        Ok((status, parse_operation_body(&body)?))
    }

    async fn update_instance(
        &self,
        instance_id: &str,
        req: &UpdateInstanceRequest,
    ) -> Result<(StatusCode, OperationResponse), BrokerError> {
        let path = format!(
            "/v2/service_instances/{}?accepts_incomplete=true",
            instance_id
        );
        let (status, body) = self.send(reqwest::Method::PATCH, &path, Some(req)).await?;
        Ok((status, parse_operation_body(&body)?))
    }

    async fn deprovision(
        &self,
        instance_id: &str,
        service_id: &str,
        plan_id: &str,
    ) -> Result<(StatusCode, OperationResponse), BrokerError> {
        let path = format!(
            "/v2/service_instances/{}?service_id={}&plan_id={}&accepts_incomplete=true",
            instance_id, service_id, plan_id
        );
        let (status, body) = self.send::<()>(reqwest::Method::DELETE, &path, None).await?;
        Ok((status, parse_operation_body(&body)?))
    }

    async fn poll_instance_operation(
        &self,
        instance_id: &str,
        operation: Option<&str>,
    ) -> Result<LastOperationResponse, BrokerError> {
        let mut path = format!("/v2/service_instances/{}/last_operation", instance_id);
        if let Some(operation) = operation {
            path.push_str(&format!("?operation={}", operation));
        }
        poll(self, reqwest::Method::GET, &path).await
    }

    async fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
        req: &BindRequest,
    ) -> Result<(StatusCode, BindResponse), BrokerError> {
        let path = format!(
            "/v2/service_instances/{}/service_bindings/{}?accepts_incomplete=true",
            instance_id, binding_id
        );
        let (status, body) = self.send(reqwest::Method::PUT, &path, Some(req)).await?;
        Ok((status, serde_json::from_slice(&body)?))
    }

    async fn unbind(
        &self,
        instance_id: &str,
        binding_id: &str,
        service_id: &str,
        plan_id: &str,
    ) -> Result<(StatusCode, OperationResponse), BrokerError> {
        let path = format!(
            "/v2/service_instances/{}/service_bindings/{}?service_id={}&plan_id={}&accepts_incomplete=true",
            instance_id, binding_id, service_id, plan_id
        );
        let (status, body) = self.send::<()>(reqwest::Method::DELETE, &path, None).await?;
        Ok((status, parse_operation_body(&body)?))
    }

    async fn poll_binding_operation(
        &self,
        instance_id: &str,
        binding_id: &str,
        operation: Option<&str>,
    ) -> Result<LastOperationResponse, BrokerError> {
        let mut path = format!(
            "/v2/service_instances/{}/service_bindings/{}/last_operation",
            instance_id, binding_id
        );
        if let Some(operation) = operation {
            path.push_str(&format!("?operation={}", operation));
        }
        poll(self, reqwest::Method::GET, &path).await
    }
}

fn parse_operation_body(body: &[u8]) -> Result<OperationResponse, serde_json::Error> {
    if body.is_empty() {
        return Ok(OperationResponse::default());
    }
    serde_json::from_slice(body)
}

async fn poll(
    client: &HttpBrokerClient,
    method: reqwest::Method,
    path: &str,
) -> Result<LastOperationResponse, BrokerError> {
    match client.send::<()>(method, path, None).await {
        Ok((_, body)) => Ok(parse_last_operation(&body)?),
        Err(BrokerError::Http { status: 410, .. }) => Ok(LastOperationResponse {
            state: LastOperationState::Gone,
            description: None,
        }),
        Err(e) => Err(e),
    }
}
