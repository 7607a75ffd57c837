use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::{Certificate, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::errors::RpcError;
use super::types::RpcResponse;

/// Where and how to reach one RPC server.
#[derive(Clone, Debug)]
pub struct RpcEndpoint {
    /// Full URL, e.g. `https://127.0.0.1:9109`.
    pub url: String,
    pub user: String,
    pub pass: String,
    /// PEM certificate of the server, trusted in addition to the system roots.
    pub ca_cert: Option<PathBuf>,
}

/// JSON-RPC 1.0 client over HTTP POST with basic auth.
#[derive(Clone)]
pub struct RpcClient {
    http: Client,
    service: &'static str,
    endpoint: RpcEndpoint,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    pub fn new(service: &'static str, endpoint: RpcEndpoint) -> Result<Self, RpcError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30));

        if let Some(path) = &endpoint.ca_cert {
            let pem = std::fs::read(path).map_err(|source| RpcError::Certificate {
                path: path.clone(),
                source,
            })?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
        }

        Ok(Self {
            http: builder.build()?,
            service,
            endpoint,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    #[instrument(
        skip(self, params),
        fields(service = self.service),
        level = "debug"
    )]
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let resp = self
            .http
            .post(&self.endpoint.url)
            .basic_auth(&self.endpoint.user, Some(&self.endpoint.pass))
            .json(&body)
            .send()
            .await?;

        // RPC errors come back as non-2xx with a JSON body, so the status is
        // only checked for the cases that carry no body.
        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(RpcError::Unauthorized {
                    service: self.service,
                });
            }
            status if status.is_server_error() || status.is_success() => {}
            _ => {
                resp.error_for_status_ref()?;
            }
        }

        let envelope: RpcResponse<T> = resp.json().await?;

        debug!(id, "rpc call complete");

        envelope.into_result(method)
    }
}
