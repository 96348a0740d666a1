use crate::config::GatewayConfig;
use crate::domain::ports::{Acknowledgement, Gateway, Submission};
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

/// Body of a contract invocation request.
#[derive(Debug, Serialize, PartialEq)]
pub struct InvokeRequest {
    pub input: InvokeInput,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvokeInput {
    /// Transaction identifier and payload, both `0x` hex.
    pub args: [String; 2],
    pub invocation_id: String,
    pub network_id: String,
    pub primary_network_id: String,
    pub tx_id: String,
}

/// Submits transactions by invoking a contract function over HTTP.
pub struct HttpGateway {
    config: GatewayConfig,
    url: String,
    client: Client,
}

impl HttpGateway {
    /// Builds the client with `config.request_timeout` applied to every
    /// submission. Fails only if the HTTP client cannot be initialized.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            url: config.invoke_url(),
            config,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn request_body(&self, submission: &Submission) -> InvokeRequest {
        InvokeRequest {
            input: InvokeInput {
                args: [submission.key.id_hex(), submission.key.payload_hex()],
                invocation_id: self.config.invocation_id.clone(),
                network_id: self.config.network_id.clone(),
                primary_network_id: self.config.primary_network_id.clone(),
                tx_id: submission.label.clone(),
            },
        }
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn submit(&self, submission: &Submission) -> Result<Acknowledgement> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.request_body(submission))
            .send()
            .await
            .map_err(|e| BenchError::Submission(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BenchError::Submission(e.to_string()))?;

        if !status.is_success() {
            return Err(BenchError::Submission(format!(
                "gateway returned {status}: {body}"
            )));
        }

        // The body is informational only; a non-JSON acceptance is still an acceptance.
        let id = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string));

        Ok(Acknowledgement {
            status: status.as_u16(),
            id,
        })
    }
}
