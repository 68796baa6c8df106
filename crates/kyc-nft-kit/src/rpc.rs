//! HTTP transport and JSON-RPC plumbing shared by every chain provider.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use url::Url;

use kyc_nft_core::types::AnyJson;

/// Failure of a single HTTP exchange.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// The request never produced a response.
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Invalid JSON body: {0}")]
    Decode(#[from] serde_json::Error),
    #[cfg(feature = "http-client")]
    #[error("{0}")]
    Http(#[from] reqwest::Error),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            #[cfg(feature = "http-client")]
            TransportError::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Minimal JSON over HTTP.
pub trait HttpTransport {
    fn get_json(&self, url: &Url) -> impl Future<Output = Result<AnyJson, TransportError>>;

    fn post_json(
        &self,
        url: &Url,
        body: &AnyJson,
    ) -> impl Future<Output = Result<AnyJson, TransportError>>;
}

/// [`HttpTransport`] over a shared `reqwest` client.
#[cfg(feature = "http-client")]
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    pub client: reqwest::Client,
}

#[cfg(feature = "http-client")]
impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        ReqwestTransport { client }
    }

    async fn read(response: reqwest::Response) -> Result<AnyJson, TransportError> {
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(feature = "http-client")]
impl HttpTransport for ReqwestTransport {
    async fn get_json(&self, url: &Url) -> Result<AnyJson, TransportError> {
        let response = self.client.get(url.clone()).send().await?;
        ReqwestTransport::read(response).await
    }

    async fn post_json(&self, url: &Url, body: &AnyJson) -> Result<AnyJson, TransportError> {
        let response = self.client.post(url.clone()).json(body).send().await?;
        ReqwestTransport::read(response).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: AnyJson,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: AnyJson) -> Self {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<AnyJson>,
    #[serde(default)]
    pub result: Option<AnyJson>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// A JSON-RPC error object.
///
/// Injected EVM wallets raise errors of the same shape (EIP-1193), so wallet
/// adapters surface them as this type too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("JSON-RPC error {code}: {message}")]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<AnyJson>,
    /// Structured cause, as reported by Near nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<AnyJson>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        JsonRpcError {
            code,
            message: message.into(),
            data: None,
            cause: None,
        }
    }

    pub fn with_data(mut self, data: AnyJson) -> Self {
        self.data = Some(data);
        self
    }

    /// The `cause.name` of a Near error.
    pub fn cause_name(&self) -> Option<&str> {
        self.cause.as_ref()?.get("name")?.as_str()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RpcCallError {
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Rpc(#[from] JsonRpcError),
    #[error("Serialization/Deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A JSON-RPC 2.0 client bound to one endpoint.
#[derive(Debug)]
pub struct JsonRpcClient<T> {
    pub transport: T,
    pub url: Url,
    next_id: AtomicU64,
}

impl<T: Clone> Clone for JsonRpcClient<T> {
    fn clone(&self) -> Self {
        JsonRpcClient::new(self.transport.clone(), self.url.clone())
    }
}

impl<T> JsonRpcClient<T> {
    pub fn new(transport: T, url: Url) -> Self {
        JsonRpcClient {
            transport,
            url,
            next_id: AtomicU64::new(1),
        }
    }
}

impl<T: HttpTransport> JsonRpcClient<T> {
    /// Call `method` and return its raw result. A missing result decodes as `null`.
    pub async fn call(&self, method: &str, params: AnyJson) -> Result<AnyJson, RpcCallError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = serde_json::to_value(JsonRpcRequest::new(id, method, params))?;

        #[cfg(feature = "tracing")]
        tracing::trace!("JSON-RPC {method} -> {}", self.url);

        let response: JsonRpcResponse =
            serde_json::from_value(self.transport.post_json(&self.url, &request).await?)?;

        if let Some(error) = response.error {
            return Err(error.into());
        }
        Ok(response.result.unwrap_or(AnyJson::Null))
    }

    /// Call `method` and decode its result.
    pub async fn call_as<R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: AnyJson,
    ) -> Result<R, RpcCallError> {
        Ok(serde_json::from_value(self.call(method, params).await?)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::test_utils::MockTransport;

    use super::*;

    fn client(answers: Vec<Result<AnyJson, TransportError>>) -> JsonRpcClient<MockTransport> {
        JsonRpcClient::new(
            MockTransport::with(answers),
            Url::parse("https://rpc.example.org").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_call_returns_result() {
        let rpc = client(vec![Ok(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x1" }))]);
        let result = rpc.call("eth_chainId", json!([])).await.unwrap();
        assert_eq!(result, json!("0x1"));

        let requests = rpc.transport.requests.borrow();
        let body = requests[0].1.as_ref().unwrap();
        assert_eq!(body["method"], "eth_chainId");
        assert_eq!(body["jsonrpc"], "2.0");
    }

    #[tokio::test]
    async fn test_call_surfaces_rpc_error() {
        let rpc = client(vec![Ok(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "insufficient funds for gas" }
        }))]);
        match rpc.call("eth_estimateGas", json!([])).await {
            Err(RpcCallError::Rpc(err)) => assert_eq!(err.code, -32000),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_result_is_null() {
        let rpc = client(vec![Ok(json!({ "jsonrpc": "2.0", "id": 1, "result": null }))]);
        let receipt: Option<AnyJson> = rpc
            .call_as("eth_getTransactionReceipt", json!(["0xabc"]))
            .await
            .unwrap();
        assert!(receipt.is_none());
    }
}
