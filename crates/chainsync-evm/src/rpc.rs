//! JSON-RPC 2.0 wire types and the HTTP transport backed by `reqwest`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chainsync_core::error::{looks_rate_limited, SyncError, SyncResult};

use crate::client::{parse_hex_u64, EvmRpcClient, RawLog};

/// JSON-RPC request ID: string, number, or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(u64),
    String(String),
    Null,
}

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: RpcId,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id: RpcId::Number(id),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Map onto the pipeline error, separating provider rate limits.
    fn into_sync_error(self, method: &str) -> SyncError {
        let msg = format!("{method}: JSON-RPC error {}: {}", self.code, self.message);
        if self.code == 429 || looks_rate_limited(&self.message) {
            SyncError::RateLimited(msg)
        } else {
            SyncError::Rpc(msg)
        }
    }
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RpcId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Unwrap the result value or return the error object.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        if let Some(err) = self.error {
            Err(err)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

/// HTTP JSON-RPC client. Sends each request once; retries are the fetcher's job.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    /// Create a client for `url`, with an optional per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> SyncResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| SyncError::Rpc(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> SyncResult<JsonRpcResponse> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| SyncError::Rpc(format!("{}: {e}", req.method)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let msg = format!("{}: HTTP {}: {body}", req.method, status.as_u16());
            return Err(if status == reqwest::StatusCode::TOO_MANY_REQUESTS || looks_rate_limited(&body) {
                SyncError::RateLimited(msg)
            } else {
                SyncError::Rpc(msg)
            });
        }

        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| SyncError::Rpc(format!("{}: malformed response: {e}", req.method)))
    }

    /// Send `method` with `params` and return the `result` value.
    pub async fn request(&self, method: &str, params: Vec<Value>) -> SyncResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);
        tracing::trace!(id, method, "rpc request");
        self.send_once(&req)
            .await?
            .into_result()
            .map_err(|e| e.into_sync_error(method))
    }
}

#[async_trait]
impl EvmRpcClient for HttpRpcClient {
    async fn get_block_number(&self) -> SyncResult<u64> {
        let v = self.request("eth_blockNumber", vec![]).await?;
        v.as_str()
            .and_then(parse_hex_u64)
            .ok_or_else(|| SyncError::Rpc(format!("eth_blockNumber: unexpected result {v}")))
    }

    async fn get_logs(&self, addresses: &[String], from: u64, to: u64) -> SyncResult<Vec<RawLog>> {
        let filter = json!({
            "address": addresses,
            "fromBlock": format!("{from:#x}"),
            "toBlock": format!("{to:#x}"),
        });
        let v = self.request("eth_getLogs", vec![filter]).await?;
        serde_json::from_value(v).map_err(|e| SyncError::Rpc(format!("eth_getLogs: malformed logs: {e}")))
    }

    async fn get_block_timestamp(&self, number: u64) -> SyncResult<i64> {
        let v = self
            .request("eth_getBlockByNumber", vec![json!(format!("{number:#x}")), json!(false)])
            .await?;
        if v.is_null() {
            return Err(SyncError::Rpc(format!("eth_getBlockByNumber: block {number} not found")));
        }
        v["timestamp"]
            .as_str()
            .and_then(parse_hex_u64)
            .and_then(|ts| i64::try_from(ts).ok())
            .ok_or_else(|| SyncError::Rpc(format!("eth_getBlockByNumber: block {number} has no timestamp")))
    }
}
