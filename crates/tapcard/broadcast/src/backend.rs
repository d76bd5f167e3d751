//! Network backends a coordinator submits through

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use nexum_tapcard_engine::{ChainFamily, SignedTransaction};
use reqwest::{Client, header};
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use crate::response::{
    classify_answer, parse_raw_response, parse_ripple_submit, parse_rpc_response,
};
use crate::Result;

/// One endpoint a signed transaction can be submitted to
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Endpoint this backend talks to, for logs and errors
    fn endpoint(&self) -> &str;

    /// Submit the transaction and return the id the node reports
    async fn submit(&self, tx: &SignedTransaction) -> Result<String>;
}

/// JSON-RPC method used for submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    /// `eth_sendRawTransaction` with the `0x` prefixed payload
    EthSendRawTransaction,
    /// rippled `submit` with a `tx_blob`
    RippleSubmit,
}

#[derive(Serialize)]
struct RpcRequest<P> {
    jsonrpc: &'static str,
    method: &'static str,
    params: P,
    id: u64,
}

#[derive(Serialize)]
struct TxBlob<'a> {
    tx_blob: &'a str,
}

/// Submits through a JSON-RPC node
#[derive(Debug)]
pub struct JsonRpcBackend {
    client: Client,
    url: Url,
    method: RpcMethod,
    next_id: AtomicU64,
}

impl JsonRpcBackend {
    /// Backend for a node URL
    pub fn new(client: Client, url: Url, method: RpcMethod) -> Self {
        Self {
            client,
            url,
            method,
            next_id: AtomicU64::new(1),
        }
    }

    fn request_body(&self, payload: &str) -> Result<Vec<u8>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = match self.method {
            RpcMethod::EthSendRawTransaction => serde_json::to_vec(&RpcRequest {
                jsonrpc: "2.0",
                method: "eth_sendRawTransaction",
                params: [payload],
                id,
            }),
            RpcMethod::RippleSubmit => serde_json::to_vec(&RpcRequest {
                jsonrpc: "2.0",
                method: "submit",
                params: [TxBlob { tx_blob: payload }],
                id,
            }),
        }?;
        Ok(body)
    }
}

#[async_trait]
impl Backend for JsonRpcBackend {
    fn endpoint(&self) -> &str {
        self.url.as_str()
    }

    #[instrument(skip_all, fields(endpoint = %self.url, method = ?self.method))]
    async fn submit(&self, tx: &SignedTransaction) -> Result<String> {
        let response = self
            .client
            .post(self.url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .body(self.request_body(&tx.payload)?)
            .send()
            .await?;

        let parse = match self.method {
            RpcMethod::EthSendRawTransaction => parse_rpc_response,
            RpcMethod::RippleSubmit => parse_ripple_submit,
        };
        read_answer(response, self.endpoint(), parse).await
    }
}

/// Posts the encoded payload as the request body
///
/// JSON payloads are sent as `application/json`, hex payloads as `text/plain`.
#[derive(Debug)]
pub struct RawTxBackend {
    client: Client,
    url: Url,
}

impl RawTxBackend {
    /// Backend for a submission URL
    pub const fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl Backend for RawTxBackend {
    fn endpoint(&self) -> &str {
        self.url.as_str()
    }

    #[instrument(skip_all, fields(endpoint = %self.url))]
    async fn submit(&self, tx: &SignedTransaction) -> Result<String> {
        let content_type = if tx.payload.starts_with('{') {
            "application/json"
        } else {
            "text/plain"
        };
        let response = self
            .client
            .post(self.url.clone())
            .header(header::CONTENT_TYPE, content_type)
            .body(tx.payload.clone())
            .send()
            .await?;
        read_answer(response, self.endpoint(), parse_raw_response).await
    }
}

/// Read the body and classify it against the status it came with
async fn read_answer(
    response: reqwest::Response,
    endpoint: &str,
    parse: fn(&str) -> Result<String>,
) -> Result<String> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    debug!(status, bytes = body.len(), "Received answer");
    classify_answer(status, endpoint, &body, parse)
}

/// Backend suited to a chain family's submission API
pub fn backend_for(family: ChainFamily, client: Client, url: &str) -> Result<Arc<dyn Backend>> {
    let url = Url::parse(url)?;
    let backend: Arc<dyn Backend> = match family {
        ChainFamily::Evm => Arc::new(JsonRpcBackend::new(
            client,
            url,
            RpcMethod::EthSendRawTransaction,
        )),
        ChainFamily::Ripple => Arc::new(JsonRpcBackend::new(client, url, RpcMethod::RippleSubmit)),
        ChainFamily::Bitcoin
        | ChainFamily::BitcoinCash
        | ChainFamily::Eos
        | ChainFamily::Binance => Arc::new(RawTxBackend::new(client, url)),
    };
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_rpc_request_bodies() {
        let url = Url::parse("http://localhost:8545").unwrap();
        let eth = JsonRpcBackend::new(Client::new(), url.clone(), RpcMethod::EthSendRawTransaction);
        let body: serde_json::Value =
            serde_json::from_slice(&eth.request_body("0xf86b").unwrap()).unwrap();
        assert_eq!(body["method"], "eth_sendRawTransaction");
        assert_eq!(body["params"][0], "0xf86b");
        assert_eq!(body["id"], 1);
        let body: serde_json::Value =
            serde_json::from_slice(&eth.request_body("0xf86b").unwrap()).unwrap();
        assert_eq!(body["id"], 2);

        let xrp = JsonRpcBackend::new(Client::new(), url, RpcMethod::RippleSubmit);
        let body: serde_json::Value =
            serde_json::from_slice(&xrp.request_body("1200002280").unwrap()).unwrap();
        assert_eq!(body["method"], "submit");
        assert_eq!(body["params"][0]["tx_blob"], "1200002280");
    }

    #[test]
    fn test_backend_for_family() {
        let backend = backend_for(ChainFamily::Bitcoin, Client::new(), "https://mempool.space/api/tx")
            .unwrap();
        assert_eq!(backend.endpoint(), "https://mempool.space/api/tx");
        assert!(matches!(
            backend_for(ChainFamily::Evm, Client::new(), "not a url"),
            Err(Error::Url(_))
        ));
    }
}
