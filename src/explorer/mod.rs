//! Explorer API client
//!
//! Thin typed wrapper over the node explorer's GET endpoints. Every request
//! first emits a [`RequestEvent`] so listeners can rewrite its path, answer
//! it locally or cancel it; failures go through the shared retry protocol.

pub mod compat;
pub mod types;

pub use types::{Block, BlockInput, BlockKernel, BlockOutput, ExtraMap, ExtraValue, NodeStatus};

use crate::config::HttpEndpointConfig;
use crate::context::Operation;
use crate::events::{FailureEvent, Listeners, RequestEvent, RequestListener};
use crate::http::{HttpDispatcher, HttpRequest};
use crate::{Error, Result};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Largest block range `/blocks` serves in one call
pub const MAX_BLOCKS_PER_REQUEST: u32 = 1500;

/// Client for the node explorer API
pub struct ExplorerClient {
    http: HttpDispatcher,
    request_listeners: Listeners<RequestListener>,
}

impl ExplorerClient {
    /// Create a client for `config`, validating it first
    pub fn new(config: HttpEndpointConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            http: HttpDispatcher::new(config.endpoint(), config.timeout())?,
            request_listeners: Listeners::new(),
        })
    }

    pub fn host(&self) -> &str {
        &self.http.endpoint().host
    }

    pub fn port(&self) -> u16 {
        self.http.endpoint().port
    }

    pub fn timeout(&self) -> Duration {
        self.http.timeout()
    }

    pub fn is_secure(&self) -> bool {
        self.http.endpoint().is_secure
    }

    /// Called before every request attempt is sent
    pub fn on_request<F>(&self, listener: F)
    where
        F: Fn(&mut RequestEvent<'_>) + Send + Sync + 'static,
    {
        self.request_listeners.add(Arc::new(listener));
    }

    /// Called when the explorer answers with a status other than 200
    pub fn on_api_error<F>(&self, listener: F)
    where
        F: Fn(&mut FailureEvent<'_>) + Send + Sync + 'static,
    {
        self.http.on_api_error(Arc::new(listener));
    }

    /// Called when a request fails below the HTTP layer
    pub fn on_socket_error<F>(&self, listener: F)
    where
        F: Fn(&mut FailureEvent<'_>) + Send + Sync + 'static,
    {
        self.http.on_socket_error(Arc::new(listener));
    }

    #[instrument(skip(self))]
    pub async fn get_status(&self) -> Result<NodeStatus> {
        let value = self.get("get_status", Value::Null, "status".to_string()).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Block with the given hash
    #[instrument(skip(self))]
    pub async fn get_block(&self, hash: &str) -> Result<Block> {
        require_id("hash", hash)?;
        let value = self
            .get("get_block", json!({ "hash": hash }), query("block", &[("hash", hash)]))
            .await?;
        decode_block(value)
    }

    /// Block at the given height
    #[instrument(skip(self))]
    pub async fn get_block_at(&self, height: u64) -> Result<Block> {
        require_height(height)?;
        let value = self
            .get(
                "get_block_at",
                json!({ "height": height }),
                query("block", &[("height", &height.to_string())]),
            )
            .await?;
        decode_block(value)
    }

    /// Block containing the given kernel
    #[instrument(skip(self))]
    pub async fn get_block_by_kernel(&self, kernel_id: &str) -> Result<Block> {
        require_id("kernel_id", kernel_id)?;
        let value = self
            .get(
                "get_block_by_kernel",
                json!({ "kernel": kernel_id }),
                query("block", &[("kernel", kernel_id)]),
            )
            .await?;
        decode_block(value)
    }

    /// `count` consecutive blocks starting at `height`
    #[instrument(skip(self))]
    pub async fn get_blocks(&self, height: u64, count: u32) -> Result<Vec<Block>> {
        require_height(height)?;
        if count == 0 || count > MAX_BLOCKS_PER_REQUEST {
            return Err(Error::validation(
                "count",
                format!("must be between 1 and {}", MAX_BLOCKS_PER_REQUEST),
            ));
        }

        let value = self
            .get(
                "get_blocks",
                json!({ "height": height, "count": count }),
                query("blocks", &[("height", &height.to_string()), ("n", &count.to_string())]),
            )
            .await?;

        match value {
            Value::Array(blocks) => blocks.into_iter().map(decode_block).collect(),
            other => Err(Error::protocol(format!("expected a block array, got {}", other))),
        }
    }

    async fn get(&self, name: &str, args: Value, path: String) -> Result<Value> {
        self.http
            .dispatch(
                Operation::new(name, args),
                HttpRequest::Get { path },
                Some(&self.request_listeners),
            )
            .await
            .map(|(value, _)| value)
    }
}

impl fmt::Debug for ExplorerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExplorerClient")
            .field("endpoint", self.http.endpoint())
            .field("timeout", &self.http.timeout())
            .field("request_listeners", &self.request_listeners.len())
            .finish()
    }
}

/// `path` with `pairs` appended as a form-encoded query string
fn query(path: &str, pairs: &[(&str, &str)]) -> String {
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    format!("{}?{}", path, encoded)
}

fn decode_block(mut value: Value) -> Result<Block> {
    compat::stabilize_block(&mut value);
    Ok(serde_json::from_value(value)?)
}

fn require_height(height: u64) -> Result<()> {
    if height == 0 {
        return Err(Error::validation("height", "must be a positive integer"));
    }
    Ok(())
}

fn require_id(field: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn client() -> ExplorerClient {
        ExplorerClient::new(HttpEndpointConfig::new("127.0.0.1", 1)).unwrap()
    }

    #[test]
    fn test_accessors() {
        let client = ExplorerClient::new(
            HttpEndpointConfig::new("explorer.local", 8888)
                .with_secure(true)
                .with_timeout(Duration::from_secs(3)),
        )
        .unwrap();

        assert_eq!(client.host(), "explorer.local");
        assert_eq!(client.port(), 8888);
        assert_eq!(client.timeout(), Duration::from_secs(3));
        assert!(client.is_secure());
    }

    #[test]
    fn test_query_values_are_encoded() {
        assert_eq!(query("block", &[("height", "5")]), "block?height=5");
        assert_eq!(query("blocks", &[("height", "1"), ("n", "2")]), "blocks?height=1&n=2");
        assert_eq!(query("block", &[("hash", "a+b&n=1")]), "block?hash=a%2Bb%26n%3D1");
        assert_eq!(query("block", &[("kernel", "k 1/2")]), "block?kernel=k+1%2F2");
    }

    #[tokio::test]
    async fn test_ids_cannot_inject_query_parameters() {
        let client = client();
        let paths = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = Arc::clone(&paths);
        client.on_request(move |ev| {
            seen.lock().push(ev.path().to_string());
            ev.set_result(json!({ "height": 1 }));
        });

        client.get_block("ab&height=1").await.unwrap();
        client.get_block_by_kernel("k#1").await.unwrap();
        assert_eq!(
            *paths.lock(),
            vec!["block?hash=ab%26height%3D1", "block?kernel=k%231"]
        );
    }

    #[test]
    fn test_debug_shows_endpoint() {
        let debug = format!("{:?}", client());
        assert!(debug.starts_with("ExplorerClient"));
        assert!(debug.contains("127.0.0.1"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert_matches!(
            ExplorerClient::new(HttpEndpointConfig::new("", 8888)),
            Err(Error::Config { .. })
        );
    }

    #[tokio::test]
    async fn test_argument_validation() {
        let client = client();
        assert_matches!(client.get_block_at(0).await, Err(Error::Validation { .. }));
        assert_matches!(client.get_block("").await, Err(Error::Validation { .. }));
        assert_matches!(client.get_blocks(10, 0).await, Err(Error::Validation { .. }));
        assert_matches!(client.get_blocks(10, 1501).await, Err(Error::Validation { .. }));
    }

    #[tokio::test]
    async fn test_injected_block_is_stabilized() {
        let client = client();
        client.on_request(|ev| {
            assert_eq!(ev.path(), "block?height=5");
            ev.set_result(json!({
                "hash": "ab",
                "height": 5,
                "outputs": [{ "commitment": "cc", "extra": "Coinbase" }]
            }));
        });

        let block = client.get_block_at(5).await.unwrap();
        assert_eq!(block.hash, "ab");
        assert!(block.outputs[0].coinbase);
        assert_eq!(block.outputs[0].maturity, 245);
        assert_eq!(block.outputs[0].extra_map.get("Coinbase"), Some(&ExtraValue::Flag(true)));
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let client = client();
        client.on_request(|ev| ev.cancel());
        assert_matches!(client.get_status().await, Err(Error::Cancelled { .. }));
    }
}
