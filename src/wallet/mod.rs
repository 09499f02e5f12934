//! Wallet API client
//!
//! Every method posts a JSON-RPC 2.0 request to the wallet API endpoint. An
//! `error` object in the response becomes [`Error::Rpc`] carrying the request
//! and the connection context; it is returned as is and never retried.

pub mod types;

pub use types::{
    CreateAddressParams, EditAddressParams, TxListFilter, TxListParams, TxSendParams, TxSplitParams,
    UtxoParams,
};

use crate::config::HttpEndpointConfig;
use crate::context::Operation;
use crate::error::RpcFailure;
use crate::events::FailureEvent;
use crate::http::{HttpDispatcher, HttpRequest};
use crate::types::AddressExpiration;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use types::{require_non_empty, RpcResponse};

/// Path of the wallet JSON-RPC endpoint
pub const WALLET_API_PATH: &str = "api/wallet";

const JSONRPC_VERSION: &str = "2.0";

/// Client for the wallet JSON-RPC API
pub struct WalletClient {
    http: HttpDispatcher,
}

impl WalletClient {
    /// Create a client for `config`, validating it first
    pub fn new(config: HttpEndpointConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            http: HttpDispatcher::new(config.endpoint(), config.timeout())?,
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

    /// Called when the wallet answers with a status other than 200
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

    /// Create a new receive address; returns the address
    #[instrument(skip(self))]
    pub async fn create_address(&self, expiration: AddressExpiration, comment: &str) -> Result<String> {
        let params = CreateAddressParams {
            expiration,
            comment: comment.to_string(),
        };
        let result = self.call("create_address", Some(to_params(&params)?)).await?;
        Ok(serde_json::from_value(result)?)
    }

    #[instrument(skip(self))]
    pub async fn validate_address(&self, address: &str) -> Result<Value> {
        require_non_empty("address", address)?;
        self.call("validate_address", Some(json!({ "address": address }))).await
    }

    /// List own addresses when `own` is set, otherwise contacts
    #[instrument(skip(self))]
    pub async fn addr_list(&self, own: bool) -> Result<Value> {
        self.call("addr_list", Some(json!({ "own": own }))).await
    }

    #[instrument(skip(self))]
    pub async fn delete_address(&self, address: &str) -> Result<Value> {
        require_non_empty("address", address)?;
        self.call("delete_address", Some(json!({ "address": address }))).await
    }

    #[instrument(skip(self))]
    pub async fn edit_address(
        &self,
        address: &str,
        comment: &str,
        expiration: AddressExpiration,
    ) -> Result<Value> {
        require_non_empty("address", address)?;
        let params = EditAddressParams {
            address: address.to_string(),
            comment: comment.to_string(),
            expiration,
        };
        self.call("edit_address", Some(to_params(&params)?)).await
    }

    #[instrument(skip(self))]
    pub async fn tx_send(&self, params: TxSendParams) -> Result<Value> {
        params.validate()?;
        self.call("tx_send", Some(to_params(&params)?)).await
    }

    #[instrument(skip(self))]
    pub async fn tx_split(&self, params: TxSplitParams) -> Result<Value> {
        params.validate()?;
        self.call("tx_split", Some(to_params(&params)?)).await
    }

    #[instrument(skip(self))]
    pub async fn tx_cancel(&self, tx_id: &str) -> Result<Value> {
        require_non_empty("txId", tx_id)?;
        self.call("tx_cancel", Some(json!({ "txId": tx_id }))).await
    }

    #[instrument(skip(self))]
    pub async fn tx_status(&self, tx_id: &str) -> Result<Value> {
        require_non_empty("txId", tx_id)?;
        self.call("tx_status", Some(json!({ "txId": tx_id }))).await
    }

    #[instrument(skip(self))]
    pub async fn tx_list(&self, params: TxListParams) -> Result<Value> {
        params.validate()?;
        self.call("tx_list", Some(to_params(&params)?)).await
    }

    #[instrument(skip(self))]
    pub async fn wallet_status(&self) -> Result<Value> {
        self.call("wallet_status", None).await
    }

    #[instrument(skip(self))]
    pub async fn get_utxo(&self, params: UtxoParams) -> Result<Value> {
        params.validate()?;
        self.call("get_utxo", Some(to_params(&params)?)).await
    }

    /// Ask the wallet for a fresh transaction id
    #[instrument(skip(self))]
    pub async fn generate_tx_id(&self) -> Result<String> {
        let result = self.call("generate_tx_id", None).await?;
        Ok(serde_json::from_value(result)?)
    }

    #[instrument(skip(self))]
    pub async fn export_payment_proof(&self, tx_id: &str) -> Result<Value> {
        require_non_empty("txId", tx_id)?;
        self.call("export_payment_proof", Some(json!({ "txId": tx_id }))).await
    }

    #[instrument(skip(self, payment_proof))]
    pub async fn verify_payment_proof(&self, payment_proof: &str) -> Result<Value> {
        require_non_empty("payment_proof", payment_proof)?;
        self.call("verify_payment_proof", Some(json!({ "payment_proof": payment_proof })))
            .await
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let mut request = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": 1,
            "method": method,
        });
        if let Some(params) = &params {
            request["params"] = params.clone();
        }

        let (body, context) = self
            .http
            .dispatch(
                Operation::new(method, params.unwrap_or(Value::Null)),
                HttpRequest::Post {
                    path: WALLET_API_PATH.to_string(),
                    body: request.clone(),
                },
                None,
            )
            .await?;

        let response: RpcResponse = serde_json::from_value(body)?;

        if let Some(error) = response.error {
            debug!(method, code = error.code, "Wallet returned an error object");
            return Err(RpcFailure {
                code: error.code,
                message: error.message,
                data: error.data,
                request,
                context,
            }
            .into());
        }

        Ok(response.result.unwrap_or(Value::Null))
    }
}

impl fmt::Debug for WalletClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletClient")
            .field("endpoint", self.http.endpoint())
            .field("timeout", &self.http.timeout())
            .finish()
    }
}

fn to_params<T: Serialize>(params: &T) -> Result<Value> {
    serde_json::to_value(params).map_err(Error::from)
}
