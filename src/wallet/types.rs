//! Wallet JSON-RPC parameter shapes
//!
//! Optional fields are left out of the JSON entirely when unset.

use crate::types::{AddressExpiration, TxStatus};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateAddressParams {
    pub expiration: AddressExpiration,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditAddressParams {
    pub address: String,
    pub comment: String,
    pub expiration: AddressExpiration,
}

/// Arguments of `tx_send`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TxSendParams {
    pub value: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub address: String,
    pub comment: String,
    #[serde(rename = "txId", skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
}

impl TxSendParams {
    pub fn new(value: u64, address: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            value,
            fee: None,
            from: None,
            address: address.into(),
            comment: comment.into(),
            tx_id: None,
        }
    }

    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = Some(fee);
        self
    }

    /// Send from this own address instead of a fresh one
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_tx_id(mut self, tx_id: impl Into<String>) -> Self {
        self.tx_id = Some(tx_id.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        require_positive("value", self.value)?;
        require_positive_opt("fee", self.fee)?;
        require_non_empty("address", &self.address)?;
        if let Some(from) = &self.from {
            require_non_empty("from", from)?;
        }
        if let Some(tx_id) = &self.tx_id {
            require_non_empty("txId", tx_id)?;
        }
        Ok(())
    }
}

/// Arguments of `tx_split`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TxSplitParams {
    pub coins: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
    #[serde(rename = "txId", skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
}

impl TxSplitParams {
    pub fn new(coins: Vec<u64>) -> Self {
        Self {
            coins,
            fee: None,
            tx_id: None,
        }
    }

    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = Some(fee);
        self
    }

    pub fn with_tx_id(mut self, tx_id: impl Into<String>) -> Self {
        self.tx_id = Some(tx_id.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.coins.is_empty() {
            return Err(Error::validation("coins", "must not be empty"));
        }
        if self.coins.contains(&0) {
            return Err(Error::validation("coins", "every coin must be positive"));
        }
        require_positive_opt("fee", self.fee)?;
        if let Some(tx_id) = &self.tx_id {
            require_non_empty("txId", tx_id)?;
        }
        Ok(())
    }
}

/// Filter of `tx_list`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxListFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TxStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
}

/// Arguments of `tx_list`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TxListParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<TxListFilter>,
    pub skip: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl TxListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: TxListFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(filter) = &self.filter {
            require_positive_opt("filter.height", filter.height)?;
        }
        require_positive_opt("count", self.count)
    }
}

/// Arguments of `get_utxo`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UtxoParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    pub skip: u64,
}

impl UtxoParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        require_positive_opt("count", self.count)
    }
}

/// Error object of a JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RpcErrorObject {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// JSON-RPC response envelope
#[derive(Debug, Deserialize)]
pub(crate) struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    Ok(())
}

fn require_positive(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(Error::validation(field, "must be a positive integer"));
    }
    Ok(())
}

fn require_positive_opt(field: &str, value: Option<u64>) -> Result<()> {
    value.map_or(Ok(()), |v| require_positive(field, v))
}
