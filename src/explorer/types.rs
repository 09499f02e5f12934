//! Explorer payloads
//!
//! Unknown fields are kept in `other` so newer node versions do not lose data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Parsed value of one `extra` token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
    Flag(bool),
    Integer(i64),
    Text(String),
}

/// Structured form of the comma-separated `extra` attribute
pub type ExtraMap = BTreeMap<String, ExtraValue>;

/// Node status returned by `/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub chainwork: String,
    #[serde(default)]
    pub hash: String,
    pub height: u64,
    #[serde(default)]
    pub low_horizon: u64,
    #[serde(default)]
    pub peers_count: u32,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Block returned by the `/block` and `/blocks` endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub hash: String,
    pub height: u64,
    #[serde(default)]
    pub chainwork: String,
    #[serde(default)]
    pub difficulty: f64,
    #[serde(default)]
    pub found: bool,
    #[serde(default)]
    pub prev: String,
    #[serde(default)]
    pub subsidy: u64,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub inputs: Vec<BlockInput>,
    #[serde(default)]
    pub kernels: Vec<BlockKernel>,
    #[serde(default)]
    pub outputs: Vec<BlockOutput>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInput {
    #[serde(default)]
    pub commitment: String,
    #[serde(default)]
    pub height: u64,
    #[serde(default)]
    pub maturity: u64,
    #[serde(default)]
    pub extra: Option<String>,
    #[serde(default)]
    pub extra_map: ExtraMap,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockKernel {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub excess: String,
    #[serde(default)]
    pub fee: u64,
    #[serde(default, rename = "minHeight")]
    pub min_height: u64,
    #[serde(default, rename = "maxHeight")]
    pub max_height: u64,
    /// Only present when the `extra` attribute carries `Maturity`
    #[serde(default)]
    pub maturity: Option<u64>,
    #[serde(default)]
    pub extra: Option<String>,
    #[serde(default)]
    pub extra_map: ExtraMap,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockOutput {
    #[serde(default)]
    pub commitment: String,
    #[serde(default)]
    pub coinbase: bool,
    #[serde(default)]
    pub incubation: u64,
    #[serde(default)]
    pub maturity: u64,
    #[serde(default)]
    pub extra: Option<String>,
    #[serde(default)]
    pub extra_map: ExtraMap,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}
