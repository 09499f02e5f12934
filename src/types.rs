//! Wallet enumerations and their wire values

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Address expiration accepted by `create_address`/`edit_address`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressExpiration {
    #[serde(rename = "24h")]
    Hours24,
    #[serde(rename = "never")]
    Never,
    #[serde(rename = "expired")]
    Expired,
}

impl AddressExpiration {
    pub fn all() -> &'static [AddressExpiration] {
        &[Self::Hours24, Self::Never, Self::Expired]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hours24 => "24h",
            Self::Never => "never",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for AddressExpiration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressExpiration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| Error::validation("expiration", format!("unknown value {:?}", s)))
    }
}

/// Transaction status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TxStatus {
    Pending,
    InProgress,
    Canceled,
    Completed,
    Failed,
    Registering,
}

impl TxStatus {
    pub fn all() -> &'static [TxStatus] {
        &[
            Self::Pending,
            Self::InProgress,
            Self::Canceled,
            Self::Completed,
            Self::Failed,
            Self::Registering,
        ]
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Canceled => 2,
            Self::Completed => 3,
            Self::Failed => 4,
            Self::Registering => 5,
        }
    }
}

impl From<TxStatus> for u8 {
    fn from(status: TxStatus) -> Self {
        status.code()
    }
}

impl TryFrom<u8> for TxStatus {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|s| s.code() == code)
            .ok_or_else(|| Error::validation("status", format!("unknown transaction status {}", code)))
    }
}

/// Transaction type code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TxType {
    Simple,
    AssetIssue,
    AssetConsume,
    AssetInfo,
}

impl TxType {
    pub fn all() -> &'static [TxType] {
        &[Self::Simple, Self::AssetIssue, Self::AssetConsume, Self::AssetInfo]
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Simple => 0,
            Self::AssetIssue => 2,
            Self::AssetConsume => 3,
            Self::AssetInfo => 6,
        }
    }
}

impl From<TxType> for u8 {
    fn from(tx_type: TxType) -> Self {
        tx_type.code()
    }
}

impl TryFrom<u8> for TxType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|t| t.code() == code)
            .ok_or_else(|| Error::validation("tx_type", format!("unknown transaction type {}", code)))
    }
}
