//! Beam Node Client
//!
//! Async clients for the three network surfaces of a Beam node:
//! - Explorer HTTP API (status and block queries)
//! - Wallet JSON-RPC API
//! - Stratum mining protocol over a persistent TCP/TLS connection
//!
//! Failed HTTP attempts are reported to listeners that may ask for a retry,
//! optionally against another endpoint or after a delay. Lost stratum
//! connections are reported the same way and may be reconnected.

pub mod config;
pub mod context;
pub mod difficulty;
pub mod error;
pub mod events;
pub mod explorer;
pub(crate) mod http;
pub mod logging;
pub mod mining;
pub mod reward;
pub mod types;
pub mod wallet;

pub use config::{Config, HttpEndpointConfig, MiningEndpointConfig};
pub use context::{ConnectionContext, ConnectionOverrides, Endpoint, MiningContext, Operation};
pub use error::{Error, Result, RpcFailure};
pub use events::{FailureEvent, FailureKind, RequestEvent, RetryDecision};
pub use explorer::ExplorerClient;
pub use mining::{ConnectionState, MiningClient, MiningJob, ReconnectEvent, SolutionOutcome};
pub use types::{AddressExpiration, TxStatus, TxType};
pub use wallet::WalletClient;
