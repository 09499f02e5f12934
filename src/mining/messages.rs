//! Stratum wire messages
//!
//! One JSON object per line in both directions. Field order of the outbound
//! messages follows what the node expects to see.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub(crate) const JSONRPC_VERSION: &str = "2.0";

/// Correlation id of the login request
pub const LOGIN_ID: &str = "login";

/// `code` of a successful login
pub const LOGIN_SUCCESS: i64 = 0;

/// `code` of an accepted solution
pub const SOLUTION_ACCEPTED: i64 = 1;

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    id: &'static str,
    method: &'static str,
    api_key: &'a str,
    jsonrpc: &'static str,
}

impl<'a> LoginRequest<'a> {
    pub(crate) fn new(api_key: &'a str) -> Self {
        Self {
            id: LOGIN_ID,
            method: "login",
            api_key,
            jsonrpc: JSONRPC_VERSION,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SolutionRequest<'a> {
    id: &'a str,
    method: &'static str,
    nonce: &'a str,
    output: &'a str,
    jsonrpc: &'static str,
}

impl<'a> SolutionRequest<'a> {
    pub(crate) fn new(job_id: &'a str, nonce: &'a str, output: &'a str) -> Self {
        Self {
            id: job_id,
            method: "solution",
            nonce,
            output,
            jsonrpc: JSONRPC_VERSION,
        }
    }
}

/// Inbound `result` message
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResultMessage {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub blockhash: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl ResultMessage {
    /// `forkheight*` fields reported by a login result
    pub(crate) fn fork_heights(&self) -> BTreeMap<String, u64> {
        self.rest
            .iter()
            .filter(|(key, _)| key.starts_with("forkheight"))
            .filter_map(|(key, value)| value.as_u64().map(|height| (key.clone(), height)))
            .collect()
    }
}

/// Inbound `job` message
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JobMessage {
    pub id: Value,
    pub input: String,
    pub height: u64,
    pub difficulty: u32,
}

/// Correlation ids may arrive as strings or numbers
pub(crate) fn correlation_id(id: Option<&Value>) -> Option<String> {
    match id? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_login_request_shape() {
        let line = serde_json::to_string(&LoginRequest::new("secret")).unwrap();
        assert_eq!(
            line,
            r#"{"id":"login","method":"login","api_key":"secret","jsonrpc":"2.0"}"#
        );
    }

    #[test]
    fn test_solution_request_shape() {
        let value = serde_json::to_value(SolutionRequest::new("1f", "00aa", "beef")).unwrap();
        assert_eq!(
            value,
            json!({ "id": "1f", "method": "solution", "nonce": "00aa", "output": "beef", "jsonrpc": "2.0" })
        );
    }

    #[test]
    fn test_fork_heights() {
        let message: ResultMessage = serde_json::from_value(json!({
            "id": "login",
            "method": "result",
            "code": 0,
            "description": "Login successful",
            "forkheight": 321321,
            "forkheight2": 777777,
            "nonceprefix": "abcd"
        }))
        .unwrap();

        assert_eq!(message.code, Some(LOGIN_SUCCESS));
        let forks = message.fork_heights();
        assert_eq!(forks.len(), 2);
        assert_eq!(forks["forkheight"], 321321);
        assert_eq!(forks["forkheight2"], 777777);
    }

    #[test]
    fn test_correlation_id() {
        assert_eq!(correlation_id(Some(&json!("abc"))), Some("abc".to_string()));
        assert_eq!(correlation_id(Some(&json!(17))), Some("17".to_string()));
        assert_eq!(correlation_id(Some(&json!(null))), None);
        assert_eq!(correlation_id(None), None);
    }
}
