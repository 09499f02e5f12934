//! Wallet client against a mock JSON-RPC endpoint

use beam_node_client::wallet::{TxListFilter, TxListParams, TxSendParams};
use beam_node_client::{AddressExpiration, Error, HttpEndpointConfig, TxStatus, WalletClient};
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn client_for(server: &Server) -> WalletClient {
    let addr = server.socket_address();
    WalletClient::new(HttpEndpointConfig::new(addr.ip().to_string(), addr.port())).unwrap()
}

#[tokio::test]
async fn test_create_address_envelope() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/wallet")
        .match_body(Matcher::PartialJson(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "create_address",
            "params": { "expiration": "24h", "comment": "payout" }
        })))
        .with_status(200)
        .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": "addr-123" }).to_string())
        .expect(1)
        .create_async()
        .await;

    let address = client_for(&server)
        .create_address(AddressExpiration::Hours24, "payout")
        .await
        .unwrap();
    assert_eq!(address, "addr-123");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_error_object_becomes_rpc_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/wallet")
        .with_status(200)
        .with_body(json!({ "error": { "code": -1 } }).to_string())
        .create_async()
        .await;

    let client = client_for(&server);
    let retries = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&retries);
    client.on_api_error(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let error = client
        .create_address(AddressExpiration::Never, "")
        .await
        .unwrap_err();

    let Error::Rpc(failure) = error else {
        panic!("expected an RPC error, got {:?}", error);
    };
    assert_eq!(failure.code, -1);
    assert_eq!(failure.request["method"], "create_address");
    assert_eq!(failure.context.port(), server.socket_address().port());
    assert_eq!(failure.context.attempt(), 0);
    assert_eq!(retries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_wallet_status_sends_no_params() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/wallet")
        .match_body(Matcher::Json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "wallet_status"
        })))
        .with_status(200)
        .with_body(json!({ "result": { "current_height": 5000, "available": 100 } }).to_string())
        .expect(1)
        .create_async()
        .await;

    let status = client_for(&server).wallet_status().await.unwrap();
    assert_eq!(status["current_height"], 5000);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_optional_params_are_omitted() {
    let mut server = Server::new_async().await;
    let send = server
        .mock("POST", "/api/wallet")
        .match_body(Matcher::Json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tx_send",
            "params": { "value": 1000, "fee": 100, "address": "addr", "comment": "" }
        })))
        .with_status(200)
        .with_body(json!({ "result": { "txId": "abc" } }).to_string())
        .expect(1)
        .create_async()
        .await;
    let list = server
        .mock("POST", "/api/wallet")
        .match_body(Matcher::Json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tx_list",
            "params": { "filter": { "status": 4 }, "skip": 0 }
        })))
        .with_status(200)
        .with_body(json!({ "result": [] }).to_string())
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    let sent = client
        .tx_send(TxSendParams::new(1000, "addr", "").with_fee(100))
        .await
        .unwrap();
    assert_eq!(sent["txId"], "abc");

    let filter = TxListFilter {
        status: Some(TxStatus::Failed),
        height: None,
    };
    let txs = client.tx_list(TxListParams::new().with_filter(filter)).await.unwrap();
    assert_eq!(txs, json!([]));

    send.assert_async().await;
    list.assert_async().await;
}

#[tokio::test]
async fn test_http_error_goes_through_retry_protocol() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/wallet")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let client = client_for(&server);
    client.on_api_error(|event| {
        if event.attempt() < 2 {
            event.retry();
        }
    });

    assert!(matches!(
        client.generate_tx_id().await,
        Err(Error::Api { status: 503, .. })
    ));
    mock.assert_async().await;
}
