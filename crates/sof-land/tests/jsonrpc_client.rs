//! JSON-RPC ledger and bundle clients against a mock HTTP endpoint.

use std::{sync::Arc, time::Duration};

use serde_json::json;
use sof_land::{
    BuilderPayload, Channel, Commitment, Endpoint, EngineConfig, ErrorKind, InclusionService,
    JsonRpcInclusionService, JsonRpcLedgerClient, LedgerClient, ReliabilityEngine,
    SignatureState, StaticComputeBudget, StaticPriorityFee, Strategy, TransportError, TxBuilder,
};
use solana_keypair::Keypair;
use solana_signer::Signer;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method},
};

const TIMEOUT: Duration = Duration::from_secs(5);
const BLOCKHASH: &str = "11111111111111111111111111111111";

async fn mount_result(server: &MockServer, rpc_method: &str, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": result,
        })))
        .mount(server)
        .await;
}

async fn mount_error(server: &MockServer, rpc_method: &str, code: i64, message: &str) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": code, "message": message },
        })))
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> Option<JsonRpcLedgerClient> {
    JsonRpcLedgerClient::new(server.uri(), TIMEOUT).ok()
}

#[tokio::test]
async fn reads_slot_height_and_blockhash() {
    let server = MockServer::start().await;
    mount_result(&server, "getSlot", json!(321)).await;
    mount_result(&server, "getBlockHeight", json!(300)).await;
    mount_result(
        &server,
        "getLatestBlockhash",
        json!({
            "context": { "slot": 321 },
            "value": { "blockhash": BLOCKHASH, "lastValidBlockHeight": 450 },
        }),
    )
    .await;

    let client = client(&server);
    assert!(client.is_some());
    if let Some(client) = client {
        assert_eq!(client.get_slot().await, Ok(321));
        assert_eq!(client.get_block_height().await, Ok(300));
        let latest = client.get_latest_blockhash().await;
        assert!(latest.is_ok());
        if let Ok(latest) = latest {
            assert_eq!(latest.blockhash, BLOCKHASH);
            assert_eq!(latest.last_valid_block_height, 450);
        }
    }
}

#[tokio::test]
async fn send_posts_base64_with_preflight_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "sendTransaction",
            "params": ["AQID", { "encoding": "base64", "skipPreflight": true, "maxRetries": 0 }],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": "5sig",
        })))
        .expect(1)
        .mount(&server)
        .await;

    if let Some(client) = client(&server) {
        assert_eq!(client.send_transaction(&[1, 2, 3]).await, Ok("5sig".to_owned()));
    }
}

#[tokio::test]
async fn blockhash_rpc_error_is_classified() {
    let server = MockServer::start().await;
    mount_error(
        &server,
        "sendTransaction",
        -32002,
        "Transaction simulation failed: Blockhash not found",
    )
    .await;

    if let Some(client) = client(&server) {
        let error = client.send_transaction(&[1]).await;
        assert!(matches!(
            &error,
            Err(TransportError::Rpc { method: "sendTransaction", code: -32002, .. })
        ));
        assert!(error.is_err_and(|error| error.is_blockhash_related()));
    }
}

#[tokio::test]
async fn http_failure_is_a_request_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    if let Some(client) = client(&server) {
        let error = client.get_slot().await;
        assert!(matches!(
            &error,
            Err(TransportError::Request { method: "getSlot", .. })
        ));
        assert!(error.is_err_and(|error| !error.is_blockhash_related()));
    }
}

#[tokio::test]
async fn signature_status_honours_target_commitment() {
    let server = MockServer::start().await;
    mount_result(
        &server,
        "getSignatureStatuses",
        json!({
            "context": { "slot": 10 },
            "value": [{ "slot": 9, "confirmations": 0, "err": null, "confirmationStatus": "confirmed" }],
        }),
    )
    .await;

    if let Some(client) = client(&server) {
        let confirmed = client.clone().with_commitment(Commitment::Confirmed);
        let finalized = client.with_commitment(Commitment::Finalized);
        assert_eq!(
            confirmed.signature_state("sig").await,
            Ok(SignatureState::Confirmed { slot: 9 })
        );
        assert_eq!(
            finalized.signature_state("sig").await,
            Ok(SignatureState::Pending)
        );
    }
}

#[tokio::test]
async fn unknown_signature_is_reported_as_unknown() {
    let server = MockServer::start().await;
    mount_result(
        &server,
        "getSignatureStatuses",
        json!({ "context": { "slot": 10 }, "value": [null] }),
    )
    .await;

    if let Some(client) = client(&server) {
        assert_eq!(
            client.signature_state("sig").await,
            Ok(SignatureState::Unknown)
        );
    }
}

#[tokio::test]
async fn bundle_client_submits_and_surfaces_rejection() {
    let accepting = MockServer::start().await;
    mount_result(&accepting, "sendBundle", json!("bundle-uuid")).await;
    let rejecting = MockServer::start().await;
    mount_error(&rejecting, "sendBundle", -32602, "bundle tip too low").await;

    let accepted = JsonRpcInclusionService::new(accepting.uri(), TIMEOUT);
    let rejected = JsonRpcInclusionService::new(rejecting.uri(), TIMEOUT);
    assert!(accepted.is_ok() && rejected.is_ok());
    if let (Ok(accepted), Ok(rejected)) = (accepted, rejected) {
        assert_eq!(
            accepted.submit_bundle(&[vec![1, 2, 3]]).await,
            Ok("bundle-uuid".to_owned())
        );
        assert!(matches!(
            rejected.submit_bundle(&[vec![1]]).await,
            Err(TransportError::Rpc { code: -32602, .. })
        ));
        assert!(matches!(
            accepted.submit_bundle(&[]).await,
            Err(TransportError::Config { .. })
        ));
    }
}

#[tokio::test]
async fn engine_lands_builder_payload_over_json_rpc() {
    let server = MockServer::start().await;
    mount_result(&server, "getSlot", json!(1_000)).await;
    mount_result(&server, "getBlockHeight", json!(900)).await;
    mount_result(
        &server,
        "getLatestBlockhash",
        json!({
            "context": { "slot": 1_000 },
            "value": { "blockhash": BLOCKHASH, "lastValidBlockHeight": 1_050 },
        }),
    )
    .await;
    mount_result(&server, "sendTransaction", json!("ignored")).await;
    mount_result(
        &server,
        "getSignatureStatuses",
        json!({
            "context": { "slot": 1_001 },
            "value": [{ "slot": 1_001, "err": null, "confirmationStatus": "finalized" }],
        }),
    )
    .await;

    let payer = Arc::new(Keypair::new());
    let builder = TxBuilder::new(payer.pubkey()).add_instruction(
        solana_system_interface::instruction::transfer(
            &payer.pubkey(),
            &solana_pubkey::Pubkey::new_unique(),
            1,
        ),
    );
    let signer: Arc<dyn Signer + Send + Sync> = payer;
    let payload = Arc::new(BuilderPayload::new(builder, vec![signer]));
    let config = EngineConfig::default().with_endpoints(vec![Endpoint::new("mock", server.uri())]);
    let engine = ReliabilityEngine::with_json_rpc(
        config,
        Arc::new(StaticPriorityFee::new(None)),
        Arc::new(StaticComputeBudget::new(Some(50_000))),
    );
    assert!(engine.is_ok());
    if let Ok(engine) = engine {
        let result = engine.send(payload, 0.2).await;
        assert!(result.success, "{result:?}");
        assert_eq!(result.strategy, Strategy::RetryOnly);
        assert_eq!(result.channel_used, Channel::Fast);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.error_kind, None::<ErrorKind>);
        assert!(result.confirmation_id.is_some());
        assert_eq!(engine.leases().refresh_count(), 1);
    }
}
