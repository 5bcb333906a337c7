//! End-to-end coverage for the parts of the Coordinator that unit tests in
//! `coordinator.rs` don't reach: a full `createDelegation` -> `configureProvider`
//! -> `configureBundler` -> `submitDelegationUserOp` happy path against a mocked
//! chain node and bundler, a delegation receive/revoke round trip, and
//! `waitForUserOpReceipt`'s timeout behavior. Follows the teacher's
//! `wiremock`-based HTTP-mocking style (`delegator-gateway`'s own
//! `gateway::tests`), one level up at the Coordinator.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{address, Address, Bytes, U256};
use delegator_codec::storage::InMemoryStore;
use delegator_codec::{Action, DelegationStatus, Execution};
use delegator_keyholder::InitOptions;
use delegator_wallet::{BundlerConfig, ChainConfig, Coordinator, RedeemRequest};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENTRY_POINT: Address = address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");

fn jsonrpc_ok(result: serde_json::Value) -> serde_json::Value {
    json!({"jsonrpc": "2.0", "id": 1, "result": result})
}

async fn node_returning_fees_and_nonce() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"method": "eth_getBlockByNumber"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(jsonrpc_ok(
            json!({"baseFeePerGas": "0x3b9aca00", "number": "0x1"}),
        )))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"method": "eth_maxPriorityFeePerGas"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(jsonrpc_ok(json!("0x3b9aca00"))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"method": "eth_call"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(jsonrpc_ok(json!("0x0"))))
        .mount(&server)
        .await;
    server
}

async fn bundler_accepting_user_op(user_op_hash: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"method": "eth_estimateUserOperationGas"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(jsonrpc_ok(json!({
            "callGasLimit": "0x30d40",
            "verificationGasLimit": "0x30d40",
            "preVerificationGas": "0xc350",
        }))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"method": "eth_sendUserOperation"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(jsonrpc_ok(json!(user_op_hash))))
        .mount(&server)
        .await;
    server
}

async fn initialised_coordinator(delegation_manager: Address) -> Coordinator<InMemoryStore> {
    let coordinator = Coordinator::new(Arc::new(InMemoryStore::new()), delegation_manager);
    coordinator.initialize_keyring(InitOptions::Ephemeral).await.unwrap();
    coordinator
}

#[tokio::test]
async fn create_delegation_then_submit_user_op_against_mocked_bundler() {
    let delegation_manager = address!("0x9999999999999999999999999999999999999999");
    let coordinator = initialised_coordinator(delegation_manager).await;
    let delegate = address!("0x2222222222222222222222222222222222222222");

    let node = node_returning_fees_and_nonce().await;
    let expected_hash = "0x".to_string() + &"ab".repeat(32);
    let bundler = bundler_accepting_user_op(&expected_hash).await;

    coordinator
        .configure_provider(ChainConfig {
            rpc_url: Url::parse(&node.uri()).unwrap(),
            chain_id: 1,
            delegation_manager,
        })
        .await
        .unwrap();
    coordinator
        .configure_bundler(BundlerConfig {
            bundler_url: Url::parse(&bundler.uri()).unwrap(),
            entry_point: ENTRY_POINT,
        })
        .await
        .unwrap();

    let delegation = coordinator
        .create_delegation(delegate, vec![], 1, None, None)
        .await
        .unwrap();
    assert_eq!(delegation.status, DelegationStatus::Signed);

    let execution = Execution::new(delegate, U256::ZERO, Bytes::new());
    let request = RedeemRequest {
        id: Some(delegation.id),
        ..Default::default()
    };
    let submitted = coordinator.redeem_delegation(request, execution).await.unwrap();
    assert_eq!(submitted, alloy_primitives::B256::from_str(&expected_hash).unwrap());
}

#[tokio::test]
async fn receive_then_revoke_round_trip() {
    let delegation_manager = address!("0x9999999999999999999999999999999999999999");
    let coordinator = initialised_coordinator(delegation_manager).await;
    let delegator = address!("0x1111111111111111111111111111111111111111");
    let delegate = coordinator.get_accounts().await[0];

    let remote_store = delegator_authority::AuthorityStore::new(Arc::new(InMemoryStore::new()), delegation_manager);
    let pending = remote_store
        .create(delegator, delegate, vec![], 1, None, None)
        .await
        .unwrap();
    let signed = remote_store
        .store_signed(pending.id, Bytes::from(vec![0u8; 65]))
        .await
        .unwrap();

    let received = coordinator.receive_delegation(signed.clone()).await.unwrap();
    assert_eq!(received.id, signed.id);
    assert!(coordinator.list_delegations().await.iter().any(|d| d.id == signed.id));

    let revoked = coordinator.revoke_delegation(signed.id).await.unwrap();
    assert_eq!(revoked.status, DelegationStatus::Revoked);
}

#[tokio::test]
async fn send_transaction_without_matching_delegation_broadcasts_directly() {
    let delegation_manager = address!("0x9999999999999999999999999999999999999999");
    let coordinator = initialised_coordinator(delegation_manager).await;
    let node = node_returning_fees_and_nonce().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"method": "eth_getTransactionCount"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(jsonrpc_ok(json!("0x0"))))
        .mount(&node)
        .await;
    let sent_hash = "0x".to_string() + &"cd".repeat(32);
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"method": "eth_sendRawTransaction"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(jsonrpc_ok(json!(sent_hash))))
        .mount(&node)
        .await;

    coordinator
        .configure_provider(ChainConfig {
            rpc_url: Url::parse(&node.uri()).unwrap(),
            chain_id: 1,
            delegation_manager,
        })
        .await
        .unwrap();

    let stranger = address!("0x3333333333333333333333333333333333333333");
    let outcome = coordinator
        .send_transaction(Action::new(stranger), None)
        .await
        .unwrap();
    match outcome {
        delegator_wallet::SendTransactionOutcome::Transaction(hash) => {
            assert_eq!(hash, alloy_primitives::B256::from_str(&sent_hash).unwrap());
        }
        other => panic!("expected a direct transaction broadcast, got {other:?}"),
    }
}

#[tokio::test]
async fn wait_for_user_op_receipt_times_out_when_bundler_never_includes_it() {
    let delegation_manager = address!("0x9999999999999999999999999999999999999999");
    let coordinator = initialised_coordinator(delegation_manager).await;
    let bundler = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"method": "eth_getUserOperationReceipt"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(jsonrpc_ok(serde_json::Value::Null)))
        .mount(&bundler)
        .await;

    coordinator
        .configure_bundler(BundlerConfig {
            bundler_url: Url::parse(&bundler.uri()).unwrap(),
            entry_point: ENTRY_POINT,
        })
        .await
        .unwrap();

    let err = coordinator
        .wait_for_user_op_receipt(
            alloy_primitives::B256::ZERO,
            Duration::from_millis(10),
            Duration::from_millis(30),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), delegator_codec::error::ErrorKind::Timeout);
}
