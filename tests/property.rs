use proptest::prelude::*;
use signing_engine::agent::{AgentError, AgentErrorKind, LocalKeyAgent};
use signing_engine::batch::BatchSigningPipeline;
use signing_engine::multisig::MultiSigCoordinator;
use signing_engine::tx::TransactionSigner;
use signing_engine::{BatchSigningRequest, BatchTransaction, ErrorReason, MultiSigRequest, SigningError};
use std::sync::Arc;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(future)
}

/// What happens to one batch item
#[derive(Debug, Clone, Copy)]
enum Item {
    Signs,
    AgentFails,
    BadHex,
}

fn any_item() -> impl Strategy<Value = Item> {
    prop_oneof![Just(Item::Signs), Just(Item::AgentFails), Just(Item::BadHex)]
}

fn all_reasons() -> Vec<ErrorReason> {
    vec![
        ErrorReason::InvalidRequest,
        ErrorReason::UserRejected,
        ErrorReason::Timeout,
        ErrorReason::NetworkError,
        ErrorReason::HardwareError,
        ErrorReason::InsufficientFunds,
        ErrorReason::NonceConflict,
        ErrorReason::Unknown,
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn batch_totals_cover_every_transaction(items in prop::collection::vec(any_item(), 1..20)) {
        let mut agent = LocalKeyAgent::random();
        let mut transactions = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let payload = vec![0x02, 0xf8, i as u8];
            if let Item::AgentFails = item {
                agent = agent.with_failure(&payload, AgentError::network("connection reset"));
            }
            let payload = match item {
                Item::BadHex => "0xzz".to_string(),
                _ => format!("0x{}", hex::encode(&payload)),
            };
            transactions.push(BatchTransaction { id: format!("tx-{}", i), payload, description: None });
        }

        let pipeline = BatchSigningPipeline::new(Arc::new(TransactionSigner::new(Arc::new(agent))));
        let request = BatchSigningRequest {
            id: "prop".into(),
            chain_id: "eip155:1".into(),
            topic: "topic".into(),
            transactions,
            simulate: None,
        };
        let response = block_on(pipeline.sign_batch(&request)).unwrap();

        prop_assert_eq!(response.total_signed + response.total_failed, items.len());
        prop_assert_eq!(response.signatures.len(), response.total_signed);
        prop_assert_eq!(response.failed_transactions.len(), response.total_failed);

        let expected_signed = items.iter().filter(|i| matches!(i, Item::Signs)).count();
        prop_assert_eq!(response.total_signed, expected_signed);

        // Input order is kept on both sides
        let signed: Vec<usize> = response.signatures.iter()
            .map(|s| s.request_id.trim_start_matches("tx-").parse().unwrap())
            .collect();
        prop_assert!(signed.windows(2).all(|w| w[0] < w[1]));
        for failure in &response.failed_transactions {
            let index: usize = failure.request_id.trim_start_matches("tx-").parse().unwrap();
            let expected = match items[index] {
                Item::BadHex => ErrorReason::InvalidRequest,
                _ => ErrorReason::NetworkError,
            };
            prop_assert_eq!(failure.reason, expected);
        }
    }

    #[test]
    fn quorum_reached_exactly_at_kth_signer(
        (n, k, order) in (1usize..8).prop_flat_map(|n| {
            (Just(n), 1..=n, Just((0..n).collect::<Vec<_>>()).prop_shuffle())
        })
    ) {
        let coordinator = MultiSigCoordinator::new();
        let signers: Vec<String> = (0..n).map(|i| format!("signer-{}", i)).collect();
        let request = MultiSigRequest {
            id: "ms".into(),
            chain_id: "eip155:1".into(),
            topic: "topic".into(),
            payload: "0x02f801".into(),
            required_signatures: k,
            signers: signers.clone(),
            timeout_ms: None,
            initiator: None,
        };
        block_on(coordinator.initiate(&request)).unwrap();

        for (position, index) in order.iter().enumerate() {
            let response = coordinator.add_signature("ms", &signers[*index], "0x01").unwrap();
            prop_assert_eq!(response.is_complete, position + 1 >= k);
            prop_assert_eq!(response.completed_by_this_call, position + 1 == k);

            let again = coordinator.add_signature("ms", &signers[*index], "0x01").unwrap_err();
            prop_assert_eq!(again.reason, ErrorReason::InvalidRequest);
        }

        let completion = coordinator.complete("ms").unwrap();
        prop_assert_eq!(completion.signatures.len(), n);
        let after = coordinator.add_signature("ms", &signers[0], "0x01").unwrap_err();
        prop_assert!(after.message.contains("not found"));
    }

    #[test]
    fn structured_agent_errors_ignore_message_text(message in ".{0,64}") {
        prop_assert_eq!(AgentError::rejected(message.clone()).reason(), ErrorReason::UserRejected);
        prop_assert_eq!(AgentError::timeout(message.clone()).reason(), ErrorReason::Timeout);
        prop_assert_eq!(
            AgentError::new(AgentErrorKind::InvalidRequest, message).reason(),
            ErrorReason::InvalidRequest
        );
    }
}

#[test]
fn retryable_depends_only_on_reason() {
    for reason in all_reasons() {
        let expected = matches!(
            reason,
            ErrorReason::Timeout | ErrorReason::NetworkError | ErrorReason::HardwareError
        );
        assert_eq!(SigningError::new(reason, "a").retryable(), expected);
        assert_eq!(
            SigningError::new(reason, "b").with_details("c").for_request("r").retryable(),
            expected
        );
    }
}
