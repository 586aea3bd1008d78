//! Credit accounting scenarios across the gateway and store, plus
//! property tests for the ledger invariants.

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use smartspec_config::{Config, ProviderConfig, RouteTarget, RoutingRule};
use smartspec_gateway::{
    BudgetPriority, CompletionRequest, Gateway, GatewayError, Message, MockProvider, Provider,
    RoutingTable, TaskClass, TokenUsage, topup_credits, usd_to_credits_ceil,
};
use smartspec_store::{Role, Store, TransactionKind};
use uuid::Uuid;

fn chat_rule() -> Vec<RoutingRule> {
    vec![RoutingRule {
        task: "chat".into(),
        priority: "cost".into(),
        routes: vec![RouteTarget {
            provider: "mock".into(),
            model: "mock-model".into(),
            price_in_per_1k: 0.0,
            price_out_per_1k: 1.0,
        }],
    }]
}

fn routing_table(rows: Vec<RoutingRule>) -> RoutingTable {
    let mut config = Config::default();
    for rule in &rows {
        for route in &rule.routes {
            let provider: ProviderConfig = toml::from_str("kind = \"mock\"").unwrap();
            config.providers.insert(route.provider.clone(), provider);
        }
    }
    config.routing = rows;
    RoutingTable::from_config(&config)
}

async fn gateway_with_mock(mock: Arc<MockProvider>) -> (Gateway, Store, Uuid) {
    let store = Store::open_in_memory().await.unwrap();
    let user = store
        .create_user("dev@example.com", "hash", Role::User)
        .await
        .unwrap();
    let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
    providers.insert("mock".into(), mock);
    let gateway = Gateway::new(store.clone(), routing_table(chat_rule()), providers, 600, 0.15);
    (gateway, store, user.id)
}

fn request(user_id: Uuid, expected_output: u64) -> CompletionRequest {
    CompletionRequest {
        user_id,
        task: TaskClass::Chat,
        priority: BudgetPriority::Cost,
        messages: vec![Message::user("hello")],
        expected_output_tokens: Some(expected_output),
    }
}

/// A $100 top-up at 15% markup grants 86,956 credits; a call reporting
/// $0.10 of provider cost deducts exactly 100.
#[tokio::test]
async fn topup_then_usage_matches_the_published_arithmetic() {
    let mock = Arc::new(MockProvider::new("mock"));
    mock.push_response(
        "done",
        TokenUsage {
            input_tokens: 500,
            output_tokens: 200,
        },
        0.10,
    );
    let (gateway, store, user_id) = gateway_with_mock(Arc::clone(&mock)).await;

    let topup = gateway.topup(user_id, 100.0).await.unwrap();
    assert_eq!(topup.amount_credits, 86_956);
    assert_eq!(topup.kind, TransactionKind::Topup);
    assert_eq!(store.balance(user_id).await.unwrap(), 86_956);

    let completion = gateway.complete(request(user_id, 50)).await.unwrap();
    assert_eq!(completion.credits_charged, 100);
    assert_eq!(store.balance(user_id).await.unwrap(), 86_856);
}

/// Insufficient credits: the provider is never called and nothing is
/// recorded; a smaller estimate afterwards succeeds and debits.
#[tokio::test]
async fn preflight_shortfall_blocks_the_call_without_side_effects() {
    let mock = Arc::new(MockProvider::new("mock"));
    let (gateway, store, user_id) = gateway_with_mock(Arc::clone(&mock)).await;
    store
        .record_topup(user_id, 50, serde_json::json!({}))
        .await
        .unwrap();

    let err = gateway.complete(request(user_id, 200)).await.unwrap_err();
    match err {
        GatewayError::InsufficientCredits {
            balance,
            required,
            shortfall,
        } => {
            assert_eq!((balance, required, shortfall), (50, 200, 150));
        }
        other => panic!("expected shortfall, got {other}"),
    }
    assert_eq!(mock.call_count(), 0);
    assert_eq!(store.transaction_history(user_id).await.unwrap().len(), 1);

    mock.push_response(
        "ok",
        TokenUsage {
            input_tokens: 1,
            output_tokens: 1,
        },
        0.04,
    );
    let completion = gateway.complete(request(user_id, 40)).await.unwrap();
    assert_eq!(completion.credits_charged, 40);
    assert_eq!(store.balance(user_id).await.unwrap(), 10);
}

/// Topping up then deducting the same amount restores the prior balance.
#[tokio::test]
async fn topup_and_matching_deduction_round_trip() {
    let store = Store::open_in_memory().await.unwrap();
    let user = store
        .create_user("dev@example.com", "hash", Role::User)
        .await
        .unwrap();
    store
        .record_topup(user.id, 1234, serde_json::json!({}))
        .await
        .unwrap();
    let before = store.balance(user.id).await.unwrap();

    store
        .record_topup(user.id, 777, serde_json::json!({}))
        .await
        .unwrap();
    store
        .record_deduction(user.id, 777, serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(store.balance(user.id).await.unwrap(), before);
}

proptest! {
    /// Conversion arithmetic: grants never exceed the unmarked-up value,
    /// debits never round down.
    #[test]
    fn conversion_bounds(paid in 0.01f64..5_000.0, cost in 0.0f64..50.0) {
        let granted = topup_credits(paid, 0.15);
        prop_assert!(granted >= 0);
        prop_assert!((granted as f64) <= paid * 1000.0 + 1.0);

        let debit = usd_to_credits_ceil(cost);
        prop_assert!(debit as f64 >= cost * 1000.0 - 1e-6);
    }
}

/// Ledger invariants hold across an arbitrary interleaving of topups and
/// deductions: every row chains, the balance mirrors the last row, and it
/// never goes negative.
#[tokio::test]
async fn ledger_invariants_hold_across_random_interleavings() {
    let store = Store::open_in_memory().await.unwrap();
    let user = store
        .create_user("dev@example.com", "hash", Role::User)
        .await
        .unwrap();

    // Deterministic pseudo-random walk; amounts intentionally overshoot
    // the balance sometimes to exercise the rejection path.
    let mut seed: u64 = 0x5eed;
    let mut next = || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        seed >> 33
    };

    for _ in 0..200 {
        let amount = (next() % 500) as i64 + 1;
        if next() % 2 == 0 {
            store
                .record_topup(user.id, amount, serde_json::json!({}))
                .await
                .unwrap();
        } else {
            // May fail with insufficient balance, which must change nothing.
            let before = store.balance(user.id).await.unwrap();
            let result = store
                .record_deduction(user.id, amount, serde_json::json!({}))
                .await;
            if result.is_err() {
                assert_eq!(store.balance(user.id).await.unwrap(), before);
            }
        }
    }

    let history = store.transaction_history(user.id).await.unwrap();
    assert!(!history.is_empty());
    for row in &history {
        assert_eq!(
            row.balance_after,
            row.balance_before + row.kind.sign() * row.amount_credits
        );
        assert!(row.balance_after >= 0);
    }
    for pair in history.windows(2) {
        assert_eq!(pair[1].balance_before, pair[0].balance_after);
    }
    assert_eq!(
        store.balance(user.id).await.unwrap(),
        history.last().unwrap().balance_after
    );
}
