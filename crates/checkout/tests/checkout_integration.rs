//! Integration tests for both purchase paths against the in-memory store.

use std::time::Duration;

use checkout::{
    Checkout, Pacing, Purchase, PurchaseError, PurchaseOutcome, Rejection, RetryPolicy,
};
use document_store::{FailPoint, InMemoryDocumentStore, TransactionOptions};
use domain::{InventoryGuard, Money, OwnerId, Product, ProductId};
use futures_util::future::join_all;

const CHOCOLATE: &str = "chocolate";

struct TestHarness {
    checkout: Checkout<InMemoryDocumentStore>,
    store: InMemoryDocumentStore,
}

impl TestHarness {
    async fn new() -> Self {
        Self::build(RetryPolicy::default(), Pacing::none(), 3).await
    }

    async fn with_stock(stock: i64) -> Self {
        Self::build(RetryPolicy::default(), Pacing::none(), stock).await
    }

    async fn build(policy: RetryPolicy, pacing: Pacing, stock: i64) -> Self {
        let store = InMemoryDocumentStore::new();
        let checkout = Checkout::new(store.clone(), policy).with_pacing(pacing);
        checkout.ensure_schema().await.unwrap();
        checkout.reset_state().await.unwrap();
        checkout
            .stock_product(Product::new(CHOCOLATE, stock, Money::from_dollars(3)))
            .await
            .unwrap();
        Self { checkout, store }
    }

    async fn stock(&self) -> i64 {
        self.checkout
            .report_state()
            .await
            .unwrap()
            .stock_of(&ProductId::new(CHOCOLATE))
            .unwrap()
    }

    async fn cart_quantity(&self, owner: &str) -> Option<u32> {
        self.checkout
            .report_state()
            .await
            .unwrap()
            .cart(&OwnerId::new(owner))
            .map(|cart| cart.quantity_of(&ProductId::new(CHOCOLATE)))
    }
}

fn is_negative_stock(outcome: &PurchaseOutcome) -> bool {
    matches!(
        outcome.rejection(),
        Some(Rejection::ConstraintViolation { field, reason })
            if field == "quantity" && reason == "would go negative"
    )
}

#[tokio::test]
async fn nofar_then_alex_scenario() {
    let harness = TestHarness::new().await;

    let report = harness.checkout.report_state().await.unwrap();
    assert!(report.carts.is_empty());
    assert!(report.to_string().contains("No carts..."));

    let outcome = harness
        .checkout
        .purchase_without_coordination(Purchase::new("Nofar", CHOCOLATE, 2))
        .await
        .unwrap();
    assert!(outcome.is_completed());
    assert_eq!(harness.stock().await, 1);
    assert_eq!(harness.cart_quantity("Nofar").await, Some(2));

    let outcome = harness
        .checkout
        .purchase_with_transaction(Purchase::new("Alex", CHOCOLATE, 3))
        .await
        .unwrap();
    assert!(is_negative_stock(&outcome));

    let report = harness.checkout.report_state().await.unwrap();
    assert_eq!(report.stock_of(&ProductId::new(CHOCOLATE)), Some(1));
    assert!(report.cart(&OwnerId::new("Alex")).is_none());
    assert_eq!(report.carts.len(), 1);
    assert_eq!(report.units_in_carts(&ProductId::new(CHOCOLATE)), 2);
}

#[tokio::test]
async fn uncoordinated_rejection_leaves_cart_write_visible() {
    let harness = TestHarness::with_stock(1).await;

    let outcome = harness
        .checkout
        .purchase_without_coordination(Purchase::new("Nofar", CHOCOLATE, 2))
        .await
        .unwrap();

    assert!(is_negative_stock(&outcome));
    assert_eq!(harness.stock().await, 1);
    assert_eq!(harness.cart_quantity("Nofar").await, Some(2));
}

#[tokio::test]
async fn coordinated_rejection_leaves_no_visible_effect() {
    let harness = TestHarness::with_stock(1).await;

    let outcome = harness
        .checkout
        .purchase_with_transaction(Purchase::new("Alex", CHOCOLATE, 2))
        .await
        .unwrap();

    assert!(is_negative_stock(&outcome));
    assert_eq!(harness.stock().await, 1);
    assert_eq!(harness.cart_quantity("Alex").await, None);
    assert_eq!(harness.store.locked_documents(), 0);
}

#[tokio::test]
async fn coordinated_success_makes_both_writes_visible() {
    let harness = TestHarness::new().await;

    let outcome = harness
        .checkout
        .purchase_with_transaction(Purchase::new("Alex", CHOCOLATE, 2))
        .await
        .unwrap();

    let receipt = outcome.receipt().unwrap();
    assert_eq!(receipt.attempts, 1);
    assert_eq!(receipt.total(), Money::from_dollars(6));
    assert_eq!(harness.stock().await, 1);
    assert_eq!(harness.cart_quantity("Alex").await, Some(2));
}

#[tokio::test]
async fn repeat_coordinated_purchase_increments_cart_item() {
    let harness = TestHarness::new().await;

    for _ in 0..3 {
        let outcome = harness
            .checkout
            .purchase_with_transaction(Purchase::new("Alex", CHOCOLATE, 1))
            .await
            .unwrap();
        assert!(outcome.is_completed());
    }

    let report = harness.checkout.report_state().await.unwrap();
    let cart = report.cart(&OwnerId::new("Alex")).unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.quantity_of(&ProductId::new(CHOCOLATE)), 3);
    assert_eq!(report.stock_of(&ProductId::new(CHOCOLATE)), Some(0));
}

#[tokio::test]
async fn missing_product_is_rejected_in_both_paths() {
    let harness = TestHarness::new().await;

    let outcome = harness
        .checkout
        .purchase_without_coordination(Purchase::new("Nofar", "candy", 1))
        .await
        .unwrap();
    assert!(matches!(
        outcome.rejection(),
        Some(Rejection::NotFound { collection, .. }) if collection == "product"
    ));

    let outcome = harness
        .checkout
        .purchase_with_transaction(Purchase::new("Alex", "candy", 1))
        .await
        .unwrap();
    assert!(matches!(outcome.rejection(), Some(Rejection::NotFound { .. })));

    let report = harness.checkout.report_state().await.unwrap();
    assert!(report.carts.is_empty());
}

#[tokio::test]
async fn zero_quantity_is_refused_before_any_write() {
    let harness = TestHarness::new().await;

    let result = harness
        .checkout
        .purchase_with_transaction(Purchase::new("Alex", CHOCOLATE, 0))
        .await;
    assert!(matches!(result, Err(PurchaseError::InvalidQuantity(0))));

    let result = harness
        .checkout
        .purchase_without_coordination(Purchase::new("Nofar", CHOCOLATE, 0))
        .await;
    assert!(matches!(result, Err(PurchaseError::InvalidQuantity(0))));
    assert_eq!(harness.cart_quantity("Nofar").await, None);
}

#[tokio::test]
async fn reset_is_idempotent() {
    let harness = TestHarness::new().await;
    harness
        .checkout
        .purchase_with_transaction(Purchase::new("Alex", CHOCOLATE, 1))
        .await
        .unwrap();

    harness.checkout.reset_state().await.unwrap();
    harness.checkout.reset_state().await.unwrap();

    let report = harness.checkout.report_state().await.unwrap();
    assert!(report.products.is_empty());
    assert!(report.carts.is_empty());
}

#[tokio::test]
async fn reader_observes_cart_before_stock_without_coordination() {
    let harness = TestHarness::build(
        RetryPolicy::default(),
        Pacing::between_writes(Duration::from_millis(50)),
        3,
    )
    .await;

    let reader = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        harness.checkout.report_state().await.unwrap()
    };
    let (outcome, mid_flight) = tokio::join!(
        harness
            .checkout
            .purchase_without_coordination(Purchase::new("Nofar", CHOCOLATE, 2)),
        reader
    );

    assert!(outcome.unwrap().is_completed());
    let chocolate = ProductId::new(CHOCOLATE);
    assert_eq!(mid_flight.units_in_carts(&chocolate), 2);
    assert_eq!(mid_flight.stock_of(&chocolate), Some(3));
    assert_eq!(harness.stock().await, 1);
}

/// Each transaction stays open 20ms with its stock lock held, and a loser
/// waits 60ms before retrying, so overlapping purchases always collide.
fn overlapping() -> (RetryPolicy, Pacing) {
    (
        RetryPolicy::new(5, Duration::from_millis(60)),
        Pacing::none().with_commit_delay(Duration::from_millis(20)),
    )
}

#[tokio::test]
async fn overlapping_transactions_conflict_and_retry() {
    let (policy, pacing) = overlapping();
    let harness = TestHarness::build(policy, pacing, 4).await;

    let (alex, nofar) = tokio::join!(
        harness
            .checkout
            .purchase_with_transaction(Purchase::new("Alex", CHOCOLATE, 2)),
        harness
            .checkout
            .purchase_with_transaction(Purchase::new("Nofar", CHOCOLATE, 2)),
    );

    let mut attempts = vec![
        alex.unwrap().receipt().unwrap().attempts,
        nofar.unwrap().receipt().unwrap().attempts,
    ];
    attempts.sort_unstable();
    assert_eq!(attempts, vec![1, 2]);

    assert_eq!(harness.stock().await, 0);
    assert_eq!(harness.cart_quantity("Alex").await, Some(2));
    assert_eq!(harness.cart_quantity("Nofar").await, Some(2));
    assert_eq!(harness.store.locked_documents(), 0);
}

#[tokio::test]
async fn overlapping_transactions_never_oversell() {
    let (policy, pacing) = overlapping();
    let harness = TestHarness::build(policy, pacing, 3).await;

    let reader = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        harness.checkout.report_state().await.unwrap()
    };
    let (alex, nofar, mid_flight) = tokio::join!(
        harness
            .checkout
            .purchase_with_transaction(Purchase::new("Alex", CHOCOLATE, 2)),
        harness
            .checkout
            .purchase_with_transaction(Purchase::new("Nofar", CHOCOLATE, 2)),
        reader,
    );

    // The winner is staged but not committed while the reader runs.
    let chocolate = ProductId::new(CHOCOLATE);
    assert_eq!(mid_flight.stock_of(&chocolate), Some(3));
    assert_eq!(mid_flight.units_in_carts(&chocolate), 0);

    let outcomes = [alex.unwrap(), nofar.unwrap()];
    let winner = outcomes.iter().find(|o| o.is_completed()).unwrap();
    assert_eq!(winner.receipt().map(|r| r.attempts), Some(1));
    assert_eq!(outcomes.iter().filter(|o| is_negative_stock(o)).count(), 1);

    let report = harness.checkout.report_state().await.unwrap();
    assert_eq!(report.stock_of(&chocolate), Some(1));
    assert_eq!(report.units_in_carts(&chocolate), 2);
}

#[tokio::test]
async fn stock_and_carts_always_add_up() {
    let (policy, pacing) = overlapping();
    let harness = TestHarness::build(policy, pacing, 3).await;

    let buyers = ["Alex", "Nofar", "Sam", "Kim", "Lee"];
    let outcomes = join_all(buyers.iter().map(|owner| {
        harness
            .checkout
            .purchase_with_transaction(Purchase::new(*owner, CHOCOLATE, 1))
    }))
    .await;

    let outcomes: Vec<PurchaseOutcome> = outcomes.into_iter().map(Result::unwrap).collect();
    let completed: Vec<u32> = outcomes
        .iter()
        .filter_map(|o| o.receipt().map(|r| r.attempts))
        .collect();
    assert_eq!(completed.len(), 3);
    assert!(completed.iter().any(|&attempts| attempts > 1));
    assert_eq!(outcomes.iter().filter(|o| is_negative_stock(o)).count(), 2);

    let report = harness.checkout.report_state().await.unwrap();
    let chocolate = ProductId::new(CHOCOLATE);
    assert_eq!(report.stock_of(&chocolate), Some(0));
    assert_eq!(report.units_in_carts(&chocolate), 3);
}

#[tokio::test]
async fn uncoordinated_decrement_on_locked_stock_keeps_cart_write() {
    let harness = TestHarness::new().await;
    let facade = harness.checkout.facade();

    let mut holder = facade
        .begin_transaction(TransactionOptions::majority())
        .await
        .unwrap();
    let (filter, update) = InventoryGuard::decrement(&ProductId::new(CHOCOLATE), 1);
    facade
        .update_one::<Product>(&filter, &update, Some(&mut holder))
        .await
        .unwrap();

    let result = harness
        .checkout
        .purchase_without_coordination(Purchase::new("Nofar", CHOCOLATE, 2))
        .await;
    assert!(matches!(
        result,
        Err(PurchaseError::Transaction { attempts: 1, ref reason }) if reason.contains("chocolate")
    ));
    assert_eq!(harness.cart_quantity("Nofar").await, Some(2));

    facade.rollback(&mut holder).await.unwrap();
    assert_eq!(harness.stock().await, 3);
}

#[tokio::test]
async fn conflict_is_retried_once_the_other_scope_commits() {
    let harness = TestHarness::build(
        RetryPolicy::new(3, Duration::from_millis(20)),
        Pacing::none(),
        3,
    )
    .await;
    let facade = harness.checkout.facade();

    let mut holder = facade
        .begin_transaction(TransactionOptions::majority())
        .await
        .unwrap();
    let (filter, update) = InventoryGuard::decrement(&ProductId::new(CHOCOLATE), 1);
    facade
        .update_one::<Product>(&filter, &update, Some(&mut holder))
        .await
        .unwrap();

    let release = async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        facade.commit(&mut holder).await.unwrap();
    };
    let (outcome, ()) = tokio::join!(
        harness
            .checkout
            .purchase_with_transaction(Purchase::new("Alex", CHOCOLATE, 2)),
        release
    );

    let outcome = outcome.unwrap();
    assert_eq!(outcome.receipt().map(|r| r.attempts), Some(2));
    assert_eq!(harness.stock().await, 0);
    assert_eq!(harness.cart_quantity("Alex").await, Some(2));
}

#[tokio::test]
async fn exhausted_retries_fail_the_transaction() {
    let harness = TestHarness::build(
        RetryPolicy::new(2, Duration::from_millis(1)),
        Pacing::none(),
        3,
    )
    .await;
    let facade = harness.checkout.facade();

    let mut holder = facade
        .begin_transaction(TransactionOptions::majority())
        .await
        .unwrap();
    let (filter, update) = InventoryGuard::decrement(&ProductId::new(CHOCOLATE), 1);
    facade
        .update_one::<Product>(&filter, &update, Some(&mut holder))
        .await
        .unwrap();

    let result = harness
        .checkout
        .purchase_with_transaction(Purchase::new("Alex", CHOCOLATE, 1))
        .await;
    assert!(matches!(
        result,
        Err(PurchaseError::Transaction { attempts: 2, .. })
    ));

    facade.rollback(&mut holder).await.unwrap();
    assert_eq!(harness.stock().await, 3);
    assert_eq!(harness.cart_quantity("Alex").await, None);
    assert_eq!(harness.store.locked_documents(), 0);
}

#[tokio::test]
async fn injected_write_conflict_is_retried() {
    let harness = TestHarness::new().await;
    harness.store.inject(FailPoint::WriteConflict);

    let outcome = harness
        .checkout
        .purchase_with_transaction(Purchase::new("Alex", CHOCOLATE, 1))
        .await
        .unwrap();

    assert_eq!(outcome.receipt().map(|r| r.attempts), Some(2));
    assert_eq!(harness.stock().await, 2);
    assert_eq!(harness.cart_quantity("Alex").await, Some(1));
}

#[tokio::test]
async fn failed_commit_is_a_transaction_error() {
    let harness = TestHarness::new().await;
    harness.store.inject(FailPoint::Commit);

    let result = harness
        .checkout
        .purchase_with_transaction(Purchase::new("Alex", CHOCOLATE, 1))
        .await;

    assert!(matches!(
        result,
        Err(PurchaseError::Transaction { attempts: 1, .. })
    ));
    assert_eq!(harness.stock().await, 3);
    assert_eq!(harness.cart_quantity("Alex").await, None);
}

#[tokio::test]
async fn lost_connection_is_a_connectivity_error() {
    let harness = TestHarness::new().await;

    harness.store.inject(FailPoint::Connectivity);
    let result = harness
        .checkout
        .purchase_with_transaction(Purchase::new("Alex", CHOCOLATE, 1))
        .await;
    assert!(matches!(result, Err(PurchaseError::Connectivity(_))));

    harness.store.inject(FailPoint::Connectivity);
    let result = harness
        .checkout
        .purchase_without_coordination(Purchase::new("Nofar", CHOCOLATE, 1))
        .await;
    assert!(matches!(result, Err(PurchaseError::Connectivity(_))));

    assert_eq!(harness.stock().await, 3);
}
