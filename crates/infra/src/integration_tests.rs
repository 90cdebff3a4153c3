//! Integration tests for the full movement pipeline.
//!
//! Tests: MovementRequest → MovementCoordinator → StockStore → reconciliation
//!
//! Verifies:
//! - The worked scenarios (first movement, threshold, insufficient stock)
//! - Rejected requests leave no trace in either table
//! - Concurrent outbound movements on one item never oversell
//! - Lock timeouts, cancellation and storage failures roll back

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use proptest::prelude::*;

    use stockledger_core::{ItemId, MovementError};
    use stockledger_inventory::{Balance, Item, Movement, MovementRequest, NewMovement};

    use crate::coordinator::MovementCoordinator;
    use crate::reconcile::{reconcile_all, reconcile_item};
    use crate::store::{
        BalanceProjector, InMemoryItemRegistry, InMemoryStockStore, ItemRegistry, MovementLedger,
        StockStore, StockTransaction, StoreError,
    };

    const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

    type Coordinator = MovementCoordinator<Arc<InMemoryItemRegistry>, InMemoryStockStore>;

    fn setup(items: impl IntoIterator<Item = Item>) -> Coordinator {
        MovementCoordinator::new(
            Arc::new(InMemoryItemRegistry::with_items(items)),
            InMemoryStockStore::new(),
            LOCK_TIMEOUT,
        )
    }

    async fn stored_balance<S: BalanceProjector>(store: &S, item_id: ItemId) -> Option<i64> {
        store.balance(item_id).await.unwrap().map(|b| b.quantity)
    }

    #[tokio::test]
    async fn worked_scenarios_in_sequence() {
        let item = Item::new(ItemId::new(), "Widget", 5);
        let coordinator = setup([item.clone()]);

        // 1: no balance row yet
        assert_eq!(stored_balance(coordinator.store(), item.id).await, None);
        let applied = coordinator
            .apply_movement(MovementRequest::inbound(item.id, 10))
            .await
            .unwrap();
        assert_eq!(applied.new_balance, 10);

        // 2
        let applied = coordinator
            .apply_movement(MovementRequest::outbound(item.id, 3))
            .await
            .unwrap();
        assert_eq!(applied.new_balance, 7);

        // 3
        let err = coordinator
            .apply_movement(MovementRequest::outbound(item.id, 3))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MovementError::BelowMinimumThreshold {
                requested: 3,
                remaining: 4,
                minimum: 5
            }
        );
        assert_eq!(stored_balance(coordinator.store(), item.id).await, Some(7));

        // 4
        let err = coordinator
            .apply_movement(MovementRequest::outbound(item.id, 100))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MovementError::InsufficientBalance {
                available: 7,
                requested: 100
            }
        );
        assert_eq!(stored_balance(coordinator.store(), item.id).await, Some(7));

        let ledger = coordinator.movements(item.id).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(reconcile_item(coordinator.store(), item.id)
            .await
            .unwrap()
            .is_consistent());
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected_before_any_storage_access() {
        let item = Item::new(ItemId::new(), "Widget", 0);
        let registry = Arc::new(CountingRegistry::new(InMemoryItemRegistry::with_items([
            item.clone(),
        ])));
        let store = FaultyStore::new(Fault::None);
        let coordinator = MovementCoordinator::new(registry.clone(), store.clone(), LOCK_TIMEOUT);

        for qty in [0, -4] {
            let err = coordinator
                .apply_movement(MovementRequest::inbound(item.id, qty))
                .await
                .unwrap_err();
            assert_eq!(err, MovementError::InvalidQuantity(qty));
        }

        assert_eq!(registry.lookups.load(Ordering::SeqCst), 0);
        assert_eq!(store.locks_taken.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_item_creates_no_rows() {
        let coordinator = setup(Vec::new());
        let missing = ItemId::new();

        let err = coordinator
            .apply_movement(MovementRequest::inbound(missing, 5))
            .await
            .unwrap_err();
        assert_eq!(err, MovementError::ItemNotFound(missing));

        assert_eq!(stored_balance(coordinator.store(), missing).await, None);
        assert_eq!(coordinator.store().movement_count(), 0);
        assert_eq!(
            coordinator.balance(missing).await.unwrap_err(),
            MovementError::ItemNotFound(missing)
        );
    }

    #[tokio::test]
    async fn ledger_records_reasons_and_increasing_sequences() {
        let item = Item::new(ItemId::new(), "Bolt", 0);
        let coordinator = setup([item.clone()]);

        coordinator
            .apply_movement(MovementRequest::inbound(item.id, 8))
            .await
            .unwrap();
        coordinator
            .apply_movement(MovementRequest::outbound(item.id, 2).with_reason("   "))
            .await
            .unwrap();
        coordinator
            .apply_movement(MovementRequest::outbound(item.id, 1).with_reason("damaged in transit"))
            .await
            .unwrap();

        let ledger = coordinator.movements(item.id).await.unwrap();
        let reasons: Vec<&str> = ledger.iter().map(|m| m.reason.as_str()).collect();
        assert_eq!(reasons, ["Stock inbound", "Stock outbound", "damaged in transit"]);
        assert!(ledger.windows(2).all(|w| w[0].sequence < w[1].sequence));
        assert_eq!(coordinator.balance(item.id).await.unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn stock_levels_list_every_item_by_name() {
        let bolt = Item::new(ItemId::new(), "Bolt", 10);
        let anchor = Item::new(ItemId::new(), "Anchor", 2);
        let coordinator = setup([bolt.clone(), anchor.clone()]);

        coordinator
            .apply_movement(MovementRequest::inbound(anchor.id, 4))
            .await
            .unwrap();

        let levels = coordinator.stock_levels().await.unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].name, "Anchor");
        assert_eq!(levels[0].quantity, 4);
        assert!(!levels[0].below_minimum);
        assert_eq!(levels[1].name, "Bolt");
        assert_eq!(levels[1].quantity, 0);
        assert!(levels[1].below_minimum);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_outbound_movements_never_oversell() {
        let item = Item::new(ItemId::new(), "Widget", 0);
        let coordinator = Arc::new(setup([item.clone()]));
        coordinator
            .apply_movement(MovementRequest::inbound(item.id, 10))
            .await
            .unwrap();

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    coordinator
                        .apply_movement(MovementRequest::outbound(item.id, 3))
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(MovementError::InsufficientBalance { .. })
                | Err(MovementError::BelowMinimumThreshold { .. }) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(successes, 10 / 3);
        assert_eq!(stored_balance(coordinator.store(), item.id).await, Some(1));
        assert_eq!(coordinator.movements(item.id).await.unwrap().len(), 1 + 10 / 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_outbound_movements_respect_the_minimum() {
        let item = Item::new(ItemId::new(), "Widget", 5);
        let coordinator = Arc::new(setup([item.clone()]));
        coordinator
            .apply_movement(MovementRequest::inbound(item.id, 20))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    coordinator
                        .apply_movement(MovementRequest::outbound(item.id, 4))
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }

        // (20 - 5) / 4
        assert_eq!(successes, 3);
        assert_eq!(stored_balance(coordinator.store(), item.id).await, Some(8));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn movements_on_different_items_do_not_block_each_other() {
        let a = Item::new(ItemId::new(), "A", 0);
        let b = Item::new(ItemId::new(), "B", 0);
        let coordinator = MovementCoordinator::new(
            Arc::new(InMemoryItemRegistry::with_items([a.clone(), b.clone()])),
            InMemoryStockStore::new(),
            Duration::from_millis(50),
        );

        let _held = coordinator
            .store()
            .lock_balance(a.id, LOCK_TIMEOUT)
            .await
            .unwrap();

        let applied = coordinator
            .apply_movement(MovementRequest::inbound(b.id, 1))
            .await
            .unwrap();
        assert_eq!(applied.new_balance, 1);
    }

    #[tokio::test]
    async fn contended_lock_surfaces_as_timeout() {
        let item = Item::new(ItemId::new(), "Widget", 0);
        let coordinator = MovementCoordinator::new(
            Arc::new(InMemoryItemRegistry::with_items([item.clone()])),
            InMemoryStockStore::new(),
            Duration::from_millis(50),
        );

        let held = coordinator
            .store()
            .lock_balance(item.id, LOCK_TIMEOUT)
            .await
            .unwrap();

        let err = coordinator
            .apply_movement(MovementRequest::inbound(item.id, 1))
            .await
            .unwrap_err();
        assert_eq!(err, MovementError::Timeout { waited_ms: 50 });

        held.rollback().await.unwrap();
        assert_eq!(stored_balance(coordinator.store(), item.id).await, None);
        assert_eq!(coordinator.store().movement_count(), 0);

        // lock released: the same request now goes through
        coordinator
            .apply_movement(MovementRequest::inbound(item.id, 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn abandoned_request_rolls_back_staged_writes() {
        let item = Item::new(ItemId::new(), "Widget", 0);
        let store = FaultyStore::new(Fault::StallOnBalanceWrite);
        let coordinator = MovementCoordinator::new(
            Arc::new(InMemoryItemRegistry::with_items([item.clone()])),
            store.clone(),
            LOCK_TIMEOUT,
        );

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            coordinator.apply_movement(MovementRequest::inbound(item.id, 9)),
        )
        .await;
        assert!(abandoned.is_err());

        assert_eq!(store.locks_taken.load(Ordering::SeqCst), 1);
        assert_eq!(stored_balance(&store, item.id).await, None);
        assert!(store.movements(item.id).await.unwrap().is_empty());

        // the dropped transaction released the row lock
        let tx = store.inner.lock_balance(item.id, Duration::from_millis(50)).await;
        assert!(tx.is_ok());
    }

    #[tokio::test]
    async fn storage_failure_rolls_back_and_hides_detail() {
        let item = Item::new(ItemId::new(), "Widget", 0);
        let store = FaultyStore::new(Fault::FailBalanceWrite);
        let coordinator = MovementCoordinator::new(
            Arc::new(InMemoryItemRegistry::with_items([item.clone()])),
            store.clone(),
            LOCK_TIMEOUT,
        );

        let err = coordinator
            .apply_movement(MovementRequest::inbound(item.id, 3))
            .await
            .unwrap_err();

        assert!(matches!(err, MovementError::StorageFailure { .. }));
        assert!(!err.is_business_outcome());
        assert!(!err.to_string().contains("disk"));
        assert_eq!(store.rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(stored_balance(&store, item.id).await, None);
        assert!(store.movements(item.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn item_removed_after_lookup_is_not_found_and_writes_nothing() {
        let item = Item::new(ItemId::new(), "Widget", 0);
        let items = Arc::new(InMemoryItemRegistry::with_items([item.clone()]));
        let store = InMemoryStockStore::with_registry(items.clone());
        let coordinator =
            MovementCoordinator::new(VanishingRegistry::new(items), store.clone(), LOCK_TIMEOUT);

        let err = coordinator
            .apply_movement(MovementRequest::inbound(item.id, 5))
            .await
            .unwrap_err();

        assert_eq!(err, MovementError::ItemNotFound(item.id));
        assert_eq!(stored_balance(&store, item.id).await, None);
        assert_eq!(store.movement_count(), 0);
    }

    #[tokio::test]
    async fn item_removed_while_waiting_for_the_row_is_not_found() {
        let item = Item::new(ItemId::new(), "Widget", 0);
        let registry = Arc::new(InMemoryItemRegistry::with_items([item.clone()]));
        let coordinator = Arc::new(MovementCoordinator::new(
            registry.clone(),
            InMemoryStockStore::with_registry(registry.clone()),
            LOCK_TIMEOUT,
        ));

        let held = coordinator
            .store()
            .lock_balance(item.id, LOCK_TIMEOUT)
            .await
            .unwrap();
        let waiting = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .apply_movement(MovementRequest::inbound(item.id, 5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.remove(item.id);
        held.rollback().await.unwrap();

        let err = waiting.await.unwrap().unwrap_err();
        assert_eq!(err, MovementError::ItemNotFound(item.id));
        assert_eq!(stored_balance(coordinator.store(), item.id).await, None);
        assert_eq!(coordinator.store().movement_count(), 0);
    }

    #[tokio::test]
    async fn business_rejection_rolls_back_explicitly() {
        let item = Item::new(ItemId::new(), "Widget", 0);
        let store = FaultyStore::new(Fault::None);
        let coordinator = MovementCoordinator::new(
            Arc::new(InMemoryItemRegistry::with_items([item.clone()])),
            store.clone(),
            LOCK_TIMEOUT,
        );

        let err = coordinator
            .apply_movement(MovementRequest::outbound(item.id, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, MovementError::InsufficientBalance { .. }));
        assert_eq!(store.rollbacks.load(Ordering::SeqCst), 1);
        // the zero-row created for the lock is not kept either
        assert_eq!(stored_balance(&store, item.id).await, None);
    }

    #[tokio::test]
    async fn reconcile_all_flags_tampered_balances() {
        let a = Item::new(ItemId::new(), "A", 0);
        let b = Item::new(ItemId::new(), "B", 0);
        let coordinator = setup([a.clone(), b.clone()]);
        coordinator
            .apply_movement(MovementRequest::inbound(a.id, 4))
            .await
            .unwrap();
        coordinator
            .apply_movement(MovementRequest::inbound(b.id, 2))
            .await
            .unwrap();

        let report = reconcile_all(coordinator.registry(), coordinator.store())
            .await
            .unwrap();
        assert_eq!(report.checked.len(), 2);
        assert!(report.is_consistent());

        // overwrite b's balance without a ledger entry
        let mut tx = coordinator
            .store()
            .lock_balance(b.id, LOCK_TIMEOUT)
            .await
            .unwrap();
        tx.write_balance(7).await.unwrap();
        tx.commit().await.unwrap();

        let report = reconcile_all(coordinator.registry(), coordinator.store())
            .await
            .unwrap();
        let mismatches: Vec<_> = report.mismatches().collect();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].item_id, b.id);
        assert_eq!(mismatches[0].drift(), 5);
    }

    #[tokio::test]
    async fn reconcile_all_checks_balances_of_unregistered_items() {
        let item = Item::new(ItemId::new(), "Gone", 0);
        let coordinator = setup([item.clone()]);
        coordinator
            .apply_movement(MovementRequest::inbound(item.id, 3))
            .await
            .unwrap();
        coordinator.registry().remove(item.id);

        let report = reconcile_all(coordinator.registry(), coordinator.store())
            .await
            .unwrap();
        assert_eq!(report.checked.len(), 1);
        assert_eq!(report.checked[0].replayed, 3);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn ledger_replay_always_matches_balances(
            ops in prop::collection::vec((0usize..3, any::<bool>(), -2i64..15), 1..60)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();

            runtime.block_on(async {
                let items = [
                    Item::new(ItemId::new(), "A", 0),
                    Item::new(ItemId::new(), "B", 3),
                    Item::new(ItemId::new(), "C", 10),
                ];
                let coordinator = setup(items.clone());

                for (idx, inbound, qty) in ops {
                    let item = &items[idx];
                    let request = if inbound {
                        MovementRequest::inbound(item.id, qty)
                    } else {
                        MovementRequest::outbound(item.id, qty)
                    };
                    let before = stored_balance(coordinator.store(), item.id).await;
                    let count_before = coordinator.store().movement_count();

                    match coordinator.apply_movement(request).await {
                        Ok(applied) => {
                            assert!(applied.new_balance >= 0);
                            if !inbound {
                                assert!(applied.new_balance >= item.minimum_stock());
                            }
                        }
                        Err(_) => {
                            assert_eq!(stored_balance(coordinator.store(), item.id).await, before);
                            assert_eq!(coordinator.store().movement_count(), count_before);
                        }
                    }
                }

                let report = reconcile_all(coordinator.registry(), coordinator.store())
                    .await
                    .unwrap();
                assert!(report.is_consistent());
            });
        }
    }

    // ---- test doubles ----

    struct CountingRegistry {
        inner: InMemoryItemRegistry,
        lookups: AtomicUsize,
    }

    impl CountingRegistry {
        fn new(inner: InMemoryItemRegistry) -> Self {
            Self {
                inner,
                lookups: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ItemRegistry for CountingRegistry {
        async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.get_item(item_id).await
        }

        async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.list_items().await
        }
    }

    /// Answers the first lookup, then forgets the item.
    struct VanishingRegistry {
        inner: Arc<InMemoryItemRegistry>,
    }

    impl VanishingRegistry {
        fn new(inner: Arc<InMemoryItemRegistry>) -> Self {
            Self { inner }
        }
    }

    #[async_trait]
    impl ItemRegistry for VanishingRegistry {
        async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
            let item = self.inner.get_item(item_id).await?;
            self.inner.remove(item_id);
            Ok(item)
        }

        async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
            self.inner.list_items().await
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum Fault {
        None,
        FailBalanceWrite,
        StallOnBalanceWrite,
    }

    /// In-memory store that counts calls and can inject faults into transactions.
    #[derive(Clone)]
    struct FaultyStore {
        inner: InMemoryStockStore,
        fault: Fault,
        locks_taken: Arc<AtomicUsize>,
        rollbacks: Arc<AtomicUsize>,
    }

    impl FaultyStore {
        fn new(fault: Fault) -> Self {
            Self {
                inner: InMemoryStockStore::new(),
                fault,
                locks_taken: Arc::new(AtomicUsize::new(0)),
                rollbacks: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl BalanceProjector for FaultyStore {
        async fn balance(&self, item_id: ItemId) -> Result<Option<Balance>, StoreError> {
            self.inner.balance(item_id).await
        }

        async fn balances(&self) -> Result<Vec<Balance>, StoreError> {
            self.inner.balances().await
        }
    }

    #[async_trait]
    impl MovementLedger for FaultyStore {
        async fn movements(&self, item_id: ItemId) -> Result<Vec<Movement>, StoreError> {
            self.inner.movements(item_id).await
        }
    }

    #[async_trait]
    impl StockStore for FaultyStore {
        async fn lock_balance(
            &self,
            item_id: ItemId,
            lock_timeout: Duration,
        ) -> Result<Box<dyn StockTransaction>, StoreError> {
            self.locks_taken.fetch_add(1, Ordering::SeqCst);
            let inner = self.inner.lock_balance(item_id, lock_timeout).await?;
            Ok(Box::new(FaultyTransaction {
                inner,
                fault: self.fault,
                rollbacks: self.rollbacks.clone(),
            }))
        }
    }

    struct FaultyTransaction {
        inner: Box<dyn StockTransaction>,
        fault: Fault,
        rollbacks: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StockTransaction for FaultyTransaction {
        fn item_id(&self) -> ItemId {
            self.inner.item_id()
        }

        fn current_balance(&self) -> i64 {
            self.inner.current_balance()
        }

        fn row_created(&self) -> bool {
            self.inner.row_created()
        }

        async fn append_movement(&mut self, movement: NewMovement) -> Result<Movement, StoreError> {
            self.inner.append_movement(movement).await
        }

        async fn write_balance(&mut self, quantity: i64) -> Result<(), StoreError> {
            match self.fault {
                Fault::None => self.inner.write_balance(quantity).await,
                Fault::FailBalanceWrite => Err(StoreError::backend("disk full")),
                Fault::StallOnBalanceWrite => std::future::pending().await,
            }
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            self.inner.commit().await
        }

        async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            self.inner.rollback().await
        }
    }
}
