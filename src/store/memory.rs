use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{OrderStore, StoreError};
use crate::domain::order::Order;

/// Test double with switchable failures and call counters.
#[derive(Default)]
pub(crate) struct InMemoryOrderStore {
    orders: RwLock<HashMap<String, Order>>,
    fail_saves: AtomicBool,
    failing_saves_left: AtomicUsize,
    fail_reads: AtomicBool,
    saves: AtomicUsize,
    reads: AtomicUsize,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let store = Self::new();
        for order in orders {
            store.save(&order).await.unwrap();
        }
        store.saves.store(0, Ordering::SeqCst);
        store
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Fail only the next `count` saves.
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves_left.store(count, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> HashMap<String, Order> {
        self.orders.read().await.clone()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let one_shot = self
            .failing_saves_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if one_shot || self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut orders = self.orders.write().await;
        let owner = orders.values().find(|stored| {
            stored.payment.transaction == order.payment.transaction && stored.order_uid != order.order_uid
        });
        if let Some(owner) = owner {
            return Err(StoreError::TransactionConflict {
                transaction: order.payment.transaction.clone(),
                owner: owner.order_uid.clone(),
            });
        }
        orders.insert(order.order_uid.clone(), order.clone());
        Ok(())
    }

    async fn get_by_id(&self, order_uid: &str) -> Result<Option<Order>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.orders.read().await.get(order_uid).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Order>, StoreError> {
        self.get_most_recent(usize::MAX).await
    }

    async fn get_most_recent(&self, limit: usize) -> Result<Vec<Order>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut orders: Vec<Order> = self.orders.read().await.values().cloned().collect();
        orders.sort_by(|a, b| b.date_created.cmp(&a.date_created));
        orders.truncate(limit);
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::fixtures::valid_order;
    use chrono::Duration;

    #[tokio::test]
    async fn test_save_twice_is_idempotent() {
        let store = InMemoryOrderStore::new();
        let order = valid_order("b563feb7-b2b8-4b6e-9f1d-6b1e2c3d4e5f");

        store.save(&order).await.unwrap();
        let once = store.snapshot().await;
        store.save(&order).await.unwrap();

        assert_eq!(store.snapshot().await, once);
    }

    #[tokio::test]
    async fn test_resave_replaces_items() {
        let store = InMemoryOrderStore::new();
        let mut order = valid_order("b563feb7-b2b8-4b6e-9f1d-6b1e2c3d4e5f");
        store.save(&order).await.unwrap();

        order.items[0].chrt_id = 1;
        store.save(&order).await.unwrap();

        let stored = store.get_by_id(&order.order_uid).await.unwrap().unwrap();
        assert_eq!(stored.items.len(), 1);
        assert_eq!(stored.items[0].chrt_id, 1);
    }

    #[tokio::test]
    async fn test_transaction_of_another_order_is_rejected() {
        let first = valid_order("b563feb7-b2b8-4b6e-9f1d-6b1e2c3d4e5f");
        let store = InMemoryOrderStore::with_orders([first.clone()]).await;
        let mut second = valid_order("7c9e6679-7425-40de-944b-e07fc1f90ae7");
        second.payment.transaction = first.payment.transaction.clone();

        let err = store.save(&second).await.unwrap_err();

        assert!(matches!(err, StoreError::TransactionConflict { ref owner, .. } if *owner == first.order_uid));
        assert!(!err.is_transient());
        assert_eq!(store.get_by_id(&first.order_uid).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_fail_next_saves_is_one_shot() {
        let store = InMemoryOrderStore::new();
        let order = valid_order("b563feb7-b2b8-4b6e-9f1d-6b1e2c3d4e5f");
        store.fail_next_saves(1);

        assert!(store.save(&order).await.unwrap_err().is_transient());
        store.save(&order).await.unwrap();
    }

    #[tokio::test]
    async fn test_most_recent_is_newest_first() {
        let mut old = valid_order("old");
        old.date_created -= Duration::days(1);
        let new = valid_order("new");
        let store = InMemoryOrderStore::with_orders([old, new]).await;

        let recent = store.get_most_recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].order_uid, "new");
        assert_eq!(store.get_all().await.unwrap().len(), 2);
    }
}
