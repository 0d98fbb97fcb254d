use async_trait::async_trait;

use crate::domain::order::Order;

// ============================================================================
// Order Store
// ============================================================================
//
// Durable home of every accepted order. `save` is an idempotent upsert of the
// whole aggregate (order, delivery, payment, items) in one transaction, so a
// redelivered message can be applied again without changing the outcome.
//
// ============================================================================

mod postgres;

#[cfg(test)]
pub(crate) mod memory;

pub use postgres::PostgresOrderStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored order {order_uid} has no {part} row")]
    Incomplete {
        order_uid: String,
        part: &'static str,
    },

    #[error("payment transaction {transaction} already belongs to order {owner}")]
    TransactionConflict {
        transaction: String,
        owner: String,
    },
}

impl StoreError {
    /// Whether the same write could succeed later without a different payload.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Database(_))
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert or fully replace the aggregate keyed by `order.order_uid`.
    async fn save(&self, order: &Order) -> Result<(), StoreError>;

    /// Reconstruct one aggregate, or `None` when the key is unknown.
    async fn get_by_id(&self, order_uid: &str) -> Result<Option<Order>, StoreError>;

    /// Every stored order. Start-up cache warming only.
    async fn get_all(&self) -> Result<Vec<Order>, StoreError>;

    /// Up to `limit` orders, newest `date_created` first.
    async fn get_most_recent(&self, limit: usize) -> Result<Vec<Order>, StoreError>;
}
