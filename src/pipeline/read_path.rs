use std::sync::Arc;

use crate::cache::BoundedCache;
use crate::domain::order::Order;
use crate::metrics::Metrics;
use crate::store::{OrderStore, StoreError};

/// Cache-aside lookup: cache first, then the store, back-filling on a hit.
#[derive(Clone)]
pub struct ReadPath {
    cache: Arc<BoundedCache>,
    store: Arc<dyn OrderStore>,
    metrics: Arc<Metrics>,
}

impl ReadPath {
    pub fn new(cache: Arc<BoundedCache>, store: Arc<dyn OrderStore>, metrics: Arc<Metrics>) -> Self {
        Self { cache, store, metrics }
    }

    pub fn cache(&self) -> &Arc<BoundedCache> {
        &self.cache
    }

    pub async fn lookup(&self, order_uid: &str) -> Result<Option<Arc<Order>>, StoreError> {
        if let Some(order) = self.cache.get(order_uid) {
            self.metrics.record_cache_lookup(true);
            return Ok(Some(order));
        }
        self.metrics.record_cache_lookup(false);

        let order = match self.store.get_by_id(order_uid).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                self.metrics.record_store_fallback("not_found");
                return Ok(None);
            }
            Err(e) => {
                self.metrics.record_store_fallback("error");
                tracing::error!(order_uid = %order_uid, error = %e, "Store lookup failed");
                return Err(e);
            }
        };

        self.metrics.record_store_fallback("found");
        let evicted = self.cache.put(order.clone());
        self.metrics.record_cache_put(evicted.is_some(), self.cache.len());
        tracing::debug!(order_uid = %order_uid, "Back-filled cache from store");

        Ok(Some(Arc::new(order)))
    }
}
