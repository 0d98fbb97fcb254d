use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::domain::order::Order;

// ============================================================================
// Bounded FIFO Cache
// ============================================================================
//
// Capacity-bounded map from order_uid to Order. Eviction is by insertion
// order only: reads never touch the queue, and overwriting an existing key
// keeps its original position.
//
// The value map and the eviction queue share one lock, so a reader can never
// observe a key in one structure but not the other.
//
// ============================================================================

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Arc<Order>>,
    /// Keys oldest-first. Always holds exactly the keys of `entries`.
    queue: VecDeque<String>,
}

impl CacheState {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            queue: VecDeque::with_capacity(capacity),
        }
    }

    fn evict_front(&mut self) -> Option<String> {
        let oldest = self.queue.pop_front()?;
        self.entries.remove(&oldest);
        Some(oldest)
    }
}

pub struct BoundedCache {
    state: RwLock<CacheState>,
    capacity: usize,
}

impl BoundedCache {
    /// A cache holding at most `capacity` orders. Zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: RwLock::new(CacheState::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, order_uid: &str) -> bool {
        self.state.read().entries.contains_key(order_uid)
    }

    pub fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        self.state.read().entries.get(order_uid).cloned()
    }

    /// Insert or overwrite by `order_uid`.
    ///
    /// Returns the key evicted to make room, if any. Overwrites never evict.
    pub fn put(&self, order: Order) -> Option<String> {
        if self.capacity == 0 {
            return None;
        }

        let order = Arc::new(order);
        let mut state = self.state.write();

        if let Some(existing) = state.entries.get_mut(order.key()) {
            *existing = order;
            return None;
        }

        let evicted = if state.entries.len() >= self.capacity {
            state.evict_front()
        } else {
            None
        };

        state.queue.push_back(order.order_uid.clone());
        state.entries.insert(order.order_uid.clone(), order);
        evicted
    }

    /// Replace the whole cache with `orders`, enqueued in iteration order.
    ///
    /// A key repeated in the input keeps its first position and its last
    /// value. When the input exceeds capacity the earliest entries are
    /// evicted. Returns the number of entries evicted that way.
    pub fn load_all<I>(&self, orders: I) -> usize
    where
        I: IntoIterator<Item = Order>,
    {
        let mut fresh = CacheState::with_capacity(self.capacity);
        for order in orders {
            let order = Arc::new(order);
            if fresh.entries.insert(order.order_uid.clone(), order.clone()).is_none() {
                fresh.queue.push_back(order.order_uid.clone());
            }
        }

        let mut evicted = 0;
        while fresh.entries.len() > self.capacity {
            fresh.evict_front();
            evicted += 1;
        }

        *self.state.write() = fresh;
        evicted
    }

    /// Keys oldest-first, as they would be evicted.
    #[cfg(test)]
    pub(crate) fn eviction_order(&self) -> Vec<String> {
        self.state.read().queue.iter().cloned().collect()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
