use crate::cache::BoundedCache;
use crate::config::CacheWarm;
use crate::store::{OrderStore, StoreError};

/// Fill the cache from the store before serving traffic.
///
/// Orders are loaded oldest first so the newest ones are the last to be
/// evicted.
pub async fn warm_cache(cache: &BoundedCache, store: &dyn OrderStore, warm: CacheWarm) -> Result<usize, StoreError> {
    let mut orders = match warm {
        CacheWarm::MostRecent(0) => return Ok(0),
        CacheWarm::MostRecent(limit) => store.get_most_recent(limit).await?,
        CacheWarm::All => {
            let mut all = store.get_all().await?;
            all.sort_by(|a, b| b.date_created.cmp(&a.date_created));
            all
        }
    };
    orders.reverse();

    let fetched = orders.len();
    let evicted = cache.load_all(orders);
    let loaded = cache.len();
    tracing::info!(fetched, loaded, evicted, capacity = cache.capacity(), "🔥 Cache warmed from store");
    Ok(loaded)
}
