// ============================================================================
// Cache Module
// ============================================================================
//
// In-memory projection of recently seen orders backing the read path.
// Rebuilt from the store at start-up; never persisted.
//
// ============================================================================

mod bounded;

pub use bounded::BoundedCache;
