// ============================================================================
// Order Domain
// ============================================================================
//
// - Value objects (Order, Delivery, Payment, Item, Currency)
// - Validation (declarative per-field constraint tables)
// - Errors (PayloadError, ValidationError, field diagnostics)
//
// Nothing in here touches I/O; the pipeline and store layers build on it.
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod validation;

pub use value_objects::*;
pub use errors::*;
pub use validation::{check, validate};

#[cfg(test)]
pub(crate) use validation::fixtures;
