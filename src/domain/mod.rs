// ============================================================================
// Domain Layer
// ============================================================================
//
// Business records and the rules they must satisfy before the pipeline
// persists them.
//
// ============================================================================

pub mod order;
