// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits describing what a review,
// a tokenised document and a batch row ARE.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// The batch-scoped types (BatchStat, Permutation) live here too
// because both the data layer (which creates them) and the ml
// layer (which consumes them) need the same definitions.

// Raw reviews and their tokenised form
pub mod document;

// Per-row batch metadata and permutation bookkeeping
pub mod batch_stat;

// Core abstractions (traits) that other layers implement
pub mod traits;
