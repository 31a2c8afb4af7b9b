// DETERMINISTIC LEDGER ABSTRACTION
// Key/value storage boundary of the DPoS consensus core
//
// SAFETY INVARIANTS:
// 1. Reads and writes are synchronous; no operation suspends mid-call
// 2. The in-memory store iterates in key order, so any derived state is
//    byte-identical across nodes given the same call sequence
// 3. Value encoding (bincode) is deterministic for a fixed type layout

pub mod store;

pub use store::{KvStore, MemoryStore, StoreError, TypedStore};
