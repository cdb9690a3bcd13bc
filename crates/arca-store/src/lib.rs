//! Storage layer: policy vector index (in-memory, LanceDB) and compliance report artifacts.

mod error;
pub use error::StoreError;

pub mod index;
pub use index::{IndexEntry, IndexMatch, MemoryIndex, VectorIndex};

pub mod reports;
pub use reports::ReportStore;

#[cfg(feature = "lancedb")]
mod lance;
#[cfg(feature = "lancedb")]
pub use lance::{POLICY_TABLE, PolicyChunk, PolicyIndex};
