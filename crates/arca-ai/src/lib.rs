//! AI layer: sentence embeddings (ONNX Runtime), the text-generation oracle,
//! and LLM-backed conflict classification.

mod error;
pub use error::{AiError, OracleError};

pub mod provider;
pub use provider::{EmbedderCell, EmbeddingConfig, EmbeddingProvider};

pub mod oracle;
pub use oracle::TextOracle;

pub mod classifier;
pub use classifier::{Classification, ConflictClassifier};

#[cfg(feature = "onnx")]
mod embedder;
#[cfg(feature = "onnx")]
pub use embedder::OnnxEmbedder;

#[cfg(feature = "http")]
mod anthropic;
#[cfg(feature = "http")]
pub use anthropic::{AnthropicOracle, DEFAULT_MODEL as DEFAULT_ORACLE_MODEL};
