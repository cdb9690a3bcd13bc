//! Text-generation oracle seam.

use async_trait::async_trait;

use crate::OracleError;

/// Text in, text out. No structured-output guarantee: schema enforcement is
/// the caller's job.
#[async_trait]
pub trait TextOracle: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError>;

    /// Model identifier, for logs.
    fn model(&self) -> &str;
}
