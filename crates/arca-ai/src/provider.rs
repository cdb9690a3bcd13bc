//! Embedding provider seam and the process-wide embedder slot.
//!
//! Retrieval only works if the query and the indexed policy chunks share one
//! embedding space. [`EmbedderCell`] holds the single provider of a process:
//! it is initialised lazily and at most once, shared read-only afterwards, and
//! refuses any later request for a different [`EmbeddingConfig`].

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::AiError;

/// Model identity and normalisation, fixed for the lifetime of a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub normalize: bool,
}

impl EmbeddingConfig {
    pub fn new(model: impl Into<String>, normalize: bool) -> Self {
        Self {
            model: model.into(),
            normalize,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::new("all-MiniLM-L6-v2", true)
    }
}

impl fmt::Display for EmbeddingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (normalize={})", self.model, self.normalize)
    }
}

/// Maps text to a fixed-dimension vector. Same text, same vector.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, AiError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AiError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dim(&self) -> usize;

    fn config(&self) -> &EmbeddingConfig;
}

/// Lazily initialised, write-once holder for the process embedder.
///
/// Use [`EmbedderCell::global`] in binaries; tests build their own cells.
pub struct EmbedderCell {
    slot: Mutex<Option<Arc<dyn EmbeddingProvider>>>,
}

impl EmbedderCell {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// The process-wide cell.
    pub fn global() -> &'static EmbedderCell {
        static GLOBAL: EmbedderCell = EmbedderCell::new();
        &GLOBAL
    }

    /// Return the provider for `config`, loading it on first use.
    ///
    /// Repeated calls with the same config return the same instance without
    /// calling `load`. A different config is an error, never a silent swap.
    pub fn get_or_init<F>(
        &self,
        config: &EmbeddingConfig,
        load: F,
    ) -> Result<Arc<dyn EmbeddingProvider>, AiError>
    where
        F: FnOnce(&EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, AiError>,
    {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(active) = slot.as_ref() {
            return check_config(active.config(), config).map(|_| Arc::clone(active));
        }

        let provider = load(config)?;
        check_config(provider.config(), config)?;
        info!(config = %config, dim = provider.dim(), "embedding provider initialised");
        *slot = Some(Arc::clone(&provider));
        Ok(provider)
    }

    /// The provider, if one has been initialised.
    pub fn get(&self) -> Option<Arc<dyn EmbeddingProvider>> {
        self.slot
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(Arc::clone)
    }
}

impl Default for EmbedderCell {
    fn default() -> Self {
        Self::new()
    }
}

fn check_config(active: &EmbeddingConfig, requested: &EmbeddingConfig) -> Result<(), AiError> {
    if active == requested {
        return Ok(());
    }
    error!(
        active = %active,
        requested = %requested,
        "embedding configuration change rejected"
    );
    Err(AiError::EmbeddingConfigMismatch {
        active: active.clone(),
        requested: requested.clone(),
    })
}

/// L2-normalise a vector in place.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedEmbedder {
        config: EmbeddingConfig,
    }

    impl EmbeddingProvider for FixedEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dim(&self) -> usize {
            2
        }

        fn config(&self) -> &EmbeddingConfig {
            &self.config
        }
    }

    fn load_fixed(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, AiError> {
        Ok(Arc::new(FixedEmbedder {
            config: config.clone(),
        }))
    }

    fn counted<'a>(
        calls: &'a AtomicUsize,
    ) -> impl FnOnce(&EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, AiError> + 'a {
        move |config: &EmbeddingConfig| {
            calls.fetch_add(1, Ordering::SeqCst);
            load_fixed(config)
        }
    }

    #[test]
    fn initialises_once() {
        let cell = EmbedderCell::new();
        let calls = AtomicUsize::new(0);
        let config = EmbeddingConfig::default();

        let a = cell.get_or_init(&config, counted(&calls)).unwrap();
        let b = cell.get_or_init(&config, counted(&calls)).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(cell.get().is_some());
    }

    #[test]
    fn rejects_different_model() {
        let cell = EmbedderCell::new();
        let calls = AtomicUsize::new(0);
        cell.get_or_init(&EmbeddingConfig::default(), counted(&calls))
            .unwrap();

        let other = EmbeddingConfig::new("all-mpnet-base-v2", true);
        let err = cell.get_or_init(&other, counted(&calls)).err().unwrap();
        assert!(matches!(err, AiError::EmbeddingConfigMismatch { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rejects_normalisation_change() {
        let cell = EmbedderCell::new();
        let calls = AtomicUsize::new(0);
        cell.get_or_init(&EmbeddingConfig::default(), counted(&calls))
            .unwrap();

        let raw = EmbeddingConfig::new("all-MiniLM-L6-v2", false);
        assert!(cell.get_or_init(&raw, counted(&calls)).is_err());
    }

    #[test]
    fn loader_with_wrong_config_is_rejected() {
        let cell = EmbedderCell::new();
        let result = cell.get_or_init(&EmbeddingConfig::default(), |_| {
            load_fixed(&EmbeddingConfig::new("something-else", true))
        });
        assert!(result.is_err());
        assert!(cell.get().is_none());
    }

    #[test]
    fn failed_load_leaves_cell_empty() {
        let cell = EmbedderCell::new();
        let result = cell.get_or_init(&EmbeddingConfig::default(), |_| {
            Err(AiError::Embedding("model.onnx not found".into()))
        });
        assert!(result.is_err());
        assert!(cell.get().is_none());
    }

    #[test]
    fn normalize_gives_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, [0.0, 0.0]);
    }
}
