//! Process-wide embedder (C2): wraps [`crate::embedding`] with a lazily
//! initialized, process-wide model instance and enforced output
//! normalization.
//!
//! §4.2: "exactly one process-wide instance, lazily initialized on first
//! use... multiple requests may call it concurrently; implementations must
//! serialize access per embedder instance" and "every returned vector has
//! L2 norm 1.00 ± 0.01 (enforced, not assumed)". `embedding::embed_texts`
//! satisfies neither on its own — the local-fastembed backend reloads its
//! model on every call, and no provider normalizes its output — so this
//! module is the actual entry point every caller (ingest, retrieve, upload,
//! rag) goes through instead of `embedding` directly.

use anyhow::{bail, Result};
use tokio::sync::Mutex;

use crate::config::EmbeddingConfig;
use crate::embedding::{self, EmbeddingProvider};

pub struct Embedder {
    config: EmbeddingConfig,
    provider: Mutex<Option<Box<dyn EmbeddingProvider>>>,
}

impl Embedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            config,
            provider: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Encode a batch of texts in configured batch-size windows, enforcing
    /// unit L2 normalization on every output vector. Serialized per
    /// instance: the underlying mutex is held for the whole call, which is
    /// the point — a second concurrent caller waits rather than triggering
    /// a second model load.
    pub async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = self.provider.lock().await;
        if guard.is_none() {
            if !self.config.is_enabled() {
                bail!("embedder unavailable: provider disabled");
            }
            *guard = Some(embedding::create_provider(&self.config)?);
        }
        let provider = guard.as_ref().expect("provider initialized above");

        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let raw = embedding::embed_texts(provider.as_ref(), &self.config, batch).await?;
            out.extend(raw.into_iter().map(normalize_unit));
        }
        Ok(out)
    }

    pub async fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.encode(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector for a single input"))
    }
}

fn normalize_unit(v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return v;
    }
    v.into_iter().map(|x| x / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_unit_produces_unit_norm() {
        let v = normalize_unit(vec![3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[test]
    fn normalize_unit_handles_zero_vector() {
        let v = normalize_unit(vec![0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn encode_on_disabled_provider_errors() {
        let embedder = Embedder::new(EmbeddingConfig::default());
        assert!(!embedder.is_enabled());
        let err = embedder.encode(&["hello".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
