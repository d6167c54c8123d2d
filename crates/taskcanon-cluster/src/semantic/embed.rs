//! Embedding backends.
//!
//! The sentence-embedding model is a black box behind [`Embedder`]. Two
//! backends ship with the crate:
//!
//! - [`TokenHashEmbedder`]: deterministic, offline feature hashing of words
//!   and character trigrams. Captures spelling overlap, not meaning.
//! - `OllamaEmbedder` (feature `ollama`): a local Ollama server.

use rayon::prelude::*;

use crate::ClusterError;

/// Maps texts to fixed-dimension vectors. Must be deterministic for a fixed
/// `model_id`.
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> String;

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ClusterError>;
}

// ============================================================================
// Token-hash embeddings
// ============================================================================

pub const DEFAULT_TOKEN_HASH_DIM: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenHashEmbedder {
    dim: usize,
}

impl Default for TokenHashEmbedder {
    fn default() -> Self {
        Self {
            dim: DEFAULT_TOKEN_HASH_DIM,
        }
    }
}

impl TokenHashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        let mut add = |feature: &str, weight: f32| {
            let h = fnv1a64(feature);
            let idx = (h % self.dim as u64) as usize;
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign * weight;
        };

        for word in text.split_whitespace() {
            add(&format!("w:{word}"), 1.0);
            let padded: Vec<char> = format!("^{word}$").chars().collect();
            for tri in padded.windows(3) {
                let tri: String = tri.iter().collect();
                add(&format!("t:{tri}"), 0.5);
            }
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}

impl Embedder for TokenHashEmbedder {
    fn model_id(&self) -> String {
        format!("token-hash-{}", self.dim)
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ClusterError> {
        Ok(texts.par_iter().map(|t| self.embed_one(t)).collect())
    }
}

fn fnv1a64(s: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.as_bytes() {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h
}

// ============================================================================
// Ollama embeddings
// ============================================================================

#[cfg(feature = "ollama")]
pub use ollama::OllamaEmbedder;

#[cfg(feature = "ollama")]
mod ollama {
    use std::time::Duration;

    use serde::Deserialize;

    use super::Embedder;
    use crate::ClusterError;

    pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";

    /// Embeddings from a local Ollama server.
    ///
    /// Uses the batched `/api/embed` endpoint and falls back to per-item
    /// `/api/embeddings` on servers that predate it.
    #[derive(Debug, Clone)]
    pub struct OllamaEmbedder {
        host: String,
        model: String,
        timeout: Option<Duration>,
    }

    impl OllamaEmbedder {
        pub fn new(host: &str, model: &str, timeout: Option<Duration>) -> Self {
            Self {
                host: normalize_host(host),
                model: model.to_string(),
                timeout,
            }
        }

        /// Host from `TASKCANON_OLLAMA_HOST`, else the loopback default.
        pub fn from_env(model: &str, timeout: Option<Duration>) -> Self {
            let host = std::env::var("TASKCANON_OLLAMA_HOST").unwrap_or_default();
            Self::new(&host, model, timeout)
        }

        pub fn host(&self) -> &str {
            &self.host
        }

        fn client(&self) -> Result<reqwest::blocking::Client, ClusterError> {
            let mut builder = reqwest::blocking::Client::builder();
            if let Some(timeout) = self.timeout {
                builder = builder.timeout(timeout);
            }
            builder
                .build()
                .map_err(|e| ClusterError::Embedding(format!("failed to build http client: {e}")))
        }
    }

    impl Embedder for OllamaEmbedder {
        fn model_id(&self) -> String {
            format!("ollama:{}", self.model)
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ClusterError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let client = self.client()?;

            let url = format!("{}/api/embed", self.host);
            let body = serde_json::json!({ "model": self.model, "input": texts, "truncate": true });
            match client.post(&url).json(&body).send() {
                Ok(resp) if resp.status().is_success() => {
                    #[derive(Deserialize)]
                    struct EmbedResp {
                        embeddings: Vec<Vec<f32>>,
                    }
                    let out: EmbedResp = resp.json().map_err(|e| {
                        ClusterError::Embedding(format!("ollama /api/embed returned invalid JSON: {e}"))
                    })?;
                    if out.embeddings.len() != texts.len() {
                        return Err(ClusterError::Embedding(format!(
                            "ollama /api/embed returned {} embeddings for {} inputs",
                            out.embeddings.len(),
                            texts.len()
                        )));
                    }
                    return Ok(out.embeddings);
                }
                Ok(resp) => {
                    tracing::debug!(status = %resp.status(), "ollama /api/embed unavailable, falling back");
                }
                Err(e) => {
                    return Err(ClusterError::Embedding(format!(
                        "failed to reach ollama at {url} (is it running?): {e}"
                    )));
                }
            }

            #[derive(Deserialize)]
            struct EmbeddingsResp {
                embedding: Vec<f32>,
            }
            let url = format!("{}/api/embeddings", self.host);
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                let body = serde_json::json!({ "model": self.model, "prompt": text });
                let resp = client
                    .post(&url)
                    .json(&body)
                    .send()
                    .map_err(|e| ClusterError::Embedding(format!("failed to reach ollama at {url}: {e}")))?;
                if !resp.status().is_success() {
                    let status = resp.status();
                    let text = resp.text().unwrap_or_default();
                    return Err(ClusterError::Embedding(format!("ollama http error {status}: {text}")));
                }
                let r: EmbeddingsResp = resp.json().map_err(|e| {
                    ClusterError::Embedding(format!("ollama /api/embeddings returned invalid JSON: {e}"))
                })?;
                out.push(r.embedding);
            }
            Ok(out)
        }
    }

    fn normalize_host(host: &str) -> String {
        let mut host = host.trim().to_string();
        if host.is_empty() {
            host = DEFAULT_OLLAMA_HOST.to_string();
        }
        if !host.starts_with("http://") && !host.starts_with("https://") {
            host = format!("http://{host}");
        }
        host.trim_end_matches('/').to_string()
    }

}
