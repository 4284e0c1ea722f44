// src/matching/embedding.rs
// Sentence-embedding capability behind a narrow trait, with local ONNX
// inference as the optional real implementation.

use sha2::{Digest, Sha256};

use crate::errors::EngineError;

/// Embedding dimension of the multilingual MiniLM sentence model.
pub const EMBEDDING_DIM: usize = 384;

/// A sentence-embedding model shared by the semantic matcher.
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EngineError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize;
}

#[cfg(feature = "onnx-embeddings")]
mod onnx {
    use std::path::Path;
    use std::sync::Mutex;

    use log::info;
    use ort::session::Session;

    use super::{EmbeddingModel, EMBEDDING_DIM};
    use crate::errors::EngineError;

    /// MiniLM inference through ONNX Runtime.
    ///
    /// Expects `model.onnx` and `tokenizer.json` in the model directory.
    /// The session sits behind a Mutex because `Session::run` needs
    /// `&mut self` while the trait exposes `&self` for shared use.
    pub struct OnnxEmbedder {
        session: Mutex<Session>,
        tokenizer: tokenizers::Tokenizer,
    }

    impl OnnxEmbedder {
        pub fn load(model_dir: &Path) -> Result<Self, EngineError> {
            let model_path = model_dir.join("model.onnx");
            let tokenizer_path = model_dir.join("tokenizer.json");
            for required in [&model_path, &tokenizer_path] {
                if !required.exists() {
                    return Err(EngineError::source_unavailable(
                        "embedding-model",
                        format!("missing {}", required.display()),
                        false,
                    ));
                }
            }

            let session = Session::builder()
                .and_then(|b| b.with_intra_threads(2))
                .and_then(|b| b.commit_from_file(&model_path))
                .map_err(|e| {
                    EngineError::source_unavailable("embedding-model", format!("ONNX load failed: {e}"), false)
                })?;
            let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| {
                EngineError::source_unavailable("embedding-model", format!("tokenizer load failed: {e}"), false)
            })?;

            info!("ONNX embedder loaded from {}", model_dir.display());
            Ok(OnnxEmbedder { session: Mutex::new(session), tokenizer })
        }

        fn infer(&self, text: &str) -> Result<Vec<f32>, EngineError> {
            use ort::value::TensorRef;

            let embed_err =
                |msg: String| EngineError::source_unavailable("embedding-model", msg, false);

            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|e| embed_err(format!("tokenization failed: {e}")))?;

            let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
            let attention_mask: Vec<i64> =
                encoding.get_attention_mask().iter().map(|&m| m as i64).collect();
            let token_type_ids: Vec<i64> =
                encoding.get_type_ids().iter().map(|&t| t as i64).collect();
            let seq_len = input_ids.len();

            let ids = ndarray::Array2::from_shape_vec((1, seq_len), input_ids)
                .map_err(|e| embed_err(e.to_string()))?;
            let mask = ndarray::Array2::from_shape_vec((1, seq_len), attention_mask.clone())
                .map_err(|e| embed_err(e.to_string()))?;
            let types = ndarray::Array2::from_shape_vec((1, seq_len), token_type_ids)
                .map_err(|e| embed_err(e.to_string()))?;

            let ids_tensor = TensorRef::from_array_view(&ids).map_err(|e| embed_err(e.to_string()))?;
            let mask_tensor = TensorRef::from_array_view(&mask).map_err(|e| embed_err(e.to_string()))?;
            let type_tensor = TensorRef::from_array_view(&types).map_err(|e| embed_err(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| embed_err("session lock poisoned".into()))?;
            let outputs = session
                .run(ort::inputs![ids_tensor, mask_tensor, type_tensor])
                .map_err(|e| embed_err(format!("inference failed: {e}")))?;

            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| embed_err(format!("output extraction failed: {e}")))?;
            if shape.len() != 3 || shape[2] as usize != EMBEDDING_DIM {
                return Err(embed_err(format!(
                    "unexpected output shape {shape:?}, expected [1, {seq_len}, {EMBEDDING_DIM}]"
                )));
            }

            // Mean pooling over tokens, weighted by the attention mask,
            // then L2 normalization.
            let mut pooled = vec![0.0f32; EMBEDDING_DIM];
            let mut mask_sum = 0.0f32;
            for (token_idx, &mask_val) in attention_mask.iter().enumerate().take(seq_len) {
                let weight = mask_val as f32;
                mask_sum += weight;
                let offset = token_idx * EMBEDDING_DIM;
                for (dim_idx, slot) in pooled.iter_mut().enumerate() {
                    *slot += data[offset + dim_idx] * weight;
                }
            }
            if mask_sum > 0.0 {
                for value in &mut pooled {
                    *value /= mask_sum;
                }
            }
            super::l2_normalize(&mut pooled);
            Ok(pooled)
        }
    }

    impl EmbeddingModel for OnnxEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
            self.infer(text)
        }

        fn dimension(&self) -> usize {
            EMBEDDING_DIM
        }
    }
}

#[cfg(feature = "onnx-embeddings")]
pub use onnx::OnnxEmbedder;

/// Bucket space of the hashed embedder. Wide enough that two distinct
/// tokens landing in the same bucket is not a practical concern.
pub const HASHED_DIM: usize = 65_536;

/// Deterministic bag-of-tokens embedder: every whitespace token is hashed
/// into a fixed bucket, counts are L2-normalized. Cosine similarity then
/// reflects token overlap, which makes it a usable stand-in when the ONNX
/// model resource is not installed, and the fixture for tests.
pub struct HashedEmbedder {
    dimension: usize,
}

impl HashedEmbedder {
    pub fn new() -> Self {
        HashedEmbedder { dimension: HASHED_DIM }
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(raw) % self.dimension as u64) as usize
    }
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        HashedEmbedder::new()
    }
}

impl EmbeddingModel for HashedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            vector[self.bucket(token)] += 1.0;
        }
        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}
