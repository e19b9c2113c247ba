use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use ragdb_core::traits::{Encoded, TextEncoder};
use ragdb_core::types::{DenseVector, IndexKind};
use ragdb_core::Result;
use twox_hash::XxHash64;

/// Offline stand-in for the embedding model: each token is hashed into a
/// fixed-width bucket and the result L2-normalized. Same text, same vector.
pub struct HashingEncoder { dim: usize }

impl HashingEncoder {
    pub fn new(dim: usize) -> Self { Self { dim } }

    pub fn embed_text(&self, text: &str) -> DenseVector {
        let mut v = vec![0f32; self.dim];
        let tokens = text.split_whitespace().map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase()).filter(|t| !t.is_empty());
        for (i, token) in tokens.enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

#[async_trait]
impl TextEncoder for HashingEncoder {
    type Vector = DenseVector;

    fn kind(&self) -> IndexKind { IndexKind::Dense }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Encoded<DenseVector>>> {
        Ok(texts.iter().map(|t| Encoded { text: t.clone(), vector: self.embed_text(t), dimension: self.dim }).collect())
    }
}
