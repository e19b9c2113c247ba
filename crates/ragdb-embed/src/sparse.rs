use std::path::Path;

use async_trait::async_trait;
use ragdb_core::traits::{Encoded, TextEncoder};
use ragdb_core::types::{IndexKind, SparseVector};
use ragdb_core::{Error, Result};
use tokenizers::{Tokenizer, TruncationParams};

use crate::tokenize::{term_frequencies, token_ids};

/// Structural tokens with their multilingual-BERT ids, used when the
/// vocabulary does not name them.
const RESERVED_TOKENS: [(&str, u32); 5] = [("[PAD]", 0), ("[UNK]", 100), ("[CLS]", 101), ("[SEP]", 102), ("[MASK]", 103)];

/// Lexical encoder: term frequencies over a fixed WordPiece vocabulary.
/// Local and deterministic, no network.
pub struct BertSparseEncoder {
    tokenizer: Tokenizer,
    reserved: Vec<u32>,
}

impl BertSparseEncoder {
    pub fn from_file(path: &Path, max_tokens: usize) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| Error::InvalidConfig(format!("Failed to load tokenizer from {}: {}", path.display(), e)))?;
        Self::new(tokenizer, max_tokens)
    }

    /// `max_tokens` bounds the encoding including `[CLS]`/`[SEP]`, so at most
    /// `max_tokens - 2` content tokens are counted.
    pub fn new(mut tokenizer: Tokenizer, max_tokens: usize) -> Result<Self> {
        tokenizer
            .with_truncation(Some(TruncationParams { max_length: max_tokens, ..TruncationParams::default() }))
            .map_err(|e| Error::InvalidConfig(format!("Invalid truncation of {} tokens: {}", max_tokens, e)))?;
        let reserved = RESERVED_TOKENS.iter().map(|(tok, id)| tokenizer.token_to_id(tok).unwrap_or(*id)).collect();
        Ok(Self { tokenizer, reserved })
    }

    pub fn sparse_vector(&self, text: &str) -> Result<SparseVector> {
        let ids = token_ids(&self.tokenizer, text)?;
        Ok(term_frequencies(&ids, &self.reserved))
    }
}

#[async_trait]
impl TextEncoder for BertSparseEncoder {
    type Vector = SparseVector;

    fn kind(&self) -> IndexKind { IndexKind::Sparse }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Encoded<SparseVector>>> {
        texts
            .iter()
            .map(|text| {
                let vector = self.sparse_vector(text)?;
                Ok(Encoded { text: text.clone(), dimension: vector.len(), vector })
            })
            .collect()
    }
}
