use std::collections::BTreeMap;

use ragdb_core::types::SparseVector;
use ragdb_core::{Error, Result};
use tokenizers::Tokenizer;

/// Token ids with special tokens added. Truncation is whatever the
/// tokenizer was configured with.
pub fn token_ids(tokenizer: &Tokenizer, text: &str) -> Result<Vec<u32>> {
    let enc = tokenizer.encode(text, true).map_err(|e| Error::Encoder(format!("Tokenization failed: {}", e)))?;
    Ok(enc.get_ids().to_vec())
}

/// Term-frequency histogram over `ids`, skipping `reserved`, ascending by id.
pub fn term_frequencies(ids: &[u32], reserved: &[u32]) -> SparseVector {
    let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
    for id in ids.iter().filter(|id| !reserved.contains(id)) { *counts.entry(*id).or_insert(0) += 1; }
    let (indices, values) = counts.into_iter().map(|(id, n)| (id, n as f32)).unzip();
    SparseVector { indices, values }
}
