use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ragdb_core::types::{Metadata, RawChunk};
use serde::Deserialize;

#[derive(Deserialize)]
struct ChunkLine {
    content: String,
    #[serde(default)]
    metadata: Metadata,
}

/// `*.jsonl` and `*.txt` files under `root` (or `root` itself), sorted.
pub fn list_chunk_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| matches!(p.extension().and_then(|s| s.to_str()), Some("jsonl" | "txt")))
        .collect();
    files.sort();
    files
}

/// One chunk per JSON line (`{"content": ..., "metadata": {...}}`) or, for
/// plain text, per blank-line separated paragraph.
pub fn load_chunk_file(path: &Path) -> Result<Vec<RawChunk>> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => String::from_utf8_lossy(&fs::read(path).with_context(|| format!("reading {}", path.display()))?).to_string(),
    };
    if path.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut chunks = Vec::new();
        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() { continue; }
            let parsed: ChunkLine = serde_json::from_str(line).with_context(|| format!("{}:{}: invalid chunk line", path.display(), n + 1))?;
            chunks.push(RawChunk { content: parsed.content, metadata: parsed.metadata });
        }
        return Ok(chunks);
    }
    Ok(text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| RawChunk { content: p.to_string(), metadata: Metadata::new() })
        .collect())
}
