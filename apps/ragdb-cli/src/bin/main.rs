use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use ragdb_cli::{build_store, list_chunk_files, load_chunk_file, Gateway};
use ragdb_core::config::Config;
use ragdb_hybrid::VectorStore;
use tracing::warn;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: ragdb [--verbose] <ingest <path> | query <text> [--strategy S] [--k N] [--corpus PATH] | stats>";

struct Args {
    cmd: String,
    positional: Vec<String>,
    strategy: Option<String>,
    k: Option<usize>,
    corpus: Option<PathBuf>,
    verbose: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let raw: Vec<String> = env::args().skip(1).collect();
    let mut positional = Vec::new();
    let (mut strategy, mut k, mut corpus, mut verbose) = (None, None, None, false);
    let mut i = 0;
    while i < raw.len() {
        let value = |i: usize| raw.get(i + 1).cloned().with_context(|| format!("{} requires a value", raw[i]));
        match raw[i].as_str() {
            "--verbose" | "-v" => verbose = true,
            "--strategy" => { strategy = Some(value(i)?); i += 1; }
            "--k" | "-k" => { k = Some(value(i)?.parse().context("--k requires a number")?); i += 1; }
            "--corpus" => { corpus = Some(PathBuf::from(value(i)?)); i += 1; }
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
            _ => positional.push(raw[i].clone()),
        }
        i += 1;
    }
    if positional.is_empty() { bail!(USAGE); }
    let cmd = positional.remove(0);
    Ok(Args { cmd, positional, strategy, k, corpus, verbose })
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

async fn ingest(store: &VectorStore<Gateway>, root: &Path) -> anyhow::Result<(usize, usize)> {
    let files = list_chunk_files(root);
    if files.is_empty() {
        warn!(path = %root.display(), "no .jsonl or .txt chunk files found");
        return Ok((0, 0));
    }
    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?.progress_chars("#>-"));
    let (mut documents, mut chunks) = (0usize, 0usize);
    for path in &files {
        let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        pb.set_message(file_name.clone());
        let raw = load_chunk_file(path)?;
        if !raw.is_empty() {
            chunks += store.store_documents(raw, &file_name).await.with_context(|| format!("storing {}", path.display()))?;
            documents += 1;
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");
    Ok((documents, chunks))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args()?;
    init_logging(args.verbose);
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let store = build_store(&config, &settings).await?;

    match args.cmd.as_str() {
        "ingest" => {
            let root = args.positional.first().map(PathBuf::from).context("ingest requires a path")?;
            println!("Ingesting from {}", root.display());
            let (documents, chunks) = ingest(&store, &root).await?;
            println!("Documents indexed: {}", documents);
            println!("Total chunks: {}", chunks);
        }
        "query" => {
            let text = args.positional.join(" ");
            if text.is_empty() { bail!("query requires text\n{USAGE}"); }
            if let Some(corpus) = &args.corpus { ingest(&store, corpus).await?; }
            let k = args.k.unwrap_or(settings.search.default_max_results);
            let results = store.search_similar(&text, k, args.strategy.as_deref(), None).await?;
            if results.is_empty() {
                println!("No sufficiently relevant results.");
            }
            for (rank, r) in results.iter().enumerate() {
                let source = r.document.file_name.as_deref().unwrap_or("-");
                println!("{}. [{:.3}] {} ({}, {})", rank + 1, r.relevance_score(), r.document.id, source, r.strategy_used);
                println!("   {}", r.document.content.chars().take(200).collect::<String>());
            }
        }
        "stats" => {
            for stats in store.index_stats().await? {
                let dimension = stats.dimension.map_or_else(|| "sparse".to_string(), |d| d.to_string());
                println!("{}: {} records (dimension {})", stats.name, stats.record_count, dimension);
            }
        }
        other => bail!("unknown command {other}\n{USAGE}"),
    }
    Ok(())
}
