use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use medsearch_core::{DocumentInput, EngineConfig, ListRequest, SearchEngine};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "medsearch")]
#[command(about = "Ingest and search documents with a TF-IDF inverted index", long_about = None)]
struct Cli {
    /// Database file backing the document store
    #[arg(long, global = true, default_value = "./medsearch.db")]
    db: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest documents from a JSON/JSONL file or a directory of them
    Ingest {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
    },
    /// Run a ranked query against the index
    Search {
        /// Query text; supports -term exclusions and "quoted phrases"
        query: String,
        /// Maximum number of hits to print
        #[arg(long, default_value_t = 10)]
        top_k: usize,
        /// Number of leading hits to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Emit the full result set as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List stored documents
    List {
        /// Only documents carrying this source tag
        #[arg(long)]
        source: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Print one document as JSON
    Get {
        /// External document id
        id: String,
    },
    /// Delete a document and its postings
    Remove {
        /// External document id
        id: String,
    },
    /// Rebuild the in-memory index from the store
    Reindex,
    /// Cross-check the index against the store and repair drift
    Verify,
    /// Print corpus and index statistics
    Stats,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let engine = SearchEngine::open(EngineConfig {
        db_path: Some(cli.db.clone()),
        ..EngineConfig::default()
    })
    .with_context(|| format!("opening database {}", cli.db.display()))?;

    match cli.command {
        Commands::Ingest { input } => ingest(&engine, &input),
        Commands::Search {
            query,
            top_k,
            offset,
            json,
        } => search(&engine, &query, top_k, offset, json),
        Commands::List {
            source,
            limit,
            offset,
        } => list(&engine, source, limit, offset),
        Commands::Get { id } => {
            let doc = engine.document_by_external_id(&id)?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
            Ok(())
        }
        Commands::Remove { id } => {
            let doc = engine.remove_by_external_id(&id)?;
            println!("removed {} (doc {})", doc.external_id, doc.doc_id);
            Ok(())
        }
        Commands::Reindex => {
            let summary = engine.reindex_all()?;
            println!(
                "reindexed {} documents, {} terms",
                summary.documents, summary.terms
            );
            Ok(())
        }
        Commands::Verify => {
            let summary = engine.verify()?;
            println!(
                "checked {} documents: {} repaired, {} dangling entries removed",
                summary.checked, summary.repaired, summary.removed
            );
            Ok(())
        }
        Commands::Stats => {
            let stats = engine.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

fn ingest(engine: &SearchEngine, input: &Path) -> Result<()> {
    let files = collect_input_files(input)?;
    if files.is_empty() {
        anyhow::bail!("no .json or .jsonl files under {}", input.display());
    }

    let mut created = 0usize;
    let mut updated = 0usize;
    let mut unchanged = 0usize;
    let mut failed = 0usize;

    for file in files {
        let docs = read_input_file(&file)
            .with_context(|| format!("reading {}", file.display()))?;
        for doc in docs {
            let before = engine
                .document_by_external_id(&doc.id)
                .ok()
                .map(|d| d.revision);
            match engine.add_or_update(&doc) {
                Ok(stored) => match before {
                    None => created += 1,
                    Some(rev) if stored.revision > rev => updated += 1,
                    Some(_) => unchanged += 1,
                },
                Err(e) => {
                    failed += 1;
                    tracing::warn!(id = %doc.id, error = %e, "skipping document");
                }
            }
        }
    }

    tracing::info!(created, updated, unchanged, failed, "ingest complete");
    println!("ingested: {created} created, {updated} updated, {unchanged} unchanged, {failed} failed");
    Ok(())
}

fn collect_input_files(input: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    Ok(files)
}

fn read_input_file(file: &Path) -> Result<Vec<DocumentInput>> {
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let reader = BufReader::new(File::open(file)?);
        let mut docs = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            docs.push(serde_json::from_str(&line)?);
        }
        return Ok(docs);
    }
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    let docs = match json {
        serde_json::Value::Array(arr) => arr
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(docs)
}

fn search(engine: &SearchEngine, query: &str, top_k: usize, offset: usize, json: bool) -> Result<()> {
    let start = Instant::now();
    let results = engine.search(query, top_k, offset)?;
    let took_s = start.elapsed().as_secs_f64();

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    println!(
        "{} hits for {:?} in {:.4}s",
        results.total_hits, results.query, took_s
    );
    for (i, hit) in results.hits.iter().enumerate() {
        println!(
            "{:2}. [{:.4}] {} ({})",
            offset + i + 1,
            hit.score,
            hit.title,
            hit.external_id
        );
        if let Some(snippet) = &hit.snippet {
            println!("      {}", snippet.replace('\n', " "));
        }
    }
    Ok(())
}

fn list(engine: &SearchEngine, source: Option<String>, limit: usize, offset: usize) -> Result<()> {
    let docs = engine.list(&ListRequest {
        source,
        limit,
        offset,
    })?;
    for doc in docs {
        let tag = if doc.source.is_empty() {
            String::new()
        } else {
            format!(" [{}]", doc.source)
        };
        println!("{:6}  {}  {}{}", doc.doc_id, doc.external_id, doc.title, tag);
    }
    Ok(())
}
