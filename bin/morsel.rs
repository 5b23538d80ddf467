use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use morsel::{FsStore, IndexWriter, IndexingConfig, MemoryCache, Searcher, SearcherConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "morsel")]
#[command(about = "Client-servable full-text search indexer and query tool", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an index directory from a source directory
    Index {
        /// Directory of .json, .txt and .md source files
        source_dir: PathBuf,

        /// Directory the index is written to
        output_dir: PathBuf,

        /// Only apply changes since the last run
        #[arg(long)]
        incremental: bool,

        /// JSON indexing configuration; missing keys use defaults
        #[arg(long, env = "MORSEL_CONFIG")]
        config: Option<PathBuf>,

        /// Mining threads (defaults to the number of CPUs)
        #[arg(long, env = "MORSEL_THREADS")]
        threads: Option<usize>,
    },

    /// Search an index directory
    Search {
        /// Directory holding morsel_config.json
        index_dir: PathBuf,

        /// Query string
        query: String,

        /// Number of results to show
        #[arg(long, short = 'n', default_value = "10")]
        limit: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match Args::parse().command {
        Command::Index {
            source_dir,
            output_dir,
            incremental,
            config,
            threads,
        } => {
            let mut indexing_config = match &config {
                Some(path) => IndexingConfig::from_file(path)
                    .with_context(|| format!("reading config {}", path.display()))?,
                None => IndexingConfig::default(),
            };
            if let Some(threads) = threads {
                indexing_config = indexing_config.with_num_threads(threads);
            }

            info!("morsel v{} indexing {:?}", morsel::VERSION, source_dir);
            let writer = IndexWriter::new(indexing_config)?;
            let summary = if incremental {
                writer.build_incremental(&source_dir, &output_dir)?
            } else {
                writer.build(&source_dir, &output_dir)?
            };

            println!(
                "{} docs ({} new, {} deleted), {} terms in {} postings blocks, index {}",
                summary.num_docs,
                summary.num_new_docs,
                summary.num_deleted_docs,
                summary.num_terms,
                summary.num_pls,
                summary.index_ver
            );
        }

        Command::Search {
            index_dir,
            query,
            limit,
            json,
        } => {
            let searcher = Searcher::open(
                Arc::new(FsStore::new(&index_dir)),
                Some(Arc::new(MemoryCache::new())),
                SearcherConfig::default(),
            )
            .await
            .with_context(|| format!("opening index {}", index_dir.display()))?;

            let mut results = searcher.search(&query).await?;
            let retrieved = results.retrieve(limit).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&retrieved)?);
                return Ok(());
            }

            for (original, corrected) in results.corrections() {
                println!("searched for \"{}\" instead of \"{}\"", corrected, original);
            }
            println!("{} matches", results.num_matches());
            for result in &retrieved {
                let title = result
                    .field("title")
                    .or_else(|| result.field("link"))
                    .unwrap_or("(untitled)");
                println!("\n[{:.4}] {}", result.score, title);
                for excerpt in &result.excerpts {
                    if let Some(heading) = &excerpt.heading {
                        println!("  # {}", heading);
                    }
                    println!("  {}", excerpt.excerpt.render("**", "**"));
                }
            }
        }
    }

    Ok(())
}
