//! CLI dispatcher and logging setup.
//!
//! Three subcommands, one per pipeline stage: `train` fits the coarse
//! and PQ codebooks, `index` quantizes the reference set against them,
//! `query` loads the resulting store and serves searches for a
//! directory of query descriptors. Each takes a single `--config`
//! pointing at a `key = value` param file ([`ivfadc::config`]).
//!
//! Library errors ([`ivfadc::IvfadcError`]) are converted to
//! `anyhow::Error` at this boundary — the CLI's job is to report them
//! and exit non-zero, not to recover from them.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ivfadc::config::RunConfig;
use ivfadc::query::QueryEngine;
use ivfadc::{index, train};

#[derive(Parser)]
#[command(name = "ivfadc", about = "Multithreaded IVFADC approximate nearest-neighbor image search")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train the coarse and product-quantization codebooks.
    Train {
        #[arg(long)]
        config: PathBuf,
    },
    /// Quantize the reference descriptor set and build the inverted file.
    Index {
        #[arg(long)]
        config: PathBuf,
    },
    /// Load a built index and search it with a directory of query descriptors.
    Query {
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Train { config } => run_train(&config),
        Command::Index { config } => run_index(&config),
        Command::Query { config } => run_query(&config),
    }
}

fn load_config(path: &PathBuf) -> anyhow::Result<RunConfig> {
    RunConfig::load(path).with_context(|| format!("loading config from {}", path.display()))
}

fn run_train(config_path: &PathBuf) -> anyhow::Result<()> {
    let cfg = load_config(config_path)?;
    train::train(&cfg).context("training coarse and PQ codebooks")?;
    log::info!("training complete: {:?}", cfg.working_dir());
    Ok(())
}

fn run_index(config_path: &PathBuf) -> anyhow::Result<()> {
    let cfg = load_config(config_path)?;
    index::build(&cfg).context("building inverted file")?;
    log::info!("indexing complete: {:?}", cfg.working_dir());
    Ok(())
}

fn run_query(config_path: &PathBuf) -> anyhow::Result<()> {
    let cfg = load_config(config_path)?;
    let engine = QueryEngine::load_from_config(&cfg).context("loading index")?;

    let query_dir = PathBuf::from(&cfg.query_desc);
    let descriptors = ivfadc::descio::load_dir(&query_dir, cfg.dim, None)
        .with_context(|| format!("loading query descriptors from {}", query_dir.display()))?;

    for (name, vec) in descriptors
        .names
        .iter()
        .zip(descriptors.data.chunks(descriptors.d))
    {
        let hits = engine
            .search(vec, cfg.num_ret, cfg.w)
            .with_context(|| format!("searching for query {name}"))?;
        println!("query {name}:");
        for hit in &hits {
            println!("  {:>10}  {:.6}  {}", hit.image_id, hit.distance, hit.name);
        }
    }

    Ok(())
}
