use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use cdbg_rust::config::AssemblyConfig;
use cdbg_rust::gap::run_gap_closing;
use cdbg_rust::graph::construct::build_from_reads;
use cdbg_rust::graph::GraphLike;
use cdbg_rust::io::{open_sequence_file, read_all};
use cdbg_rust::pack::{GraphPack, PackMeta};
use cdbg_rust::logging;
use cdbg_rust::simplify::Simplifier;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "cdbg-rust", author, version, about = "Condensed de Bruijn graph assembler core", arg_required_else_help = true)]
struct Cli {
    /// Config file (.toml or .json); built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Log level; RUST_LOG takes precedence
    #[arg(long = "log-level", global = true, default_value = "info")]
    log_level: String,
    /// Worker threads, overrides the config file
    #[arg(short = 't', long = "threads", global = true)]
    threads: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the condensed graph from short reads and save a graph pack
    Build {
        /// Reads file (FASTA or FASTQ)
        reads: PathBuf,
        /// Output graph pack
        #[arg(short, long, default_value = "graph.cdbg")]
        output: PathBuf,
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Run the simplification passes on a saved graph pack
    Simplify {
        pack: PathBuf,
        #[arg(short, long, default_value = "simplified.cdbg")]
        output: PathBuf,
        /// Write the remaining edges as FASTA
        #[arg(long)]
        fasta: Option<PathBuf>,
    },
    /// Close gaps between dead ends using long reads
    CloseGaps {
        pack: PathBuf,
        /// Long reads file (FASTA or FASTQ)
        reads: PathBuf,
        #[arg(short, long, default_value = "closed.cdbg")]
        output: PathBuf,
        /// Directory for intermediate gap and path dumps
        #[arg(long = "dump-dir")]
        dump_dir: Option<PathBuf>,
        #[arg(long)]
        fasta: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    let mut config = match &cli.config {
        Some(path) => AssemblyConfig::load_from_file(path)
            .with_context(|| format!("cannot load config '{}'", path.display()))?,
        None => AssemblyConfig::default(),
    };
    if let Some(t) = cli.threads {
        config.threads = t;
    }

    match cli.command {
        Commands::Build { reads, output, k } => {
            if let Some(k) = k {
                config.k = k;
            }
            config.validate()?;
            run_build(&config, &reads, &output)
        }
        Commands::Simplify { pack, output, fasta } => {
            config.validate()?;
            run_simplify(&config, &pack, &output, fasta.as_deref())
        }
        Commands::CloseGaps { pack, reads, output, dump_dir, fasta } => {
            config.validate()?;
            run_close_gaps(&config, &pack, &reads, &output, dump_dir.as_deref(), fasta.as_deref())
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn run_build(config: &AssemblyConfig, reads_path: &Path, output: &Path) -> Result<()> {
    let mut source = open_sequence_file(reads_path)?;
    let reads: Vec<Vec<u8>> = read_all(source.as_mut())?.into_iter().map(|r| r.seq).collect();
    if reads.is_empty() {
        anyhow::bail!("reads file '{}' contains no sequences", reads_path.display());
    }
    info!(reads = reads.len(), k = config.k, "building graph");

    let (graph, counts) = build_from_reads(&reads, config.k, config.min_kmer_count)?;
    let mut pack = GraphPack::new(graph, counts);
    pack.meta = PackMeta {
        reads_file: Some(reads_path.display().to_string()),
        build_args: Some(std::env::args().collect::<Vec<_>>().join(" ")),
        build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
    };
    pack.save_to_file(output)
        .with_context(|| format!("cannot write graph pack to '{}'", output.display()))?;
    println!("edges: {}", pack.graph().edge_count() / 2);
    println!("graph pack saved: {}", output.display());
    Ok(())
}

fn load_pack(config: &AssemblyConfig, path: &Path) -> Result<GraphPack> {
    let pack = GraphPack::load_from_file(path)
        .with_context(|| format!("cannot load graph pack '{}'", path.display()))?;
    if pack.k() != config.k {
        anyhow::bail!("graph pack has k = {}, config says k = {}", pack.k(), config.k);
    }
    Ok(pack)
}

fn write_fasta(pack: &GraphPack, path: Option<&Path>) -> Result<()> {
    if let Some(path) = path {
        let mut out = std::io::BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("cannot create '{}'", path.display()))?,
        );
        let n = pack.write_edges_fasta(&mut out)?;
        info!(edges = n, path = %path.display(), "edges written");
    }
    Ok(())
}

fn run_simplify(config: &AssemblyConfig, pack_path: &Path, output: &Path, fasta: Option<&Path>) -> Result<()> {
    let mut pack = load_pack(config, pack_path)?;
    let stats = Simplifier::new(config).run(&mut pack)?;
    pack.save_to_file(output)?;
    write_fasta(&pack, fasta)?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn run_close_gaps(
    config: &AssemblyConfig,
    pack_path: &Path,
    reads_path: &Path,
    output: &Path,
    dump_dir: Option<&Path>,
    fasta: Option<&Path>,
) -> Result<()> {
    let mut pack = load_pack(config, pack_path)?;
    if let Some(dir) = dump_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("cannot create '{}'", dir.display()))?;
    }
    let mut source = open_sequence_file(reads_path)?;
    let stats = run_gap_closing(&mut pack, source.as_mut(), config, dump_dir)?;
    pack.save_to_file(output)?;
    write_fasta(&pack, fasta)?;
    println!("gap classes: {}", stats.gap_classes);
    println!("closed: {}", stats.closed);
    Ok(())
}
