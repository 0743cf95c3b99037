use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indexer::{build_index, CorpusFormat};
use ircore::InvertedIndex;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and inspect inverted indexes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a corpus file or directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Output index directory
        #[arg(long)]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = CorpusFormat::Auto)]
        format: CorpusFormat,
    },
    /// Print corpus statistics of a saved index, optionally for some terms
    Stats {
        #[arg(long)]
        index: PathBuf,
        terms: Vec<String>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, format } => {
            let index = build_index(&input, format).with_context(|| format!("building index from {}", input.display()))?;
            index.save(&output).with_context(|| format!("saving index to {}", output.display()))?;
            tracing::info!(output = %output.display(), "index build complete");
            Ok(())
        }
        Commands::Stats { index, terms } => {
            let idx = InvertedIndex::load(&index).with_context(|| format!("loading index {}", index.display()))?;
            let stats = idx.corpus_stats();
            println!("documents:   {}", stats.num_docs);
            println!("terms:       {}", idx.num_terms());
            println!("total terms: {}", stats.total_terms);
            println!("avg length:  {:.4}", stats.avg_dl);
            for term in terms {
                let ts = idx.term_stats(&term);
                println!("{term}: corpus_count={} doc_count={}", ts.corpus_count, ts.doc_count);
            }
            Ok(())
        }
    }
}
