//! Query-evaluation harness: load or build an index, run a query file with a
//! chosen ranking function and report per-query average precision, mean
//! average precision and elapsed time.

use anyhow::{bail, Context, Result};
use indexer::{build_index, CorpusFormat};
use ircore::{BatchRunner, Evaluator, Interrupt, InvertedIndex, Qrels, Query, QueryId, RankerConfig};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RankerKind {
    Inl2,
    Bm25,
    PivotedLength,
    JelinekMercer,
}

#[derive(Debug, Clone, clap::Args)]
pub struct RankerArgs {
    /// Built-in ranking function
    #[arg(long, value_enum, default_value_t = RankerKind::Inl2)]
    pub ranker: RankerKind,
    /// JSON ranker configuration, e.g. {"method":"bm25","k1":1.2}; overrides --ranker
    #[arg(long)]
    pub ranker_config: Option<PathBuf>,
    /// InL2 normalization parameter
    #[arg(long)]
    pub c: Option<f64>,
    #[arg(long)]
    pub k1: Option<f64>,
    #[arg(long)]
    pub b: Option<f64>,
    #[arg(long)]
    pub k3: Option<f64>,
    /// Pivoted length slope
    #[arg(long)]
    pub s: Option<f64>,
    /// Jelinek-Mercer interpolation weight
    #[arg(long)]
    pub lambda: Option<f64>,
}

impl RankerArgs {
    pub fn config(&self) -> Result<RankerConfig> {
        if let Some(path) = &self.ranker_config {
            let f = File::open(path).with_context(|| format!("opening ranker config {}", path.display()))?;
            return serde_json::from_reader(BufReader::new(f))
                .with_context(|| format!("parsing ranker config {}", path.display()));
        }
        use ircore::{InL2, JelinekMercer, OkapiBm25, PivotedLength};
        Ok(match self.ranker {
            RankerKind::Inl2 => RankerConfig::InL2 { c: self.c.unwrap_or(InL2::DEFAULT_C) },
            RankerKind::Bm25 => RankerConfig::Bm25 {
                k1: self.k1.unwrap_or(OkapiBm25::DEFAULT_K1),
                b: self.b.unwrap_or(OkapiBm25::DEFAULT_B),
                k3: self.k3.unwrap_or(OkapiBm25::DEFAULT_K3),
            },
            RankerKind::PivotedLength => RankerConfig::PivotedLength { s: self.s.unwrap_or(PivotedLength::DEFAULT_S) },
            RankerKind::JelinekMercer => {
                RankerConfig::JelinekMercer { lambda: self.lambda.unwrap_or(JelinekMercer::DEFAULT_LAMBDA) }
            }
        })
    }
}

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "evaluator")]
#[command(about = "Run a query batch against an index and report average precision", long_about = None)]
pub struct EvalArgs {
    /// Index directory; built from --corpus when it does not exist yet
    #[arg(long, default_value = "./index")]
    pub index: PathBuf,
    /// Corpus file or directory used to build a missing index
    #[arg(long)]
    pub corpus: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = CorpusFormat::Auto)]
    pub format: CorpusFormat,
    /// One query per line
    #[arg(long, default_value = "queries.txt")]
    pub queries: PathBuf,
    /// Relevance judgments, `query_id doc_id grade` per line
    #[arg(long)]
    pub qrels: PathBuf,
    /// Query id of the first line of the query file
    #[arg(long, default_value_t = 0)]
    pub query_id_start: QueryId,
    #[arg(long, default_value_t = 10)]
    pub top_k: usize,
    /// Stop between queries once this many seconds have passed
    #[arg(long)]
    pub time_budget: Option<f64>,
    #[command(flatten)]
    pub ranker: RankerArgs,
}

/// Loads the index at `path`, or builds and saves it from `corpus` when the
/// directory holds no index.
pub fn load_or_build(path: &Path, corpus: Option<&Path>, format: CorpusFormat) -> Result<InvertedIndex> {
    if ircore::persist::IndexPaths::new(path).exists() {
        return InvertedIndex::load(path).with_context(|| format!("loading index {}", path.display()));
    }
    let Some(corpus) = corpus else {
        bail!("no index at {} and no --corpus to build one from", path.display());
    };
    let index = build_index(corpus, format).with_context(|| format!("building index from {}", corpus.display()))?;
    index.save(path).with_context(|| format!("saving index to {}", path.display()))?;
    Ok(index)
}

/// Reads one query per line; ids are assigned from `id_start` in file order.
pub fn read_queries(path: &Path, id_start: QueryId) -> Result<Vec<(QueryId, Query)>> {
    let f = File::open(path).with_context(|| format!("opening queries {}", path.display()))?;
    let mut queries = Vec::new();
    for (n, line) in BufReader::new(f).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        queries.push((id_start + n as QueryId, Query::parse(line.trim())));
    }
    Ok(queries)
}

/// Runs the whole evaluation, writing the report to `out`.
pub fn run(args: &EvalArgs, out: &mut impl Write) -> Result<ircore::BatchReport> {
    let ranker = args.ranker.config()?.build().context("invalid ranker parameters")?;

    writeln!(out, "Building or loading index...")?;
    let index = load_or_build(&args.index, args.corpus.as_deref(), args.format)?;
    let evaluator = Evaluator::new(Qrels::load(&args.qrels).context("loading relevance judgments")?);
    let queries = read_queries(&args.queries, args.query_id_start)?;

    let interrupt = Interrupt::new();
    if let Some(secs) = args.time_budget {
        let budget = Duration::try_from_secs_f64(secs).context("--time-budget must be a non-negative number of seconds")?;
        interrupt.trigger_after(budget);
    }

    writeln!(out, "Running queries")?;
    let runner = BatchRunner::new(&index, ranker.as_ref(), &evaluator, args.top_k)?.with_interrupt(interrupt);
    let mut write_err = None;
    let report = runner.run(queries, |q| {
        if write_err.is_none() {
            if let Err(e) = writeln!(out, "Query {} average precision: {}", q.ordinal, q.avg_precision) {
                write_err = Some(e);
            }
        }
    })?;
    if let Some(e) = write_err {
        return Err(e.into());
    }

    if report.interrupted {
        writeln!(out, "Interrupted after {} queries", report.queries.len())?;
    }
    writeln!(out, "Mean average precision: {}", report.map)?;
    writeln!(out, "Elapsed: {:.4} seconds", report.elapsed.as_secs_f64())?;
    Ok(report)
}
