use anyhow::Result;
use clap::Parser;
use evaluator::EvalArgs;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = EvalArgs::parse();
    let stdout = std::io::stdout();
    let report = evaluator::run(&args, &mut stdout.lock())?;
    tracing::info!(queries = report.queries.len(), map = report.map, gmap = report.gmap, "evaluation finished");
    Ok(())
}
