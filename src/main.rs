use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use log::info;
use ovarian_survival::{pipeline, AnalysisConfig, DataSource};

/// Survival analysis of the ovarian cancer trial data
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON analysis config; missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// read the six-column table from this CSV instead of the embedded copy
    #[arg(long)]
    data: Option<PathBuf>,

    /// where plots and the export go
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// skip the SVG plots
    #[arg(long)]
    no_plots: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_path(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if args.no_plots {
        config.plots = false;
    }

    let source = args.data.map_or(DataSource::Embedded, DataSource::File);

    let start = Instant::now();
    let report = pipeline::run(&config, &source).context("analysis failed")?;
    println!("{report}");
    info!("done in {:?}", start.elapsed());
    Ok(())
}
