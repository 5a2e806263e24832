//! Pathway simulation runner
//!
//! Loads a TOML config and JSON inputs, runs the full horizon and writes the
//! tabular output as JSON.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use decarb_pathway::core::{PathwayConfig, Result};
use decarb_pathway::pathway::{PathwayInputs, PathwayOutput, SimulationPathway};

/// Run a technology transition pathway
#[derive(Parser, Debug)]
#[command(name = "pathway_sim")]
#[command(about = "Simulate year-by-year technology transitions of an asset stack")]
struct Args {
    /// Pathway configuration (TOML)
    #[arg(long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Initial assets, technology data and demand (JSON)
    #[arg(long, default_value = "data/inputs.json")]
    inputs: PathBuf,

    /// Where to write the run output
    #[arg(long, short = 'o', default_value = "pathway_output.json")]
    output: PathBuf,

    /// Override the configured random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this year instead of the configured end year
    #[arg(long)]
    until: Option<u32>,

    /// Check registry integrity after the run
    #[arg(long)]
    verify: bool,
}

fn run(args: &Args) -> Result<()> {
    let mut config = PathwayConfig::load(&args.config)?;
    if let Some(seed) = args.seed {
        config.random_seed = seed;
    }
    let inputs = PathwayInputs::load(&args.inputs)?;

    println!("Starting Pathway Simulation");
    println!("===========================");
    println!(
        "Horizon: {}-{}, seed {}, ranking {:?}",
        config.start_year, config.end_year, config.random_seed, config.ranking.method
    );
    println!("Initial assets: {}", inputs.initial_assets.len());
    println!();

    let start = Instant::now();
    let mut pathway = SimulationPathway::new(config, &inputs)?;
    match args.until {
        Some(year) => pathway.run_until(year)?,
        None => pathway.run()?,
    }
    let elapsed = start.elapsed();

    if args.verify {
        pathway.check_referential_integrity()?;
        println!("Registry integrity verified");
    }

    let output = PathwayOutput::from_pathway(&pathway);
    println!("{}", output.summary());
    println!("Run time: {:.2}ms", elapsed.as_secs_f64() * 1000.0);

    output.write_json(&args.output)?;
    println!("\nFull output written to {}", args.output.display());
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("decarb_pathway=info")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        tracing::error!("Pathway run failed: {}", e);
        std::process::exit(1);
    }
}
