//! Gauntlet CLI
//!
//! Comparative benchmark runner with budget governance and guard evaluation

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use gauntlet::{
    evaluate_guards, load_jsonl, stub_dataset, Billing, BudgetGovernor, Checkpoint,
    ChunkedExecutionEngine, EngineConfig, EngineError, GauntletConfig, GauntletReport,
    HeuristicScorer, ProviderClient, ProviderSpec, ProviderStatistics, ReportBuilder, RunStatus,
    SimulatedProvider,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing_subscriber::EnvFilter;

/// Base seed for simulated providers; offset per provider index
const SIMULATION_SEED: u64 = 42;

#[derive(Parser)]
#[command(name = "gauntlet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark
    Run {
        /// Benchmark configuration file
        #[arg(long, default_value = "gauntlet.yaml")]
        config: PathBuf,

        /// Write the JSON report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Resume from a checkpoint file
        #[arg(long)]
        resume: Option<PathBuf>,
    },

    /// Validate a configuration file without running
    CheckConfig {
        /// Benchmark configuration file
        #[arg(long, default_value = "gauntlet.yaml")]
        config: PathBuf,
    },

    /// Render a saved JSON report as markdown
    Report {
        /// Input JSON report
        #[arg(long)]
        input: PathBuf,

        /// Output markdown file; prints to stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    match cli.command {
        Commands::Run {
            config,
            report,
            resume,
        } => run_benchmark(&config, report.as_deref(), resume.as_deref()),
        Commands::CheckConfig { config } => {
            let loaded = GauntletConfig::load(&config)
                .with_context(|| format!("invalid configuration: {}", config.display()))?;
            println!(
                "OK: {} providers, {} domains, {} guard rules",
                loaded.providers.len(),
                loaded.domains.len(),
                loaded.guards.rules.len()
            );
            Ok(())
        }
        Commands::Report { input, output } => {
            let json = std::fs::read_to_string(&input)
                .with_context(|| format!("failed to read report: {}", input.display()))?;
            let parsed: GauntletReport =
                serde_json::from_str(&json).context("failed to parse report JSON")?;
            let markdown = parsed.to_markdown();
            match output {
                Some(path) => {
                    std::fs::write(&path, markdown)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Wrote {}", path.display());
                }
                None => print!("{markdown}"),
            }
            Ok(())
        }
    }
}

fn run_benchmark(
    config_path: &std::path::Path,
    report_path: Option<&std::path::Path>,
    resume_path: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let config = GauntletConfig::load(config_path)
        .with_context(|| format!("failed to load configuration: {}", config_path.display()))?;

    let started_at = Utc::now();
    let items = match &config.dataset {
        Some(path) => load_jsonl(path, &config.domains)
            .with_context(|| format!("failed to load dataset: {}", path.display()))?,
        None => stub_dataset(&config.domains),
    };
    tracing::info!(
        items = items.len(),
        providers = config.providers.len(),
        chunk_size = config.chunk_size,
        "starting benchmark"
    );

    let mut governor = BudgetGovernor::new(
        config.hard_cap_usd,
        config.soft_cloud_threshold_usd,
        config.throttle_delay(),
    );
    for provider in &config.providers {
        if provider.billing == Billing::Cloud {
            governor.mark_cloud(&provider.id);
        }
    }

    let engine_config = EngineConfig {
        chunk_size: config.chunk_size,
        checkpoint_interval: config.checkpoint_interval,
        checkpoint_dir: Some(config.checkpoint_dir.clone()),
        request_timeout: config.request_timeout(),
    };

    let mut engine = match resume_path {
        Some(path) => {
            let checkpoint = Checkpoint::load(path)
                .with_context(|| format!("failed to load checkpoint: {}", path.display()))?;
            ChunkedExecutionEngine::resume(engine_config, governor, &checkpoint)
        }
        None => ChunkedExecutionEngine::new(engine_config, governor),
    };

    let cancel = engine.cancel_flag();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupt received, finishing current item");
        cancel.store(true, Ordering::Relaxed);
    })
    .context("failed to install interrupt handler")?;

    let mut providers: Vec<(ProviderSpec, Box<dyn ProviderClient>)> = config
        .providers
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let seed = SIMULATION_SEED + i as u64;
            let client: Box<dyn ProviderClient> = match spec.billing {
                Billing::Local => Box::new(SimulatedProvider::local_council(seed)),
                Billing::Cloud => Box::new(SimulatedProvider::hosted_megamodel(seed)),
            };
            (spec.clone(), client)
        })
        .collect();

    let weights: HashMap<String, f64> = config
        .domains
        .iter()
        .map(|d| (d.name.clone(), d.weight))
        .collect();

    let scoring = HeuristicScorer::new();
    let run_result = engine.run(&items, &mut providers, &scoring, &weights);

    let aborted_by_budget = match run_result {
        Ok(_) => false,
        Err(EngineError::Budget(err)) => {
            tracing::error!(error = %err, "run aborted by budget cap");
            true
        }
        Err(err) => return Err(anyhow::Error::new(err).context("benchmark run failed")),
    };

    let engine_state = engine.state();
    let chunks_processed = engine.chunks_processed();
    let (scorer, governor) = engine.into_parts();

    tracing::info!(
        total_spend_usd = governor.total_spend_usd(),
        cloud_spend_usd = governor.cloud_spend_usd(),
        hard_cap_usd = governor.hard_cap_usd(),
        "run finished"
    );

    let statistics: HashMap<String, ProviderStatistics> = scorer
        .provider_ids()
        .into_iter()
        .map(|id| {
            let stats = scorer.compute_statistics(&id, config.confidence_level);
            (id, stats)
        })
        .collect();

    let verdict = evaluate_guards(
        &config.guards.rules,
        &statistics,
        &config.guards.baseline,
        &config.guards.challenger,
    );

    let gauntlet_report = ReportBuilder::new(config.confidence_level, started_at)
        .with_execution(engine_state, chunks_processed)
        .with_spend(governor.total_spend_usd(), governor.cloud_spend_usd())
        .build(scorer, verdict, aborted_by_budget);

    if let Some(path) = report_path {
        std::fs::write(path, gauntlet_report.to_json()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "report written");
    }

    print!("{}", gauntlet_report.to_markdown());

    match gauntlet_report.status {
        RunStatus::Passed => Ok(()),
        status => {
            eprintln!(
                "{}: {}",
                status.label(),
                gauntlet_report.guard_verdict.reason
            );
            std::process::exit(1);
        }
    }
}
