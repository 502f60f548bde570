use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::{Commands, EvalArgs};
use cli::report::{render_result, render_run};
use evalloop::config::Config;
use evalloop::eval::{
    EvalDataset, EvalResult, EvalRunRecord, Evaluator, EvaluatorConfig, RecordedOutputTarget, ScorerRegistry,
    ScorerSpec,
};
use evalloop::id::generate_run_id;
use evalloop::storage::{JsonlStorage, RESULTS, RUNS, Storage, StorageExt};

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("evalloop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("evalloop.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::from_default_env();
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Eval(args) => handle_eval_command(args, config).await,
        Commands::Show { run_id, detailed } => handle_show_command(run_id, *detailed, config),
        Commands::Runs => handle_runs_command(config),
        Commands::Config => handle_config_command(config),
    }
}

async fn handle_eval_command(args: &EvalArgs, config: &Config) -> Result<()> {
    let dataset_id = args.resolved_dataset_id();
    let run_id = generate_run_id();
    info!("Evaluating {} as dataset {} (run {})", args.dataset.display(), dataset_id, run_id);

    let dataset = EvalDataset::from_jsonl(&args.dataset, &dataset_id, &run_id)
        .context(format!("Failed to load dataset {}", args.dataset.display()))?;
    if dataset.is_empty() {
        bail!("Dataset {} has no cases", args.dataset.display());
    }

    let evaluator_config = EvaluatorConfig {
        concurrency_limit: args.concurrency.unwrap_or(config.evaluation.concurrency_limit),
        repeat_times: args.repeat.unwrap_or(config.evaluation.repeat_times),
    };
    if evaluator_config.concurrency_limit == 0 || evaluator_config.repeat_times == 0 {
        bail!("--concurrency and --repeat must be at least 1");
    }

    let keys = if args.scorers.is_empty() {
        config.evaluation.scorers.clone()
    } else {
        args.scorers.clone()
    };

    let registry = ScorerRegistry::with_builtins();
    let mut evaluator = Evaluator::new(evaluator_config);
    for key in &keys {
        let mut spec = ScorerSpec::new(key);
        if args.case_insensitive {
            spec = spec.with_option("case_sensitive", serde_json::json!(false));
        }
        let scorer = registry
            .create(&spec)
            .context(format!("Available scorers: {}", registry.keys().join(", ")))?;
        evaluator = evaluator.with_shared_scorer(scorer);
    }

    println!(
        "{} {} cases x{} with {} (concurrency {})",
        "Evaluating:".green(),
        dataset.len(),
        evaluator_config.repeat_times,
        keys.join(", "),
        evaluator_config.concurrency_limit
    );

    let storage = JsonlStorage::new(&config.storage.path).context("Failed to open storage")?;
    let result = evaluator
        .evaluate_and_record(&dataset, Arc::new(RecordedOutputTarget), &storage)
        .await
        .context("Evaluation failed")?;

    println!("{}", render_result(&result, false));
    Ok(())
}

fn handle_show_command(run_id: &str, detailed: bool, config: &Config) -> Result<()> {
    info!("Showing run {} (detailed: {})", run_id, detailed);
    let storage = JsonlStorage::new(&config.storage.path).context("Failed to open storage")?;

    let Some(run) = storage.get_typed::<EvalRunRecord>(RUNS, run_id)? else {
        bail!("Run {} not found in {}", run_id, config.storage.path.display());
    };
    println!("{}", render_run(&run));

    match storage.get_typed::<EvalResult>(RESULTS, run_id)? {
        Some(result) => println!("{}", render_result(&result, detailed)),
        None => println!("{}", "No result recorded for this run".yellow()),
    }
    Ok(())
}

fn handle_runs_command(config: &Config) -> Result<()> {
    let storage = JsonlStorage::new(&config.storage.path).context("Failed to open storage")?;
    let keys = storage.keys(RUNS)?;
    if keys.is_empty() {
        println!("{}", "No runs recorded".yellow());
        return Ok(());
    }
    for key in keys {
        if let Some(run) = storage.get_typed::<EvalRunRecord>(RUNS, &key)? {
            println!("{}", render_run(&run));
        }
    }
    Ok(())
}

fn handle_config_command(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging once the configured level is known
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
