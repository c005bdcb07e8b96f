use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use fraud_trainer::config::TrainerConfig;
use fraud_trainer::{format_metric, score_model, train_evaluate, TrainJob};
use tracing::info;

#[derive(Parser)]
#[command(name = "fraud-trainer", about = "Fraud classifier training job")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Train(TrainArgs),
    Score(ScoreArgs),
}

#[derive(Args, Debug, Clone)]
struct TrainArgs {
    #[arg(long, alias = "job_dir")]
    job_dir: Option<String>,
    #[arg(long, alias = "training_dataset_path")]
    training_dataset_path: String,
    #[arg(long, alias = "validation_dataset_path")]
    validation_dataset_path: String,
    #[arg(long, alias = "max_depth")]
    max_depth: usize,
    #[arg(long, alias = "n_estimators")]
    n_estimators: usize,
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    hptune: bool,
}

#[derive(Args, Debug, Clone)]
struct ScoreArgs {
    #[arg(long)]
    model: PathBuf,
    #[arg(long, alias = "dataset_path")]
    dataset_path: String,
}

fn main() {
    load_dotenv();
    init_tracing();
    if let Err(err) = run() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let (config, config_path) = TrainerConfig::load(cli.config).map_err(|err| err.to_string())?;
    if let Some(path) = config_path.filter(|path| path.exists()) {
        info!(path = %path.display(), "loaded config");
    }

    match cli.command {
        Command::Train(args) => {
            let job = TrainJob {
                job_dir: args.job_dir,
                training_dataset_path: args.training_dataset_path,
                validation_dataset_path: args.validation_dataset_path,
                max_depth: args.max_depth,
                n_estimators: args.n_estimators,
                hptune: args.hptune,
            };
            let outcome = train_evaluate(&job, &config).map_err(|err| err.to_string())?;
            info!(?outcome, "job finished");
            Ok(())
        }
        Command::Score(args) => {
            let auc = score_model(&args.model, &args.dataset_path, &config)
                .map_err(|err| err.to_string())?;
            println!("Model {}: {}", config.hypertune.metric_tag, format_metric(auc));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn load_dotenv() {
    let _ = dotenvy::dotenv();
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let manifest_path = Path::new(manifest_dir).join(".env");
    let _ = dotenvy::from_path(manifest_path);
}
