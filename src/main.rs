use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;

use nemo::catalogue::{CatalogueError, FieldCatalogue};
use nemo::config::{self, ConfigError, NemoConfig};
use nemo::pipeline::extraction::ExtractionError;
use nemo::pipeline::processor::{read_documents, save_results, DocumentProcessor};
use nemo::training::ground_truth::{
    evaluate_against_ground_truth, load_ground_truth, load_predictions,
};
use nemo::training::synth::{entity_length_stats, field_distribution, save_inspection};
use nemo::training::{create_training_examples, train, TrainingConfig, TrainingError};

#[derive(Parser)]
#[command(name = "nemo", version, about = "Hebrew medical-document field extraction")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the query API
    Serve(ServeArgs),
    /// Extract entities and sections from a file of documents, one per line
    Validate(ValidateArgs),
    /// Generate synthetic data and train the tagger
    Train(TrainArgs),
    /// Generate synthetic data only and write an inspection file
    Generate(GenerateArgs),
    /// Score a results file against annotated ground truth
    Evaluate(EvaluateArgs),
}

/// Flags shared by commands that load the processor.
#[derive(Args)]
struct ProcessorArgs {
    /// Field catalogue CSV
    #[arg(long)]
    catalogue: Option<PathBuf>,
    /// Directory holding the trained classifier
    #[arg(long)]
    model_dir: Option<PathBuf>,
    /// Minimum span confidence for model entities
    #[arg(long)]
    confidence: Option<f32>,
    /// Minimum token-sort ratio (0-100) for mapping text onto an option
    #[arg(long)]
    fuzzy_threshold: Option<u8>,
    /// Wrap known terms in bracketed markers before classification
    #[arg(long)]
    annotate_markers: bool,
}

impl ProcessorArgs {
    /// Flags win over `NEMO_*` variables.
    fn apply(&self, config: &mut NemoConfig) -> Result<(), CliError> {
        if let Some(path) = &self.catalogue {
            config.catalogue_path = path.clone();
        }
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(threshold) = self.confidence {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(CliError::Usage(format!(
                    "--confidence must be in [0, 1], got {threshold}"
                )));
            }
            config.extraction.confidence_threshold = threshold;
        }
        if let Some(threshold) = self.fuzzy_threshold {
            if threshold > 100 {
                return Err(CliError::Usage(format!(
                    "--fuzzy-threshold must be in [0, 100], got {threshold}"
                )));
            }
            config.extraction.fuzzy_threshold = threshold;
        }
        if self.annotate_markers {
            config.extraction.annotate_markers = true;
        }
        Ok(())
    }
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    processor: ProcessorArgs,
    /// Listen address
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,
}

#[derive(Args)]
struct ValidateArgs {
    #[command(flatten)]
    processor: ProcessorArgs,
    /// Input file, one document per line
    #[arg(long, default_value = "texts.txt", conflicts_with = "text")]
    input: PathBuf,
    /// Process a single inline document instead of a file
    #[arg(long)]
    text: Option<String>,
    #[arg(long, default_value = "validation_results.json")]
    output: PathBuf,
}

#[derive(Args)]
struct TrainArgs {
    /// Field catalogue CSV
    #[arg(long)]
    catalogue: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long, default_value_t = 5)]
    epochs: usize,
    #[arg(long, default_value_t = 1000)]
    min_examples: usize,
    #[arg(long, default_value_t = 1000)]
    max_examples: usize,
    #[arg(long, default_value_t = 0.2)]
    test_size: f32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// `tokenizer.json` of the base model; exports subword features when set
    #[cfg(feature = "onnx")]
    #[arg(long)]
    tokenizer: Option<PathBuf>,
}

#[derive(Args)]
struct GenerateArgs {
    #[arg(long, default_value_t = 1000)]
    min_examples: usize,
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Args)]
struct EvaluateArgs {
    #[arg(long, default_value = "validation_results.json")]
    predictions: PathBuf,
    #[arg(long)]
    ground_truth: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalogue(#[from] CatalogueError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Command::Train(args) => Some(
            args.output_dir
                .clone()
                .unwrap_or_else(config::default_training_dir)
                .join("training.log"),
        ),
        _ => None,
    };
    if let Err(e) = nemo::init_tracing(log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Serve(args) => serve(args),
        Command::Validate(args) => validate(args),
        Command::Train(args) => run_training(args),
        Command::Generate(args) => generate(args),
        Command::Evaluate(args) => evaluate(args),
    }
}

fn serve(args: ServeArgs) -> Result<(), CliError> {
    let mut config = NemoConfig::from_env()?;
    args.processor.apply(&mut config)?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    let processor = Arc::new(DocumentProcessor::from_config(&config)?);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(nemo::api::serve(processor, config.bind_addr))?;
    Ok(())
}

fn validate(args: ValidateArgs) -> Result<(), CliError> {
    let mut config = NemoConfig::from_env()?;
    args.processor.apply(&mut config)?;
    let processor = DocumentProcessor::from_config(&config)?;

    let texts = match args.text {
        Some(text) => vec![text],
        None => read_documents(&args.input)?,
    };
    let report = processor.validate_documents(&texts);
    save_results(&report.results, &args.output)?;
    tracing::info!(
        processed = report.results.len(),
        failed = report.failed,
        labels = report.labels.len(),
        "Validation finished"
    );
    Ok(())
}

fn run_training(args: TrainArgs) -> Result<(), CliError> {
    let mut env = NemoConfig::from_env()?;
    if let Some(path) = args.catalogue {
        env.catalogue_path = path;
    }
    let catalogue = FieldCatalogue::load(&env.catalogue_path)?;

    let defaults = TrainingConfig::default();
    let config = TrainingConfig {
        output_dir: args.output_dir.unwrap_or(defaults.output_dir),
        epochs: args.epochs,
        min_examples: args.min_examples,
        max_examples: args.max_examples,
        test_size: args.test_size,
        seed: args.seed,
        max_length: defaults.max_length,
    };

    #[cfg(feature = "onnx")]
    let tokenizer = match &args.tokenizer {
        Some(path) => Some(
            tokenizers::Tokenizer::from_file(path)
                .map_err(|e| TrainingError::Tokenizer(e.to_string()))?,
        ),
        None => None,
    };
    #[cfg(feature = "onnx")]
    let tokenizer_ref = tokenizer
        .as_ref()
        .map(|t| t as &dyn nemo::training::encode::SubwordTokenizer);
    #[cfg(not(feature = "onnx"))]
    let tokenizer_ref = None;

    let outcome = train(&catalogue, &config, tokenizer_ref)?;
    tracing::info!(
        path = %outcome.final_dir.display(),
        best_epoch = outcome.best_epoch,
        f1 = outcome.eval.f1,
        "Training complete"
    );
    Ok(())
}

fn generate(args: GenerateArgs) -> Result<(), CliError> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let examples = create_training_examples(&mut rng, args.min_examples);
    tracing::info!(examples = examples.len(), "Generated training examples");

    for (field, count) in field_distribution(&examples) {
        tracing::info!("{field}: {count}");
    }
    for (field, stats) in entity_length_stats(&examples) {
        tracing::info!(
            "{field}: mean {:.2} tokens, min {}, max {}, count {}",
            stats.mean,
            stats.min,
            stats.max,
            stats.count
        );
    }
    save_inspection(&examples, &args.output_dir)?;
    Ok(())
}

fn evaluate(args: EvaluateArgs) -> Result<(), CliError> {
    let predictions = load_predictions(&args.predictions)?;
    let ground_truth = load_ground_truth(&args.ground_truth)?;
    let report = evaluate_against_ground_truth(&predictions, &ground_truth);
    tracing::info!("\n{}", report.render());
    Ok(())
}
