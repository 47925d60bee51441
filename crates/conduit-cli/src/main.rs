//! CLI binary for running and validating Conduit pipelines.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use conduit_engine::{PipelineConfig, PipelineExecutor, Severity};
use conduit_functions::FunctionRegistry;

#[derive(Parser)]
#[command(name = "conduit", version, about = "Declarative JSON transformation pipeline runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline over an input document
    Run {
        /// Path to the pipeline JSON file
        pipeline: PathBuf,

        /// Path to the input JSON document (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Pretty-print the result document
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a pipeline JSON file
    Validate {
        /// Path to the pipeline JSON file
        pipeline: PathBuf,
    },

    /// Show information about a pipeline
    Info {
        /// Path to the pipeline JSON file
        pipeline: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            pipeline,
            input,
            pretty,
        } => {
            cmd_run(&pipeline, input.as_deref(), pretty).await?;
        }
        Commands::Validate { pipeline } => {
            cmd_validate(&pipeline)?;
        }
        Commands::Info { pipeline } => {
            cmd_info(&pipeline)?;
        }
    }

    Ok(())
}

fn load_pipeline(path: &Path) -> anyhow::Result<PipelineConfig> {
    let source = std::fs::read_to_string(path)?;
    Ok(PipelineConfig::from_json(&source)?)
}

fn load_input(path: Option<&Path>) -> anyhow::Result<serde_json::Value> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    Ok(serde_json::from_str(&text)?)
}

async fn cmd_run(path: &Path, input: Option<&Path>, pretty: bool) -> anyhow::Result<()> {
    let config = load_pipeline(path)?;
    let input = load_input(input)?;

    let executor = PipelineExecutor::with_default_registry();
    let state = executor.run(&input, &config).await?;

    let document = state.into_document();
    if pretty {
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        println!("{document}");
    }
    Ok(())
}

fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let config = load_pipeline(path)?;
    let functions = FunctionRegistry::builtin();
    let diagnostics = conduit_engine::validate(&config, &functions);

    if diagnostics.is_empty() {
        println!("Pipeline is valid");
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        let severity = match diag.severity {
            Severity::Error => {
                has_error = true;
                "ERROR"
            }
            Severity::Warning => "WARN",
        };
        match &diag.step {
            Some(step) => println!("[{}] {}: {} (step '{}')", severity, diag.rule, diag.message, step),
            None => println!("[{}] {}: {}", severity, diag.rule, diag.message),
        }
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let config = load_pipeline(path)?;

    println!("Steps: {}", config.steps.len());
    println!("Diagnostics: {}", config.diagnostics);
    println!("\nSteps:");
    for (i, step) in config.steps.iter().enumerate() {
        println!(
            "  {} [{}] input={:?} output={:?} key={}",
            step.effective_name(i),
            step.action.kind(),
            step.input,
            step.output,
            step.effective_output_key(i),
        );
    }

    Ok(())
}
