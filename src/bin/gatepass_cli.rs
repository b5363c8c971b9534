//! GatePass CLI - Bridge interface for the HTTP layer
//!
//! Commands: submit, export, check-in
//! Outputs JSON to stdout
//! Returns non-zero on pipeline failure

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use gatepass_core::{PipelineConfig, SubmissionInput};

#[derive(Parser)]
#[command(name = "gatepass-cli")]
#[command(about = "GatePass CLI - Event Registration Credential Compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the pipeline configuration file
    #[arg(short, long, default_value = "gatepass.json")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one registration submission
    Submit {
        /// JSON payload (SubmissionInput)
        #[arg(short, long)]
        payload: String,
    },

    /// Print every ledger row as JSON
    Export,

    /// Mark a registrant as entered (check-in scanner path)
    CheckIn {
        /// Unique registration ID
        #[arg(short, long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match PipelineConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(r#"{{"error": "Failed to load config: {}"}}"#, e);
            return ExitCode::FAILURE;
        }
    };

    let pipeline = config.build_pipeline();

    match cli.command {
        Commands::Submit { payload } => {
            let input: SubmissionInput = match serde_json::from_str(&payload) {
                Ok(i) => i,
                Err(e) => {
                    println!(r#"{{"success": false, "error": "Invalid payload: {}"}}"#, e);
                    return ExitCode::FAILURE;
                }
            };

            match pipeline.process_submission(input).await {
                Ok(record) => {
                    // Let the detached dispatch finish before the process
                    // exits; a long-lived caller would not need this.
                    pipeline.drain_notifications().await;
                    let output = serde_json::json!({
                        "success": true,
                        "record": record,
                    });
                    println!("{}", serde_json::to_string_pretty(&output).unwrap());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    let output = serde_json::json!({
                        "success": false,
                        "stage": e.stage().as_str(),
                        "error": e.to_string(),
                    });
                    println!("{}", serde_json::to_string(&output).unwrap());
                    ExitCode::from(2) // Pipeline failure
                }
            }
        }

        Commands::Export => match pipeline.ledger().all_records().await {
            Ok(records) => {
                println!("{}", serde_json::to_string_pretty(&records).unwrap());
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!(r#"{{"error": "{}"}}"#, e);
                ExitCode::FAILURE
            }
        },

        Commands::CheckIn { id } => match pipeline.ledger().mark_entered(&id).await {
            Ok(()) => {
                println!(r#"{{"success": true, "id": "{}"}}"#, id);
                ExitCode::SUCCESS
            }
            Err(e) => {
                let output = serde_json::json!({
                    "success": false,
                    "error": e.to_string(),
                });
                println!("{}", serde_json::to_string(&output).unwrap());
                ExitCode::from(2)
            }
        },
    }
}
