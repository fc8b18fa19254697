use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod autofill;
mod browser;
mod captcha;
mod census;
mod classifier;
mod config;
mod dom;
mod domain;
mod error;
mod judge;
mod llm;
mod locator;
mod models;
mod planner;
mod processor;
mod prompts;
mod session;
mod submitter;
mod trigger;
mod vocabulary;

use config::{Config, SettingsArgs, build_config, random_sleep_duration};
use models::{OutreachJob, RecipientProfile, SenderProfile, SubmissionRequest};
use submitter::FormSubmitter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a JSON file containing outreach records
    Process {
        /// Path to the input JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Path to the output JSON file
        #[arg(short, long)]
        output: PathBuf,

        /// Number of concurrent workers (defaults to the configured concurrency)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Fill and submit a single contact form
    Submit {
        /// Contact form URL
        #[arg(long)]
        url: String,

        /// Message to put into the inquiry body
        #[arg(long)]
        message: String,

        /// JSON file with the sender profile
        #[arg(long)]
        sender_file: Option<PathBuf>,

        /// JSON file with the recipient profile
        #[arg(long)]
        recipient_file: Option<PathBuf>,
    },
    /// Report what a contact page looks like without filling or submitting it
    Inspect {
        /// Contact form URL
        #[arg(long)]
        url: String,
    },
    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Failed to parse {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(build_config(&cli.settings)?);
    let submitter = Arc::new(FormSubmitter::new(config.clone())?);

    match cli.command {
        Commands::Process {
            input,
            output,
            workers,
        } => {
            let workers = workers.unwrap_or(config.max_concurrency).max(1);
            info!(
                "Processing outreach records from {} to {}",
                input.display(),
                output.display()
            );
            process_file(submitter, config, input, output, workers).await?;
        }
        Commands::Submit {
            url,
            message,
            sender_file,
            recipient_file,
        } => {
            let sender: SenderProfile = match sender_file {
                Some(path) => read_json(&path)?,
                None => SenderProfile::default(),
            };
            let recipient: RecipientProfile = match recipient_file {
                Some(path) => read_json(&path)?,
                None => RecipientProfile::default(),
            };
            let request = SubmissionRequest {
                target_url: domain::normalize_url(&url)?.to_string(),
                page_html_snapshot: None,
                message_body: message,
                sender,
                recipient,
            };
            let result = submitter.submit(&request, None).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Inspect { url } => {
            let report = submitter.inspect(&url).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Serve { port } => {
            api::start_api_server(submitter, config.max_concurrency, port).await;
        }
    }

    Ok(())
}

async fn process_file(
    submitter: Arc<FormSubmitter>,
    config: Arc<Config>,
    input: PathBuf,
    output: PathBuf,
    workers: usize,
) -> Result<()> {
    let jobs: Vec<OutreachJob> = read_json(&input)?;
    info!("Loaded {} records from {}", jobs.len(), input.display());

    let semaphore = Arc::new(tokio::sync::Semaphore::new(workers));

    let progress_bar = indicatif::ProgressBar::new(jobs.len() as u64);
    progress_bar.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );

    let mut tasks = Vec::with_capacity(jobs.len());
    for (index, job) in jobs.into_iter().enumerate() {
        let submitter = submitter.clone();
        let semaphore = semaphore.clone();
        let progress_bar = progress_bar.clone();
        let pause = if index == 0 {
            std::time::Duration::ZERO
        } else {
            random_sleep_duration(&config)
        };

        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await?;
            tokio::time::sleep(pause).await;
            let result = processor::process_job(submitter, job).await;
            progress_bar.inc(1);
            anyhow::Ok(result)
        }));
    }

    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        results.push(task.await??);
    }

    let submitted = results.iter().filter(|r| r.submitted).count();
    progress_bar.finish_with_message(format!("{} of {} submitted", submitted, results.len()));

    let output_data = serde_json::to_string_pretty(&results)?;
    std::fs::write(&output, output_data)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!("Wrote {} results to {}", results.len(), output.display());

    Ok(())
}
