mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use codegrade_common::config::{DEFAULT_LANGUAGES_CONFIG, DEFAULT_REDIS_URL};
use codegrade_common::types::Language;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "codegrade-cli")]
#[command(about = "Codegrade CLI - Run, grade and queue code submissions", long_about = None)]
struct Cli {
    /// Language profiles file (builtin profiles are used when missing)
    #[arg(long, global = true, default_value = DEFAULT_LANGUAGES_CONFIG)]
    languages_config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a source file once in the sandbox and print the raw result
    Run {
        /// Language (e.g., python, java, cpp, sql)
        #[arg(short, long)]
        language: Language,

        /// Source file to execute
        #[arg(short, long)]
        file: PathBuf,

        /// File whose contents are fed as stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Initializer script (SQL schema and data)
        #[arg(long)]
        init: Option<PathBuf>,

        /// Timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Grade a source file against a question definition (JSON)
    Grade {
        /// Question JSON file
        #[arg(short, long)]
        question: PathBuf,

        /// Source file to grade
        #[arg(short, long)]
        file: PathBuf,

        /// Submission language (defaults to the question's language)
        #[arg(short, long)]
        language: Option<Language>,
    },

    /// Store a question and queue a submission for the worker
    Submit {
        /// Question JSON file
        #[arg(short, long)]
        question: PathBuf,

        /// Source file to grade
        #[arg(short, long)]
        file: PathBuf,

        /// Submission language (defaults to the question's language)
        #[arg(short, long)]
        language: Option<Language>,

        #[arg(long, env = "REDIS_URL", default_value = DEFAULT_REDIS_URL)]
        redis_url: String,
    },

    /// Show a graded submission stored by the worker
    Status {
        /// Submission id
        #[arg(short, long)]
        id: Uuid,

        #[arg(long, env = "REDIS_URL", default_value = DEFAULT_REDIS_URL)]
        redis_url: String,
    },

    /// List language profiles
    Languages,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            language,
            file,
            input,
            init,
            timeout,
        } => {
            commands::run(
                &cli.languages_config,
                language,
                &file,
                input.as_deref(),
                init.as_deref(),
                timeout,
            )
            .await?;
        }
        Commands::Grade {
            question,
            file,
            language,
        } => {
            commands::grade(&cli.languages_config, &question, &file, language).await?;
        }
        Commands::Submit {
            question,
            file,
            language,
            redis_url,
        } => {
            commands::submit(&redis_url, &question, &file, language).await?;
        }
        Commands::Status { id, redis_url } => {
            commands::status(&redis_url, &id).await?;
        }
        Commands::Languages => {
            commands::list_languages(&cli.languages_config)?;
        }
    }

    Ok(())
}
