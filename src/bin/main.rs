//! `lineage` binary.
//!
//! Resolve aliases, chat against their current head and submit feedback
//! from the command line. Output is pretty-printed JSON on stdout; logs go
//! to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use alias_lineage::{
    ChatMessage, ChatRequest, Feedback, FeedbackRequest, LineageConfig, LineageService, Role,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lineage", author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "LINEAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve an alias to its serving weights, creating its lineage if new
    Resolve { alias: String },

    /// Show the stored lineage of an alias without creating it
    Show { alias: String },

    /// List aliases with a lineage
    List,

    /// List base models offered for new aliases
    Models,

    /// Answer a prompt with an alias
    Chat(ChatArgs),

    /// Train an alias on feedback and promote the result
    Feedback(FeedbackArgs),
}

#[derive(Args)]
struct ChatArgs {
    alias: String,
    prompt: String,

    #[arg(long)]
    system: Option<String>,

    #[arg(long)]
    max_tokens: Option<i32>,

    #[arg(long)]
    temperature: Option<f64>,
}

#[derive(Args)]
struct FeedbackArgs {
    alias: String,

    /// The prompt the answer was given for
    prompt: String,

    /// Reinforce this generated answer
    #[arg(long, value_name = "ANSWER", conflicts_with = "correct", required_unless_present = "correct")]
    approve: Option<String>,

    /// Replace the answer with this correction
    #[arg(long, value_name = "ANSWER")]
    correct: Option<String>,

    #[arg(long)]
    system: Option<String>,

    /// Only promote if the lineage is still at this version
    #[arg(long)]
    expected_version: Option<u64>,

    /// Token ids the answer was sampled as
    #[arg(long, value_delimiter = ',', requires = "logprobs")]
    tokens: Vec<i64>,

    /// Sampling log probability of each token
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, requires = "tokens")]
    logprobs: Vec<f64>,
}

fn init_logging(verbose: u8) {
    let directive = match verbose {
        0 => "alias_lineage=info,lineage=info",
        1 => "alias_lineage=debug,lineage=debug",
        _ => "alias_lineage=trace,lineage=trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> alias_lineage::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> alias_lineage::Result<()> {
    let config = LineageConfig::load(cli.config.as_deref())?;
    let service = LineageService::from_config(&config)?;

    match cli.command {
        Commands::Resolve { alias } => print_json(&service.resolve_for_inference(&alias).await?),
        Commands::Show { alias } => print_json(&service.lookup(&alias).await?),
        Commands::List => print_json(&service.aliases().await?),
        Commands::Models => print_json(&service.list_base_models()),
        Commands::Chat(args) => {
            let mut messages = Vec::new();
            if let Some(system) = args.system {
                messages.push(ChatMessage::new(Role::System, system));
            }
            messages.push(ChatMessage::new(Role::User, args.prompt));

            let mut request = ChatRequest::new(args.alias, messages);
            request.max_tokens = args.max_tokens;
            request.temperature = args.temperature;

            print_json(&service.chat(request).await?)
        }
        Commands::Feedback(args) => {
            let mut feedback = match (args.approve, args.correct) {
                (Some(answer), _) => Feedback::approved(args.prompt, answer),
                (None, Some(correction)) => Feedback::corrected(args.prompt, correction),
                (None, None) => {
                    return Err(alias_lineage::Error::InvalidRequest(
                        "one of --approve or --correct is required".into(),
                    ))
                }
            };
            if !args.tokens.is_empty() {
                feedback = feedback.with_sample(args.tokens, args.logprobs);
            }

            let mut request = FeedbackRequest::new(args.alias, feedback);
            request.system_prompt = args.system;
            request.expected_version = args.expected_version;

            print_json(&service.submit_feedback(request).await?)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            if let Some(orphan) = e.orphaned_checkpoint() {
                eprintln!(
                    "Unapplied checkpoint: resume {} / weights {}",
                    orphan.resume_checkpoint, orphan.head_weights
                );
            }
            ExitCode::FAILURE
        }
    }
}
