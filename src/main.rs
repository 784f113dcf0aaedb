mod application;
mod config;
mod domain;
mod infrastructure;

use application::orchestrator::{Orchestrator, OrchestratorOptions, Session};
use application::tooling::{HostProcess, NullHost, ToolHostInterface};
use clap::{Parser, ValueEnum};
use config::AppConfig;
use infrastructure::model::{ModelProvider, OllamaClient};
use serde_json::json;
use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(
    name = "helmsman",
    version,
    about = "Tool-augmented conversation orchestrator for stdio tool hosts"
)]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:11434")]
    ollama_url: String,
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    max_rounds: Option<usize>,
    #[arg(long)]
    prompt_file: Option<String>,
    #[arg(long, value_enum, default_value_t = RunMode::Cli)]
    mode: RunMode,
    prompt: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RunMode {
    Cli,
    Repl,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    init_tracing();
    info!("Starting helmsman");
    let cli = Cli::parse();
    debug!(?cli.mode, config = ?cli.config, "CLI arguments parsed");

    let config_path = cli.config.as_deref().map(Path::new);
    let mut file_config = AppConfig::load(config_path)?;
    if let Some(model) = cli.model.clone() {
        file_config.model = model;
    }
    if let Some(max_rounds) = cli.max_rounds {
        file_config.max_rounds = max_rounds;
    }

    let host: Arc<dyn ToolHostInterface> = match &file_config.host {
        Some(host_config) => {
            info!(command = host_config.command.as_str(), "Connecting tool host");
            Arc::new(HostProcess::new(host_config.clone()))
        }
        None => {
            warn!("No tool host configured; running without tools");
            Arc::new(NullHost)
        }
    };

    let provider = OllamaClient::new(cli.ollama_url.clone());
    let orchestrator = Orchestrator::new(
        provider,
        host,
        OrchestratorOptions {
            model: file_config.model.clone(),
            model_timeout: file_config.model_timeout,
            tool_timeout: file_config.tool_timeout,
        },
    );

    let mut session = match orchestrator.start_session().await {
        Ok(session) => session,
        Err(err) => {
            orchestrator.shutdown().await;
            return Err(err.user_message().into());
        }
    };
    debug!(
        session_id = session.session_id.as_str(),
        tools = session.directory().specs().len(),
        prompt_bytes = session.system_prompt().len(),
        "Session ready"
    );

    let outcome = match cli.mode {
        RunMode::Cli => run_single(&orchestrator, &mut session, &cli, file_config.max_rounds).await,
        RunMode::Repl => run_repl(&orchestrator, &mut session, file_config.max_rounds).await,
    };

    orchestrator.shutdown().await;
    info!("Client execution finished");
    outcome
}

async fn run_single<P: ModelProvider>(
    orchestrator: &Orchestrator<P>,
    session: &mut Session,
    cli: &Cli,
    max_rounds: usize,
) -> Result<(), Box<dyn Error>> {
    let prompt = load_prompt(cli)?;
    info!("Dispatching single prompt via CLI mode");
    let answer = orchestrator
        .run(session, &prompt, max_rounds)
        .await
        .map_err(|err| err.user_message())?;

    let output = json!({
        "session_id": session.session_id,
        "content": answer,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_repl<P: ModelProvider>(
    orchestrator: &Orchestrator<P>,
    session: &mut Session,
    max_rounds: usize,
) -> Result<(), Box<dyn Error>> {
    info!("Entering REPL mode; awaiting line input");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "exit" | "quit" => break,
            "/history" => {
                println!("{}", serde_json::to_string_pretty(&session.history())?);
            }
            "/clear" => {
                session.clear_history();
                println!("history cleared");
            }
            _ => match orchestrator.run(session, input, max_rounds).await {
                Ok(answer) => println!("{answer}"),
                Err(err) => {
                    // Retry policy belongs to the caller; just report it.
                    warn!(%err, "run failed");
                    eprintln!("{}", err.user_message());
                }
            },
        }
    }
    Ok(())
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init();
    });
}

fn load_prompt(cli: &Cli) -> Result<String, Box<dyn Error>> {
    if let Some(path) = &cli.prompt_file {
        info!(path = %path, "Loading prompt from file");
        let content = fs::read_to_string(path)?;
        return Ok(content.trim().to_string());
    }

    if !cli.prompt.is_empty() {
        info!("Using prompt provided through CLI arguments");
        return Ok(cli.prompt.join(" ").trim().to_string());
    }

    warn!("Prompt not provided via arguments or file");
    Err("prompt required via arguments or --prompt-file".into())
}
