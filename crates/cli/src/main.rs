mod config;
mod error;
mod progress;

use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser};
use futures::FutureExt;
use mcp::Client;
use notify::Hub;
use runtime::{Bridge, BridgeManager, OpenAiBackend};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};
use progress::ProgressPrinter;

#[derive(Parser)]
#[command(name = "mcp-llm-bridge")]
#[command(about = "Let an LLM answer a prompt using the tools of an MCP server", long_about = None)]
#[command(version)]
struct Cli {
    /// The prompt to send to the LLM
    prompt: Option<String>,

    /// The prompt to send to the LLM (alternative flag form)
    #[arg(long = "prompt", value_name = "PROMPT")]
    prompt_flag: Option<String>,

    /// Template name to update with piped input, bypassing the LLM
    #[arg(long)]
    template: Option<String>,

    /// Config file [default: ./bridge.toml when present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wait for whole completions instead of streaming tokens
    #[arg(long)]
    no_stream: bool,

    /// Log more (-v warn, -vv info, -vvv debug, -vvvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// What this invocation should do once the bridge is up.
#[derive(Debug, PartialEq, Eq)]
enum Request {
    Template { name: String, content: String },
    Prompt(String),
    Interactive,
}

impl Request {
    /// Positional prompt, then `--prompt`, then piped input, then ask.
    /// `--template` with piped input writes the template instead.
    fn choose(
        positional: Option<String>,
        flag: Option<String>,
        template: Option<String>,
        piped: Option<String>,
    ) -> Self {
        if let (Some(name), Some(content)) = (&template, &piped) {
            return Self::Template {
                name: name.clone(),
                content: content.clone(),
            };
        }
        positional
            .or(flag)
            .or(piped)
            .map_or(Self::Interactive, Self::Prompt)
    }
}

fn main() {
    match block_on_detached(run()) {
        Ok(Ok(())) => {}
        Ok(Err(e)) | Err(e) => println!("\nError: {e}"),
    }
}

/// Drive `future` on a fresh runtime, then shut it down without waiting for
/// blocking tasks. An interrupted prompt leaves a stdin read on the blocking
/// pool that would otherwise hold the process open until Enter is pressed.
fn block_on_detached<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Runtime::new()?;
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = Config::discover(cli.config.as_deref())?
        .apply_env(|name| std::env::var(name).ok())?
        .resolve()?;
    debug!(server = %config.server, llm = ?config.llm, "run: configuration resolved");

    let piped = read_piped_stdin().await?;
    let request = Request::choose(cli.prompt, cli.prompt_flag, cli.template, piped);
    let stream = !cli.no_stream;

    let hub = Arc::new(Hub::new());
    Arc::new(ProgressPrinter::stdout()).register(&hub);

    let manager = BridgeManager::new(Bridge::from_config(config, hub));
    let outcome = manager
        .run_until(|bridge| session(bridge, request, stream).boxed(), interrupted())
        .await;

    match outcome {
        Some(result) => result,
        None => {
            println!("\nExiting...");
            Ok(())
        }
    }
}

async fn session(
    bridge: &mut Bridge<OpenAiBackend, Client>,
    request: Request,
    stream: bool,
) -> Result<()> {
    if !bridge.is_initialized() {
        warn!("session: continuing without tools");
    }

    let prompt = match request {
        Request::Template { name, content } => {
            let output = bridge.update_template(&name, &content).await?;
            debug!(%output, "session: template updated");
            println!("\nTemplate '{name}' updated successfully.");
            return Ok(());
        }
        Request::Prompt(prompt) => prompt,
        Request::Interactive => ask("\nEnter your prompt: ").await?,
    };

    if prompt.trim().is_empty() {
        println!("\nNo input provided. Exiting...");
        return Ok(());
    }

    let response = bridge.process_message(&prompt, stream).await;
    println!("\n{response}");
    Ok(())
}

/// Read all of stdin when it is piped; `None` for a terminal or empty input.
async fn read_piped_stdin() -> Result<Option<String>> {
    if std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut data = String::new();
    tokio::io::stdin().read_to_string(&mut data).await?;
    let data = data.trim();
    Ok((!data.is_empty()).then(|| data.to_string()))
}

async fn ask(question: &str) -> Result<String> {
    print!("{question}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line.trim().to_string())
}

/// Resolves on Ctrl+C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "interrupted: cannot listen for Ctrl+C");
        futures::future::pending::<()>().await;
    }
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };
    let filter = match (verbose, EnvFilter::try_from_default_env()) {
        (0, Ok(filter)) => filter,
        _ => EnvFilter::try_new(level).map_err(|e| Error::Logging(e.to_string()))?,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Option<String> {
        Some(text.to_string())
    }

    #[test]
    fn positional_prompt_wins() {
        let request = Request::choose(s("positional"), s("flag"), None, s("piped"));
        assert_eq!(request, Request::Prompt("positional".into()));
    }

    #[test]
    fn falls_back_through_flag_and_pipe() {
        assert_eq!(
            Request::choose(None, s("flag"), None, s("piped")),
            Request::Prompt("flag".into())
        );
        assert_eq!(
            Request::choose(None, None, None, s("piped")),
            Request::Prompt("piped".into())
        );
        assert_eq!(Request::choose(None, None, None, None), Request::Interactive);
    }

    #[test]
    fn template_needs_piped_content() {
        assert_eq!(
            Request::choose(s("ignored"), None, s("greeting"), s("Hello")),
            Request::Template {
                name: "greeting".into(),
                content: "Hello".into()
            }
        );
        assert_eq!(
            Request::choose(s("hi"), None, s("greeting"), None),
            Request::Prompt("hi".into())
        );
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from([
            "mcp-llm-bridge",
            "--prompt",
            "hello",
            "--no-stream",
            "-vv",
            "--config",
            "alt.toml",
        ])
        .unwrap();
        assert_eq!(cli.prompt, None);
        assert_eq!(cli.prompt_flag.as_deref(), Some("hello"));
        assert!(cli.no_stream);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
    }

    #[test]
    fn returns_without_waiting_for_blocking_reads() {
        let started = std::time::Instant::now();
        let output = block_on_detached(async {
            let _reader =
                tokio::task::spawn_blocking(|| std::thread::sleep(std::time::Duration::from_secs(30)));
            "done"
        })
        .unwrap();
        assert_eq!(output, "done");
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
