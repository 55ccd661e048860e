//! st - live task trees from streamed model output
//!
//! CLI entry point for repairing partial JSON, replaying recorded replies and
//! generating plans.

use std::fs;
use std::io::{IsTerminal, Read, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use stepstream::cli::{Cli, Command};
use stepstream::config::Config;
use stepstream::llm::create_client;
use stepstream::render::{progress_status, render_tree};
use stepstream::session::{ReplaySource, SessionState, SessionUpdate, StreamSession};
use stepstream::tree::{TaskTree, reconcile_final};
use stepstream::Planner;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Logging is not up yet, so nothing in here can log
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stepstream")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("stepstream.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    if !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Repair { file, raw } => cmd_repair(file.as_deref(), raw),
        Command::Replay {
            file,
            chunk_size,
            verbose,
            json,
        } => cmd_replay(file.as_deref(), chunk_size, verbose, json).await,
        Command::Generate {
            goal,
            revise,
            feedback,
            json,
        } => cmd_generate(&config, &goal, revise.as_deref(), feedback.as_deref(), json).await,
    }
}

/// Read a file, or stdin when no file is given
fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => fs::read_to_string(path).context(format!("Failed to read {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read stdin")?;
            Ok(input)
        }
    }
}

fn cmd_repair(file: Option<&Path>, raw: bool) -> Result<()> {
    debug!(?file, raw, "cmd_repair: called");
    let input = read_input(file)?;

    if raw {
        println!("{}", jsonmend::repair_text(&input));
        return Ok(());
    }

    let outcome = jsonmend::repair_outcome(&input);
    if outcome.fallback {
        info!(text = %outcome.text, "cmd_repair: repaired text did not parse");
    }
    println!("{}", serde_json::to_string_pretty(&outcome.value)?);
    Ok(())
}

async fn cmd_replay(file: Option<&Path>, chunk_size: usize, verbose: bool, json: bool) -> Result<()> {
    debug!(?file, chunk_size, verbose, "cmd_replay: called");
    let input = read_input(file)?;
    let mut source = ReplaySource::from_text(&input, chunk_size);
    let mut session = StreamSession::new();
    spawn_cancel_on_ctrl_c(&session);

    let mut chunk = 0usize;
    let state = session
        .run(&mut source, |update| {
            if !verbose {
                return;
            }
            chunk += 1;
            let label = if update.done {
                "--- final ---".to_string()
            } else {
                format!("--- chunk {} ---", chunk)
            };
            println!("{}", label.dimmed());
            print!("{}", render_tree(update.tree));
        })
        .await?;

    print_result(session.tree(), state, json)
}

async fn cmd_generate(
    config: &Config,
    goal: &str,
    revise: Option<&Path>,
    feedback: Option<&str>,
    json: bool,
) -> Result<()> {
    debug!(%goal, ?revise, "cmd_generate: called");
    config.validate()?;

    let llm = create_client(&config.llm)?;
    let planner = Planner::new(llm, config);

    let request = match (revise, feedback) {
        (Some(path), Some(feedback)) => {
            let current = load_plan(path)?;
            planner.revise_request(goal, &current, feedback)
        }
        _ => planner.plan_request(goal),
    };

    let mut session = StreamSession::new();
    spawn_cancel_on_ctrl_c(&session);

    let result = planner.run(request, &mut session, print_progress).await;
    if std::io::stderr().is_terminal() {
        eprintln!();
    }

    let state = result?;
    print_result(session.tree(), state, json)
}

/// Parse a stored plan, tolerating the same damage a live stream has
fn load_plan(path: &Path) -> Result<TaskTree> {
    let text = fs::read_to_string(path).context(format!("Failed to read plan {}", path.display()))?;
    Ok(reconcile_final(&TaskTree::new(), &jsonmend::repair(&text)))
}

/// Report the session's progress on stderr
fn print_progress(update: &SessionUpdate<'_>) {
    let mut stderr = std::io::stderr();
    if let Some(status) = progress_status(update, stderr.is_terminal()) {
        let _ = write!(stderr, "{}", status);
        let _ = stderr.flush();
    }
}

fn print_result(tree: &TaskTree, state: SessionState, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&tree.export())?);
        return Ok(());
    }

    print!("{}", render_tree(tree));
    let counts = tree.counts();
    match state {
        SessionState::Cancelled => println!("{} {}", counts.progress_string(), "(cancelled)".yellow()),
        _ => println!("{}", counts.progress_string()),
    }
    Ok(())
}

/// Cancel the session on Ctrl-C
fn spawn_cancel_on_ctrl_c(session: &StreamSession) {
    let token = session.cancel_token();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    info!("spawn_cancel_on_ctrl_c: interrupt received, cancelling");
                    token.cancel();
                }
            }
        }
    });
}
