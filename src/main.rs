mod client;
mod config;
mod display;
mod engine;
mod project;
mod reconstruct;
mod store;
mod stream;
mod tools;
mod transcript;

use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;

use client::Client;
use config::{ConfigFile, ResolvedConfig};
use engine::{ChatEngine, Progress};
use transcript::Transcript;

#[derive(Parser, Debug)]
#[command(
    name = "pagecraft",
    about = "AI-assisted web page building from the terminal",
    long_about = None,
)]
struct Args {
    /// Prompt to run directly (omit to enter interactive mode)
    prompt: Option<String>,

    /// Profile to use from config file
    #[arg(short, long, env = "PAGECRAFT_PROFILE")]
    profile: Option<String>,

    /// Override endpoint URL
    #[arg(long, env = "PAGECRAFT_ENDPOINT")]
    endpoint: Option<String>,

    /// Override model name
    #[arg(short, long, env = "PAGECRAFT_MODEL")]
    model: Option<String>,

    /// Override API key
    #[arg(long, env = "PAGECRAFT_API_KEY")]
    api_key: Option<String>,

    /// Load a saved project record before the first request
    #[arg(long, value_name = "PATH")]
    record: Option<PathBuf>,

    /// Show reasoning chunks and token stats while streaming
    #[arg(short, long)]
    verbose: bool,

    /// Write a default config file to ~/.config/pagecraft/config.toml and exit
    #[arg(long)]
    init: bool,

    /// List available profiles and exit
    #[arg(long)]
    profiles: bool,

    /// List saved project records and exit
    #[arg(long)]
    records: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── --init ────────────────────────────────────────────────────────────────
    if args.init {
        let path = ConfigFile::write_default_if_missing()?;
        println!("Config written to: {}", path.display());
        println!("Edit it, then run: pagecraft");
        return Ok(());
    }

    let file = ConfigFile::load()?;

    // ── --profiles ────────────────────────────────────────────────────────────
    if args.profiles {
        print_profiles(&file);
        return Ok(());
    }

    // ── --records ─────────────────────────────────────────────────────────────
    if args.records {
        let records = store::list_records()?;
        if records.is_empty() {
            println!("No saved records in {}", store::records_dir().display());
        }
        for (name, path) in records {
            println!("  {name}  {}", path.display());
        }
        return Ok(());
    }

    let resolved = ResolvedConfig::resolve(
        &file,
        args.profile.as_deref(),
        args.endpoint.as_deref(),
        args.model.as_deref(),
        args.api_key.as_deref(),
    );

    let mut client = Client::new(resolved.endpoint.clone(), resolved.model.clone());
    if let Some(key) = &resolved.api_key {
        client.set_api_key(key.clone());
    }
    client.set_auth_required(resolved.auth_required);

    let mut engine = match &args.record {
        Some(path) => {
            let record = store::load(path)?;
            ChatEngine::restore(
                client,
                resolved.reasoning,
                resolved.max_rounds,
                record.project,
                Transcript::from_entries(record.transcript),
            )
        }
        None => ChatEngine::new(client, resolved.reasoning, resolved.max_rounds),
    };

    println!();
    println!("  ▲ pagecraft  {}  ·  {}", resolved.profile_name, resolved.model);

    if let Some(prompt) = &args.prompt {
        run_once(&mut engine, prompt, args.record.as_deref(), args.verbose).await
    } else {
        run_interactive(&mut engine, args.verbose).await
    }
}

// ── Single-shot mode ──────────────────────────────────────────────────────────

async fn run_once(
    engine: &mut ChatEngine,
    prompt: &str,
    record_path: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    println!();
    match send_with_ctrl_c(engine, prompt, verbose).await {
        Ok(()) => {
            println!();
            if verbose {
                print_usage_totals(engine);
            }
            // Write the record back so the session is resumable
            if let Some(path) = record_path {
                store::save_to(path, engine.project(), engine.transcript())?;
                println!("  saved {}", path.display());
            }
            Ok(())
        }
        Err(e) => {
            println!("\n  ✗ {e}");
            std::process::exit(1);
        }
    }
}

// ── Interactive mode ──────────────────────────────────────────────────────────

async fn run_interactive(engine: &mut ChatEngine, verbose: bool) -> Result<()> {
    println!("  /save [name] · /buffers · /quit");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break; // EOF
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "/quit" || input == "/exit" {
            break;
        }
        if input == "/buffers" {
            println!("\n{}", engine.project().snapshot());
            continue;
        }
        if let Some(rest) = input.strip_prefix("/save") {
            let name = rest.trim();
            let name = if name.is_empty() { "project" } else { name };
            match store::save(name, engine.project(), engine.transcript()) {
                Ok(path) => println!("  saved {}", path.display()),
                Err(e) => println!("  ✗ {e}"),
            }
            continue;
        }

        println!();
        match send_with_ctrl_c(engine, input, verbose).await {
            Ok(()) => {
                println!();
                if verbose {
                    print_usage_totals(engine);
                }
            }
            // Completed rounds are kept; the user can retry the same turn
            Err(e) => println!("\n  ✗ {e}"),
        }
    }

    Ok(())
}

// ── Send plumbing ─────────────────────────────────────────────────────────────

/// Run one send with Ctrl-C wired to cooperative cancellation of the
/// in-flight round.
async fn send_with_ctrl_c(engine: &mut ChatEngine, text: &str, verbose: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let guard = cancel.clone();
    let listener = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            guard.cancel();
        }
    });
    let result = engine
        .send(text, &cancel, |progress| print_progress(&progress, verbose))
        .await;
    listener.abort();
    result
}

fn print_progress(progress: &Progress, verbose: bool) {
    match progress {
        Progress::Text(chunk) => {
            print!("{chunk}");
            let _ = std::io::stdout().flush();
        }
        Progress::Reasoning(chunk) => {
            if verbose {
                print!("{chunk}");
                let _ = std::io::stdout().flush();
            }
        }
        Progress::ToolCallStarted { name } => {
            println!("\n  ⚙ {name}");
        }
        Progress::ToolResult { result, .. } => {
            let first = result.lines().next().unwrap_or(result);
            println!("    → {first}");
        }
        Progress::RoundFinished { .. } => {}
        Progress::Usage {
            prompt_tokens,
            completion_tokens,
            reasoning_tokens,
        } => {
            if verbose {
                println!("\n  tokens  in {prompt_tokens} out {completion_tokens} reasoning {reasoning_tokens}");
            }
        }
    }
}

fn print_usage_totals(engine: &ChatEngine) {
    let totals = engine.usage();
    println!(
        "  ✓ total  in {} out {} reasoning {}",
        totals.prompt_tokens, totals.completion_tokens, totals.reasoning_tokens
    );
}

// ── Profiles listing ──────────────────────────────────────────────────────────

fn print_profiles(file: &ConfigFile) {
    let mut entries: Vec<(String, String, String)> = file
        .profiles
        .iter()
        .map(|(name, p)| (name.clone(), p.endpoint.clone(), p.model.clone()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    println!();
    println!("  Profiles");
    for (name, endpoint, model) in &entries {
        let marker = if *name == file.default_profile { " ←" } else { "" };
        println!("  {name}{marker}");
        println!("    endpoint  {endpoint}");
        println!("    model     {model}");
        println!();
    }
}
