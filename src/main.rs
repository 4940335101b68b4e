use text2sql_agent::config::AppConfig;
use text2sql_agent::db::{initialize_database, verify_database, LoadOutcome};
use text2sql_agent::graph::{ChannelSink, EventKind, Orchestrator, ProgressEvent};
use text2sql_agent::state::FinalState;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "text2sql")]
#[command(about = "Ask questions about the e-commerce dataset in plain English")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the SQLite database from the CSV files in DATA_DIR
    InitDb {
        /// Rebuild even if the database already exists
        #[arg(long)]
        force: bool,
    },
    /// Show the tables in the database with their row counts
    Tables,
    /// Answer a single question
    Ask {
        question: String,

        /// Print the final state as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Interactive session, one question per line
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    match args.command {
        Commands::InitDb { force } => init_db(&config, force),
        Commands::Tables => show_tables(&config),
        Commands::Ask { question, json } => {
            let orchestrator = Orchestrator::from_config(&config).context("Failed to set up the pipeline")?;
            ask(&orchestrator, &question, json).await
        }
        Commands::Chat => {
            let orchestrator = Orchestrator::from_config(&config).context("Failed to set up the pipeline")?;
            chat(&orchestrator).await
        }
    }
}

fn init_db(config: &AppConfig, force: bool) -> Result<()> {
    let outcome = initialize_database(&config.data_dir, &config.db_path, force)
        .context("Database initialization failed")?;
    match outcome {
        LoadOutcome::AlreadyPresent => {
            println!(
                "Database already exists at {} (use --force to rebuild)",
                config.db_path.display()
            );
        }
        LoadOutcome::Created { tables } => {
            println!("Created {} with {} tables:", config.db_path.display(), tables.len());
            for (name, rows) in tables {
                println!("  {:<22} {:>10} rows", name, rows);
            }
        }
    }
    Ok(())
}

fn show_tables(config: &AppConfig) -> Result<()> {
    let counts = verify_database(&config.db_path).context("Database verification failed")?;
    println!("{}", config.db_path.display());
    for (name, rows) in counts {
        println!("  {:<22} {:>10} rows", name, rows);
    }
    Ok(())
}

async fn ask(orchestrator: &Orchestrator, question: &str, json: bool) -> Result<()> {
    let (sink, mut rx) = ChannelSink::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_progress(&event);
        }
    });

    let outcome = orchestrator.run_turn_with_events(question, &sink).await;
    drop(sink);
    printer.await.ok();

    match outcome {
        Ok(result) if json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Ok(result) => {
            print_result(&result);
            Ok(())
        }
        Err(e) => {
            error!("Question failed: {}", e);
            println!("\n{}", e.user_message());
            std::process::exit(1);
        }
    }
}

async fn chat(orchestrator: &Orchestrator) -> Result<()> {
    println!("E-commerce data assistant. Type 'exit' to quit.");
    let stdin = io::stdin();
    loop {
        print!("\n> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        match orchestrator.run_turn(question).await {
            Ok(result) => print_result(&result),
            Err(e) => {
                error!("Question failed: {}", e);
                println!("{}", e.user_message());
            }
        }
    }
    Ok(())
}

fn print_progress(event: &ProgressEvent) {
    match &event.kind {
        EventKind::StageStarted { stage } => eprintln!("  -> {}", stage),
        EventKind::StageCompleted { stage, summary } => eprintln!("  <- {}: {}", stage, summary),
        EventKind::TurnCompleted { .. } | EventKind::TurnFailed { .. } => {}
    }
}

fn print_result(result: &FinalState) {
    println!("\n{}", "=".repeat(80));
    println!("{}", result.final_answer);
    if !result.sql_query.is_empty() {
        println!("\nSQL:\n{}", result.sql_query);
    }
    if !result.chart_spec_json.is_empty() {
        println!("\nChart ({}):\n{}", result.chart_type, result.chart_spec_json);
    }
    println!("{}", "=".repeat(80));
}
