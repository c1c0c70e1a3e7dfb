//! Interactive chat REPL for the carry-on advisor
//!
//! Owns one conversation: the dialogue state and history live here for the
//! duration of the process and are passed into `run_turn` each turn. Nothing
//! is persisted across runs.
//!
//! Run with:
//!   DATABASE_URL="postgresql:///regulations" OPENAI_API_KEY=... cargo run --bin chat

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use carryon_advisor::embedder::Embedder;
use carryon_advisor::{
    Catalog, ChatMessage, DialogueOrchestrator, DialogueState, OpenAiClient, PgVectorStore,
};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chat", about = "Baggage & customs regulation chat advisor")]
struct Args {
    /// Postgres connection string for the regulation store
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Override the standard model (extraction / mapping / grounded judging)
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY not set")?;
    let llm = match &args.model {
        Some(model) => OpenAiClient::with_model(api_key.clone(), model),
        None => OpenAiClient::new(api_key.clone()),
    };
    let advanced_llm = OpenAiClient::advanced_from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&args.database_url)
        .await
        .context("failed to connect to the regulation store")?;

    let catalog = Arc::new(Catalog::load(&pool).await?);
    let store = Arc::new(PgVectorStore::new(pool, Embedder::new(api_key)));

    let orchestrator = DialogueOrchestrator::new(
        Arc::new(llm),
        Arc::new(advanced_llm),
        store,
        catalog,
    );
    info!("advisor ready");

    println!("🛫 Carry-on advisor — ask about an item and route (Ctrl-D to quit)");

    let mut state = DialogueState::default();
    let mut history: Vec<ChatMessage> = Vec::new();
    let stdin = io::stdin();

    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        let (response, updated) = orchestrator.run_turn(message, &history, &state).await?;
        println!("{response}\n");

        history.push(ChatMessage::user(message));
        history.push(ChatMessage::assistant(response));
        state = updated;
    }

    Ok(())
}
