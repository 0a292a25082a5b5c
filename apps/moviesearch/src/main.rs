use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use search_core::{load_settings, FetchController, ResponseOrdering, SearchError};
use shared::domain::QueryState;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::watch,
    task::JoinHandle,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod display;

/// Look up movies by title. Without TERMS, searches the default title and
/// then reads one title per line from stdin.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    timeout_seconds: Option<u64>,
    /// latest_request or last_arrival
    #[arg(long)]
    ordering: Option<ResponseOrdering>,
    terms: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings =
        load_settings(args.config.as_deref()).context("failed to load settings")?;
    if let Some(v) = args.base_url {
        settings.base_url = v;
    }
    if let Some(v) = args.api_key {
        settings.api_key = v;
    }
    if let Some(v) = args.timeout_seconds {
        settings.timeout_seconds = v;
    }
    if let Some(v) = args.ordering {
        settings.response_ordering = v;
    }

    let controller =
        FetchController::from_settings(&settings).context("failed to set up movie lookup")?;
    let renderer = spawn_renderer(controller.subscribe());

    if args.terms.is_empty() {
        run_search(&controller, &settings.default_term).await;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .context("failed to read search term from stdin")?
        {
            run_search(&controller, &line).await;
        }
    } else {
        for term in &args.terms {
            run_search(&controller, term).await;
        }
    }

    // Closing the state channel lets the renderer drain and exit.
    drop(controller);
    renderer.await.context("render task failed")?;
    Ok(())
}

async fn run_search(controller: &FetchController, term: &str) {
    match controller.search(term) {
        Ok(pending) => {
            pending.await;
        }
        Err(SearchError::EmptyTerm) => warn!("enter a movie title to search"),
    }
}

fn spawn_renderer(mut rx: watch::Receiver<QueryState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let text = display::render(&rx.borrow_and_update());
            if let Some(text) = text {
                println!("{text}");
            }
        }
    })
}
