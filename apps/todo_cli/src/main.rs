use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{load_client_config, ClientConfig, ClientEvent, DraftInput, TodoClient};
use shared::domain::{TodoId, TodoItem};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod render;

use render::render_items;

#[derive(Parser, Debug)]
#[command(name = "todo", about = "Minimal to-do list client")]
struct Args {
    /// TOML file with endpoint/region/auth_token (defaults to ./todo.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long)]
    region: Option<String>,
    #[arg(long)]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current list.
    List,
    /// Create a new item.
    Add { name: String },
    /// Set the checkbox of an item.
    Check {
        id: i64,
        /// Clear the checkbox instead of setting it.
        #[arg(long)]
        off: bool,
    },
    /// Flip the checkbox of an item.
    Toggle { id: i64 },
    /// Print the list and re-print it whenever the realtime feed changes it.
    Watch,
}

fn resolve_config(args: &Args) -> Result<ClientConfig> {
    let mut config = load_client_config(args.config.as_deref())?;
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(region) = &args.region {
        config.region = Some(region.clone());
    }
    if let Some(token) = &args.token {
        config.auth_token = Some(token.clone());
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let config = resolve_config(&args)?;
    let client = TodoClient::connect(config.clone())?;

    match args.command {
        Command::List => {
            let items = load_items(&client, &config).await?;
            print!("{}", render_items(&items));
        }
        Command::Add { name } => {
            load_items(&client, &config).await?;
            let mut draft = DraftInput::new();
            draft.set_text(name);
            match client.submit(&mut draft).await? {
                Some(item) => println!("created #{} {}", item.id, item.name),
                None => println!("nothing to add"),
            }
        }
        Command::Check { id, off } => {
            load_items(&client, &config).await?;
            let item = client.set_done(TodoId(id), !off).await?;
            print!("{}", render_items(&[item]));
        }
        Command::Toggle { id } => {
            load_items(&client, &config).await?;
            let item = client.toggle(TodoId(id)).await?;
            print!("{}", render_items(&[item]));
        }
        Command::Watch => watch(&client, &config).await?,
    }

    Ok(())
}

async fn load_items(client: &TodoClient, config: &ClientConfig) -> Result<Vec<TodoItem>> {
    client
        .load()
        .await
        .with_context(|| format!("failed to load items from {}", config.endpoint))
}

/// The realtime feed is connected before the initial load. Every
/// `ItemsChanged`, including the load's own, re-renders the list.
async fn watch(client: &Arc<TodoClient>, config: &ClientConfig) -> Result<()> {
    let mut events = BroadcastStream::new(client.subscribe_events());
    let feed = client.spawn_realtime(config).await?;
    load_items(client, config).await?;

    let mut rendered = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = events.next() => match next {
                Some(Ok(ClientEvent::ItemsChanged(items))) => {
                    if rendered {
                        println!("--");
                    }
                    print!("{}", render_items(&items));
                    rendered = true;
                }
                Some(Ok(ClientEvent::Error(message))) => eprintln!("error: {message}"),
                Some(Ok(ClientEvent::RealtimeStopped)) | None => break,
                Some(Err(err)) => warn!(%err, "watch: event stream lagged"),
            },
        }
    }

    feed.abort();
    Ok(())
}
