//! Member Directory
//!
//! `serve` runs the read endpoint and change feed over the SQLite member store.
//! `watch` opens a live directory against a running server and prints it.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use member_directory::client::{CacheEvent, Directory};
use member_directory::config::Config;
use member_directory::db::{self, Repository};
use member_directory::notify::{spawn_revision_watcher, ChangeHub};
use member_directory::{create_router, AppState};

#[derive(Parser)]
#[command(name = "member-directory", version, about = "Read-only member directory")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the member endpoint and change feed (default)
    Serve,
    /// Print the directory and reprint it whenever members change
    Watch {
        /// Case-insensitive search over name, batch, role and skills
        #[arg(short, long, default_value = "")]
        query: String,
        /// Only show members with exactly this role
        #[arg(short, long)]
        role: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Watch { query, role } => watch(config, query, role).await,
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Starting member directory server");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let changes = ChangeHub::new(config.change_capacity);
    spawn_revision_watcher(
        Arc::clone(&repo),
        changes.clone(),
        config.change_poll_interval,
    );

    let state = AppState { repo, changes };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn watch(
    config: Config,
    query: String,
    role: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut directory = Directory::connect(&config)?;
    directory.set_search_text(query);
    if let Some(role) = role {
        directory.set_role_filter(role);
    }

    let mut events = directory.events();
    // The initial fetch may already have finished before we subscribed.
    if let Some(event) = directory.current_event() {
        report(&directory, event);
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => report(&directory, event),
                Err(RecvError::Lagged(_)) => {
                    if let Some(event) = directory.current_event() {
                        report(&directory, event);
                    }
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    directory.close();
    tracing::info!("Member directory closed");
    Ok(())
}

fn report(directory: &Directory, event: CacheEvent) {
    match event {
        CacheEvent::Replaced { .. } => print_cards(directory),
        CacheEvent::RefreshFailed { error } => {
            eprintln!("Failed to load members: {}", error.message());
        }
    }
}

fn print_cards(directory: &Directory) {
    let cards = directory.cards();
    println!("{} member(s)", cards.len());
    for card in cards {
        let handle = if card.handle.is_empty() {
            String::new()
        } else {
            format!(" @{}", card.handle)
        };
        println!(
            "  {:<24} {:<8} {:<6}{}",
            card.title, card.subtitle, card.location, handle
        );
    }
}
