//! Biblio - a command line client for the library catalog service.
//!
//! Log in once, then list, add, edit, delete, borrow and return books. The
//! session token is kept between runs until it expires or you log out.

mod app;

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use biblio_core::models::BookDraft;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;

#[derive(Parser)]
#[command(name = "biblio", version, about = "Library catalog client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and keep the session token
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },

    /// Forget the session token
    Logout,

    /// Show the current session
    Status,

    /// Create an account
    Register {
        #[arg(short, long)]
        username: Option<String>,
        #[arg(short, long)]
        email: Option<String>,
    },

    /// List all books
    List,

    /// List books currently on loan
    Borrowed,

    /// Add a book (requires login)
    Add {
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        author: String,
        #[arg(short, long)]
        description: String,
    },

    /// Replace a book's title, author and description (requires login)
    Edit {
        id: i64,
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        author: String,
        #[arg(short, long)]
        description: String,
    },

    /// Delete a book (requires login)
    Delete {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Borrow a book
    Borrow { id: i64 },

    /// Return a borrowed book
    Return { id: i64 },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut app = App::new()?;

    match cli.command {
        Commands::Login { username } => app.login(username).await,
        Commands::Logout => {
            app.logout();
            Ok(())
        }
        Commands::Status => {
            app.status();
            Ok(())
        }
        Commands::Register { username, email } => app.register(username, email).await,
        Commands::List => app.list(false).await,
        Commands::Borrowed => app.list(true).await,
        Commands::Add {
            title,
            author,
            description,
        } => app.add(BookDraft::new(title, author, description)).await,
        Commands::Edit {
            id,
            title,
            author,
            description,
        } => app.edit(id, BookDraft::new(title, author, description)).await,
        Commands::Delete { id, yes } => app.delete(id, yes).await,
        Commands::Borrow { id } => app.borrow(id).await,
        Commands::Return { id } => app.return_book(id).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_tracing();
    info!("Biblio starting");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!(error = ?e, "Command failed");
            eprintln!("Error: {}", app::error_message(&e));
            ExitCode::FAILURE
        }
    }
}
