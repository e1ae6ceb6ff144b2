//! Application state for the command line front end.
//!
//! `App` wires the configuration, session store and API client together.
//! Every command restores the session first, so a token saved by an earlier
//! run is picked up (or discarded if it has expired).

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use biblio_core::api::{ApiClient, ApiError};
use biblio_core::auth::{Credentials, Registration, SessionState, SessionStore};
use biblio_core::config::Config;
use biblio_core::models::{BookDraft, BookRecord};
use tracing::{debug, info, warn};

const API_URL_VAR: &str = "BIBLIO_API_URL";
const USERNAME_VAR: &str = "BIBLIO_USERNAME";
const PASSWORD_VAR: &str = "BIBLIO_PASSWORD";

pub struct App {
    pub config: Config,
    pub session: SessionStore,
    pub api: ApiClient,
}

impl App {
    pub fn new() -> Result<Self> {
        let mut config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        if let Ok(url) = std::env::var(API_URL_VAR) {
            config.api_base_url = Some(url);
        }
        debug!(base_url = config.api_base_url(), "Config loaded");

        let session = SessionStore::new(config.token_store()?);
        let state = session.restore();
        debug!(authenticated = matches!(state, SessionState::Authenticated(_)), "Session loaded");

        let api = ApiClient::new(config.api_config(), session.clone())?;

        Ok(Self {
            config,
            session,
            api,
        })
    }

    fn resolve_username(&self, username: Option<String>) -> Result<String> {
        if let Some(username) = username {
            return Ok(username);
        }
        if let Ok(username) = std::env::var(USERNAME_VAR) {
            return Ok(username);
        }
        let default = self.config.last_username.clone().unwrap_or_default();
        prompt_line("Username", &default)
    }

    fn resolve_password() -> Result<String> {
        match std::env::var(PASSWORD_VAR) {
            Ok(password) => Ok(password),
            Err(_) => rpassword::prompt_password("Password: ").context("Failed to read password"),
        }
    }

    pub async fn login(&mut self, username: Option<String>) -> Result<()> {
        let username = self.resolve_username(username)?;
        let password = Self::resolve_password()?;
        let credentials = Credentials::new(username, password);

        let token = self.session.login(&self.api, &credentials).await?;

        self.config.last_username = Some(credentials.username.clone());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        println!(
            "Logged in as {} (session valid for {} minutes)",
            credentials.username,
            token.minutes_until_expiry()
        );
        Ok(())
    }

    pub fn logout(&self) {
        self.session.logout();
        println!("Logged out");
    }

    pub fn status(&self) {
        println!("Server: {}", self.api.base_url());
        match self.session.state() {
            SessionState::Authenticated(token) => {
                let claims = token.claims().ok();
                let user = claims
                    .as_ref()
                    .and_then(|c| c.sub.clone())
                    .unwrap_or_else(|| "unknown user".to_string());
                let role = claims
                    .and_then(|c| c.role_display())
                    .unwrap_or_else(|| "no role".to_string());
                println!("Logged in as {} ({})", user, role);
                println!("Session expires in {} minutes", token.minutes_until_expiry());
            }
            SessionState::Unauthenticated => {
                println!("Not logged in");
                println!("  Run 'biblio login' to start a session");
            }
        }
    }

    pub async fn register(&self, username: Option<String>, email: Option<String>) -> Result<()> {
        let username = self.resolve_username(username)?;
        let password = Self::resolve_password()?;
        let mut registration = Registration::new(username, password);
        if let Some(email) = email {
            registration = registration.with_email(email);
        }

        self.api.register(&registration).await?;
        info!(username = %registration.username, "Registered");
        println!("Registration successful. You can now log in.");
        Ok(())
    }

    pub async fn list(&self, borrowed_only: bool) -> Result<()> {
        let books = if borrowed_only {
            self.api.list_borrowed_books().await?
        } else {
            self.api.list_books().await?
        };

        if books.is_empty() {
            println!("No books");
            return Ok(());
        }
        for book in &books {
            print_book(book);
        }
        Ok(())
    }

    pub async fn add(&self, draft: BookDraft) -> Result<()> {
        let book = self.api.create_book(&draft).await?;
        println!("Book added:");
        print_book(&book);
        Ok(())
    }

    pub async fn edit(&self, id: i64, draft: BookDraft) -> Result<()> {
        let book = self.api.update_book(id, &draft).await?;
        println!("Book updated:");
        print_book(&book);
        Ok(())
    }

    pub async fn delete(&self, id: i64, confirmed: bool) -> Result<()> {
        if !confirmed && !confirm(&format!("Delete book {}?", id))? {
            println!("Cancelled");
            return Ok(());
        }
        self.api.delete_book(id).await?;
        println!("Book {} deleted", id);
        Ok(())
    }

    pub async fn borrow(&self, id: i64) -> Result<()> {
        self.api.borrow(id).await?;
        println!("Book {} borrowed", id);
        Ok(())
    }

    pub async fn return_book(&self, id: i64) -> Result<()> {
        self.api.return_book(id).await?;
        println!("Book {} returned", id);
        Ok(())
    }
}

fn print_book(book: &BookRecord) {
    println!(
        "{:>5}  {} by {}  [{}]",
        book.id,
        book.title,
        book.author,
        book.availability_display()
    );
    if !book.description.is_empty() {
        println!("       {}", book.description);
    }
}

fn prompt_line(label: &str, default: &str) -> Result<String> {
    if default.is_empty() {
        print!("{}: ", label);
    } else {
        print!("{} [{}]: ", label, default);
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    let input = input.trim();
    Ok(if input.is_empty() {
        default.to_string()
    } else {
        input.to_string()
    })
}

fn confirm(question: &str) -> Result<bool> {
    let answer = prompt_line(&format!("{} (y/N)", question), "")?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
}

/// User-facing text for a failed command
pub fn error_message(error: &anyhow::Error) -> String {
    match error.downcast_ref::<ApiError>() {
        Some(api_error) => api_error.user_message(),
        None => error.to_string(),
    }
}
