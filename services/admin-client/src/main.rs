//! Shop admin command-line client
//!
//! Drives the shop admin REST API through the request pipeline:
//! 1. Loads config (TOML + env overlay) and the persisted session
//! 2. Builds the `ApiClient` (stages, retry policy, refresh coordinator)
//! 3. Runs one command and prints the result as JSON on stdout
//!
//! Logs, notices and error reports go to stderr through tracing.

mod api;
mod cli;
mod config;
mod error;
mod metrics;
mod models;
mod pipeline;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::{Value, json};
use session::SessionStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command, ContactsCommand, NewslettersCommand, OrdersCommand};
use crate::config::Config;
use crate::models::NewsletterInput;
use crate::pipeline::{ApiClient, Hooks};

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr, LOG_LEVEL / RUST_LOG filter
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    // Install before any request so the first attempt is counted
    let prometheus = if cli.print_metrics {
        Some(metrics::install_recorder().context("failed to install metrics recorder")?)
    } else {
        None
    };

    let config = Config::load(&cli.config_path)
        .with_context(|| format!("failed to load config from {}", cli.config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        timeout_secs = config.api.timeout_secs,
        max_retries = config.retry.max_retries,
        headers = config.headers.len(),
        persistent_session = config.session.storage_path.is_some(),
        "configuration loaded"
    );

    let session = open_session(&config).await?;
    let policy = config.retry.policy().context("invalid retry settings")?;
    let client = ApiClient::new(&config.api, policy, &config.headers, session, Hooks::tracing())
        .context("failed to build HTTP client")?;

    let outcome = run(&client, cli.command).await;

    if let Some(handle) = prometheus {
        eprintln!("{}", handle.render());
    }

    match outcome {
        Ok(Some(value)) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            error!(error = %e, "command failed");
            Err(e.into())
        }
    }
}

async fn open_session(config: &Config) -> Result<Arc<SessionStore>> {
    let store = match &config.session.storage_path {
        Some(path) => SessionStore::load(path.clone())
            .await
            .with_context(|| format!("failed to load session from {}", path.display()))?,
        None => SessionStore::in_memory(),
    };
    if let Some(token) = config.session.access_token.clone() {
        store
            .set_access_token(token)
            .await
            .context("failed to store access token from SHOP_ADMIN_ACCESS_TOKEN")?;
    }
    Ok(Arc::new(store))
}

fn to_json<T: Serialize>(value: &T) -> error::Result<Option<Value>> {
    serde_json::to_value(value)
        .map(Some)
        .map_err(|e| error::Error::Encode(e.to_string()))
}

/// Content type for an uploaded contacts file, by extension.
fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("csv") => "text/csv",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("xls") => "application/vnd.ms-excel",
        _ => "application/octet-stream",
    }
}

/// Run one command. `None` means the output was already written.
async fn run(client: &ApiClient, command: Command) -> error::Result<Option<Value>> {
    match command {
        Command::Login(args) => {
            let response = client.login(&args.email, &args.password).await?;
            Ok(Some(json!({ "user": response.user })))
        }
        Command::Logout => {
            client.logout().await?;
            Ok(Some(json!({ "logged_out": true })))
        }
        Command::Whoami => {
            let session = client.session();
            Ok(Some(json!({
                "authenticated": session.is_authenticated().await,
                "user": session.user().await,
            })))
        }
        Command::Contacts(command) => run_contacts(client, command).await,
        Command::Newsletters(command) => run_newsletters(client, command).await,
        Command::Orders(command) => run_orders(client, command).await,
    }
}

async fn run_contacts(client: &ApiClient, command: ContactsCommand) -> error::Result<Option<Value>> {
    match command {
        ContactsCommand::List { page, search } => {
            to_json(&client.list_contacts(page.into(), search.as_deref()).await?)
        }
        ContactsCommand::Get { id } => to_json(&client.get_contact(id).await?),
        ContactsCommand::Create(args) => to_json(&client.create_contact(&args.into()).await?),
        ContactsCommand::Update { id, fields } => {
            to_json(&client.update_contact(id, &fields.into()).await?)
        }
        ContactsCommand::Delete { id } => {
            client.delete_contact(id).await?;
            Ok(Some(json!({ "deleted": id })))
        }
        ContactsCommand::BulkDelete { ids } => {
            client.bulk_delete_contacts(&ids).await?;
            Ok(Some(json!({ "deleted": ids })))
        }
        ContactsCommand::Import { file } => {
            let contents = tokio::fs::read(&file)
                .await
                .map_err(|source| error::Error::File {
                    path: file.display().to_string(),
                    source,
                })?;
            let file_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("contacts")
                .to_string();
            let summary = client
                .import_contacts(&file_name, content_type_for(&file), contents.into())
                .await?;
            to_json(&summary)
        }
        ContactsCommand::Export { out } => {
            let exported = client.export_contacts().await?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, &exported)
                        .await
                        .map_err(|source| error::Error::File {
                            path: path.display().to_string(),
                            source,
                        })?;
                    Ok(Some(json!({
                        "written": path.display().to_string(),
                        "bytes": exported.len(),
                    })))
                }
                None => {
                    std::io::stdout()
                        .write_all(&exported)
                        .map_err(|source| error::Error::File {
                            path: "<stdout>".into(),
                            source,
                        })?;
                    Ok(None)
                }
            }
        }
    }
}

async fn run_newsletters(
    client: &ApiClient,
    command: NewslettersCommand,
) -> error::Result<Option<Value>> {
    match command {
        NewslettersCommand::List { page, status } => {
            to_json(&client.list_newsletters(page.into(), status).await?)
        }
        NewslettersCommand::Get { id } => to_json(&client.get_newsletter(id).await?),
        NewslettersCommand::Create { title, content } => {
            let input = NewsletterInput { title, content };
            to_json(&client.create_newsletter(&input).await?)
        }
        NewslettersCommand::Approve { id } => to_json(&client.approve_newsletter(id).await?),
        NewslettersCommand::Reject { id, reason } => {
            to_json(&client.reject_newsletter(id, &reason).await?)
        }
        NewslettersCommand::Delete { id } => {
            client.delete_newsletter(id).await?;
            Ok(Some(json!({ "deleted": id })))
        }
        NewslettersCommand::Stats => to_json(&client.newsletter_stats().await?),
    }
}

async fn run_orders(client: &ApiClient, command: OrdersCommand) -> error::Result<Option<Value>> {
    match command {
        OrdersCommand::List { page, status } => {
            to_json(&client.list_orders(page.into(), status.as_deref()).await?)
        }
        OrdersCommand::Get { id } => to_json(&client.get_order(id).await?),
    }
}
