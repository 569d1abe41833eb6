//! mail-desk-toolkit: locate, extract and answer mail-store messages over stdio
//!
//! Reads one JSON request from standard input, runs the named capability
//! against a Maildir-backed mail store, and writes one JSON response to
//! standard output. Logs go to standard error.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading, CLI and the stdio exchange
//! - [`config`]: Environment-driven configuration and outgoing accounts
//! - [`errors`]: Application error model
//! - [`models`]: Request/response envelope, capability inputs and results
//! - [`store`]: Mail-store driver traits and the Maildir driver
//! - [`session`]: Scoped, thread-affine store binding
//! - [`mailbox`]: Account to Inbox resolution
//! - [`locator`]: Most recent message matching a subject
//! - [`extract`]: Detached copy of a message and its content file
//! - [`attachments`]: Attachment materialization, listing and pattern matching
//! - [`naming`]: Filename sanitization and extraction folder naming
//! - [`reply`]: Outgoing message dispatch
//! - [`orchestrator`]: Capability handlers

mod attachments;
mod config;
mod errors;
mod extract;
mod locator;
mod mailbox;
mod models;
mod naming;
mod orchestrator;
mod reply;
mod session;
mod store;

use std::io::Write as _;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::error;
use tracing_subscriber::EnvFilter;

use config::ToolkitConfig;
use errors::AppError;
use models::Response;
use orchestrator::{Capability, MailToolkit, UNKNOWN_CAPABILITY, parse_request};
use store::maildir::MaildirStore;

#[derive(Debug, Parser)]
#[command(name = "mail-desk-toolkit", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List top-level stores with their Inbox sizes and outgoing accounts
    Accounts,
    /// Print the JSON Schema of a capability's arguments (all when omitted)
    Schema { capability: Option<String> },
}

/// Application entry point
///
/// Without a subcommand, one request is read from standard input:
///
/// ```text
/// echo '{"capability":"check_email_attachments",
///        "args":{"subject":"Invoice","email_account":"ops@example.com"}}' \
///   | MAIL_TOOLKIT_STORE_ROOT=~/Maildir mail-desk-toolkit
/// ```
///
/// Exits non-zero only when the request is malformed, names an unknown
/// capability, or the environment cannot be loaded. Capability failures are
/// reported in the response body.
#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        None => run_request().await,
        Some(Command::Accounts) => run_accounts().await,
        Some(Command::Schema { capability }) => print_schema(capability.as_deref()),
    }
}

fn maildir_toolkit(config: ToolkitConfig) -> MailToolkit {
    let store = MaildirStore::new(config.store_root.clone(), config.outgoing_accounts.clone());
    MailToolkit::new(config, Box::new(store))
}

async fn run_request() -> ExitCode {
    let mut input = String::new();
    if let Err(e) = tokio::io::stdin().read_to_string(&mut input).await {
        let response = Response::failure(UNKNOWN_CAPABILITY, format!("Invalid JSON input: {e}"));
        return emit(&response, ExitCode::FAILURE);
    }

    let (capability, args) = match parse_request(&input) {
        Ok(parsed) => parsed,
        Err(response) => return emit(&response, ExitCode::FAILURE),
    };

    let config = match ToolkitConfig::load_from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(code = e.code(), error = %e, "cannot load configuration");
            return emit(
                &Response::failure(capability.name(), e.to_string()),
                ExitCode::FAILURE,
            );
        }
    };
    let timeout_ms = config.operation_timeout_ms;

    // The store binding is thread-affine: the whole call runs on one blocking thread.
    let task =
        tokio::task::spawn_blocking(move || maildir_toolkit(config).dispatch(capability, args));

    let joined = if timeout_ms == 0 {
        task.await
    } else {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
            Ok(joined) => joined,
            Err(_) => {
                let e = AppError::Timeout(format!(
                    "{} did not finish within {timeout_ms} ms",
                    capability.name()
                ));
                error!(code = e.code(), error = %e, "capability abandoned");
                let _ = emit(
                    &Response::failure(capability.name(), e.to_string()),
                    ExitCode::SUCCESS,
                );
                // The runtime would otherwise wait for the stuck blocking thread on shutdown.
                let _ = std::io::stdout().flush();
                std::process::exit(0);
            }
        }
    };

    let response = joined.unwrap_or_else(|e| {
        let e = AppError::Internal(format!("capability task failed: {e}"));
        error!(code = e.code(), error = %e, "capability aborted");
        Response::failure(capability.name(), e.to_string())
    });
    emit(&response, ExitCode::SUCCESS)
}

async fn run_accounts() -> ExitCode {
    let config = match ToolkitConfig::load_from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(code = e.code(), error = %e, "cannot load configuration");
            return ExitCode::FAILURE;
        }
    };

    match tokio::task::spawn_blocking(move || maildir_toolkit(config).list_accounts()).await {
        Ok(Ok(listings)) => emit(&listings, ExitCode::SUCCESS),
        Ok(Err(e)) => {
            error!(code = e.code(), error = %e, "cannot list accounts");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "account listing aborted");
            ExitCode::FAILURE
        }
    }
}

fn print_schema(capability: Option<&str>) -> ExitCode {
    match capability {
        Some(name) => match Capability::parse(name) {
            Some(capability) => emit(&capability.input_schema(), ExitCode::SUCCESS),
            None => {
                eprintln!("Unknown capability: {name}");
                ExitCode::FAILURE
            }
        },
        None => {
            let all: serde_json::Map<String, serde_json::Value> = Capability::ALL
                .into_iter()
                .map(|c| (c.name().to_owned(), c.input_schema()))
                .collect();
            emit(&all, ExitCode::SUCCESS)
        }
    }
}

/// Print `value` as pretty JSON on standard output
fn emit<T: Serialize>(value: &T, code: ExitCode) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{text}");
            code
        }
        Err(e) => {
            error!(error = %e, "cannot serialize output");
            ExitCode::FAILURE
        }
    }
}
