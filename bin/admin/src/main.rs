//! Command-line administration of the allow-list.
//!
//! Reads project coordinates from the environment (see [`config`]) and
//! talks to the hosted database directly.

mod config;
mod error;

use crate::config::AdminConfig;
use crate::error::AdminError;
use clap::{Parser, Subcommand};
use gatehouse_access::{AllowListConfig, AllowListGate};
use gatehouse_core::{DocumentId, Result, normalize_email};
use gatehouse_services::{FirestoreRecordStore, Identity};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(name = "gatehouse-admin", version, about = "Manage the gatehouse allow-list")]
struct Cli {
    /// Allow-list collection; overrides the configured one.
    #[arg(long, global = true, env = "GATEHOUSE_COLLECTION")]
    collection: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every allow-list entry.
    List {
        /// Print entries as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Add an email address to the allow-list.
    Add {
        email: String,
        /// Display name; defaults to the email.
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove an entry by its id.
    Remove { id: String },
    /// Report whether an email address is on the allow-list.
    Check { email: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(code) => code,
        Err(report) => {
            tracing::error!(error = %report, "command failed");
            eprintln!("Error: {report}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode, AdminError> {
    let config = AdminConfig::from_env().map_err(|e| AdminError::Config {
        details: e.to_string(),
    })?;
    if config.provider.project_id().trim().is_empty() {
        return Err(AdminError::Config {
            details: "GATEHOUSE__PROVIDER__PROJECT_ID is not set".to_string(),
        }
        .into());
    }

    let gate = build_gate(&config, cli.collection);
    tracing::debug!(collection = gate.collection(), "allow-list gate ready");

    match cli.command {
        Command::List { json } => {
            let entries = gate.list_all().await;
            if json {
                let rendered =
                    serde_json::to_string_pretty(&entries).map_err(|e| AdminError::Output {
                        details: e.to_string(),
                    })?;
                println!("{rendered}");
            } else {
                for entry in &entries {
                    println!(
                        "{}\t{}\t{}\t{}",
                        entry.id, entry.email, entry.name, entry.created_at
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Add { email, name } => {
            let id = gate
                .add(&email, name.as_deref())
                .await
                .map_err(|report| report.context(AdminError::Command { command: "add" }))?;
            println!("added {} as {id}", normalize_email(&email));
            Ok(ExitCode::SUCCESS)
        }
        Command::Remove { id } => {
            let id = DocumentId::new(id);
            gate.remove(&id)
                .await
                .map_err(|report| report.context(AdminError::Command { command: "remove" }))?;
            println!("removed {id}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { email } => {
            let candidate = Identity::new("gatehouse-admin", Some(email.clone()));
            if gate.is_allowed(Some(&candidate)).await {
                println!("{} is allowed", normalize_email(&email));
                Ok(ExitCode::SUCCESS)
            } else {
                println!("{} is not allowed", normalize_email(&email));
                Ok(ExitCode::from(2))
            }
        }
    }
}

fn build_gate(config: &AdminConfig, collection: Option<String>) -> AllowListGate {
    let mut store = FirestoreRecordStore::from_config(&config.provider)
        .with_bearer_token(config.access_token.clone());
    if let Some(api_root) = &config.api_root {
        store = store.with_api_root(api_root.as_str());
    }

    let allow_list = collection.map_or_else(|| config.allow_list.clone(), AllowListConfig::new);
    AllowListGate::new(Arc::new(store), &allow_list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn add_accepts_optional_name() {
        let cli = Cli::try_parse_from(["gatehouse-admin", "add", "a@example.com", "--name", "A"])
            .expect("parse");
        match cli.command {
            Command::Add { email, name } => {
                assert_eq!(email, "a@example.com");
                assert_eq!(name.as_deref(), Some("A"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn collection_flag_overrides_config() {
        let config = AdminConfig {
            provider: gatehouse_services::ProviderConfig::new("k", "d", "demo"),
            allow_list: AllowListConfig::default(),
            access_token: None,
            api_root: None,
        };
        assert_eq!(build_gate(&config, None).collection(), "allowedUsers");
        assert_eq!(
            build_gate(&config, Some("admins".to_string())).collection(),
            "admins"
        );
    }
}
