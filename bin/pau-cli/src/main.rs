//! Pluggable Authentication CLI
//!
//! Loads configuration, assembles the dispatcher chain and runs one
//! operation against it, printing the result as JSON on stdout:
//! - `authenticate`: run the extractor/authenticator pipeline
//! - `principal`: look a principal up by id
//! - `search`: query every configured searcher
//! - `challenge`: run the challengers (or logout) and show the response
//! - `example-config`: print an example TOML configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde_json::json;
use tracing::info;

use pau_config::{AppConfig, ConfigLoader};
use pau_core::{build_authentication, AuthRequest, AuthResponse, AuthenticationSetup, PrincipalSearch, SearchQuery};

/// Pluggable authentication operator CLI
#[derive(Parser, Debug)]
#[command(name = "pau-cli")]
#[command(about = "Run the configured authentication chain from the command line")]
struct Args {
    /// Configuration file (otherwise the standard search paths are used)
    #[arg(long, short, env = "PAU_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authenticate a request built from the given credentials
    Authenticate {
        /// Login submitted as a form field
        #[arg(long)]
        login: Option<String>,

        /// Password submitted as a form field
        #[arg(long)]
        password: Option<String>,

        /// Raw Authorization header value
        #[arg(long)]
        authorization: Option<String>,

        /// Session id carried by the request
        #[arg(long)]
        session: Option<String>,

        #[arg(long, default_value = "http://127.0.0.1/")]
        url: String,
    },

    /// Look up a principal by its full id
    Principal { id: String },

    /// Search every configured searcher
    Search {
        /// Case-insensitive substring; empty matches everything
        #[arg(default_value = "")]
        text: String,

        #[arg(long)]
        start: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Run the challengers, or logout handlers, for a request
    Challenge {
        #[arg(long, default_value = "http://127.0.0.1/")]
        url: String,

        #[arg(long)]
        session: Option<String>,

        /// Run logout instead of a challenge
        #[arg(long)]
        logout: bool,
    },

    /// Print an example configuration file
    ExampleConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries only JSON results
    pau_common::logging::init_logging("pau-cli");

    let args = Args::parse();

    if let Command::ExampleConfig = args.command {
        print!("{}", AppConfig::example_toml());
        return Ok(());
    }

    let loader = match &args.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load().context("Failed to load configuration")?;
    let setup = build_authentication(&config).context("Failed to assemble authentication chain")?;

    let output = run(&setup, args.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(setup: &AuthenticationSetup, command: Command) -> Result<serde_json::Value> {
    let auth = &setup.authentication;

    match command {
        Command::Authenticate {
            login,
            password,
            authorization,
            session,
            url,
        } => {
            let mut request = AuthRequest::new(url);
            if let Some(login) = login {
                request = request.with_form_field("login", login);
            }
            if let Some(password) = password {
                request = request.with_form_field("password", password);
            }
            if let Some(header) = authorization {
                request = request.with_header("Authorization", header);
            }
            if let Some(session) = session {
                request = request.with_session(session);
            }

            match auth.authenticate(&request).await? {
                Some(principal) => {
                    info!(principal_id = %principal.id, "Authenticated");
                    Ok(json!({ "authenticated": true, "principal": principal }))
                }
                None => Ok(json!({
                    "authenticated": false,
                    "principal": auth.unauthenticated_principal(),
                })),
            }
        }

        Command::Principal { id } => {
            let principal = auth.get_principal(&id).await?;
            Ok(json!(principal))
        }

        Command::Search {
            text,
            start,
            batch_size,
        } => {
            let query = SearchQuery::text(text);
            let mut results = Vec::new();
            for (name, searcher) in auth.get_queriables() {
                let ids: Vec<String> = searcher.search(&query, start, batch_size).collect().await;
                results.push(json!({ "searcher": name, "ids": ids }));
            }
            Ok(json!(results))
        }

        Command::Challenge { url, session, logout } => {
            let mut request = AuthRequest::new(url);
            if let Some(session) = session {
                request = request.with_session(session);
            }

            let mut response = AuthResponse::new();
            if logout {
                auth.logout(&request, &mut response).await?;
            } else {
                auth.unauthorized(None, &request, &mut response).await?;
            }
            Ok(response_json(&response))
        }

        Command::ExampleConfig => Ok(json!(AppConfig::example_toml())),
    }
}

fn response_json(response: &AuthResponse) -> serde_json::Value {
    let headers: serde_json::Map<String, serde_json::Value> = response
        .headers()
        .iter()
        .map(|(name, value)| (name.clone(), json!(value)))
        .collect();
    json!({ "status": response.status(), "headers": headers })
}
