//! `wsrpc` command-line interface
//!
//! Settings are resolved in increasing priority: defaults,
//! `.wsrpc/config.toml` (or `--config`), `WSRPC_BASE_URL`, `--base-url`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use serde_json::Value;
use tracing::info;

use wsrpc_client::config::TOKEN_ENV;
use wsrpc_client::{
    load_settings, load_settings_from, ClientSettings, CredentialStore, FileTokenStore, RpcClient,
};

use crate::output::{mask_token, print_value, ListenEvent};

/// Call tools on a WebSocket JSON-RPC server
#[derive(Parser, Debug)]
#[command(name = "wsrpc", version)]
#[command(about = "Call tools on a WebSocket JSON-RPC server", long_about = None)]
pub struct Cli {
    /// HTTP(S) origin of the server, e.g. https://api.example.com
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Settings file to use instead of .wsrpc/config.toml
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Give up waiting for a response after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Send a raw JSON-RPC request and print the result
    Call {
        method: String,
        /// Request params as JSON (default: {})
        params: Option<String>,
    },

    /// Call a tool and print its result
    Tool {
        name: String,
        /// Tool arguments as JSON (default: {})
        args: Option<String>,
    },

    /// List the tools the server exposes
    Tools,

    /// Print server notifications as JSON lines until the connection closes
    Listen,

    /// Manage the stored bearer token
    Token {
        #[command(subcommand)]
        action: TokenCommand,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum TokenCommand {
    /// Store a token in the token file
    Set { value: String },
    /// Delete the token file
    Clear,
    /// Show where the token comes from
    Show,
}

/// Run one CLI invocation to completion.
pub async fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let settings = resolve_settings(&cli, &cwd)?;
    let timeout = cli.timeout.map(Duration::from_secs);

    if let Command::Token { action } = &cli.command {
        return run_token(action, &settings);
    }

    let client = RpcClient::from_settings(&settings).wrap_err("Invalid client settings")?;

    match cli.command {
        Command::Call { method, params } => {
            let params = parse_json_arg(params.as_deref())?;
            let result = with_timeout(timeout, client.request(&method, params)).await?;
            print_value(&result)?;
        }
        Command::Tool { name, args } => {
            let args = parse_json_arg(args.as_deref())?;
            let result = with_timeout(timeout, client.call_tool(&name, args)).await?;
            print_value(&result)?;
        }
        Command::Tools => {
            let tools = with_timeout(timeout, client.list_tools()).await?;
            for tool in tools {
                match tool.description {
                    Some(description) => println!("{}\t{}", tool.name, description),
                    None => println!("{}", tool.name),
                }
            }
        }
        Command::Listen => listen(&client).await?,
        Command::Token { action } => run_token(&action, &settings)?,
    }

    client.close().await;
    Ok(())
}

/// Build the effective settings for this invocation.
pub fn resolve_settings(cli: &Cli, cwd: &Path) -> Result<ClientSettings> {
    let mut settings = match &cli.config {
        Some(path) => load_settings_from(path)?,
        None => load_settings(cwd),
    };
    settings.apply_env_overrides();
    if let Some(base_url) = &cli.base_url {
        settings.base_url = base_url.clone();
    }
    Ok(settings)
}

/// Parse an optional JSON argument, defaulting to `{}`.
pub fn parse_json_arg(raw: Option<&str>) -> Result<Value> {
    match raw {
        None => Ok(Value::Object(Default::default())),
        Some(raw) => serde_json::from_str(raw).wrap_err_with(|| format!("Not valid JSON: {raw}")),
    }
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = wsrpc_core::Result<T>>,
) -> Result<T> {
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| eyre!("No response within {}s", limit.as_secs()))?,
        None => fut.await,
    };
    Ok(outcome?)
}

async fn listen(client: &RpcClient) -> Result<()> {
    let subscription = client.on_notification(|n| ListenEvent::notification(n).emit());

    client.connect().await.wrap_err("Failed to connect")?;
    ListenEvent::connected(client.endpoint().socket_url(None)?.as_str()).emit();

    tokio::select! {
        _ = client.wait_for_disconnect() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, closing connection");
            client.close().await;
        }
    }

    subscription.unsubscribe();
    ListenEvent::disconnected().emit();
    Ok(())
}

fn run_token(action: &TokenCommand, settings: &ClientSettings) -> Result<()> {
    let store = FileTokenStore::new(settings.token_path());
    match action {
        TokenCommand::Set { value } => {
            store.store(value)?;
            println!("Token saved to {}", store.path().display());
        }
        TokenCommand::Clear => {
            store.clear()?;
            println!("Token removed from {}", store.path().display());
        }
        TokenCommand::Show => {
            if std::env::var(TOKEN_ENV).is_ok_and(|v| !v.trim().is_empty()) {
                println!("{TOKEN_ENV} is set and takes precedence over the token file");
            }
            match store.token() {
                Some(token) => println!("{} ({})", mask_token(&token), store.path().display()),
                None => println!("No token stored at {}", store.path().display()),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parse_call_with_params() {
        let cli = parse(&["wsrpc", "call", "ping", r#"{"a":1}"#]);
        assert_eq!(
            cli.command,
            Command::Call {
                method: "ping".to_string(),
                params: Some(r#"{"a":1}"#.to_string()),
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["wsrpc", "tools", "--timeout", "3", "--base-url", "http://h"]);
        assert_eq!(cli.command, Command::Tools);
        assert_eq!(cli.timeout, Some(3));
        assert_eq!(cli.base_url.as_deref(), Some("http://h"));
    }

    #[test]
    fn test_parse_token_subcommands() {
        let cli = parse(&["wsrpc", "token", "set", "abc"]);
        assert_eq!(
            cli.command,
            Command::Token {
                action: TokenCommand::Set {
                    value: "abc".to_string()
                }
            }
        );
        assert!(Cli::try_parse_from(["wsrpc", "token"]).is_err());
    }

    #[test]
    fn test_parse_json_arg() {
        assert_eq!(parse_json_arg(None).unwrap(), json!({}));
        assert_eq!(parse_json_arg(Some("[1,2]")).unwrap(), json!([1, 2]));
        assert!(parse_json_arg(Some("{oops")).is_err());
    }

    #[test]
    fn test_base_url_flag_wins_over_config_file() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("custom.toml");
        std::fs::write(&config, "base_url = \"http://from-file:1\"\n").unwrap();

        let cli = parse(&[
            "wsrpc",
            "--config",
            config.to_str().unwrap(),
            "--base-url",
            "https://from-flag",
            "tools",
        ]);
        let settings = resolve_settings(&cli, dir.path()).unwrap();
        assert_eq!(settings.base_url, "https://from-flag");
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let cli = parse(&["wsrpc", "--config", missing.to_str().unwrap(), "tools"]);
        assert!(resolve_settings(&cli, dir.path()).is_err());
    }

    #[test]
    fn test_token_set_then_clear() {
        let dir = tempdir().unwrap();
        let settings = ClientSettings {
            token_file: Some(dir.path().join("nested").join("token")),
            ..Default::default()
        };

        run_token(
            &TokenCommand::Set {
                value: "s3cret".to_string(),
            },
            &settings,
        )
        .unwrap();
        assert_eq!(
            FileTokenStore::new(settings.token_path()).token().as_deref(),
            Some("s3cret")
        );

        run_token(&TokenCommand::Clear, &settings).unwrap();
        assert!(!settings.token_path().exists());
    }

    #[tokio::test]
    async fn test_timeout_reports_error() {
        let never = std::future::pending::<wsrpc_core::Result<Value>>();
        let err = with_timeout(Some(Duration::from_millis(10)), never)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No response"));
    }
}
