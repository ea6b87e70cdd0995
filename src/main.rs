//! # Vault Gateway CLI (`vgw`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vgw tools` | List registered tools and their parameters |
//! | `vgw call <tool> --params '<json>'` | Invoke one tool and print its result envelope |
//! | `vgw search "<query>"` | Shortcut for the `search` tool |
//! | `vgw serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! vgw --config ./config/vgw.toml tools
//! vgw call read_note --params '{"path": "daily/2024-05-01.md"}'
//! vgw search "borrow checker" --mode keyword --limit 5
//! RUST_LOG=vault_gateway=debug vgw serve
//! ```
//!
//! Logs go to stderr; results go to stdout as JSON.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use vault_gateway::config::{self, Config};
use vault_gateway::gateway::Gateway;
use vault_gateway::search::SearchMode;
use vault_gateway::server;
use vault_gateway::tools::{ToolInvocationRequest, ToolResult};

/// Vault Gateway: tool dispatch, caching, and hybrid search over a
/// knowledge vault.
#[derive(Parser)]
#[command(name = "vgw", version)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered tools.
    Tools,

    /// Invoke a tool and print the result envelope.
    Call {
        /// Tool name, e.g. `read_note`.
        tool: String,

        /// Parameters as a JSON object.
        #[arg(long, default_value = "{}")]
        params: String,
    },

    /// Search the vault.
    Search {
        query: String,

        /// `keyword`, `semantic`, or `hybrid`. Defaults to `retrieval.mode`.
        #[arg(long)]
        mode: Option<SearchMode>,

        #[arg(long)]
        limit: Option<u64>,

        /// Print per-scorer score breakdowns.
        #[arg(long)]
        explain: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    let gateway = Gateway::from_config(&cfg)?;

    match cli.command {
        Commands::Tools => {
            let catalog = gateway.dispatcher().catalog();
            println!("{}", serde_json::to_string_pretty(&json!({ "tools": catalog }))?);
        }
        Commands::Call { tool, params } => {
            let params: Value = serde_json::from_str(&params)
                .map_err(|e| anyhow::anyhow!("--params is not valid JSON: {}", e))?;
            let result = gateway
                .dispatcher()
                .dispatch(ToolInvocationRequest::new(tool, params))
                .await;
            print_result(&result)?;
        }
        Commands::Search {
            query,
            mode,
            limit,
            explain,
        } => {
            let mut params = json!({ "query": query, "explain": explain });
            if let Some(mode) = mode {
                params["mode"] = json!(mode.as_str());
            }
            if let Some(limit) = limit {
                params["limit"] = json!(limit);
            }
            let result = gateway
                .dispatcher()
                .dispatch(ToolInvocationRequest::new("search", params))
                .await;
            print_result(&result)?;
        }
        Commands::Serve => {
            server::run_server(&cfg, gateway.dispatcher().clone()).await?;
        }
    }

    Ok(())
}

/// Print the envelope; a failed invocation exits non-zero.
fn print_result(result: &ToolResult) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
