mod calculator;
mod chat_commands;
mod config_commands;
mod runtime;
mod serve_commands;

use std::process::ExitCode;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::{runtime::Runtime, serve_commands::ServeTransport};

#[derive(Parser)]
#[command(name = "agentwire", version, about = "Agent loop with MCP tool calling")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Print tool calls and compaction progress to stderr.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default when no subcommand is provided).
    Chat,
    /// Answer one message and exit.
    Ask {
        #[arg(short, long)]
        message: String,
    },
    /// Expose the registered tools as an MCP server.
    Serve {
        #[arg(long, value_enum, default_value = "http")]
        transport: ServeTransport,
        /// Address to bind to (overrides config value).
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides config value).
        #[arg(long)]
        port: Option<u16>,
    },
    /// List every registered tool and the connected MCP servers.
    Tools,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

/// Logs always go to stderr; stdout belongs to answers and to the stdio
/// protocol server.
fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);
    info!(version = env!("CARGO_PKG_VERSION"), "agentwire starting");

    let config = agentwire_config::discover_and_load();
    let command = match cli.command.unwrap_or(Commands::Chat) {
        Commands::Config { action } => {
            config_commands::handle_config(action, &config)?;
            return Ok(ExitCode::SUCCESS);
        },
        other => other,
    };

    let runtime = Runtime::start(config).await;
    let result = match command {
        Commands::Chat => chat_commands::chat(&runtime, cli.verbose)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Ask { message } => chat_commands::ask(&runtime, &message, cli.verbose).await,
        Commands::Serve {
            transport,
            bind,
            port,
        } => serve_commands::serve(&runtime, transport, bind, port)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Tools => {
            list_tools(&runtime).await;
            Ok(ExitCode::SUCCESS)
        },
        Commands::Config { .. } => Ok(ExitCode::SUCCESS),
    };
    runtime.shutdown().await;
    result
}

async fn list_tools(runtime: &Runtime) {
    for entry in runtime.tools.manifest() {
        println!("{:<40} {}", entry.name, entry.description);
    }
    let servers = runtime.mcp.status().await;
    if !servers.is_empty() {
        println!();
    }
    for s in servers {
        println!(
            "server {} ({:?}, {}): {} tool(s){}",
            s.name,
            s.transport,
            if s.alive { "alive" } else { "down" },
            s.tool_count,
            s.server_info
                .map(|info| format!(", {info}"))
                .unwrap_or_default()
        );
    }
}
