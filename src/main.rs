use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tvfleet_gateway::api::{self, ApiState};
use tvfleet_gateway::{
    Config, Dispatcher, OperationCatalog, SamsungLink, TokenStore, TvRegistry,
};

/// tvfleet - operation gateway for a Samsung Smart TV fleet
#[derive(Parser)]
#[command(name = "tvfleet", version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "TVFLEET_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(long, env = "TVFLEET_PORT")]
    port: Option<u16>,

    /// Fleet configuration file
    #[arg(long, env = "TVFLEET_FLEET")]
    fleet: Option<PathBuf>,

    /// Pairing-token file
    #[arg(long, env = "TVFLEET_TOKENS")]
    tokens: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway (default)
    Serve,
    /// List configured TVs with pairing status
    List,
    /// Pair one or more TVs
    Pair {
        /// TV ids to pair
        #[arg(required = true)]
        tv_ids: Vec<String>,
    },
    /// Check TV ids against the fleet configuration
    Validate {
        /// TV ids to check
        #[arg(required = true)]
        tv_ids: Vec<String>,
    },
    /// Run an operation against one or more TVs
    Exec {
        /// Operation name (e.g. power_status, send_key)
        operation: String,
        /// TV ids to target
        #[arg(short, long = "tv", required = true)]
        tv_ids: Vec<String>,
        /// Operation arguments (e.g. KEY_POWER)
        #[arg(short, long = "arg")]
        args: Vec<String>,
        /// Run one target at a time
        #[arg(long)]
        sequential: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,tvfleet_gateway=info",
        1 => "info,tvfleet_gateway=debug",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_ref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(fleet) = cli.fleet {
        config.fleet_path = fleet;
    }
    if let Some(tokens) = cli.tokens {
        config.tokens_path = tokens;
    }

    let registry = Arc::new(TvRegistry::load(&config.fleet_path)?);
    // A corrupt token file is fatal: pairing-dependent operations must not
    // run against untrusted state
    let tokens = TokenStore::open(&config.tokens_path)?;
    let link = Arc::new(SamsungLink::new(config.bridge.clone())?);
    let catalog = Arc::new(OperationCatalog::with_builtin(link));
    let dispatcher = Dispatcher::new(registry.clone(), tokens.clone(), catalog)
        .with_max_workers(config.max_workers);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let state = ApiState {
                registry,
                tokens,
                dispatcher,
                max_batch: config.max_batch,
            };
            api::serve(state, &config.host, config.port).await?;
        }
        Command::List => {
            let tvs = registry.list_with_pairing(&tokens).await;
            println!("{}", serde_json::to_string_pretty(&tvs)?);
        }
        Command::Pair { tv_ids } => {
            let batch = dispatcher.run("pair", &tv_ids, &[], true).await?;
            println!("{}", serde_json::to_string_pretty(&batch)?);
        }
        Command::Validate { tv_ids } => {
            let report = api::tv::validation_report(&registry, &tv_ids);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Exec {
            operation,
            tv_ids,
            args,
            sequential,
        } => {
            let batch = dispatcher
                .run(&operation, &tv_ids, &args, !sequential)
                .await?;
            println!("{}", serde_json::to_string_pretty(&batch)?);
        }
    }

    Ok(())
}
