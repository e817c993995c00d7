use anyhow::Context;
use clap::{Parser, Subcommand};
use pushrelay::config::{self, Config};
use pushrelay::notify::{ConsolePresenter, MessageObserver};
use pushrelay::probe::{AppStateProbe, FixedStateProbe};
use pushrelay::relay::{OutboxHandler, RedbWorkQueue, RelayHandler, RelayRegistry, RelayWorker};
use pushrelay::{AppState, InboundMessage};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pushrelay")]
#[command(about = "Push message relay dispatcher", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Route one push message: relay it to the configured target, then present it.
    Route {
        /// Config file path (default: PUSHRELAY_CONFIG_PATH or ~/.pushrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Message JSON file, or "-" for stdin.
        #[arg(long, short, value_name = "FILE")]
        message: PathBuf,

        /// Skip the process probe and use this state (not-running, background, foreground).
        #[arg(long, value_name = "STATE")]
        assume_state: Option<AppState>,

        /// Register an observer that prints each raw message and suppresses notifications while in the foreground.
        #[arg(long)]
        quiet_in_foreground: bool,
    },

    /// Deliver queued relay work to the configured targets once.
    Drain {
        /// Config file path (default: PUSHRELAY_CONFIG_PATH or ~/.pushrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("pushrelay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Route {
            config,
            message,
            assume_state,
            quiet_in_foreground,
        }) => {
            if let Err(e) = run_route(config, &message, assume_state, quiet_in_foreground).await {
                log::error!("route failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Drain { config }) => {
            if let Err(e) = run_drain(config).await {
                log::error!("drain failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

/// Prints the raw message; declines notifications while the app is in the foreground.
struct StdoutObserver {
    wants_foreground: bool,
}

impl MessageObserver for StdoutObserver {
    fn wants_foreground_notification(&self) -> bool {
        self.wants_foreground
    }

    fn on_message_received(&self, message: &InboundMessage) {
        println!("received {}", message.to_uri());
    }
}

/// Register an outbox handler for every configured relay target.
async fn registry_from_config(config: &Config, config_path: &Path) -> Arc<RelayRegistry> {
    let registry = Arc::new(RelayRegistry::new());
    for (id, target) in &config.relay.targets {
        let outbox = config::resolve_relative(config_path, &target.outbox);
        log::debug!("relay target {} -> {}", id, outbox.display());
        registry
            .register(id.clone(), move || {
                Arc::new(OutboxHandler::new(outbox.clone())) as Arc<dyn RelayHandler>
            })
            .await;
    }
    registry
}

fn read_message(path: &Path) -> anyhow::Result<InboundMessage> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("reading message from stdin")?;
        return parse_message(&raw, "stdin");
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading message from {}", path.display()))?;
    parse_message(&raw, &path.display().to_string())
}

fn parse_message(raw: &str, source: &str) -> anyhow::Result<InboundMessage> {
    serde_json::from_str(raw).with_context(|| format!("parsing message from {}", source))
}

async fn run_route(
    config_path: Option<PathBuf>,
    message_path: &Path,
    assume_state: Option<AppState>,
    quiet_in_foreground: bool,
) -> anyhow::Result<()> {
    let (config, path) = config::load_config(config_path)?;
    let message = read_message(message_path)?;
    let registry = registry_from_config(&config, &path).await;
    let queue = Arc::new(RedbWorkQueue::open(config::resolve_queue_path(&config, &path))?);
    let probe = assume_state.map(|s| Arc::new(FixedStateProbe(s)) as Arc<dyn AppStateProbe>);
    let router = pushrelay::router::build_router(
        &config,
        &path,
        registry,
        queue,
        Arc::new(ConsolePresenter),
        probe,
    );

    let observer: Option<Arc<dyn MessageObserver>> = if quiet_in_foreground {
        Some(Arc::new(StdoutObserver {
            wants_foreground: false,
        }))
    } else {
        None
    };
    router.set_callback(observer.as_ref());

    let report = router.on_message_received(&message).await;
    log::info!(
        "routed: dispatch={:?} state={} presentation={:?}",
        report.dispatch,
        report.state,
        report.presentation
    );
    Ok(())
}

async fn run_drain(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = config::load_config(config_path)?;
    let registry = registry_from_config(&config, &path).await;
    let queue = Arc::new(RedbWorkQueue::open(config::resolve_queue_path(&config, &path))?);
    let report = RelayWorker::new(queue, registry).drain().await?;
    println!(
        "delivered {}, failed {}, skipped {}, unacked {}",
        report.delivered, report.failed, report.skipped, report.unacked
    );
    Ok(())
}
