//! Treemesh peer binary
//!
//! Loads configuration, starts the overlay node and feeds it commands read
//! from standard input, one per line.

use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};
use treemesh::{Command, Config, EngineEvent, Node};

/// Tree overlay network peer
#[derive(Parser, Debug)]
#[command(name = "treemesh", version, about)]
struct Args {
    /// Path to configuration file (overrides default search paths)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Overlay address to listen on, as ip:port
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,

    /// Run as the overlay root
    #[arg(long)]
    root: bool,

    /// Address of the overlay root, as ip:port
    #[arg(long, value_name = "ADDR")]
    root_addr: Option<String>,
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(listen) = &self.listen {
            config.node.listen_addr = Some(listen.clone());
        }
        if self.root {
            config.node.root = true;
        }
        if let Some(root_addr) = &self.root_addr {
            config.node.root_addr = Some(root_addr.clone());
        }
    }
}

/// Read commands from stdin until EOF. Runs on its own thread.
fn read_commands(tx: mpsc::Sender<Command>) {
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                if tx.blocking_send(command).is_err() {
                    break;
                }
            }
            Err(e) => warn!(line = %line.trim(), error = %e, "Ignoring command"),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    info!("Treemesh starting");

    let (mut config, loaded_paths) = if let Some(config_path) = &args.config {
        // Explicit config file specified - load only that file
        match Config::load_file(config_path) {
            Ok(config) => (config, vec![config_path.clone()]),
            Err(e) => {
                error!("Failed to load configuration from {}: {}", config_path.display(), e);
                std::process::exit(1);
            }
        }
    } else {
        match Config::load() {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    };

    if loaded_paths.is_empty() {
        info!("No config files found, using defaults");
    } else {
        for path in &loaded_paths {
            info!(path = %path.display(), "Loaded config file");
        }
    }

    args.apply(&mut config);

    let mut node = match Node::new(config) {
        Ok(node) => node,
        Err(e) => {
            error!("Failed to create node: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = node.start().await {
        error!("Failed to start node: {}", e);
        std::process::exit(1);
    }

    let mut events = node.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let EngineEvent::MessageDelivered { .. } = &event {
                println!("{}", event);
            }
        }
    });

    let (command_tx, command_rx) = mpsc::channel(16);
    std::thread::spawn(move || read_commands(command_tx));

    info!("Treemesh running, press Ctrl+C to exit");

    tokio::select! {
        result = node.run(command_rx) => {
            if let Err(e) = result {
                error!("Event loop failed: {}", e);
            }
        }
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        },
    }

    info!("Treemesh shutting down");

    if let Err(e) = node.stop().await {
        warn!("Error during shutdown: {}", e);
    }

    info!("Treemesh shutdown complete");
}
