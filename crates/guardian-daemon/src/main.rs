//! guardian-daemon: Line-oriented front end for editing config files next to
//! their sanitized copies.
//!
//! Commands are read from stdin and results printed to stdout. Logs go to
//! stderr.

use anyhow::Result;
use clap::Parser;
use guardian_core::{AlwaysConfirm, Confirmer, EngineEvent, NoticeLevel};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use guardian_daemon::confirm::{stdin_lines, StdinConfirmer};
use guardian_daemon::daemon::is_announced;
use guardian_daemon::{Args, Command, Daemon, DaemonConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,guardian_core=debug,guardian_daemon=debug"
    } else {
        "info,guardian_core=info,guardian_daemon=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = DaemonConfig::from_args(&args)?;
    info!("Starting guardian-daemon");
    info!("Data directory: {:?}", config.data_dir);

    let lines = stdin_lines();
    let confirmer: Box<dyn Confirmer> = if config.auto_confirm {
        Box::new(AlwaysConfirm)
    } else {
        Box::new(StdinConfirmer::new(lines.clone()))
    };
    let daemon = Daemon::open(&config, confirmer)?;

    let _notices = daemon.engine().subscribe(|event| {
        if let EngineEvent::Notice { level, message } = event {
            match level {
                NoticeLevel::Info => println!("{}", message),
                NoticeLevel::Error => println!("error: {}", message),
            }
        }
    });

    info!("Ready. Type `help` for commands.");

    // Main event loop
    loop {
        tokio::select! {
            line = async { lines.lock().await.next_line().await } => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let command = match line.parse::<Command>() {
                    Ok(command) => command,
                    Err(e) => {
                        println!("error: {}", e);
                        continue;
                    }
                };
                if command == Command::Quit {
                    break;
                }

                match daemon.execute(command).await {
                    Ok(output) if output.is_empty() => {}
                    Ok(output) => println!("{}", output),
                    Err(e) if is_announced(&e) => {}
                    Err(e) => println!("error: {:#}", e),
                }
            }

            // Handle graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Shutting down");
    daemon.shutdown().await;
    Ok(())
}
