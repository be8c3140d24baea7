use clap::Parser;
use ssgd::{Config, Server, logging, signal};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ssgd")]
#[command(about = "Serve a generated static site over HTTP/1.1")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "server.conf")]
    config: PathBuf,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of worker threads (overrides the configuration file)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Directory to serve files from (overrides the configuration file)
    #[arg(short, long)]
    document_root: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    signal::ignore_sigpipe();

    let mut config = match Config::load_or_default(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            process::exit(1);
        }
    };

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(workers) = cli.workers {
        config.num_workers = workers;
    }
    if let Some(document_root) = cli.document_root {
        config.document_root = document_root;
    }

    let guard = match logging::init(&config.log_file) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(&config) {
        error!("Fatal: {e}");
        drop(guard);
        process::exit(1);
    }
}

fn run(config: &Config) -> ssgd::Result<()> {
    info!(
        port = config.port,
        workers = config.num_workers,
        document_root = %config.document_root.display(),
        "Starting server"
    );

    let server = Server::bind(config)?;
    signal::install(server.shutdown_handle())?;

    server.run()?;

    info!("Shutdown complete");
    Ok(())
}
