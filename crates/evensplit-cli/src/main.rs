//! evensplit - terminal front end for the evensplit expense-splitting service.
//!
//! Logs in, keeps the session between runs, and issues authenticated API
//! calls. Any call that comes back `Unauthorized` signs the user out.

mod app;

use std::io;
use std::process::ExitCode;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{App, Command};

/// Environment variable naming a directory for rolling log files
const LOG_DIR_ENV: &str = "EVENSPLIT_LOG_DIR";

const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;

/// Initialize the tracing subscriber for logging.
/// The returned guard must live until exit so buffered file logs flush.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "evensplit.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    // Dropped when main returns, after the last log line is queued
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    ExitCode::from(run(&args).await)
}

/// Run one command and return the process exit status
async fn run(args: &[String]) -> u8 {
    let command = match Command::parse(args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n\n{}", e, app::USAGE);
            return EXIT_USAGE;
        }
    };

    if matches!(command, Command::Help) {
        println!("{}", app::USAGE);
        return 0;
    }

    info!(?command, "evensplit starting");
    let mut app = match App::new().await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return EXIT_FAILURE;
        }
    };
    let result = app.run(command).await;
    app.print_notices();
    app.print_flow();

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_FAILURE
        }
    }
}
