//! report-server – serves the assembled PDF report over HTTP.
//!
//! Usage:
//!   report-server [--config <file.json>] [--bind <addr:port>]
//!
//! Without `--config` the built-in demonstration report is served. Set
//! `RUST_LOG` (e.g. `RUST_LOG=info`) to control log output.

use std::{env, net::SocketAddr, path::PathBuf, process};

use report_forge::config::ServerConfig;
use report_forge::server::{build_router, AppState};

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut bind: Option<SocketAddr> = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => match iter.next() {
                Some(v) => config_path = Some(PathBuf::from(v)),
                None => {
                    eprintln!("Error: --config needs a file path.");
                    process::exit(1);
                }
            },
            "--bind" | "-b" => match iter.next().map(|v| v.parse::<SocketAddr>()) {
                Some(Ok(addr)) => bind = Some(addr),
                Some(Err(e)) => {
                    eprintln!("Error: invalid --bind address: {e}");
                    process::exit(1);
                }
                None => {
                    eprintln!("Error: --bind needs an address.");
                    process::exit(1);
                }
            },
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    let mut config = match config_path {
        Some(path) => match ServerConfig::load(&path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };
    if let Some(addr) = bind {
        config.bind = addr;
    }

    let listener = match tokio::net::TcpListener::bind(config.bind).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error binding {}: {e}", config.bind);
            process::exit(1);
        }
    };
    log::info!("Serving GET /reports/pdf on http://{}", config.bind);

    let app = build_router(AppState::new(config.report));
    if let Err(e) = axum::serve(listener, app).await {
        log::error!("Server error: {e}");
        process::exit(1);
    }
}

fn print_usage(prog: &str) {
    eprintln!("report-server – PDF report endpoint (report-forge)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} [--config <file.json>] [--bind <addr:port>]");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --config, -c   JSON file with `bind` and `report` settings");
    eprintln!("  --bind, -b     Listen address (default: 127.0.0.1:8080)");
    eprintln!("  --help         Print this message");
}
