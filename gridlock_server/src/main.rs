// CLI entry point for the Gridlock match server.
//
// Starts a standalone server that lobby clients connect to: one TCP
// connection per client, display-name login, global chat, and two-player
// matches brokered by invitation. See `server.rs` for the threading
// architecture and `room.rs` for the match rules.
//
// Usage:
//   gridlock [OPTIONS]
//     --port <PORT>          Listen port (default: 8888)
//     --mode <MODE>          Match rules: classic | eviction (default: eviction)
//     --idle-timeout <SECS>  Drop peers silent this long, 0 = never (default: 300)

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gridlock_server::server::{ServerConfig, start_server};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = parse_args();
    let (handle, addr) = start_server(config).context("failed to start server")?;
    info!(%addr, "server listening");

    // Periodic presence monitor; the process runs until killed. The server
    // never initiates shutdown itself — connection closure is the only
    // termination signal in the protocol.
    loop {
        std::thread::sleep(std::time::Duration::from_secs(5));
        info!(clients = handle.user_count(), "active clients");
    }
}

/// Parse command-line arguments into a `ServerConfig`. Uses simple
/// `std::env::args()` matching — no clap dependency.
fn parse_args() -> ServerConfig {
    let mut config = ServerConfig::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--mode" => {
                i += 1;
                config.mode = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--mode requires `classic` or `eviction`");
                    std::process::exit(1);
                });
            }
            "--idle-timeout" => {
                i += 1;
                config.idle_timeout_secs =
                    args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                        eprintln!("--idle-timeout requires a number of seconds");
                        std::process::exit(1);
                    });
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_usage() {
    println!("Usage: gridlock [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>          Listen port (default: 8888)");
    println!("  --mode <MODE>          Match rules: classic | eviction (default: eviction)");
    println!("  --idle-timeout <SECS>  Drop peers silent this long, 0 = never (default: 300)");
    println!("  --help, -h             Show this help");
}
