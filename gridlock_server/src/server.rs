// TCP listener and composition root.
//
// Architecture: thread-per-connection over shared, lock-guarded state.
//
// - **Accept thread** (`TcpListener::accept()` loop): accepts new TCP
//   connections and spawns a handler thread per connection.
// - **Handler threads** (one per client, `handler.rs`): own their
//   connection's blocking read loop and dispatch into the shared registry
//   and the per-match rooms.
// - **Writer threads** (one per client): drain that connection's outbound
//   queue, so no handler ever blocks on another connection's socket.
//
// There is no central event loop: the `Registry` mutex serializes directory
// mutations and snapshots, and each room's own mutex serializes its moves.
// A connection blocks only on its own socket read.
//
// Shutdown: the accept thread checks a `keep_running` flag (cleared by
// `ServerHandle::stop`) between non-blocking accept attempts and exits.
// Handler threads end when their peers hang up.

use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::handler::handle_connection;
use crate::registry::Registry;
use crate::room::GameMode;

/// Configuration for starting a match server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    /// Rule set newly created matches play under.
    pub mode: GameMode,
    /// Disconnect a peer silent for this long; clients heartbeat every 5
    /// seconds. `0` disables the reaper.
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8888,
            mode: GameMode::BoundedHistory,
            idle_timeout_secs: 300,
        }
    }
}

/// Handle returned by `start_server` to observe and stop the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    registry: Registry,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Connected (logged-in) users right now.
    pub fn user_count(&self) -> usize {
        self.registry.user_count()
    }

    /// Stop accepting connections and wait for the accept thread to exit.
    /// Already-established connections run until their peers hang up.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Start the match server on a background thread. Returns a handle for
/// stopping it and the actual bound address (useful when port 0 is used to
/// let the OS pick a free port).
pub fn start_server(config: ServerConfig) -> std::io::Result<(ServerHandle, std::net::SocketAddr)> {
    let listener = TcpListener::bind(("0.0.0.0", config.port))?;
    let addr = listener.local_addr()?;
    let registry = Registry::new();
    let keep_running = Arc::new(AtomicBool::new(true));

    let accept_registry = registry.clone();
    let accept_keep_running = keep_running.clone();
    let thread = thread::spawn(move || {
        accept_loop(listener, config, accept_registry, accept_keep_running);
    });

    Ok((
        ServerHandle {
            keep_running,
            registry,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Accept connections until `keep_running` clears.
fn accept_loop(
    listener: TcpListener,
    config: ServerConfig,
    registry: Registry,
    keep_running: Arc<AtomicBool>,
) {
    // Non-blocking so the loop can check keep_running periodically.
    listener.set_nonblocking(true).ok();

    let idle_timeout = match config.idle_timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "connection accepted");
                stream.set_nonblocking(false).ok();
                let registry = registry.clone();
                let mode = config.mode;
                thread::spawn(move || {
                    handle_connection(stream, registry, mode, idle_timeout);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                break;
            }
        }
    }
}
