// gridlock_server — multiplayer match server for Gridlock.
//
// The server accepts persistent TCP connections speaking the line protocol
// defined in `gridlock_protocol`, authenticates a display name per
// connection, maintains a live directory of who is online, brokers match
// invitations, and runs any number of concurrent two-player matches to
// completion — relaying every state change to both participants and global
// chat to everyone.
//
// Module overview:
// - `registry.rs`: The process-wide directory — `username → connection`
//                  and `match id → room` — behind a single lock. The only
//                  shared-mutable-state boundary in the system.
// - `room.rs`:     Per-match state machine: board, turn pointer, win/draw
//                  rules, and the bounded-history mark recycling variant.
// - `handler.rs`:  Per-connection protocol interpreter: read loop, command
//                  dispatch, disconnect sequence, plus the writer thread
//                  that decouples sends from the peer's socket.
// - `server.rs`:   TCP listener and composition root; `start_server`
//                  returns a handle usable from tests and the binary.
// - `client.rs`:   Headless TCP client for integration tests and
//                  non-graphical frontends.
//
// Dependencies: `gridlock_protocol` (shared message types and framing).
// The server can run standalone (`main.rs`) or be embedded in another
// process via the library API (`start_server`).

pub mod client;
pub mod handler;
pub mod registry;
pub mod room;
pub mod server;

pub use server::start_server;
