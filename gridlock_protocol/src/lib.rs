// gridlock_protocol — wire protocol for the Gridlock match server.
//
// This crate defines the message types and line framing used by the match
// server (`gridlock_server`) and its clients to communicate over TCP. It is
// shared between both sides and has no dependency on the server's state or
// any frontend.
//
// Module overview:
// - `types.rs`:    Core wire types — `MatchId`, `PlayerSymbol`.
// - `message.rs`:  Client-to-server and server-to-client message enums plus
//                  the pipe-delimited line codec (`Display` / `parse`).
// - `framing.rs`:  Newline-terminated UTF-8 line framing over any
//                  `BufRead`/`Write` stream, with a line-length guard.
//
// Design decisions:
// - **Plain text lines.** One message per newline-terminated line, fields
//   separated by `|`. Trivially inspectable with netcat, and what every
//   existing client speaks.
// - **Typed parse errors, silent callers.** `parse` reports exactly what was
//   wrong, but the protocol's policy is forward-compatible tolerance: both
//   ends drop lines they cannot decode instead of failing the connection.
// - **No async runtime.** Uses `std::io::BufRead`/`Write` for framing,
//   compatible with blocking TCP streams and buffered wrappers.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{MAX_LINE_LEN, read_line, write_line};
pub use message::{ClientMessage, MatchOutcome, ParseError, ServerMessage};
pub use types::{MatchId, PlayerSymbol};
