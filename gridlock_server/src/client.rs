// TCP client for connecting to the match server.
//
// Provides a non-blocking interface for a frontend (or an integration test)
// to talk to the server. Architecture:
// - `connect()` performs TCP connect + LOGIN handshake on the calling
//   thread, then spawns a background reader thread.
// - The reader thread calls `read_line()` in a loop, decodes
//   `ServerMessage`, and pushes into an `mpsc` channel. Lines it cannot
//   decode are skipped (the protocol's forward-compatibility policy).
// - The caller holds a `BufWriter<TcpStream>` for sending.
// - `poll()` drains the inbox non-blocking; `recv_timeout()` waits for the
//   next message with a deadline.
//
// This separation means the caller never blocks on network reads. It lives
// in the server crate rather than the protocol crate because it is a
// convenience over the protocol, not part of the wire contract.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use gridlock_protocol::framing::{read_line, write_line};
use gridlock_protocol::message::{ClientMessage, ServerMessage};
use gridlock_protocol::types::MatchId;
use thiserror::Error;

/// Failure to establish or use a client connection.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),
    #[error("handshake read failed: {0}")]
    Handshake(#[source] std::io::Error),
    #[error("login rejected: {reason}")]
    LoginRejected { reason: String },
    #[error("unexpected handshake response: {line}")]
    UnexpectedResponse { line: String },
}

/// TCP client for the match server's line protocol.
pub struct SessionClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ServerMessage>,
    _reader_thread: Option<JoinHandle<()>>,
    username: String,
}

impl SessionClient {
    /// Connect to a server, log in under `username`, and spawn a reader
    /// thread. Fails with `LoginRejected` if the name is taken; the TCP
    /// connection is dropped in that case (a frontend that wants to retry
    /// on the same connection can speak the protocol directly).
    pub fn connect(addr: &str, username: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).map_err(ClientError::Connect)?;

        // Bound the handshake wait; nothing is sent to this connection
        // before the server answers the login.
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .ok();

        let reader_stream = stream.try_clone().map_err(ClientError::Connect)?;
        let mut writer = BufWriter::new(stream);
        let mut reader = BufReader::new(reader_stream);

        send_msg(
            &mut writer,
            &ClientMessage::Login {
                username: username.to_string(),
            },
        )?;

        let line = read_line(&mut reader).map_err(ClientError::Handshake)?;
        match ServerMessage::parse(&line) {
            Ok(ServerMessage::LoginOk { .. }) => {}
            Ok(ServerMessage::LoginFail { reason }) => {
                return Err(ClientError::LoginRejected { reason });
            }
            _ => return Err(ClientError::UnexpectedResponse { line }),
        }

        // Clear the read timeout for the long-lived reader loop.
        if let Ok(inner) = reader.get_ref().try_clone() {
            inner.set_read_timeout(None).ok();
        }

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || {
            reader_loop(reader, tx);
        });

        Ok(Self {
            writer,
            inbox: rx,
            _reader_thread: Some(reader_thread),
            username: username.to_string(),
        })
    }

    /// Name this client is logged in under.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Ask the server to re-broadcast the user directory.
    pub fn request_user_list(&mut self) -> Result<(), ClientError> {
        send_msg(&mut self.writer, &ClientMessage::RequestUserList)
    }

    /// Chat to everyone connected.
    pub fn send_chat(&mut self, text: &str) -> Result<(), ClientError> {
        send_msg(
            &mut self.writer,
            &ClientMessage::ChatGlobal {
                text: text.to_string(),
            },
        )
    }

    /// Invite another user to a match.
    pub fn send_invite(&mut self, target: &str) -> Result<(), ClientError> {
        send_msg(
            &mut self.writer,
            &ClientMessage::Invite {
                target: target.to_string(),
            },
        )
    }

    /// Accept an invitation; the server creates and starts the match.
    pub fn accept_invite(&mut self, inviter: &str) -> Result<(), ClientError> {
        send_msg(
            &mut self.writer,
            &ClientMessage::AcceptInvite {
                inviter: inviter.to_string(),
            },
        )
    }

    /// Decline an invitation.
    pub fn decline_invite(&mut self, inviter: &str) -> Result<(), ClientError> {
        send_msg(
            &mut self.writer,
            &ClientMessage::DeclineInvite {
                inviter: inviter.to_string(),
            },
        )
    }

    /// Place a mark at `cell` (0..=8, row-major).
    pub fn send_move(&mut self, match_id: MatchId, cell: usize) -> Result<(), ClientError> {
        send_msg(&mut self.writer, &ClientMessage::GameMove { match_id, cell })
    }

    /// Chat visible only inside the match.
    pub fn send_game_chat(&mut self, match_id: MatchId, text: &str) -> Result<(), ClientError> {
        send_msg(
            &mut self.writer,
            &ClientMessage::GameChat {
                match_id,
                text: text.to_string(),
            },
        )
    }

    /// Forfeit the active match.
    pub fn surrender(&mut self) -> Result<(), ClientError> {
        send_msg(&mut self.writer, &ClientMessage::Surrender)
    }

    /// Heartbeat.
    pub fn send_ping(&mut self) -> Result<(), ClientError> {
        send_msg(&mut self.writer, &ClientMessage::Ping)
    }

    /// Graceful disconnect; the server treats it like a hangup.
    pub fn quit(&mut self) {
        let _ = send_msg(&mut self.writer, &ClientMessage::Quit);
    }

    /// Drain all queued server messages (non-blocking).
    pub fn poll(&self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.inbox.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Wait up to `timeout` for the next server message.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ServerMessage> {
        self.inbox.recv_timeout(timeout).ok()
    }
}

/// Encode a `ClientMessage` and write it as one framed line.
fn send_msg(writer: &mut BufWriter<TcpStream>, msg: &ClientMessage) -> Result<(), ClientError> {
    write_line(writer, &msg.to_string()).map_err(ClientError::Send)
}

/// Reader thread: read framed lines in a loop, push decoded messages to the
/// channel.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<ServerMessage>) {
    loop {
        let line = match read_line(&mut reader) {
            Ok(line) => line,
            Err(_) => break, // Read error or EOF.
        };
        match ServerMessage::parse(&line) {
            Ok(msg) => {
                if tx.send(msg).is_err() {
                    break; // Owner dropped the receiver.
                }
            }
            Err(_) => continue, // Unknown message — skip.
        }
    }
}
