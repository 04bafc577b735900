// Per-connection session handling.
//
// Each accepted connection gets two threads:
// - The **handler thread** (this module's entry point) owns the blocking
//   read loop: frame a line, decode it, check preconditions, dispatch to
//   the registry or the relevant room.
// - A **writer thread** owns the socket's write half and drains the
//   connection's bounded outbound queue, so nothing that sends to this
//   connection — another handler broadcasting, a room announcing a move —
//   ever blocks on this peer's I/O.
//
// The connection's protocol state is `Connected` until a successful login,
// then `LoggedIn`. Whether the user is in the lobby or in a match is owned
// by the registry (both participants' threads need to see it change when a
// match is created or concluded); dispatch consults it through the match
// lookups.
//
// Any exit from the read loop — EOF, I/O error, idle timeout, `QUIT` — runs
// the disconnect sequence exactly once: unregister, directory broadcast,
// writer shutdown, socket release. A match the user was in stays in place;
// the opponent can surrender out of it.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use gridlock_protocol::framing::{read_line, write_line};
use gridlock_protocol::message::{ClientMessage, ServerMessage};
use gridlock_protocol::types::MatchId;
use tracing::{debug, info, warn};

use crate::registry::{OUTBOUND_QUEUE_DEPTH, Outbound, OutboundHandle, Registry, RegistryError};
use crate::room::{GameMode, MoveOutcome};

/// Protocol state of one connection, consulted by dispatch.
enum SessionState {
    /// No successful login yet; only `LOGIN` (and the heartbeat) do
    /// anything.
    Connected,
    /// Registered in the directory under this name.
    LoggedIn { username: String },
}

struct Session {
    registry: Registry,
    mode: GameMode,
    handle: OutboundHandle,
    state: SessionState,
}

/// Run one connection to completion. Blocks until the peer disconnects,
/// errs, times out, or quits.
pub fn handle_connection(
    stream: TcpStream,
    registry: Registry,
    mode: GameMode,
    idle_timeout: Option<Duration>,
) {
    // The only liveness signal the protocol offers is the client's 5-second
    // heartbeat, so a read timeout doubles as the silent-peer reaper.
    stream.set_read_timeout(idle_timeout).ok();

    let write_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to split connection");
            return;
        }
    };
    let (tx, rx) = mpsc::sync_channel(OUTBOUND_QUEUE_DEPTH);
    let handle = OutboundHandle::new(tx);
    thread::spawn(move || writer_loop(write_stream, rx));

    let mut session = Session {
        registry,
        mode,
        handle,
        state: SessionState::Connected,
    };

    let mut reader = BufReader::new(stream);
    loop {
        let line = match read_line(&mut reader) {
            Ok(line) => line,
            Err(e) => {
                debug!(error = %e, "read loop ended");
                break;
            }
        };
        let msg = match ClientMessage::parse(&line) {
            Ok(msg) => msg,
            Err(e) => {
                // Unknown or malformed input is a no-op, not an error
                // response: old servers must tolerate new clients.
                debug!(error = %e, "ignoring line");
                continue;
            }
        };
        if matches!(msg, ClientMessage::Quit) {
            break;
        }
        session.dispatch(msg);
    }

    session.disconnect(reader.get_ref());
}

impl Session {
    fn dispatch(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::Login { username } => self.handle_login(username),
            ClientMessage::RequestUserList => self.registry.broadcast_user_list(),
            ClientMessage::ChatGlobal { text } => {
                if let Some(sender) = self.username() {
                    self.registry.broadcast(&ServerMessage::ChatGlobalFrom {
                        sender: sender.to_string(),
                        text,
                    });
                }
            }
            ClientMessage::Invite { target } => {
                if let Some(inviter) = self.username()
                    && let Some(handle) = self.registry.lookup(&target)
                {
                    handle.send(&ServerMessage::InviteFrom {
                        inviter: inviter.to_string(),
                    });
                }
            }
            ClientMessage::AcceptInvite { inviter } => self.handle_accept(&inviter),
            ClientMessage::DeclineInvite { inviter } => {
                if let Some(me) = self.username()
                    && let Some(handle) = self.registry.lookup(&inviter)
                {
                    handle.send(&ServerMessage::InviteDeclined {
                        other: me.to_string(),
                    });
                }
            }
            ClientMessage::GameMove { match_id, cell } => self.handle_move(match_id, cell),
            ClientMessage::GameChat { match_id, text } => {
                if let Some(sender) = self.username()
                    && let Some(room) = self.registry.find_match(match_id)
                {
                    room.lock().unwrap().relay_chat(sender, &text);
                }
            }
            ClientMessage::Surrender => self.handle_surrender(),
            ClientMessage::Ping => self.handle.send(&ServerMessage::Pong),
            // Handled by the read loop before dispatch.
            ClientMessage::Quit => {}
        }
    }

    fn username(&self) -> Option<&str> {
        match &self.state {
            SessionState::Connected => None,
            SessionState::LoggedIn { username } => Some(username),
        }
    }

    fn handle_login(&mut self, username: String) {
        if !matches!(self.state, SessionState::Connected) {
            debug!("duplicate LOGIN ignored");
            return;
        }
        match self.registry.register(&username, self.handle.clone()) {
            Ok(()) => {
                self.handle.send(&ServerMessage::LoginOk {
                    username: username.clone(),
                });
                info!(user = %username, "logged in");
                self.state = SessionState::LoggedIn { username };
                self.registry.broadcast_user_list();
            }
            Err(RegistryError::NameTaken) => {
                self.handle.send(&ServerMessage::LoginFail {
                    reason: "Username already used.".to_string(),
                });
            }
        }
    }

    fn handle_accept(&mut self, inviter: &str) {
        let Some(me) = self.username().map(str::to_string) else {
            return;
        };
        // A match needs two distinct participants.
        if inviter == me {
            return;
        }
        // Inviter holds X and moves first; the accepter holds O.
        let Some((_, room)) = self.registry.create_match(inviter, &me, self.mode) else {
            return;
        };
        if let Some(handle) = self.registry.lookup(inviter) {
            handle.send(&ServerMessage::InviteAccepted { other: me });
        }
        self.handle.send(&ServerMessage::InviteAccepted {
            other: inviter.to_string(),
        });
        room.lock().unwrap().start();
    }

    fn handle_move(&mut self, match_id: MatchId, cell: usize) {
        let Some(me) = self.username() else {
            return;
        };
        let Some(room) = self.registry.find_match(match_id) else {
            return;
        };
        let outcome = room.lock().unwrap().apply_move(me, cell);
        if matches!(outcome, MoveOutcome::Won | MoveOutcome::Draw) {
            self.registry.match_concluded(match_id);
        }
    }

    fn handle_surrender(&mut self) {
        let Some(me) = self.username() else {
            return;
        };
        let Some((match_id, room)) = self.registry.find_match_by_participant(me) else {
            return;
        };
        room.lock().unwrap().surrender(me);
        self.registry.remove_match(match_id);
    }

    /// The single disconnect path, run exactly once per connection.
    fn disconnect(&mut self, stream: &TcpStream) {
        if let SessionState::LoggedIn { username } = &self.state {
            info!(user = %username, "disconnected");
            self.registry.unregister(username);
            self.registry.broadcast_user_list();
        }
        self.handle.close();
        // Unblocks the writer thread if it is mid-write on a stalled peer.
        stream.shutdown(Shutdown::Both).ok();
    }
}

/// Drain the outbound queue onto the socket. Exits on `Shutdown`, on a
/// closed queue, or on the first write error (the handler thread notices
/// the dead peer through its own read loop).
fn writer_loop(stream: TcpStream, rx: Receiver<Outbound>) {
    let mut writer = BufWriter::new(stream);
    while let Ok(event) = rx.recv() {
        match event {
            Outbound::Line(line) => {
                if write_line(&mut writer, &line).is_err() {
                    break;
                }
            }
            Outbound::Shutdown => break,
        }
    }
}
