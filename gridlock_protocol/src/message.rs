// Protocol messages for client-server communication.
//
// Two enums define the full protocol vocabulary:
// - `ClientMessage`: sent by clients to the match server.
// - `ServerMessage`: sent by the match server to clients.
//
// The wire form of a message is a single newline-terminated UTF-8 line with
// `|`-separated fields (see `framing.rs`): `Display` renders that line
// (without the terminator) and `parse` decodes it. Fields holding a name or
// an id are single tokens; the trailing text field of chat messages is
// opaque and may itself contain `|`, so it is split off with `split_once`
// rather than tokenized.
//
// `parse` rejects unknown commands and missing fields with a typed
// `ParseError`; callers drop such lines silently (forward-compatible no-op
// policy — an old server ignores commands it does not know).

use std::fmt;

use thiserror::Error;

use crate::types::{MatchId, PlayerSymbol};

/// Decode failure for a single wire line.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("missing `{0}` field")]
    MissingField(&'static str),
    #[error("match id is not a number")]
    InvalidMatchId,
    #[error("cell index is not a number")]
    InvalidCell,
    #[error("symbol must be X or O")]
    InvalidSymbol,
    #[error("board snapshot must be 9 cells")]
    InvalidBoard,
    #[error("unknown result kind `{0}`")]
    InvalidOutcome(String),
}

/// Messages sent by a client to the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// Claim a display name (must be the first command on a connection).
    Login { username: String },
    /// Ask the server to re-broadcast the user directory.
    RequestUserList,
    /// Chat to everyone connected.
    ChatGlobal { text: String },
    /// Invite another user to a match.
    Invite { target: String },
    /// Accept a pending invitation from `inviter`.
    AcceptInvite { inviter: String },
    /// Decline a pending invitation from `inviter`.
    DeclineInvite { inviter: String },
    /// Place a mark at `cell` (0..=8, row-major).
    GameMove { match_id: MatchId, cell: usize },
    /// Chat visible only to the two match participants.
    GameChat { match_id: MatchId, text: String },
    /// Forfeit the caller's active match.
    Surrender,
    /// Heartbeat; answered with `PONG`.
    Ping,
    /// Graceful disconnect.
    Quit,
}

/// Messages sent by the server to a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerMessage {
    /// Login accepted under this name.
    LoginOk { username: String },
    /// Login rejected (name in use); the connection stays open.
    LoginFail { reason: String },
    /// Full directory snapshot, comma-joined.
    UserList { users: Vec<String> },
    /// Relayed global chat.
    ChatGlobalFrom { sender: String, text: String },
    /// Incoming match invitation.
    InviteFrom { inviter: String },
    /// The other party accepted the invitation.
    InviteAccepted { other: String },
    /// The other party declined the invitation.
    InviteDeclined { other: String },
    /// Match created; each side receives its own symbol.
    GameStart {
        match_id: MatchId,
        symbol: PlayerSymbol,
        opponent: String,
    },
    /// It is this recipient's move.
    YourTurn { match_id: MatchId },
    /// Authoritative board snapshot: 9 chars of `-`, `X`, `O`.
    BoardUpdate { match_id: MatchId, board: String },
    /// Match concluded.
    GameResult {
        match_id: MatchId,
        outcome: MatchOutcome,
    },
    /// Relayed in-match chat.
    ChatGameFrom { sender: String, text: String },
    /// Heartbeat reply.
    Pong,
}

/// Terminal result of a match. Every win path — line completion or the
/// opponent surrendering — reports the single winner; only the classic rule
/// set can draw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchOutcome {
    Winner(String),
    Draw,
}

/// Split a line into its command token and the remainder after the first
/// `|`, if any.
fn split_command(line: &str) -> (&str, Option<&str>) {
    match line.split_once('|') {
        Some((cmd, rest)) => (cmd, Some(rest)),
        None => (line, None),
    }
}

/// First `|`-token of `rest`, required to be present and non-empty.
/// Surplus fields are ignored, matching the original protocol's tolerance.
fn token<'a>(rest: Option<&'a str>, name: &'static str) -> Result<&'a str, ParseError> {
    rest.and_then(|r| r.split('|').next())
        .filter(|t| !t.is_empty())
        .ok_or(ParseError::MissingField(name))
}

impl ClientMessage {
    /// Decode one wire line (terminator already stripped by the framing
    /// layer).
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        if line.is_empty() {
            return Err(ParseError::Empty);
        }
        let (cmd, rest) = split_command(line);
        match cmd {
            "LOGIN" => Ok(ClientMessage::Login {
                username: token(rest, "username")?.to_string(),
            }),
            "REQ_USER_LIST" => Ok(ClientMessage::RequestUserList),
            "CHAT_GLOBAL" => Ok(ClientMessage::ChatGlobal {
                text: rest.ok_or(ParseError::MissingField("text"))?.to_string(),
            }),
            "INVITE" => Ok(ClientMessage::Invite {
                target: token(rest, "target")?.to_string(),
            }),
            "ACCEPT_INVITE" => Ok(ClientMessage::AcceptInvite {
                inviter: token(rest, "inviter")?.to_string(),
            }),
            "DECLINE_INVITE" => Ok(ClientMessage::DeclineInvite {
                inviter: token(rest, "inviter")?.to_string(),
            }),
            "GAME_MOVE" => {
                let match_id: MatchId = token(rest, "match id")?.parse()?;
                let mut fields = rest.unwrap_or_default().split('|');
                let cell = fields
                    .nth(1)
                    .ok_or(ParseError::MissingField("cell"))?
                    .parse::<usize>()
                    .map_err(|_| ParseError::InvalidCell)?;
                Ok(ClientMessage::GameMove { match_id, cell })
            }
            "GAME_CHAT" => {
                let rest = rest.ok_or(ParseError::MissingField("match id"))?;
                let (id, text) = rest
                    .split_once('|')
                    .ok_or(ParseError::MissingField("text"))?;
                Ok(ClientMessage::GameChat {
                    match_id: id.parse()?,
                    text: text.to_string(),
                })
            }
            "GAME_SURRENDER" => Ok(ClientMessage::Surrender),
            "PING" => Ok(ClientMessage::Ping),
            "QUIT" => Ok(ClientMessage::Quit),
            other => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientMessage::Login { username } => write!(f, "LOGIN|{username}"),
            ClientMessage::RequestUserList => write!(f, "REQ_USER_LIST"),
            ClientMessage::ChatGlobal { text } => write!(f, "CHAT_GLOBAL|{text}"),
            ClientMessage::Invite { target } => write!(f, "INVITE|{target}"),
            ClientMessage::AcceptInvite { inviter } => write!(f, "ACCEPT_INVITE|{inviter}"),
            ClientMessage::DeclineInvite { inviter } => write!(f, "DECLINE_INVITE|{inviter}"),
            ClientMessage::GameMove { match_id, cell } => {
                write!(f, "GAME_MOVE|{match_id}|{cell}")
            }
            ClientMessage::GameChat { match_id, text } => {
                write!(f, "GAME_CHAT|{match_id}|{text}")
            }
            ClientMessage::Surrender => write!(f, "GAME_SURRENDER"),
            ClientMessage::Ping => write!(f, "PING"),
            ClientMessage::Quit => write!(f, "QUIT"),
        }
    }
}

impl ServerMessage {
    /// Decode one wire line (terminator already stripped by the framing
    /// layer).
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        if line.is_empty() {
            return Err(ParseError::Empty);
        }
        let (cmd, rest) = split_command(line);
        match cmd {
            "LOGIN_OK" => Ok(ServerMessage::LoginOk {
                username: token(rest, "username")?.to_string(),
            }),
            "LOGIN_FAIL" => Ok(ServerMessage::LoginFail {
                reason: rest.ok_or(ParseError::MissingField("reason"))?.to_string(),
            }),
            "USER_LIST" => {
                let rest = rest.ok_or(ParseError::MissingField("users"))?;
                let users = if rest.is_empty() {
                    Vec::new()
                } else {
                    rest.split(',').map(str::to_string).collect()
                };
                Ok(ServerMessage::UserList { users })
            }
            "CHAT_GLOBAL_FROM" => {
                let (sender, text) = sender_and_text(rest)?;
                Ok(ServerMessage::ChatGlobalFrom { sender, text })
            }
            "INVITE_FROM" => Ok(ServerMessage::InviteFrom {
                inviter: token(rest, "inviter")?.to_string(),
            }),
            "INVITE_ACCEPTED" => Ok(ServerMessage::InviteAccepted {
                other: token(rest, "other")?.to_string(),
            }),
            "INVITE_DECLINED" => Ok(ServerMessage::InviteDeclined {
                other: token(rest, "other")?.to_string(),
            }),
            "GAME_START" => {
                let rest = rest.ok_or(ParseError::MissingField("match id"))?;
                let mut fields = rest.split('|');
                let match_id: MatchId = fields
                    .next()
                    .ok_or(ParseError::MissingField("match id"))?
                    .parse()?;
                let symbol = fields
                    .next()
                    .and_then(|t| t.strip_prefix("you="))
                    .ok_or(ParseError::MissingField("you="))?
                    .parse::<PlayerSymbol>()?;
                let opponent = fields
                    .next()
                    .and_then(|t| t.strip_prefix("opponent="))
                    .ok_or(ParseError::MissingField("opponent="))?
                    .to_string();
                Ok(ServerMessage::GameStart {
                    match_id,
                    symbol,
                    opponent,
                })
            }
            "YOUR_TURN" => Ok(ServerMessage::YourTurn {
                match_id: token(rest, "match id")?.parse()?,
            }),
            "BOARD_UPDATE" => {
                let rest = rest.ok_or(ParseError::MissingField("match id"))?;
                let (id, board) = rest
                    .split_once('|')
                    .ok_or(ParseError::MissingField("board"))?;
                if board.chars().count() != 9 {
                    return Err(ParseError::InvalidBoard);
                }
                Ok(ServerMessage::BoardUpdate {
                    match_id: id.parse()?,
                    board: board.to_string(),
                })
            }
            "GAME_RESULT" => {
                let rest = rest.ok_or(ParseError::MissingField("match id"))?;
                let mut fields = rest.split('|');
                let match_id: MatchId = fields
                    .next()
                    .ok_or(ParseError::MissingField("match id"))?
                    .parse()?;
                let kind = fields.next().ok_or(ParseError::MissingField("kind"))?;
                let outcome = match kind {
                    "WINNER" => MatchOutcome::Winner(
                        fields
                            .next()
                            .filter(|n| !n.is_empty())
                            .ok_or(ParseError::MissingField("winner"))?
                            .to_string(),
                    ),
                    "DRAW" => MatchOutcome::Draw,
                    other => return Err(ParseError::InvalidOutcome(other.to_string())),
                };
                Ok(ServerMessage::GameResult { match_id, outcome })
            }
            "CHAT_GAME_FROM" => {
                let (sender, text) = sender_and_text(rest)?;
                Ok(ServerMessage::ChatGameFrom { sender, text })
            }
            "PONG" => Ok(ServerMessage::Pong),
            other => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }
}

/// Shared shape of the two chat relays: `sender|text`, text opaque.
fn sender_and_text(rest: Option<&str>) -> Result<(String, String), ParseError> {
    let rest = rest.ok_or(ParseError::MissingField("sender"))?;
    let (sender, text) = rest
        .split_once('|')
        .ok_or(ParseError::MissingField("text"))?;
    Ok((sender.to_string(), text.to_string()))
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::LoginOk { username } => write!(f, "LOGIN_OK|{username}"),
            ServerMessage::LoginFail { reason } => write!(f, "LOGIN_FAIL|{reason}"),
            ServerMessage::UserList { users } => write!(f, "USER_LIST|{}", users.join(",")),
            ServerMessage::ChatGlobalFrom { sender, text } => {
                write!(f, "CHAT_GLOBAL_FROM|{sender}|{text}")
            }
            ServerMessage::InviteFrom { inviter } => write!(f, "INVITE_FROM|{inviter}"),
            ServerMessage::InviteAccepted { other } => write!(f, "INVITE_ACCEPTED|{other}"),
            ServerMessage::InviteDeclined { other } => write!(f, "INVITE_DECLINED|{other}"),
            ServerMessage::GameStart {
                match_id,
                symbol,
                opponent,
            } => write!(f, "GAME_START|{match_id}|you={symbol}|opponent={opponent}"),
            ServerMessage::YourTurn { match_id } => write!(f, "YOUR_TURN|{match_id}"),
            ServerMessage::BoardUpdate { match_id, board } => {
                write!(f, "BOARD_UPDATE|{match_id}|{board}")
            }
            ServerMessage::GameResult { match_id, outcome } => match outcome {
                MatchOutcome::Winner(name) => {
                    write!(f, "GAME_RESULT|{match_id}|WINNER|{name}")
                }
                MatchOutcome::Draw => write!(f, "GAME_RESULT|{match_id}|DRAW|NONE"),
            },
            ServerMessage::ChatGameFrom { sender, text } => {
                write!(f, "CHAT_GAME_FROM|{sender}|{text}")
            }
            ServerMessage::Pong => write!(f, "PONG"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_command_is_typed() {
        assert_eq!(
            ClientMessage::parse("DANCE|now"),
            Err(ParseError::UnknownCommand("DANCE".into()))
        );
    }

    #[test]
    fn empty_line_rejected() {
        assert_eq!(ClientMessage::parse(""), Err(ParseError::Empty));
    }

    #[test]
    fn login_requires_nonempty_name() {
        assert_eq!(
            ClientMessage::parse("LOGIN"),
            Err(ParseError::MissingField("username"))
        );
        assert_eq!(
            ClientMessage::parse("LOGIN|"),
            Err(ParseError::MissingField("username"))
        );
        assert_eq!(
            ClientMessage::parse("LOGIN|alice"),
            Ok(ClientMessage::Login {
                username: "alice".into()
            })
        );
    }

    #[test]
    fn chat_text_keeps_embedded_pipes() {
        assert_eq!(
            ClientMessage::parse("CHAT_GLOBAL|a|b|c"),
            Ok(ClientMessage::ChatGlobal {
                text: "a|b|c".into()
            })
        );
        assert_eq!(
            ClientMessage::parse("GAME_CHAT|7|gg|wp"),
            Ok(ClientMessage::GameChat {
                match_id: MatchId(7),
                text: "gg|wp".into()
            })
        );
    }

    #[test]
    fn game_move_parses_id_and_cell() {
        assert_eq!(
            ClientMessage::parse("GAME_MOVE|3|8"),
            Ok(ClientMessage::GameMove {
                match_id: MatchId(3),
                cell: 8
            })
        );
        assert_eq!(
            ClientMessage::parse("GAME_MOVE|3|center"),
            Err(ParseError::InvalidCell)
        );
        assert_eq!(
            ClientMessage::parse("GAME_MOVE|yesterday|4"),
            Err(ParseError::InvalidMatchId)
        );
        assert_eq!(
            ClientMessage::parse("GAME_MOVE|3"),
            Err(ParseError::MissingField("cell"))
        );
    }

    #[test]
    fn bare_commands_tolerate_surplus_fields() {
        assert_eq!(ClientMessage::parse("PING"), Ok(ClientMessage::Ping));
        assert_eq!(
            ClientMessage::parse("REQ_USER_LIST|whatever"),
            Ok(ClientMessage::RequestUserList)
        );
    }

    #[test]
    fn game_start_wire_shape() {
        let msg = ServerMessage::GameStart {
            match_id: MatchId(12),
            symbol: PlayerSymbol::X,
            opponent: "bob".into(),
        };
        let line = msg.to_string();
        assert_eq!(line, "GAME_START|12|you=X|opponent=bob");
        assert_eq!(ServerMessage::parse(&line), Ok(msg));
    }

    #[test]
    fn game_start_requires_labelled_fields() {
        assert_eq!(
            ServerMessage::parse("GAME_START|12|X|opponent=bob"),
            Err(ParseError::MissingField("you="))
        );
        assert_eq!(
            ServerMessage::parse("GAME_START|12|you=Z|opponent=bob"),
            Err(ParseError::InvalidSymbol)
        );
    }

    #[test]
    fn result_wire_shapes() {
        let win = ServerMessage::GameResult {
            match_id: MatchId(4),
            outcome: MatchOutcome::Winner("alice".into()),
        };
        assert_eq!(win.to_string(), "GAME_RESULT|4|WINNER|alice");
        assert_eq!(ServerMessage::parse("GAME_RESULT|4|WINNER|alice"), Ok(win));

        let draw = ServerMessage::GameResult {
            match_id: MatchId(4),
            outcome: MatchOutcome::Draw,
        };
        assert_eq!(draw.to_string(), "GAME_RESULT|4|DRAW|NONE");
        assert_eq!(ServerMessage::parse("GAME_RESULT|4|DRAW|NONE"), Ok(draw));

        assert_eq!(
            ServerMessage::parse("GAME_RESULT|4|LOSE|bob"),
            Err(ParseError::InvalidOutcome("LOSE".into()))
        );
    }

    #[test]
    fn user_list_splits_on_commas() {
        assert_eq!(
            ServerMessage::parse("USER_LIST|alice,bob"),
            Ok(ServerMessage::UserList {
                users: vec!["alice".into(), "bob".into()]
            })
        );
        // An empty directory is a bare trailing separator.
        assert_eq!(
            ServerMessage::UserList { users: vec![] }.to_string(),
            "USER_LIST|"
        );
        assert_eq!(
            ServerMessage::parse("USER_LIST|"),
            Ok(ServerMessage::UserList { users: vec![] })
        );
    }

    #[test]
    fn board_update_validates_cell_count() {
        assert_eq!(
            ServerMessage::parse("BOARD_UPDATE|2|-XOX-XOO-"),
            Ok(ServerMessage::BoardUpdate {
                match_id: MatchId(2),
                board: "-XOX-XOO-".into()
            })
        );
        assert_eq!(
            ServerMessage::parse("BOARD_UPDATE|2|-XO"),
            Err(ParseError::InvalidBoard)
        );
    }
}
