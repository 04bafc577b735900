// Core ID types for the match server protocol.
//
// These are lightweight newtypes used by both `message.rs` (protocol
// messages) and the server's registry/room state. Match ids are assigned
// from a monotonic counter on the server — compact integers on the wire,
// never wall-clock timestamps, so concurrently created matches can never
// collide.

use std::fmt;
use std::str::FromStr;

use crate::message::ParseError;

/// Server-assigned match ID (monotonic counter, rendered as a bare number).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MatchId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(MatchId)
            .map_err(|_| ParseError::InvalidMatchId)
    }
}

/// Mark held by one side of a match. The inviter always holds `X` and moves
/// first; the accepter holds `O`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlayerSymbol {
    X,
    O,
}

impl PlayerSymbol {
    /// Wire character for this symbol (board cells use `-` when empty).
    pub fn as_char(self) -> char {
        match self {
            PlayerSymbol::X => 'X',
            PlayerSymbol::O => 'O',
        }
    }

    /// The opposing symbol.
    pub fn other(self) -> PlayerSymbol {
        match self {
            PlayerSymbol::X => PlayerSymbol::O,
            PlayerSymbol::O => PlayerSymbol::X,
        }
    }
}

impl fmt::Display for PlayerSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for PlayerSymbol {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "X" => Ok(PlayerSymbol::X),
            "O" => Ok(PlayerSymbol::O),
            _ => Err(ParseError::InvalidSymbol),
        }
    }
}
