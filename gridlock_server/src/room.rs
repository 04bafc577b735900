// Match state for one two-player game.
//
// `GameRoom` is the state machine the connection handlers drive: board, turn
// pointer, status, and — in the bounded-history rule set — the per-player
// move queues that recycle old marks. All mutation happens through methods
// called with the room's own mutex held (the registry hands out
// `Arc<Mutex<GameRoom>>`), so two moves racing on the same match are
// serialized and the loser of the race fails the turn check.
//
// Every notification a room emits goes only to the two handles bound at
// creation, never to the full directory. Writing through a handle never
// blocks and tolerates a vanished recipient, so a room can keep running
// after one player disconnects until somebody surrenders out of it.

use std::collections::VecDeque;
use std::str::FromStr;

use gridlock_protocol::message::{MatchOutcome, ServerMessage};
use gridlock_protocol::types::{MatchId, PlayerSymbol};
use thiserror::Error;
use tracing::{debug, info};

use crate::registry::OutboundHandle;

/// Marks a player may hold at once under the bounded-history rule. The cap
/// is enforced before insertion: the oldest mark is recycled first.
pub const MAX_MARKS_PER_PLAYER: usize = 3;

/// The 8 winning lines: rows, columns, diagonals.
const WIN_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Rule set a match plays under, fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameMode {
    /// Marks stay where placed; a full board with no line is a draw.
    Classic,
    /// Each player holds at most `MAX_MARKS_PER_PLAYER` marks; placing
    /// another recycles that player's oldest. At most 6 of 9 cells are ever
    /// occupied, so this variant cannot draw.
    BoundedHistory,
}

/// Failure to parse a `--mode` value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("unknown game mode (expected `classic` or `eviction`)")]
pub struct UnknownGameMode;

impl FromStr for GameMode {
    type Err = UnknownGameMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classic" => Ok(GameMode::Classic),
            "eviction" => Ok(GameMode::BoundedHistory),
            _ => Err(UnknownGameMode),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomStatus {
    Waiting,
    InProgress,
    Finished,
}

/// What `apply_move` did, so the caller knows whether to release the
/// participants back to the lobby.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Precondition failed; nothing changed, nothing was sent.
    Rejected,
    /// Mark placed, match continues.
    Placed,
    /// Mark placed and it completed a line.
    Won,
    /// Mark placed and filled the board without a line (classic only).
    Draw,
}

/// One two-player match: board, turn pointer, status, rule set.
pub struct GameRoom {
    id: MatchId,
    /// Holds X and always moves first (the inviter).
    player_a: String,
    /// Holds O (the accepter).
    player_b: String,
    handle_a: OutboundHandle,
    handle_b: OutboundHandle,
    mode: GameMode,
    board: [Option<PlayerSymbol>; 9],
    current_turn: String,
    status: RoomStatus,
    winner: Option<String>,
    history_x: VecDeque<usize>,
    history_o: VecDeque<usize>,
}

impl GameRoom {
    pub fn new(
        id: MatchId,
        player_a: &str,
        player_b: &str,
        handle_a: OutboundHandle,
        handle_b: OutboundHandle,
        mode: GameMode,
    ) -> Self {
        Self {
            id,
            player_a: player_a.to_string(),
            player_b: player_b.to_string(),
            handle_a,
            handle_b,
            mode,
            board: [None; 9],
            current_turn: player_a.to_string(),
            status: RoomStatus::Waiting,
            winner: None,
            history_x: VecDeque::new(),
            history_o: VecDeque::new(),
        }
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// Username currently authorized to move.
    pub fn current_turn(&self) -> &str {
        &self.current_turn
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    /// Board snapshot in wire form: 9 chars of `-`, `X`, `O`.
    pub fn board_string(&self) -> String {
        self.board
            .iter()
            .map(|cell| cell.map_or('-', PlayerSymbol::as_char))
            .collect()
    }

    /// Open the match: each side learns its symbol and opponent, X is told
    /// to move, and both get the initial board.
    pub fn start(&mut self) {
        if self.status != RoomStatus::Waiting {
            return;
        }
        self.status = RoomStatus::InProgress;
        self.current_turn = self.player_a.clone();

        self.handle_a.send(&ServerMessage::GameStart {
            match_id: self.id,
            symbol: PlayerSymbol::X,
            opponent: self.player_b.clone(),
        });
        self.handle_b.send(&ServerMessage::GameStart {
            match_id: self.id,
            symbol: PlayerSymbol::O,
            opponent: self.player_a.clone(),
        });
        self.handle_a.send(&ServerMessage::YourTurn { match_id: self.id });
        self.broadcast_board();
        info!(id = %self.id, "match started");
    }

    /// Apply one move. Rejected silently — no response, no state change —
    /// unless the match is in progress, `actor` holds the turn, and `cell`
    /// is an empty on-board cell.
    pub fn apply_move(&mut self, actor: &str, cell: usize) -> MoveOutcome {
        if self.status != RoomStatus::InProgress
            || actor != self.current_turn
            || cell > 8
            || self.board[cell].is_some()
        {
            debug!(id = %self.id, actor, cell, "move rejected");
            return MoveOutcome::Rejected;
        }

        let symbol = self.symbol_of(actor);
        if self.mode == GameMode::BoundedHistory {
            let history = match symbol {
                PlayerSymbol::X => &mut self.history_x,
                PlayerSymbol::O => &mut self.history_o,
            };
            let evicted = if history.len() == MAX_MARKS_PER_PLAYER {
                history.pop_front()
            } else {
                None
            };
            history.push_back(cell);
            // The vacated cell is cleared before the new mark lands.
            if let Some(oldest) = evicted {
                self.board[oldest] = None;
            }
        }
        self.board[cell] = Some(symbol);
        self.broadcast_board();

        // Only the mover's symbol can have completed a line.
        if self.line_completed(symbol) {
            self.status = RoomStatus::Finished;
            self.winner = Some(actor.to_string());
            self.broadcast(&ServerMessage::GameResult {
                match_id: self.id,
                outcome: MatchOutcome::Winner(actor.to_string()),
            });
            info!(id = %self.id, winner = actor, "match won");
            return MoveOutcome::Won;
        }

        if self.mode == GameMode::Classic && self.board.iter().all(Option::is_some) {
            self.status = RoomStatus::Finished;
            self.broadcast(&ServerMessage::GameResult {
                match_id: self.id,
                outcome: MatchOutcome::Draw,
            });
            info!(id = %self.id, "match drawn");
            return MoveOutcome::Draw;
        }

        self.current_turn = self.opponent_of(actor).to_string();
        self.handle_of(&self.current_turn)
            .send(&ServerMessage::YourTurn { match_id: self.id });
        MoveOutcome::Placed
    }

    /// Forfeit: the opponent wins immediately, whoever's turn it was.
    pub fn surrender(&mut self, actor: &str) {
        if self.status == RoomStatus::Finished {
            return;
        }
        let opponent = self.opponent_of(actor).to_string();
        self.status = RoomStatus::Finished;
        self.winner = Some(opponent.clone());
        self.broadcast(&ServerMessage::GameResult {
            match_id: self.id,
            outcome: MatchOutcome::Winner(opponent),
        });
        info!(id = %self.id, loser = actor, "match surrendered");
    }

    /// Relay in-match chat to both participants only.
    pub fn relay_chat(&self, sender: &str, text: &str) {
        self.broadcast(&ServerMessage::ChatGameFrom {
            sender: sender.to_string(),
            text: text.to_string(),
        });
    }

    fn symbol_of(&self, actor: &str) -> PlayerSymbol {
        if actor == self.player_a {
            PlayerSymbol::X
        } else {
            PlayerSymbol::O
        }
    }

    fn opponent_of(&self, actor: &str) -> &str {
        if actor == self.player_a {
            &self.player_b
        } else {
            &self.player_a
        }
    }

    fn handle_of(&self, player: &str) -> &OutboundHandle {
        if player == self.player_a {
            &self.handle_a
        } else {
            &self.handle_b
        }
    }

    fn line_completed(&self, symbol: PlayerSymbol) -> bool {
        WIN_LINES
            .iter()
            .any(|line| line.iter().all(|&i| self.board[i] == Some(symbol)))
    }

    fn broadcast_board(&self) {
        self.broadcast(&ServerMessage::BoardUpdate {
            match_id: self.id,
            board: self.board_string(),
        });
    }

    fn broadcast(&self, msg: &ServerMessage) {
        self.handle_a.send(msg);
        self.handle_b.send(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Outbound;
    use crate::registry::test_support::{drain_lines, test_handle};
    use std::sync::mpsc::Receiver;

    fn room(mode: GameMode) -> (GameRoom, Receiver<Outbound>, Receiver<Outbound>) {
        let (ha, rx_a) = test_handle();
        let (hb, rx_b) = test_handle();
        let room = GameRoom::new(MatchId(1), "alice", "bob", ha, hb, mode);
        (room, rx_a, rx_b)
    }

    fn started(mode: GameMode) -> (GameRoom, Receiver<Outbound>, Receiver<Outbound>) {
        let (mut room, rx_a, rx_b) = room(mode);
        room.start();
        drain_lines(&rx_a);
        drain_lines(&rx_b);
        (room, rx_a, rx_b)
    }

    #[test]
    fn start_notifies_symbols_turn_and_board() {
        let (mut room, rx_a, rx_b) = room(GameMode::BoundedHistory);
        room.start();

        assert_eq!(
            drain_lines(&rx_a),
            vec![
                "GAME_START|1|you=X|opponent=bob".to_string(),
                "YOUR_TURN|1".to_string(),
                "BOARD_UPDATE|1|---------".to_string(),
            ]
        );
        // O gets no turn notice at start.
        assert_eq!(
            drain_lines(&rx_b),
            vec![
                "GAME_START|1|you=O|opponent=alice".to_string(),
                "BOARD_UPDATE|1|---------".to_string(),
            ]
        );
        assert_eq!(room.status(), RoomStatus::InProgress);
        assert_eq!(room.current_turn(), "alice");
    }

    #[test]
    fn start_is_one_shot() {
        let (mut room, rx_a, _rx_b) = started(GameMode::BoundedHistory);
        room.start();
        assert!(drain_lines(&rx_a).is_empty());
    }

    #[test]
    fn moves_rejected_before_start() {
        let (mut room, rx_a, _rx_b) = room(GameMode::BoundedHistory);
        assert_eq!(room.apply_move("alice", 0), MoveOutcome::Rejected);
        assert!(drain_lines(&rx_a).is_empty());
    }

    #[test]
    fn accepted_move_alternates_turn_and_notifies() {
        let (mut room, rx_a, rx_b) = started(GameMode::BoundedHistory);

        assert_eq!(room.apply_move("alice", 4), MoveOutcome::Placed);
        assert_eq!(room.current_turn(), "bob");
        assert_eq!(
            drain_lines(&rx_a),
            vec!["BOARD_UPDATE|1|----X----".to_string()]
        );
        assert_eq!(
            drain_lines(&rx_b),
            vec![
                "BOARD_UPDATE|1|----X----".to_string(),
                "YOUR_TURN|1".to_string(),
            ]
        );
    }

    #[test]
    fn rejected_moves_change_nothing() {
        let (mut room, rx_a, rx_b) = started(GameMode::BoundedHistory);
        room.apply_move("alice", 4);
        drain_lines(&rx_a);
        drain_lines(&rx_b);

        // Out of turn.
        assert_eq!(room.apply_move("alice", 0), MoveOutcome::Rejected);
        // Occupied cell.
        assert_eq!(room.apply_move("bob", 4), MoveOutcome::Rejected);
        // Out of range.
        assert_eq!(room.apply_move("bob", 9), MoveOutcome::Rejected);
        // Not a participant, so never the turn holder.
        assert_eq!(room.apply_move("mallory", 0), MoveOutcome::Rejected);

        assert_eq!(room.current_turn(), "bob");
        assert_eq!(room.board_string(), "----X----");
        assert!(drain_lines(&rx_a).is_empty());
        assert!(drain_lines(&rx_b).is_empty());
    }

    #[test]
    fn row_win_reports_mover_and_finishes() {
        let (mut room, rx_a, rx_b) = started(GameMode::BoundedHistory);
        room.apply_move("alice", 0);
        room.apply_move("bob", 3);
        room.apply_move("alice", 1);
        room.apply_move("bob", 4);
        drain_lines(&rx_a);
        drain_lines(&rx_b);

        assert_eq!(room.apply_move("alice", 2), MoveOutcome::Won);
        assert_eq!(room.status(), RoomStatus::Finished);
        assert_eq!(room.winner(), Some("alice"));

        // Board first, then the single result line; no turn switch.
        assert_eq!(
            drain_lines(&rx_a),
            vec![
                "BOARD_UPDATE|1|XXXOO----".to_string(),
                "GAME_RESULT|1|WINNER|alice".to_string(),
            ]
        );
        assert_eq!(
            drain_lines(&rx_b),
            vec![
                "BOARD_UPDATE|1|XXXOO----".to_string(),
                "GAME_RESULT|1|WINNER|alice".to_string(),
            ]
        );

        // Finished match accepts no further moves.
        assert_eq!(room.apply_move("bob", 8), MoveOutcome::Rejected);
    }

    #[test]
    fn column_and_diagonal_wins_detected() {
        // Column {0,3,6} for X.
        let (mut room, _rx_a, _rx_b) = started(GameMode::BoundedHistory);
        room.apply_move("alice", 0);
        room.apply_move("bob", 1);
        room.apply_move("alice", 3);
        room.apply_move("bob", 2);
        assert_eq!(room.apply_move("alice", 6), MoveOutcome::Won);

        // Diagonal {2,4,6} for O.
        let (mut room, _rx_a, _rx_b) = started(GameMode::BoundedHistory);
        room.apply_move("alice", 0);
        room.apply_move("bob", 2);
        room.apply_move("alice", 1);
        room.apply_move("bob", 4);
        room.apply_move("alice", 5);
        assert_eq!(room.apply_move("bob", 6), MoveOutcome::Won);
        assert_eq!(room.winner(), Some("bob"));
    }

    #[test]
    fn fourth_mark_recycles_oldest() {
        let (mut room, rx_a, _rx_b) = started(GameMode::BoundedHistory);
        // X occupies 0, 1, 3 (no line); O occupies 6, 7, 2 (no line).
        room.apply_move("alice", 0);
        room.apply_move("bob", 6);
        room.apply_move("alice", 1);
        room.apply_move("bob", 7);
        room.apply_move("alice", 3);
        room.apply_move("bob", 2);
        drain_lines(&rx_a);

        // Alice's 4th mark: cell 0 is vacated before 5 is marked.
        assert_eq!(room.apply_move("alice", 5), MoveOutcome::Placed);
        assert_eq!(room.board_string(), "-XOX-XOO-");
        assert_eq!(
            drain_lines(&rx_a),
            vec!["BOARD_UPDATE|1|-XOX-XOO-".to_string()]
        );
        assert_eq!(room.status(), RoomStatus::InProgress);
    }

    #[test]
    fn occupancy_never_exceeds_cap() {
        let (mut room, _rx_a, _rx_b) = started(GameMode::BoundedHistory);
        let alice_moves = [0, 1, 3, 5, 7];
        let bob_moves = [6, 2, 8, 0, 6];
        for (&a, &b) in alice_moves.iter().zip(&bob_moves) {
            assert_eq!(room.apply_move("alice", a), MoveOutcome::Placed);
            assert_eq!(room.apply_move("bob", b), MoveOutcome::Placed);
            let board = room.board_string();
            assert!(board.chars().filter(|&c| c == 'X').count() <= MAX_MARKS_PER_PLAYER);
            assert!(board.chars().filter(|&c| c == 'O').count() <= MAX_MARKS_PER_PLAYER);
        }
        // Ten accepted moves in, nobody has won and nothing has drawn.
        assert_eq!(room.status(), RoomStatus::InProgress);
    }

    #[test]
    fn classic_full_board_draws() {
        let (mut room, rx_a, _rx_b) = started(GameMode::Classic);
        // X: 0 2 3 7 8, O: 1 4 5 6 — no line for either side.
        room.apply_move("alice", 0);
        room.apply_move("bob", 1);
        room.apply_move("alice", 2);
        room.apply_move("bob", 4);
        room.apply_move("alice", 3);
        room.apply_move("bob", 5);
        room.apply_move("alice", 7);
        room.apply_move("bob", 6);
        drain_lines(&rx_a);

        assert_eq!(room.apply_move("alice", 8), MoveOutcome::Draw);
        assert_eq!(room.status(), RoomStatus::Finished);
        assert_eq!(room.winner(), None);
        assert_eq!(
            drain_lines(&rx_a),
            vec![
                "BOARD_UPDATE|1|XOXXOOOXX".to_string(),
                "GAME_RESULT|1|DRAW|NONE".to_string(),
            ]
        );
    }

    #[test]
    fn classic_keeps_all_marks() {
        let (mut room, _rx_a, _rx_b) = started(GameMode::Classic);
        room.apply_move("alice", 0);
        room.apply_move("bob", 6);
        room.apply_move("alice", 1);
        room.apply_move("bob", 7);
        room.apply_move("alice", 3);
        room.apply_move("bob", 2);
        room.apply_move("alice", 5);
        // Four X marks on the board: nothing was recycled.
        assert_eq!(room.board_string(), "XXOX-XOO-");
    }

    #[test]
    fn surrender_awards_opponent_regardless_of_turn() {
        let (mut room, rx_a, rx_b) = started(GameMode::BoundedHistory);
        // It is Alice's turn, and Alice surrenders.
        room.surrender("alice");

        assert_eq!(room.status(), RoomStatus::Finished);
        assert_eq!(room.winner(), Some("bob"));
        assert_eq!(
            drain_lines(&rx_a),
            vec!["GAME_RESULT|1|WINNER|bob".to_string()]
        );
        assert_eq!(
            drain_lines(&rx_b),
            vec!["GAME_RESULT|1|WINNER|bob".to_string()]
        );

        // A second surrender on the finished match is a no-op.
        room.surrender("bob");
        assert!(drain_lines(&rx_a).is_empty());
        assert_eq!(room.winner(), Some("bob"));
    }

    #[test]
    fn chat_relays_to_both_participants() {
        let (room, rx_a, rx_b) = started(GameMode::BoundedHistory);
        room.relay_chat("bob", "good luck");
        let expected = vec!["CHAT_GAME_FROM|bob|good luck".to_string()];
        assert_eq!(drain_lines(&rx_a), expected);
        assert_eq!(drain_lines(&rx_b), expected);
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("classic".parse(), Ok(GameMode::Classic));
        assert_eq!("eviction".parse(), Ok(GameMode::BoundedHistory));
        assert_eq!("golf".parse::<GameMode>(), Err(UnknownGameMode));
    }
}
