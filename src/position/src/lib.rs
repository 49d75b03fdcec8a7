// Copyright 2019 Karl Sundequist Blomdahl <karl.sundequist.blomdahl@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Position adapter — the opaque handle to a game state that the search
//! core is written against. Everything that knows about chess rules
//! lives in this crate; `mcts_core` only ever calls through the
//! `GamePosition` trait.

mod encode;
mod error;

pub use encode::{encode_into, PLANE_SIZE};
pub use error::PositionError;
pub use shakmaty::Move;

use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{fen::Fen, CastlingMode, Chess, EnPassantMode, Outcome, Position as ShakmatyPosition};
use std::str::FromStr;

/// The side to move, re-exported so that callers do not need to depend
/// on `shakmaty` directly.
pub type Side = shakmaty::Color;

/// The contract the search core requires from a game state. Implemented
/// here by `ChessPosition`; kept as a trait so that `mcts_core` is never
/// compiled against `shakmaty` types directly, only against this
/// interface.
pub trait GamePosition: Clone + Send {
    /// The ordered list of legal moves from this position. Fixed at the
    /// time a `Node` is constructed.
    fn legal_moves(&self) -> Vec<Move>;

    /// Applies `m`, returning the resulting position. `m` must be one of
    /// the moves returned by `legal_moves()`.
    fn do_move(&self, m: &Move) -> Self;

    /// 64-bit Zobrist hash used by the transposition map.
    fn hash(&self) -> u64;

    /// The side to move at this position.
    fn side_to_move(&self) -> Side;

    /// `Some(value)` (from the side-to-move's perspective, in [-1, +1])
    /// if the position is terminal; `None` otherwise.
    fn is_terminal(&self) -> Option<f32>;

    /// Number of plies since the last null move. This engine never
    /// issues a null move during search, so this is simply the number
    /// of plies played since the position this adapter was constructed
    /// from (see `ChessPosition::new_game`).
    fn plies_from_null(&self) -> u32;

    /// The 50-move-rule half-move counter, as tracked by the rules
    /// engine (resets on pawn moves and captures).
    fn rule50_counter(&self) -> u32;

    /// Number of times the current position has previously occurred in
    /// this position's own move history (i.e. within the game/search
    /// line that produced it, not the wider history of the match).
    fn repetition_count(&self) -> u32;

    /// FEN for the current position.
    fn fen(&self) -> String;
}

/// A chess (or chess-variant) position, backed by `shakmaty`.
///
/// Owns the full move history back to the position it was constructed
/// from so that `repetition_count` and `plies_from_null` can be
/// computed without external bookkeeping.
#[derive(Clone, Debug)]
pub struct ChessPosition {
    current: Chess,
    history: Vec<Zobrist64>,
}

/// Formats a move the way the UCI `position ... moves` command expects
/// (e.g. `e2e4`, `e7e8q`), since `shakmaty`'s own `Move` formatting is
/// SAN, not UCI.
fn move_to_uci(m: &Move) -> String {
    let mut out = format!("{}{}", m.from().expect("non-drop move"), m.to());

    if let Some(role) = m.promotion() {
        out.push(role.char());
    }

    out
}

impl ChessPosition {
    /// The standard starting position.
    pub fn new_game() -> Self {
        let current = Chess::default();
        let hash = current.zobrist_hash(EnPassantMode::Legal);

        Self { current, history: vec![hash] }
    }

    /// Parses a FEN string into a position with empty history (the
    /// position adapter has no visibility into moves played before the
    /// FEN was given, per the UCI `position fen <FEN>` contract).
    pub fn from_fen(fen: &str) -> Result<Self, PositionError> {
        let parsed = Fen::from_str(fen).map_err(|_| PositionError::InvalidFen(fen.to_string()))?;
        let current: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|_| PositionError::InvalidFen(fen.to_string()))?;
        let hash = current.zobrist_hash(EnPassantMode::Legal);

        Ok(Self { current, history: vec![hash] })
    }

    /// Parses and applies a UCI move string (e.g. `e2e4`), returning an
    /// error if it is not legal from the current position.
    pub fn do_uci_move(&self, uci: &str) -> Result<Self, PositionError> {
        let legal = self.current.legal_moves();
        let found = legal
            .iter()
            .find(|m| move_to_uci(m) == uci)
            .cloned()
            .ok_or_else(|| PositionError::IllegalMove(uci.to_string()))?;

        Ok(self.do_move(&found))
    }

    pub fn inner(&self) -> &Chess {
        &self.current
    }
}

impl GamePosition for ChessPosition {
    fn legal_moves(&self) -> Vec<Move> {
        self.current.legal_moves().iter().cloned().collect()
    }

    fn do_move(&self, m: &Move) -> Self {
        let mut current = self.current.clone();
        current.play_unchecked(m);

        let hash = current.zobrist_hash(EnPassantMode::Legal);
        let mut history = self.history.clone();
        history.push(hash);

        Self { current, history }
    }

    fn hash(&self) -> u64 {
        self.current.zobrist_hash::<Zobrist64>(EnPassantMode::Legal).0
    }

    fn side_to_move(&self) -> Side {
        self.current.turn()
    }

    fn is_terminal(&self) -> Option<f32> {
        match self.current.outcome() {
            None => None,
            Some(Outcome::Draw) => Some(0.0),
            Some(Outcome::Decisive { winner }) => {
                if winner == self.current.turn() {
                    Some(1.0)
                } else {
                    Some(-1.0)
                }
            }
        }
    }

    fn plies_from_null(&self) -> u32 {
        (self.history.len() as u32).saturating_sub(1)
    }

    fn rule50_counter(&self) -> u32 {
        self.current.halfmove_clock()
    }

    fn repetition_count(&self) -> u32 {
        let current_hash = self.history.last().copied();

        match current_hash {
            None => 0,
            Some(hash) => {
                let zeroing_horizon = self.history.len().saturating_sub(1 + self.rule50_counter() as usize);

                self.history[zeroing_horizon..self.history.len() - 1]
                    .iter()
                    .filter(|&&h| h == hash)
                    .count() as u32
            }
        }
    }

    fn fen(&self) -> String {
        Fen::from_position(self.current.clone(), EnPassantMode::Legal).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_position_has_twenty_moves() {
        let pos = ChessPosition::new_game();

        assert_eq!(pos.legal_moves().len(), 20);
        assert_eq!(pos.side_to_move(), Side::White);
        assert!(pos.is_terminal().is_none());
        assert_eq!(pos.repetition_count(), 0);
    }

    #[test]
    fn fen_round_trips_through_moves() {
        let start = ChessPosition::new_game();
        let after_e4 = start.do_uci_move("e2e4").unwrap();
        let after_e5 = after_e4.do_uci_move("e7e5").unwrap();

        let replayed = ChessPosition::from_fen(&start.fen())
            .unwrap()
            .do_uci_move("e2e4")
            .unwrap()
            .do_uci_move("e7e5")
            .unwrap();

        assert_eq!(after_e5.fen(), replayed.fen());
    }

    #[test]
    fn illegal_move_is_rejected() {
        let pos = ChessPosition::new_game();

        assert!(pos.do_uci_move("e2e5").is_err());
    }

    #[test]
    fn fools_mate_is_terminal() {
        let pos = ChessPosition::new_game()
            .do_uci_move("f2f3").unwrap()
            .do_uci_move("e7e5").unwrap()
            .do_uci_move("g2g4").unwrap()
            .do_uci_move("d8h4").unwrap();

        assert_eq!(pos.is_terminal(), Some(-1.0));
    }

    #[test]
    fn threefold_repetition_is_detected() {
        let mut pos = ChessPosition::new_game();

        for _ in 0..2 {
            pos = pos
                .do_uci_move("g1f3").unwrap()
                .do_uci_move("g8f6").unwrap()
                .do_uci_move("f3g1").unwrap()
                .do_uci_move("f6g8").unwrap();
        }

        assert_eq!(pos.repetition_count(), 2);
    }
}
