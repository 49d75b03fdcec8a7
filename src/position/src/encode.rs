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

//! The board encoder: a deterministic function from a position to a
//! fixed-size plane tensor (§2, component 3). The exact feature set is
//! explicitly a Non-goal of the specification (the NN architecture is
//! not part of this core); this is a minimal, deterministic encoding
//! good enough to feed a mock or real `Evaluator`.

use crate::{ChessPosition, GamePosition};
use shakmaty::{Board, Color, Piece, Role, Square};

const NUM_PIECE_PLANES: usize = 12; // 6 roles x 2 colors
const NUM_AUX_PLANES: usize = 2; // side to move, rule50 (normalized)
const SQUARES: usize = 64;

/// Number of `f32`s a single encoded position occupies.
pub const PLANE_SIZE: usize = (NUM_PIECE_PLANES + NUM_AUX_PLANES) * SQUARES;

/// Encodes `pos` from the perspective of its side to move into `out`,
/// which must be exactly `PLANE_SIZE` long.
pub fn encode_into(pos: &ChessPosition, out: &mut [f32]) {
    assert_eq!(out.len(), PLANE_SIZE);
    out.iter_mut().for_each(|v| *v = 0.0);

    let board: &Board = pos.inner().board();
    let to_move = pos.side_to_move();

    for square in Square::ALL {
        if let Some(Piece { color, role }) = board.piece_at(square) {
            let plane = piece_plane(role, color, to_move);
            let index = plane * SQUARES + oriented_square_index(square, to_move);

            out[index] = 1.0;
        }
    }

    let side_plane_offset = NUM_PIECE_PLANES * SQUARES;
    let side_value = if to_move == Color::White { 1.0 } else { 0.0 };

    for i in 0..SQUARES {
        out[side_plane_offset + i] = side_value;
    }

    let rule50_plane_offset = (NUM_PIECE_PLANES + 1) * SQUARES;
    let rule50_value = (pos.rule50_counter().min(100) as f32) / 100.0;

    for i in 0..SQUARES {
        out[rule50_plane_offset + i] = rule50_value;
    }
}

/// Plane index for a piece, from the perspective of `to_move` (the
/// side to move's own pieces always occupy planes 0..6).
fn piece_plane(role: Role, color: Color, to_move: Color) -> usize {
    let role_index = match role {
        Role::Pawn => 0,
        Role::Knight => 1,
        Role::Bishop => 2,
        Role::Rook => 3,
        Role::Queen => 4,
        Role::King => 5,
    };
    let color_offset = if color == to_move { 0 } else { 6 };

    role_index + color_offset
}

/// Flips the board vertically when black is to move, so that the
/// encoding is always presented from the mover's point of view.
fn oriented_square_index(square: Square, to_move: Color) -> usize {
    let (file, rank) = (square.file() as usize, square.rank() as usize);
    let rank = if to_move == Color::White { rank } else { 7 - rank };

    rank * 8 + file
}
