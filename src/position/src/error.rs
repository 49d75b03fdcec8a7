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

use thiserror::Error;

/// Errors surfaced by the position adapter.
///
/// This mirrors the error taxonomy's `ProtocolError` / `IllegalMove`
/// variants (the search core never sees these — they are caught by the
/// command surface while parsing `position`/`go` commands).
#[derive(Debug, Error)]
pub enum PositionError {
    #[error("could not parse FEN: {0}")]
    InvalidFen(String),

    #[error("move `{0}` is not legal from the current position")]
    IllegalMove(String),

    #[error("could not parse move `{0}`")]
    InvalidMove(String),
}
