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

use nn::EvaluatorError;
use thiserror::Error;

/// The error taxonomy of the search core. `BudgetExhausted` is deliberately
/// absent here — running out of budget is the normal way a search ends and
/// is represented by `StopReason`, not by this enum.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("move {0:?} is not legal from the current position")]
    IllegalMove(String),

    #[error("evaluator unavailable: {0}")]
    EvaluatorUnavailable(#[from] EvaluatorError),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}
