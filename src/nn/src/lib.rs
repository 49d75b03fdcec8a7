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

//! The Evaluator — a batched neural-network predictor mapping encoded
//! boards to `(value, policy)` pairs. The NN architecture itself is out
//! of scope for this crate; it only specifies and mocks the contract
//! `mcts_core` is written against.

mod error;
mod random;
mod scripted;

pub use error::EvaluatorError;
pub use random::RandomEvaluator;
pub use scripted::ScriptedEvaluator;

use position::PLANE_SIZE;

/// One predicted leaf: a scalar value in `[-1, +1]` from the side to
/// move's perspective, and a prior over `policy.len()` move slots.
#[derive(Clone, Debug)]
pub struct PredictResponse {
    value: f32,
    policy: Vec<f32>,
}

impl PredictResponse {
    pub fn new(value: f32, policy: Vec<f32>) -> Self {
        Self { value, policy }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn policy(&self) -> &[f32] {
        &self.policy
    }

    pub fn into_policy(self) -> Vec<f32> {
        self.policy
    }
}

/// A batched NN predictor. Implementations must be safe to share
/// across worker threads — `mcts_core` creates one `Evaluator` per
/// worker in the general case, but tests frequently share a single
/// deterministic instance across all workers.
pub trait Evaluator: Send + Sync {
    /// Runs a forward pass over `batch_size` positions, whose encoded
    /// planes have been concatenated into `input_planes`
    /// (`batch_size * PLANE_SIZE` floats). Returns one response per
    /// position, in input order.
    fn predict(&self, input_planes: &[f32], batch_size: usize) -> Result<Vec<PredictResponse>, EvaluatorError>;

    /// `true` if `policy` in each `PredictResponse` is indexed by a
    /// fixed, game-wide move encoding (a "policy map") rather than by
    /// position within this position's own legal-move list.
    fn is_policy_map(&self) -> bool;

    /// The largest batch size this evaluator can service in one call to
    /// `predict`. The search core never builds a mini-batch larger than
    /// this.
    fn max_batch_size(&self) -> usize;
}

/// Asserts that `input_planes` has the shape `predict` expects.
pub fn assert_input_shape(input_planes: &[f32], batch_size: usize) {
    debug_assert_eq!(
        input_planes.len(),
        batch_size * PLANE_SIZE,
        "expected {} floats ({} positions x {} planes), got {}",
        batch_size * PLANE_SIZE,
        batch_size,
        PLANE_SIZE,
        input_planes.len()
    );
}
