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

use crate::{assert_input_shape, EvaluatorError, Evaluator, PredictResponse};
use position::PLANE_SIZE;

/// An `Evaluator` that ignores its input and returns a uniform policy
/// and a fixed value, exercised by scenario S1/S5/S6 and used as a
/// harmless stand-in when no real network is loaded yet. Mirrors the
/// teacher's `RandomPredictor` used in its own lib.rs tests.
#[derive(Clone)]
pub struct RandomEvaluator {
    num_moves: usize,
    max_batch_size: usize,
    value: f32,
}

impl RandomEvaluator {
    pub fn new(num_moves: usize, max_batch_size: usize) -> Self {
        Self { num_moves, max_batch_size, value: 0.0 }
    }
}

impl Default for RandomEvaluator {
    fn default() -> Self {
        Self::new(256, 16)
    }
}

impl Evaluator for RandomEvaluator {
    fn predict(&self, input_planes: &[f32], batch_size: usize) -> Result<Vec<PredictResponse>, EvaluatorError> {
        assert_input_shape(input_planes, batch_size);

        let uniform = 1.0 / (self.num_moves.max(1) as f32);

        Ok((0..batch_size)
            .map(|_| PredictResponse::new(self.value, vec![uniform; self.num_moves]))
            .collect())
    }

    fn is_policy_map(&self) -> bool {
        false
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_sums_to_one() {
        let evaluator = RandomEvaluator::new(20, 8);
        let input = vec![0.0f32; PLANE_SIZE * 3];
        let responses = evaluator.predict(&input, 3).unwrap();

        for response in responses {
            let sum: f32 = response.policy().iter().sum();
            assert!((sum - 1.0).abs() < 1e-4);
        }
    }
}
