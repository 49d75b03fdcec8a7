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
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A deterministic evaluator that always returns the same `(value,
/// policy)` pair, used to drive the literal scenarios in the
/// specification (S1-S6) where the test needs full control over what
/// the network "believes" about every position. Counts how many
/// positions it has been asked to evaluate, so tests can assert on
/// evaluator call volume (scenario S4, transposition sharing).
pub struct ScriptedEvaluator {
    value: f32,
    policy: Vec<f32>,
    max_batch_size: usize,
    is_policy_map: bool,
    calls: AtomicUsize,
    fail_after: Option<usize>,
    failed: Mutex<bool>,
}

impl ScriptedEvaluator {
    pub fn new(value: f32, policy: Vec<f32>, max_batch_size: usize) -> Self {
        Self {
            value,
            policy,
            max_batch_size,
            is_policy_map: false,
            calls: AtomicUsize::new(0),
            fail_after: None,
            failed: Mutex::new(false),
        }
    }

    pub fn uniform(num_moves: usize, value: f32, max_batch_size: usize) -> Self {
        Self::new(value, vec![1.0 / (num_moves.max(1) as f32); num_moves], max_batch_size)
    }

    /// After `n` total predicted positions, every subsequent call fails
    /// with `EvaluatorError::DeviceFailed`, simulating a device failure
    /// mid-search.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn with_policy_map(mut self, is_policy_map: bool) -> Self {
        self.is_policy_map = is_policy_map;
        self
    }

    /// Total number of individual positions evaluated so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Evaluator for ScriptedEvaluator {
    fn predict(&self, input_planes: &[f32], batch_size: usize) -> Result<Vec<PredictResponse>, EvaluatorError> {
        assert_input_shape(input_planes, batch_size);

        let before = self.calls.fetch_add(batch_size, Ordering::SeqCst);

        if let Some(limit) = self.fail_after {
            if before + batch_size > limit {
                *self.failed.lock().unwrap() = true;
                return Err(EvaluatorError::DeviceFailed("scripted failure threshold reached".into()));
            }
        }

        Ok((0..batch_size)
            .map(|_| PredictResponse::new(self.value, self.policy.clone()))
            .collect())
    }

    fn is_policy_map(&self) -> bool {
        self.is_policy_map
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
