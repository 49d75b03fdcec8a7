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

//! Turning a raw evaluator response into per-child-slot priors (§4.4 step
//! 3). Reuses `engine_utils`'s finite-aware sum/normalize helpers -- the
//! same pair the teacher's own `lib.rs` used to keep `dream-go`'s policy
//! renormalization NaN-free after masking illegal moves.

use engine_utils::{normalize_finite_f32, sum_finite_f32};

/// Produces `num_moves` priors from an evaluator's raw `policy[k]` (§4.4
/// step 3: "apply softmax to policy[k] unless the Evaluator is a direct
/// policy-map, then apply temperature").
///
/// A direct policy-map evaluator's output is already a normalized
/// distribution over its fixed move encoding, so it skips the softmax and
/// goes straight to temperature; a legal-move-indexed evaluator's raw
/// output is logits, so it is exponentiated first. `is_policy_map`
/// evaluators return values indexed by a fixed, game-wide move encoding
/// rather than by this position's own legal-move list; translating that
/// encoding into legal-move order is the game-specific policy-to-move
/// mapping spec.md §1 names as a Non-goal of this core, so this function
/// takes the response's first `num_moves` entries as a stand-in for that
/// mapping (see DESIGN.md for the tradeoff this keeps open for a future
/// game-specific adapter).
pub fn prior_from_response(raw: &[f32], num_moves: usize, temperature: f32, is_policy_map: bool) -> Vec<f32> {
    let mut policy: Vec<f32> = raw.iter().copied().take(num_moves).collect();
    policy.resize(num_moves, 0.0);

    if is_policy_map {
        normalize(&mut policy);
    } else {
        softmax(&mut policy);
    }

    if temperature > 0.0 && (temperature - 1.0).abs() > 1e-6 {
        for p in policy.iter_mut() {
            *p = p.max(0.0).powf(1.0 / temperature);
        }
        normalize(&mut policy);
    }

    policy
}

/// `p_i <- exp(p_i - max) / sum`, the usual numerically-stable softmax.
fn softmax(policy: &mut [f32]) {
    if policy.is_empty() {
        return;
    }

    let max = policy.iter().copied().filter(|v| v.is_finite()).fold(f32::NEG_INFINITY, f32::max);

    for p in policy.iter_mut() {
        *p = if p.is_finite() { (*p - max).exp() } else { 0.0 };
    }

    normalize(policy);
}

fn normalize(policy: &mut [f32]) {
    let sum = sum_finite_f32(policy);

    if sum > 1e-6 {
        normalize_finite_f32(policy, sum);
    } else if !policy.is_empty() {
        let uniform = 1.0 / policy.len() as f32;

        for p in policy.iter_mut() {
            *p = uniform;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominant_prior_survives_normalization() {
        let raw = vec![1.0, 0.0, 0.0, 0.0];
        let prior = prior_from_response(&raw, 4, 1.0, true);

        assert!((prior[0] - 1.0).abs() < 1e-6);
        assert_eq!(prior[1], 0.0);
    }

    #[test]
    fn uniform_input_stays_uniform() {
        let raw = vec![0.25; 4];
        let prior = prior_from_response(&raw, 4, 1.0, true);

        for p in prior {
            assert!((p - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn all_zero_response_falls_back_to_uniform() {
        let raw = vec![0.0; 4];
        let prior = prior_from_response(&raw, 4, 1.0, true);

        for p in prior {
            assert!((p - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn low_temperature_sharpens_the_distribution() {
        let raw = vec![0.7, 0.2, 0.1];
        let sharp = prior_from_response(&raw, 3, 0.1, true);

        assert!(sharp[0] > 0.9);
    }

    #[test]
    fn non_policy_map_logits_go_through_softmax() {
        let raw = vec![0.0, 0.0, 0.0, 0.0];
        let prior = prior_from_response(&raw, 4, 1.0, false);

        for p in prior {
            assert!((p - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn softmax_favors_the_largest_logit() {
        let raw = vec![5.0, 0.0, 0.0];
        let prior = prior_from_response(&raw, 3, 1.0, false);

        assert!(prior[0] > 0.9);
    }
}
