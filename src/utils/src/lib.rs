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

//! Ambient plumbing shared by the `engine` binary and test harnesses:
//! logging setup and a few small numeric helpers. Engine-wide tunables
//! are kept out of this crate entirely — they live as an explicit
//! record in `mcts_core::options` rather than behind a process-wide
//! global, so tests and concurrent searches never fight over shared
//! mutable configuration.

pub mod logging;

/// Sums only the finite elements of `values`, treating `-inf` entries
/// (used to mark illegal policy slots) as zero.
pub fn sum_finite_f32(values: &[f32]) -> f32 {
    values.iter().filter(|v| v.is_finite()).sum()
}

/// Divides every finite element of `values` by `denom` in place,
/// leaving non-finite (masked-out) entries untouched.
pub fn normalize_finite_f32(values: &mut [f32], denom: f32) {
    if denom == 0.0 {
        return;
    }

    for v in values.iter_mut() {
        if v.is_finite() {
            *v /= denom;
        }
    }
}
