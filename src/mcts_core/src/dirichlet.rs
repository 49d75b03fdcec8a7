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

use rand::thread_rng;
use rand_distr::{Dirichlet, Distribution};

/// Mixes Dirichlet exploration noise into the root prior. Only the first
/// `prior.len()` slots are touched; `epsilon` is the noise weight and
/// `alpha` its concentration. Re-sampled once per search, never mutated
/// again within it.
pub fn add(prior: &mut [f32], epsilon: f32, alpha: f32) {
    if prior.is_empty() || epsilon <= 0.0 {
        return;
    }

    let dirichlet = match Dirichlet::new_with_size(alpha, prior.len()) {
        Ok(d) => d,
        Err(_) => return,
    };
    let noise: Vec<f32> = dirichlet.sample(&mut thread_rng());

    for (p, eta) in prior.iter_mut().zip(noise) {
        *p = (1.0 - epsilon) * *p + epsilon * eta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_preserves_normalization() {
        let mut prior = vec![0.25f32; 4];
        add(&mut prior, 0.25, 0.3);

        let sum: f32 = prior.iter().sum();
        assert!((sum - 1.0).abs() < 1e-3, "sum was {}", sum);
    }

    #[test]
    fn zero_epsilon_is_a_no_op() {
        let mut prior = vec![0.1, 0.2, 0.3, 0.4];
        let before = prior.clone();
        add(&mut prior, 0.0, 0.3);

        assert_eq!(prior, before);
    }
}
