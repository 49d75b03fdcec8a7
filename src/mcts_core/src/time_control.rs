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

//! Time management (§4.7): translates remaining clock/increment into a
//! millisecond search budget. "The exact formula is a design choice of the
//! time manager" per the specification; what the core requires is that the
//! coordinator treats the result as an upper bound, polled every few
//! milliseconds -- enforced by [`Deadline`], not by this module.

use crate::options::SearchLimits;
use std::time::{Duration, Instant};

/// The time manager's own tunables -- not part of `SearchSettings` because
/// they shape *how* a clock budget is derived, not how the tree is
/// searched once a budget is known.
#[derive(Clone, Copy, Debug)]
pub struct TimeManager {
    /// Fallback estimate of moves remaining when `moves_to_go` is absent,
    /// i.e. the `divisor` of §4.7's formula in the common case.
    pub expected_moves: u32,
    /// Fraction of the increment banked into this move's budget.
    pub inc_factor: f32,
}

impl Default for TimeManager {
    fn default() -> Self {
        Self { expected_moves: 30, inc_factor: 0.9 }
    }
}

impl TimeManager {
    /// Computes `movetime_ms = (time - move_overhead) / divisor + inc *
    /// inc_factor` for the side to move (§4.7), given that side's own
    /// `time`/`inc` already picked out of `wtime`/`btime`/`winc`/`binc` by
    /// the caller. An explicit `movetime` in `limits` always wins outright.
    /// Returns `None` when neither is present -- the coordinator then falls
    /// back to its other stop conditions (nodes, depth, external stop).
    pub fn budget_for(&self, limits: &SearchLimits, time_ms: Option<u64>, inc_ms: Option<u64>) -> Option<Duration> {
        if let Some(movetime) = limits.movetime_ms {
            return Some(Duration::from_millis(movetime));
        }

        let time_ms = time_ms?;
        let inc_ms = inc_ms.unwrap_or(0) as f64;
        let divisor = limits.moves_to_go.unwrap_or(self.expected_moves).max(1) as f64;
        let overhead = limits.move_overhead_ms as f64;

        let available = (time_ms as f64 - overhead).max(0.0);
        let budget_ms = (available / divisor + inc_ms * self.inc_factor as f64).max(0.0);

        Some(Duration::from_millis(budget_ms as u64))
    }
}

/// A wall-clock budget checked at least every poll tick by the coordinator
/// (§4.6). `None` means no wall-clock bound applies (node/depth limits or
/// `infinite` govern instead).
pub struct Deadline {
    started_at: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn new(budget: Option<Duration>) -> Self {
        Self { started_at: Instant::now(), budget }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn has_expired(&self) -> bool {
        match self.budget {
            Some(budget) => self.started_at.elapsed() >= budget,
            None => false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_movetime_wins_over_clock() {
        let manager = TimeManager::default();
        let mut limits = SearchLimits::default();
        limits.movetime_ms = Some(500);

        let budget = manager.budget_for(&limits, Some(60_000), Some(1_000)).unwrap();

        assert_eq!(budget, Duration::from_millis(500));
    }

    #[test]
    fn no_clock_information_yields_no_budget() {
        let manager = TimeManager::default();
        let limits = SearchLimits::default();

        assert!(manager.budget_for(&limits, None, None).is_none());
    }

    #[test]
    fn budget_respects_move_overhead() {
        let manager = TimeManager::default();
        let mut limits = SearchLimits::default();
        limits.move_overhead_ms = 100;
        limits.moves_to_go = Some(1);

        let budget = manager.budget_for(&limits, Some(1_100), Some(0)).unwrap();

        assert_eq!(budget, Duration::from_millis(1_000));
    }

    #[test]
    fn deadline_expires_after_its_budget() {
        let deadline = Deadline::new(Some(Duration::from_millis(0)));
        std::thread::sleep(Duration::from_millis(5));

        assert!(deadline.has_expired());
    }

    #[test]
    fn unbounded_deadline_never_expires() {
        assert!(!Deadline::unbounded().has_expired());
    }
}
