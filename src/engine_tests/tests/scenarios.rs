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

//! Black-box scenario tests exercised purely through the public
//! `mcts_core` / `nn` / `position` API, one level up from the white-box
//! unit tests living alongside the code they cover. Mirrors the
//! dg_tests crate's role in the teacher: integration coverage that
//! would otherwise need every crate's internals exposed just for tests.

use mcts_core::{SearchCoordinator, SearchLimits, SearchSettings, StopReason, TimeManager};
use nn::{Evaluator, ScriptedEvaluator};
use position::ChessPosition;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn coordinator_with(settings: SearchSettings, value: f32, policy: Vec<f32>, is_policy_map: bool) -> SearchCoordinator {
    SearchCoordinator::new(settings, TimeManager::default(), move || {
        Box::new(ScriptedEvaluator::new(value, policy.clone(), 8).with_policy_map(is_policy_map)) as Box<dyn Evaluator>
    })
}

fn uniform_coordinator(settings: SearchSettings, num_moves: usize, value: f32) -> SearchCoordinator {
    SearchCoordinator::new(settings, TimeManager::default(), move || {
        Box::new(ScriptedEvaluator::uniform(num_moves, value, 8)) as Box<dyn Evaluator>
    })
}

/// S1: a one-node search from the starting position must stop after
/// exactly one root visit and still produce a move.
#[test]
fn s1_deterministic_one_ply_stops_at_exactly_one_node() {
    let settings = SearchSettings { threads: 1, batch_size: 1, dirichlet_epsilon: 0.0, ..SearchSettings::default() };
    let mut coordinator = uniform_coordinator(settings, 20, 0.0);

    coordinator.set_position(ChessPosition::new_game());
    let report = coordinator
        .search(SearchLimits { nodes: 1, ..SearchLimits::default() }, Arc::new(AtomicBool::new(false)))
        .unwrap()
        .unwrap();

    assert_eq!(report.nodes, 1);
    assert!(report.best_move.is_some());
    assert_eq!(report.stop_reason, StopReason::NodesExhausted);
}

/// S2: a root policy that puts essentially all mass on one move must
/// dominate visits even though every position evaluates to the same
/// value (so nothing but the prior can be driving the choice).
#[test]
fn s2_dominant_prior_captures_almost_all_visits() {
    let num_moves = ChessPosition::new_game().legal_moves().len();
    let mut policy = vec![0.0f32; num_moves];
    policy[0] = 1.0;

    let settings = SearchSettings {
        threads: 1,
        batch_size: 1,
        dirichlet_epsilon: 0.0,
        ..SearchSettings::default()
    };
    let mut coordinator = coordinator_with(settings, 0.0, policy, true);

    coordinator.set_position(ChessPosition::new_game());
    let report = coordinator
        .search(SearchLimits { nodes: 100, ..SearchLimits::default() }, Arc::new(AtomicBool::new(false)))
        .unwrap()
        .unwrap();

    let diagnostics = coordinator.root_child_diagnostics();
    assert_eq!(diagnostics[0].visits as u64, report.nodes - 1, "all but the root visit must land on the dominant move");
    for child in diagnostics.iter().skip(1) {
        assert!(child.visits <= 1, "a move with zero prior mass must not be meaningfully explored");
    }
}

/// S3: from a position one move away from checkmate, the search must
/// find and prefer the mating move.
#[test]
fn s3_terminal_shortcut_finds_the_mate() {
    // White: Kh1, Re1. Black: Kg8, pawns f7/g7/h7 intact. Re1-e8 is a
    // back-rank mate; every other move leaves the position open.
    let fen = "6k1/5ppp/8/8/8/8/8/4R2K w - - 0 1";
    let position = ChessPosition::from_fen(fen).unwrap();
    let num_moves = position.legal_moves().len();

    let settings = SearchSettings { threads: 1, batch_size: 1, dirichlet_epsilon: 0.0, ..SearchSettings::default() };
    let mut coordinator = uniform_coordinator(settings, num_moves, 0.0);

    coordinator.set_position(position);
    let report = coordinator
        .search(SearchLimits { nodes: 800, ..SearchLimits::default() }, Arc::new(AtomicBool::new(false)))
        .unwrap()
        .unwrap();

    let best_move = report.best_move.expect("a legal move must be returned");
    assert_eq!(best_move.from().map(|sq| sq.to_string()), Some("e1".to_string()));
    assert_eq!(best_move.to().to_string(), "e8");
}

/// S5: with a flat prior and a value that never distinguishes any
/// move, many parallel workers must still spread visits roughly evenly
/// across every root child rather than starving some of them.
#[test]
fn s5_parallel_workers_spread_visits_evenly() {
    let num_moves = ChessPosition::new_game().legal_moves().len();
    let settings = SearchSettings { threads: 8, batch_size: 8, dirichlet_epsilon: 0.0, ..SearchSettings::default() };
    let mut coordinator = uniform_coordinator(settings, num_moves, 0.0);

    coordinator.set_position(ChessPosition::new_game());
    let report = coordinator
        .search(SearchLimits { nodes: 8000, ..SearchLimits::default() }, Arc::new(AtomicBool::new(false)))
        .unwrap()
        .unwrap();

    let diagnostics = coordinator.root_child_diagnostics();
    assert_eq!(diagnostics.len(), num_moves, "every legal move must eventually be explored");

    let total_visits: u64 = diagnostics.iter().map(|c| c.visits as u64).sum();
    assert_eq!(total_visits + 1, report.nodes);

    let mean = total_visits as f64 / diagnostics.len() as f64;
    for child in &diagnostics {
        assert!(child.visits > 0, "no legal move should end up completely unexplored");
        let deviation = (child.visits as f64 - mean).abs() / mean;
        assert!(deviation <= 0.25, "visits={} deviates too far from mean={:.1}", child.visits, mean);
    }

    let prior_sum: f32 = diagnostics.iter().map(|c| c.prior).sum();
    assert!((prior_sum - 1.0).abs() < 1e-3, "root priors must still sum to ~1 after Dirichlet mixing, got {prior_sum}");
}

/// S6: an external stop flag raised mid-search must be honored quickly
/// even under an "infinite" time control, exercised only through the
/// public API (the white-box twin of this test lives in mcts_core).
#[test]
fn s6_external_stop_is_honored_promptly() {
    let settings = SearchSettings { threads: 4, batch_size: 4, dirichlet_epsilon: 0.0, ..SearchSettings::default() };
    let mut coordinator = uniform_coordinator(settings, 20, 0.0);

    coordinator.set_position(ChessPosition::new_game());
    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = stop.clone();

    let flipper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        stop_clone.store(true, Ordering::Release);
    });

    let started = Instant::now();
    let report = coordinator.search(SearchLimits { infinite: true, ..SearchLimits::default() }, stop).unwrap().unwrap();
    flipper.join().unwrap();

    assert_eq!(report.stop_reason, StopReason::ExternalStop);
    assert!(started.elapsed() < Duration::from_millis(500), "stop must be noticed within a handful of poll intervals");
}

/// Property 1: total root visits always equal one (the root's own
/// implicit visit) plus the sum of every child's visit count.
#[test]
fn root_visit_count_matches_sum_of_child_visits() {
    let settings = SearchSettings { threads: 2, batch_size: 4, dirichlet_epsilon: 0.25, ..SearchSettings::default() };
    let mut coordinator = uniform_coordinator(settings, 20, 0.0);

    coordinator.set_position(ChessPosition::new_game());
    let report = coordinator
        .search(SearchLimits { nodes: 500, ..SearchLimits::default() }, Arc::new(AtomicBool::new(false)))
        .unwrap()
        .unwrap();

    let sum: u64 = coordinator.root_child_diagnostics().iter().map(|c| c.visits as u64).sum();
    assert_eq!(report.nodes, sum + 1);
}

/// Property 7 (partial): with a single thread, a batch size of one, a
/// fixed evaluator and Dirichlet noise disabled, two otherwise-identical
/// searches from the same position must reach the same move and the
/// same visit distribution. Dirichlet noise itself is not seeded in
/// this engine (plain `thread_rng`), so this only demonstrates
/// reproducibility with it switched off -- see DESIGN.md.
#[test]
fn single_threaded_search_is_reproducible_with_dirichlet_disabled() {
    let settings = SearchSettings { threads: 1, batch_size: 1, dirichlet_epsilon: 0.0, ..SearchSettings::default() };

    let run = |settings: SearchSettings| {
        let mut coordinator = uniform_coordinator(settings, 20, 0.0);
        coordinator.set_position(ChessPosition::new_game());
        let report = coordinator
            .search(SearchLimits { nodes: 300, ..SearchLimits::default() }, Arc::new(AtomicBool::new(false)))
            .unwrap()
            .unwrap();
        let diagnostics = coordinator.root_child_diagnostics();
        (report.best_move, diagnostics.into_iter().map(|c| c.visits).collect::<Vec<_>>())
    };

    let (first_move, first_visits) = run(settings.clone());
    let (second_move, second_visits) = run(settings);

    assert_eq!(first_move.map(|m| m.to_string()), second_move.map(|m| m.to_string()));
    assert_eq!(first_visits, second_visits);
}
