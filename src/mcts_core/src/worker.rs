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

//! The search worker: one of `N` parallel agents that repeatedly fills a
//! mini-batch by descending the shared tree, hands any freshly-expanded
//! leaves to its own evaluator, and backs the results up. Driven by a
//! simple `while running && within_limits: iteration()` loop, with each
//! worker talking to the rest of the tree only through shared nodes and
//! atomics rather than a dispatcher or work queue.

use crate::batch::MiniBatch;
use crate::node::{self, Node, ProbeResult};
use crate::options::SearchSettings;
use crate::policy;
use crate::transposition::TranspositionMap;
use nn::Evaluator;
use position::GamePosition;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One parallel search agent. Owns its mini-batch buffer and its own
/// `Evaluator` instance -- one evaluator per worker, never shared.
pub struct SearchWorker {
    root: Arc<Node>,
    settings: SearchSettings,
    transposition_map: Option<Arc<TranspositionMap>>,
    evaluator: Box<dyn Evaluator>,
    running: Arc<AtomicBool>,
    batch: MiniBatch,
}

impl SearchWorker {
    pub fn new(
        root: Arc<Node>,
        settings: SearchSettings,
        transposition_map: Option<Arc<TranspositionMap>>,
        evaluator: Box<dyn Evaluator>,
        running: Arc<AtomicBool>,
    ) -> Self {
        let batch_size = settings.batch_size.min(evaluator.max_batch_size()).max(1);

        Self {
            root,
            settings,
            transposition_map,
            evaluator,
            running,
            batch: MiniBatch::new(batch_size),
        }
    }

    /// `while running && within_limits: iteration()`. The caller (the
    /// coordinator) is the sole owner of what "within limits" means; this
    /// loop only checks the shared stop flag, which the coordinator flips
    /// once a budget is exhausted or `stop` is received.
    pub fn run(mut self) {
        while self.running.load(Ordering::Acquire) {
            self.iteration();
        }
    }

    /// One full cycle: build a mini-batch, evaluate it, back it up.
    fn iteration(&mut self) {
        self.batch.clear();

        while !self.batch.is_full() {
            self.discover_one();

            if !self.running.load(Ordering::Acquire) {
                break;
            }
        }

        if !self.batch.new_nodes.is_empty() {
            match self.evaluator.predict(&self.batch.input_planes, self.batch.new_nodes.len()) {
                Ok(responses) => {
                    for (leaf, response) in self.batch.new_nodes.iter().zip(responses.into_iter()) {
                        let mut stats = leaf.node.stats.lock().expect("stats lock poisoned");
                        let prior = policy::prior_from_response(
                            response.policy(),
                            leaf.node.moves.len(),
                            self.settings.node_policy_temperature,
                            self.evaluator.is_policy_map(),
                        );

                        stats.prior = prior;
                        stats.value = response.value();
                        stats.has_nn_results = true;
                        drop(stats);

                        if let (Some(map), Some(key)) = (&self.transposition_map, leaf.transposition_key) {
                            map.insert(key, leaf.node.stats.clone());
                        }
                    }
                }
                Err(_evaluator_error) => {
                    // NN failure aborts the search. The worker stops
                    // cleanly; in-flight virtual loss on these leaves'
                    // ancestors is left in place rather than guessed at,
                    // since the coordinator is about to join every worker
                    // and read the tree regardless.
                    self.running.store(false, Ordering::Release);
                    return;
                }
            }
        }

        self.backup();
    }

    /// One descent resolving to `Expand`/`Terminal`/`Collision`, routed
    /// into the matching mini-batch vector.
    fn discover_one(&mut self) {
        match node::probe(&self.root, &self.settings, self.settings.max_depth) {
            ProbeResult::Expand(parent, child_idx) => self.handle_expand(parent, child_idx),
            ProbeResult::Terminal(parent, child_idx) => {
                let child = parent.child_at(child_idx).expect("terminal outcome without an attached child");
                self.batch.terminal_nodes.push(child);
            }
            ProbeResult::Collision(parent, child_idx) => {
                self.batch.collision_nodes.push((parent, child_idx));
            }
        }
    }

    /// Clone the position, check the transposition map, and either adopt
    /// an existing candidate's stats or construct a fresh node.
    fn handle_expand(&mut self, parent: Arc<Node>, child_idx: usize) {
        let child_position = parent.position.do_move(&parent.moves[child_idx]);

        if child_position.is_terminal().is_some() {
            let child = Node::new_owned_child(&parent, child_idx);
            parent.attach_child(child_idx, child.clone());
            self.batch.terminal_nodes.push(child);
            return;
        }

        let key = if self.settings.use_transposition_table {
            TranspositionMap::key_for(&child_position)
        } else {
            None
        };

        if let (Some(map), Some(k)) = (&self.transposition_map, key) {
            if let Some(stats) = map.get(&k) {
                let child = Node::new_transposition_child(&parent, child_idx, stats);
                parent.attach_child(child_idx, child.clone());
                self.batch.transposition_nodes.push(child);
                return;
            }
        }

        let child = Node::new_owned_child(&parent, child_idx);
        parent.attach_child(child_idx, child.clone());
        self.batch.push_new(child, key);
    }

    /// Back up every leaf gathered this cycle, then clear the mini-batch
    /// for the next iteration.
    fn backup(&mut self) {
        let virtual_loss = self.settings.virtual_loss;

        for leaf in &self.batch.new_nodes {
            backup_leaf(&leaf.node, virtual_loss);
        }

        for leaf in &self.batch.transposition_nodes {
            backup_leaf(leaf, virtual_loss);
        }

        for leaf in &self.batch.terminal_nodes {
            backup_leaf(leaf, virtual_loss);
        }

        for (parent, child_idx) in &self.batch.collision_nodes {
            parent.backup_collision(*child_idx, virtual_loss);
        }
    }
}

/// Walks `leaf` up to the root, negating the value once per ply. A leaf
/// with no parent is the root itself, which never appears as a
/// discovered leaf (it is always pre-evaluated before workers start), so
/// this is effectively unreachable in practice but harmless if it ever is.
fn backup_leaf(leaf: &Arc<Node>, virtual_loss: i32) {
    if let Some(parent) = leaf.parent() {
        parent.backup_value(leaf.child_idx_in_parent(), -leaf.value(), virtual_loss);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::SearchSettings;
    use nn::RandomEvaluator;
    use position::ChessPosition;

    fn ready_root() -> Arc<Node> {
        let root = Node::new_root(ChessPosition::new_game());
        let mut stats = root.stats.lock().unwrap();
        stats.has_nn_results = true;
        let n = stats.prior.len();
        for p in stats.prior.iter_mut() {
            *p = 1.0 / n as f32;
        }
        drop(stats);
        root
    }

    #[test]
    fn one_iteration_expands_exactly_one_leaf_with_batch_size_one() {
        let root = ready_root();
        let settings = SearchSettings { batch_size: 1, threads: 1, ..SearchSettings::default() };
        let running = Arc::new(AtomicBool::new(true));
        let evaluator = Box::new(RandomEvaluator::new(20, 1));

        let mut worker = SearchWorker::new(root.clone(), settings, None, evaluator, running);
        worker.iteration();

        assert_eq!(root.total_visits(), 2); // 1 (self) + 1 child visit
    }

    fn uci(m: &position::Move) -> String {
        let mut out = format!("{}{}", m.from().expect("non-drop move"), m.to());
        if let Some(role) = m.promotion() {
            out.push(role.char());
        }
        out
    }

    /// Two move orders reaching the identical position (the classic
    /// knight-development transposition, `1.Nf3 Nf6 2.Nc3` vs `1.Nc3 Nc6
    /// 2.Nf3`) must expand to a *shared* `NodeStats` the second time
    /// around, without the evaluator being consulted again -- exercised
    /// directly against `handle_expand` since forcing two independent
    /// trees' PUCT descents to both land on one specific non-root move is
    /// otherwise only probabilistic.
    #[test]
    fn second_transposing_expansion_shares_stats_without_evaluating() {
        use nn::{EvaluatorError, PredictResponse, ScriptedEvaluator};

        struct PanicEvaluator;
        impl nn::Evaluator for PanicEvaluator {
            fn predict(&self, _: &[f32], _: usize) -> Result<Vec<PredictResponse>, EvaluatorError> {
                panic!("evaluator must not be invoked for an already-shared transposition");
            }
            fn is_policy_map(&self) -> bool {
                false
            }
            fn max_batch_size(&self) -> usize {
                8
            }
        }

        let seq_a = ChessPosition::new_game()
            .do_uci_move("g1f3").unwrap()
            .do_uci_move("g8f6").unwrap()
            .do_uci_move("b1c3").unwrap();
        let seq_b = ChessPosition::new_game()
            .do_uci_move("b1c3").unwrap()
            .do_uci_move("b8c6").unwrap()
            .do_uci_move("g1f3").unwrap();

        let root_a = Node::new_root(seq_a);
        let root_b = Node::new_root(seq_b);

        let idx_a = root_a.moves.iter().position(|m| uci(m) == "b8c6").expect("b8c6 is legal");
        let idx_b = root_b.moves.iter().position(|m| uci(m) == "g8f6").expect("g8f6 is legal");

        assert_eq!(
            root_a.position.do_move(&root_a.moves[idx_a]).fen(),
            root_b.position.do_move(&root_b.moves[idx_b]).fen(),
            "the two move orders must transpose into the same position"
        );

        let map = Arc::new(crate::transposition::TranspositionMap::new());
        let settings = SearchSettings::default();
        let running = Arc::new(AtomicBool::new(true));

        let mut worker_a = SearchWorker::new(
            root_a.clone(),
            settings.clone(),
            Some(map.clone()),
            Box::new(ScriptedEvaluator::uniform(30, 0.0, 8)),
            running.clone(),
        );
        worker_a.handle_expand(root_a.clone(), idx_a);
        assert_eq!(worker_a.batch.new_nodes.len(), 1);

        let leaf = &worker_a.batch.new_nodes[0];
        {
            let mut stats = leaf.node.stats.lock().unwrap();
            let n = leaf.node.moves.len();
            stats.prior = vec![1.0 / n as f32; n];
            stats.value = 0.0;
            stats.has_nn_results = true;
        }
        map.insert(leaf.transposition_key.expect("a non-repeated position carries a key"), leaf.node.stats.clone());
        assert_eq!(map.len(), 1);

        let mut worker_b =
            SearchWorker::new(root_b.clone(), settings, Some(map.clone()), Box::new(PanicEvaluator), running);
        worker_b.handle_expand(root_b.clone(), idx_b);

        assert_eq!(worker_b.batch.transposition_nodes.len(), 1, "the second expansion must adopt the shared stats");
        assert!(worker_b.batch.new_nodes.is_empty(), "a transposed leaf must not be queued for (re-)evaluation");
        assert_eq!(map.len(), 1, "no second entry should be inserted for the same position");
    }

    #[test]
    fn repeated_iterations_spread_visits_without_vanishing_virtual_loss() {
        let root = ready_root();
        let settings = SearchSettings { batch_size: 4, threads: 1, ..SearchSettings::default() };
        let running = Arc::new(AtomicBool::new(true));
        let evaluator = Box::new(RandomEvaluator::new(20, 8));

        let mut worker = SearchWorker::new(root.clone(), settings, None, evaluator, running);
        for _ in 0..20 {
            worker.iteration();
        }

        let stats = root.stats.lock().unwrap();
        assert!(stats.virtual_loss.iter().all(|&v| v == 0));
        assert!(stats.visits.iter().sum::<u32>() > 0);
    }
}
