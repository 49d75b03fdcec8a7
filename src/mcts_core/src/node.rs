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

//! The search tree. A tree-structural [`Node`] owns its children and a
//! non-owning [`Weak`] back-reference to its parent, so the tree can
//! never form a reference cycle; the four child-slot arrays that can be
//! shared across a transposition (`prior`, `visits`, `action_value`,
//! `virtual_loss`) plus the node's own NN value live in a separate,
//! reference-counted [`NodeStats`] block. Two transposing `Node`s point
//! at the same `NodeStats` but keep independent `children`/
//! `no_visit_idx`: only the essentials are shared, not the subtree
//! below them.

use position::{ChessPosition, GamePosition, Move, Side};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// The four child-slot arrays plus the node's own leaf value, shared by
/// reference across every tree occurrence of one transposed position.
pub struct NodeStats {
    /// Neural policy prior per child slot; sums to ~1 once `has_nn_results`.
    pub prior: Vec<f32>,
    /// Visit count per child slot.
    pub visits: Vec<u32>,
    /// Running mean action-value per child slot, from this node's
    /// perspective.
    pub action_value: Vec<f32>,
    /// In-flight traversal count per child slot.
    pub virtual_loss: Vec<i32>,
    /// Leaf value from `side_to_move`'s perspective, filled in by the NN.
    pub value: f32,
    /// Whether `value`/`prior` have been filled in by the evaluator.
    pub has_nn_results: bool,
}

impl NodeStats {
    pub(crate) fn new(num_moves: usize) -> Self {
        Self {
            prior: vec![0.0; num_moves],
            visits: vec![0; num_moves],
            action_value: vec![0.0; num_moves],
            virtual_loss: vec![0; num_moves],
            value: 0.0,
            has_nn_results: false,
        }
    }

    pub(crate) fn terminal(value: f32) -> Self {
        Self {
            prior: Vec::new(),
            visits: Vec::new(),
            action_value: Vec::new(),
            virtual_loss: Vec::new(),
            value,
            has_nn_results: true,
        }
    }

    /// Sum of per-child visits, plus one for the NN evaluation of this node
    /// itself (invariant 1). Terminal nodes report a single visit once
    /// reached at all, via the caller tracking that separately -- this
    /// count only concerns interior nodes with a move list.
    pub fn total_visits(&self) -> u64 {
        1 + self.visits.iter().map(|&v| v as u64).sum::<u64>()
    }
}

/// One vertex of the search tree.
pub struct Node {
    /// Owned snapshot of the game state at this node.
    pub position: ChessPosition,
    pub side_to_move: Side,
    /// Ordered legal moves, fixed at construction.
    pub moves: Vec<Move>,
    pub plies_from_null: u32,
    pub rule50: u32,
    pub is_terminal: bool,

    parent: Option<Weak<Node>>,
    child_idx_in_parent: usize,

    /// First child slot that is not yet expanded or reserved. Starts at
    /// `min(1, moves.len())` so the first candidate is immediately
    /// selectable, then widens by one slot per resolved expansion or
    /// transposition share -- a progressive reveal that keeps two
    /// workers from ever racing to expand the same still-null slot.
    /// Atomic so siblings remain selectable while one slot is pending.
    no_visit_idx: AtomicUsize,
    /// Structural children, aligned with `moves`. Holds the node's own
    /// lock -- acquired only during child selection and the virtual-loss
    /// increment that follows it.
    children: Mutex<Vec<Option<Arc<Node>>>>,

    pub stats: Arc<Mutex<NodeStats>>,
}

/// The outcome of one descent, returned by [`probe`].
pub enum ProbeResult {
    /// `(parent, child_idx)`: the slot is empty and must be expanded.
    Expand(Arc<Node>, usize),
    /// `(parent, child_idx)`: the child at this slot is already terminal.
    Terminal(Arc<Node>, usize),
    /// `(parent, child_idx)`: the child is mid-flight, not yet evaluated,
    /// or the descent reached the configured depth bound while trying to
    /// continue past it.
    Collision(Arc<Node>, usize),
}

impl Node {
    /// Builds a fresh root node. The caller supplies the NN's `(value,
    /// prior)` for `position` once it has a forward pass in hand; until
    /// then `has_nn_results` is false and the root cannot be selected into.
    pub fn new_root(position: ChessPosition) -> Arc<Self> {
        Self::new_child(position, None, 0)
    }

    fn new_child(position: ChessPosition, parent: Option<Weak<Node>>, child_idx_in_parent: usize) -> Arc<Self> {
        let side_to_move = position.side_to_move();
        let terminal_value = position.is_terminal();
        let moves = if terminal_value.is_some() {
            Vec::new()
        } else {
            position.legal_moves()
        };
        let is_terminal = terminal_value.is_some();
        let plies_from_null = position.plies_from_null();
        let rule50 = position.rule50_counter();
        let num_moves = moves.len();

        let stats = if let Some(value) = terminal_value {
            Arc::new(Mutex::new(NodeStats::terminal(value)))
        } else {
            Arc::new(Mutex::new(NodeStats::new(num_moves)))
        };

        Arc::new(Self {
            position,
            side_to_move,
            moves,
            plies_from_null,
            rule50,
            is_terminal,
            parent,
            child_idx_in_parent,
            no_visit_idx: AtomicUsize::new(num_moves.min(1)),
            children: Mutex::new((0..num_moves).map(|_| None).collect()),
            stats,
        })
    }

    /// Builds a new, freshly-expanded child at `moves[child_idx]` of
    /// `parent`, owning its own `position'`.
    pub fn new_owned_child(parent: &Arc<Node>, child_idx: usize) -> Arc<Self> {
        let position = parent.position.do_move(&parent.moves[child_idx]);
        Self::new_child(position, Some(Arc::downgrade(parent)), child_idx)
    }

    /// Builds a child that shares `stats` with a transposing node already
    /// in the table. `moves` is recomputed locally since the position is
    /// recomputed locally too -- cheap, and avoids needing the
    /// transposition's own `moves` vector to outlive this call.
    pub fn new_transposition_child(parent: &Arc<Node>, child_idx: usize, stats: Arc<Mutex<NodeStats>>) -> Arc<Self> {
        let position = parent.position.do_move(&parent.moves[child_idx]);
        let side_to_move = position.side_to_move();
        let moves = if position.is_terminal().is_some() {
            Vec::new()
        } else {
            position.legal_moves()
        };
        let is_terminal = position.is_terminal().is_some();
        let plies_from_null = position.plies_from_null();
        let rule50 = position.rule50_counter();
        let num_moves = moves.len();

        Arc::new(Self {
            position,
            side_to_move,
            moves,
            plies_from_null,
            rule50,
            is_terminal,
            parent: Some(Arc::downgrade(parent)),
            child_idx_in_parent: child_idx,
            no_visit_idx: AtomicUsize::new(num_moves.min(1)),
            children: Mutex::new((0..num_moves).map(|_| None).collect()),
            stats,
        })
    }

    pub fn parent(&self) -> Option<Arc<Node>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn child_idx_in_parent(&self) -> usize {
        self.child_idx_in_parent
    }

    pub fn has_nn_results(&self) -> bool {
        self.stats.lock().expect("stats lock poisoned").has_nn_results
    }

    pub fn value(&self) -> f32 {
        self.stats.lock().expect("stats lock poisoned").value
    }

    /// Total visits observed at this node, for invariant 1 / stopping
    /// conditions.
    pub fn total_visits(&self) -> u64 {
        if self.is_terminal {
            self.stats.lock().expect("stats lock poisoned").has_nn_results as u64
        } else {
            self.stats.lock().expect("stats lock poisoned").total_visits()
        }
    }

    /// Visit count of child `i`, for final move selection and reporting.
    pub fn child_visits(&self, i: usize) -> u32 {
        self.stats.lock().expect("stats lock poisoned").visits[i]
    }

    pub fn child_action_value(&self, i: usize) -> f32 {
        self.stats.lock().expect("stats lock poisoned").action_value[i]
    }

    /// Returns the currently-attached child at slot `i`, if any.
    pub fn child_at(&self, i: usize) -> Option<Arc<Node>> {
        self.children.lock().expect("children lock poisoned")[i].clone()
    }

    /// Selects a child slot to descend into by PUCT, applies the
    /// virtual-loss increment to it, and attaches `child` if the slot was
    /// empty. Returns `(child_idx, existing_child)`. Holds this node's own
    /// lock for the duration -- the only lock this node ever grants, and
    /// only for exactly the selection + virtual-loss step. Dirichlet noise
    /// is mixed directly into the root's stored `prior` once per search,
    /// before any worker starts selecting, so this method reads a single
    /// `prior` array regardless of whether `self` is the root.
    pub fn select_and_mark(&self, settings: &crate::options::SearchSettings) -> (usize, Option<Arc<Node>>) {
        let children = self.children.lock().expect("children lock poisoned");
        let no_visit_idx = self.no_visit_idx.load(Ordering::Acquire);
        let mut stats = self.stats.lock().expect("stats lock poisoned");

        let total = stats.total_visits() as f32;
        let cpuct = settings.cpuct_init + ((total + settings.cpuct_base + 1.0) / settings.cpuct_base).ln();
        let sqrt_total = total.sqrt();

        let limit = no_visit_idx.min(children.len());
        debug_assert!(limit > 0, "select_and_mark called on a node with no eligible children");

        let mut best_idx = 0;
        let mut best_score = f32::NEG_INFINITY;

        for i in 0..limit {
            let prior = stats.prior[i];
            let u = cpuct * prior * sqrt_total / (1.0 + stats.visits[i] as f32);
            let virtual_penalty = stats.virtual_loss[i] as f32 * (1.0 / settings.virtual_loss.max(1) as f32);
            let q = stats.action_value[i] - virtual_penalty;
            let score = q + u;

            if score > best_score {
                best_score = score;
                best_idx = i;
            }
        }

        stats.virtual_loss[best_idx] += settings.virtual_loss;
        drop(stats);

        (best_idx, children[best_idx].clone())
    }

    /// Attaches `child` to slot `i` and advances `no_visit_idx` past it.
    /// Slots below `no_visit_idx` are either real children or
    /// transposition shares; the caller has already verified `i ==
    /// no_visit_idx` under its own bookkeeping before calling this.
    pub fn attach_child(&self, i: usize, child: Arc<Node>) {
        let mut children = self.children.lock().expect("children lock poisoned");
        children[i] = Some(child);
        drop(children);
        self.no_visit_idx.fetch_add(1, Ordering::AcqRel);
    }

    pub fn no_visit_idx(&self) -> usize {
        self.no_visit_idx.load(Ordering::Acquire)
    }

    /// Removes the virtual loss applied to child slot `i` without
    /// recording a visit (collision backup), then recurses to the parent
    /// removing the virtual loss placed on every ancestor slot `probe`
    /// walked through to reach this collision -- mirrors `backup_value`'s
    /// own walk to the root, minus the visit/action-value update.
    pub fn backup_collision(self: &Arc<Self>, i: usize, virtual_loss: i32) {
        {
            let mut stats = self.stats.lock().expect("stats lock poisoned");
            stats.virtual_loss[i] -= virtual_loss;
        }

        if let Some(parent) = self.parent() {
            parent.backup_collision(self.child_idx_in_parent, virtual_loss);
        }
    }

    /// Records a completed visit with leaf value `v` (from this node's own
    /// perspective) at child slot `i`, then recurses to the parent with the
    /// value negated once per ply. Removes the slot's virtual loss as it
    /// goes.
    pub fn backup_value(self: &Arc<Self>, i: usize, v: f32, virtual_loss: i32) {
        {
            let mut stats = self.stats.lock().expect("stats lock poisoned");
            stats.virtual_loss[i] -= virtual_loss;
            stats.visits[i] += 1;
            let visits = stats.visits[i] as f32;
            stats.action_value[i] += (v - stats.action_value[i]) / visits;
        }

        if let Some(parent) = self.parent() {
            parent.backup_value(self.child_idx_in_parent, -v, virtual_loss);
        }
    }

    /// Greedy descent by visit count, for the principal variation.
    pub fn principal_variation(self: &Arc<Self>) -> Vec<Move> {
        let mut pv = Vec::new();
        let mut current = self.clone();

        loop {
            if current.is_terminal || current.moves.is_empty() {
                break;
            }

            let best = {
                let stats = current.stats.lock().expect("stats lock poisoned");
                (0..current.moves.len())
                    .filter(|&i| i < current.no_visit_idx())
                    .max_by_key(|&i| stats.visits[i])
            };

            match best {
                Some(i) => {
                    let mv = current.moves[i].clone();
                    match current.child_at(i) {
                        Some(child) => {
                            pv.push(mv);
                            current = child;
                        }
                        None => break,
                    }
                }
                None => break,
            }
        }

        pv
    }
}

/// Descends from `root` applying the leaf-discovery state machine until it
/// resolves to one of `Expand`/`Terminal`/`Collision`. A descent that would
/// continue past `max_depth` resolves as `Collision` at the boundary
/// instead rather than unwinding the virtual loss it already placed.
pub fn probe(root: &Arc<Node>, settings: &crate::options::SearchSettings, max_depth: u32) -> ProbeResult {
    let mut current = root.clone();
    let mut depth = 0;

    loop {
        let (child_idx, existing) = current.select_and_mark(settings);
        depth += 1;

        match existing {
            None => return ProbeResult::Expand(current, child_idx),
            Some(child) => {
                if child.is_terminal {
                    return ProbeResult::Terminal(current, child_idx);
                } else if !child.has_nn_results() || depth >= max_depth {
                    return ProbeResult::Collision(current, child_idx);
                } else {
                    current = child;
                }
            }
        }
    }
}
