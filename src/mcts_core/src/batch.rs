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

//! The per-worker mini-batch: four bounded vectors, each capped by the
//! configured batch size `B`, that one worker fills in during leaf
//! discovery before handing the freshly-expanded leaves to the evaluator
//! and backing every leaf up.

use crate::node::Node;
use crate::transposition::TranspositionKey;
use position::{encode_into, PLANE_SIZE};
use std::sync::Arc;

/// A node newly expanded this iteration, still awaiting NN results. Carries
/// the transposition key it was expanded under (if transposition sharing is
/// enabled and the position qualifies) so the worker can register it in the
/// map once its results arrive, without recomputing the key.
pub struct PendingLeaf {
    pub node: Arc<Node>,
    pub transposition_key: Option<TranspositionKey>,
}

pub struct MiniBatch {
    capacity: usize,

    /// Nodes freshly expanded this cycle, awaiting NN results.
    pub new_nodes: Vec<PendingLeaf>,
    /// Newly created nodes that adopted an existing transposition's stats.
    pub transposition_nodes: Vec<Arc<Node>>,
    /// Terminal leaves discovered this iteration (freshly expanded, or
    /// re-selected on a later visit to an already-terminal child).
    pub terminal_nodes: Vec<Arc<Node>>,
    /// Traversals that landed on an already in-flight evaluation: `(parent,
    /// child_idx)`.
    pub collision_nodes: Vec<(Arc<Node>, usize)>,

    /// Encoded board planes for `new_nodes`, concatenated in push order;
    /// exactly `new_nodes.len() * PLANE_SIZE` floats at any time.
    pub input_planes: Vec<f32>,
}

impl MiniBatch {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            new_nodes: Vec::with_capacity(capacity),
            transposition_nodes: Vec::with_capacity(capacity),
            terminal_nodes: Vec::with_capacity(capacity),
            collision_nodes: Vec::with_capacity(capacity),
            input_planes: Vec::with_capacity(capacity * PLANE_SIZE),
        }
    }

    /// `true` once any one of the four vectors has reached `capacity`
    /// (once any of the four vectors reach size `B`).
    pub fn is_full(&self) -> bool {
        self.new_nodes.len() >= self.capacity
            || self.transposition_nodes.len() >= self.capacity
            || self.terminal_nodes.len() >= self.capacity
            || self.collision_nodes.len() >= self.capacity
    }

    pub fn push_new(&mut self, node: Arc<Node>, transposition_key: Option<TranspositionKey>) {
        let offset = self.input_planes.len();
        self.input_planes.resize(offset + PLANE_SIZE, 0.0);
        encode_into(&node.position, &mut self.input_planes[offset..offset + PLANE_SIZE]);

        self.new_nodes.push(PendingLeaf { node, transposition_key });
    }

    pub fn clear(&mut self) {
        self.new_nodes.clear();
        self.transposition_nodes.clear();
        self.terminal_nodes.clear();
        self.collision_nodes.clear();
        self.input_planes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use position::{ChessPosition, GamePosition};

    #[test]
    fn fills_up_to_capacity() {
        let mut batch = MiniBatch::new(2);
        let root = Node::new_root(ChessPosition::new_game());

        assert!(!batch.is_full());
        batch.terminal_nodes.push(root.clone());
        batch.terminal_nodes.push(root);
        assert!(batch.is_full());
    }

    #[test]
    fn push_new_encodes_one_board_per_call() {
        let mut batch = MiniBatch::new(4);
        let a = Node::new_root(ChessPosition::new_game());
        let b = Node::new_root(ChessPosition::new_game().do_move(&a.moves[0]));

        batch.push_new(a, None);
        batch.push_new(b, None);

        assert_eq!(batch.new_nodes.len(), 2);
        assert_eq!(batch.input_planes.len(), 2 * PLANE_SIZE);
    }
}
