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

//! The transposition map: a concurrent `position_hash -> NodeStats` table
//! that lets a freshly reached position adopt the statistics of an
//! equivalent node already in the tree. Backed by `dashmap`, a sharded
//! concurrent map that avoids serializing every worker on one lock the
//! way a plain `Mutex<HashMap<..>>` would.

use crate::node::NodeStats;
use dashmap::DashMap;
use position::GamePosition;
use std::sync::{Arc, Mutex};

/// Identifies a position for transposition-sharing purposes. Two positions
/// are only candidates for sharing when every field here matches *and* both
/// have `repetition_count() == 0` -- checked separately by [`key_for`],
/// since a repetition-sensitive position must never be looked up or
/// inserted at all (draw-by-repetition semantics).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TranspositionKey {
    hash: u64,
    plies_from_null: u32,
    rule50: u32,
}

/// Append-only during one search: entries are never removed or overwritten,
/// only inserted once per freshly-evaluated position.
pub struct TranspositionMap {
    table: DashMap<TranspositionKey, Arc<Mutex<NodeStats>>>,
}

impl TranspositionMap {
    pub fn new() -> Self {
        Self { table: DashMap::new() }
    }

    /// Computes the lookup key for `position`, or `None` if the position's
    /// nonzero in-search repetition count rules out sharing entirely. This
    /// only guards against repetitions the search itself has observed
    /// within the current line; whether that is sufficient to preserve
    /// draw-by-repetition semantics across the whole game history is a
    /// narrower question this gate does not attempt to answer.
    pub fn key_for<P: GamePosition>(position: &P) -> Option<TranspositionKey> {
        if position.repetition_count() != 0 {
            return None;
        }

        Some(TranspositionKey {
            hash: position.hash(),
            plies_from_null: position.plies_from_null(),
            rule50: position.rule50_counter(),
        })
    }

    /// Returns the stats block for `key` if one is already present *and*
    /// has NN results -- a candidate without `has_nn_results` is still
    /// in-flight under some other node and is not a valid share target.
    pub fn get(&self, key: &TranspositionKey) -> Option<Arc<Mutex<NodeStats>>> {
        let entry = self.table.get(key)?;
        let stats = entry.value().clone();
        let has_results = stats.lock().expect("stats lock poisoned").has_nn_results;

        if has_results {
            Some(stats)
        } else {
            None
        }
    }

    /// Registers `stats` under `key` once its NN results have arrived.
    /// Uses `entry().or_insert()` so that a second worker racing to insert
    /// the same key never clobbers the first (idempotent, append-only).
    pub fn insert(&self, key: TranspositionKey, stats: Arc<Mutex<NodeStats>>) {
        self.table.entry(key).or_insert(stats);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }
}

impl Default for TranspositionMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_key() {
        let map = TranspositionMap::new();
        let key = TranspositionKey { hash: 42, plies_from_null: 1, rule50: 0 };
        let stats = Arc::new(Mutex::new(NodeStats::new(4)));
        stats.lock().unwrap().has_nn_results = true;

        assert!(map.get(&key).is_none());
        map.insert(key, stats);
        assert!(map.get(&key).is_some());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn pending_stats_are_not_a_valid_share_target() {
        let map = TranspositionMap::new();
        let key = TranspositionKey { hash: 7, plies_from_null: 0, rule50: 0 };
        let stats = Arc::new(Mutex::new(NodeStats::new(4)));

        map.insert(key, stats);
        assert!(map.get(&key).is_none());
    }
}
