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

//! The engine's configuration record. Rather than a process-wide mutable
//! option table, every tunable lives on `SearchSettings`, built once by
//! the command surface from `setoption` lines and threaded explicitly
//! into the coordinator and every worker. Field names mirror the
//! UCI-style option vocabulary, divided by 100 where the option is a
//! `Centi_*` integer.

/// Tunables that shape how a single search is carried out. Constructed
/// once per `go` and shared read-only (`Clone`, not mutated in place) by
/// every worker thread.
#[derive(Clone, Debug)]
pub struct SearchSettings {
    /// Number of parallel search workers (`Threads`).
    pub threads: usize,
    /// Maximum number of leaves gathered before invoking the evaluator
    /// (`Batch_Size`).
    pub batch_size: usize,
    /// Enable transposition-table sharing (`Use_Transposition_Table`).
    pub use_transposition_table: bool,
    /// PUCT exploration constant base term (`Centi_CPuct_Init` / 100).
    pub cpuct_init: f32,
    /// PUCT exploration constant log-growth base (`CPuct_Base`).
    pub cpuct_base: f32,
    /// Root Dirichlet noise weight (`Centi_Dirichlet_Epsilon` / 100).
    pub dirichlet_epsilon: f32,
    /// Root Dirichlet noise concentration (`Centi_Dirichlet_Alpha` / 100).
    pub dirichlet_alpha: f32,
    /// Prior temperature applied to freshly predicted policies
    /// (`Centi_Node_Temperature` / 100).
    pub node_policy_temperature: f32,
    /// Virtual-loss count applied per in-flight traversal (`Virtual_Loss`).
    pub virtual_loss: i32,
    /// Q-value weight `[0, 1]` mixed into the final move selection
    /// (`Centi_Q_Value_Weight` / 100).
    pub q_value_weight: f32,
    /// Early-stopping Q-threshold at the start of search
    /// (`Centi_Q_Thresh_Init` / 100).
    pub q_thresh_init: f32,
    /// Early-stopping Q-threshold ceiling (`Centi_Q_Thresh_Max` / 100).
    pub q_thresh_max: f32,
    /// Node count at which the threshold reaches its ceiling
    /// (`Q_Thresh_Base`).
    pub q_thresh_base: u32,
    /// Whether early stopping is permitted at all (`Allow_Early_Stopping`).
    pub allow_early_stopping: bool,
    /// Stochastic exploration factor applied to the chosen move
    /// (`Centi_Random_Move_Factor` / 100).
    pub random_move_factor: f32,
    /// Maximum selection depth per descent.
    pub max_depth: u32,
    /// Milliseconds reserved for communication/GUI latency, subtracted
    /// from the clock before a move-time budget is computed
    /// (`Move_Overhead`). Set once via `setoption` and carried into every
    /// subsequent `go`'s `SearchLimits`.
    pub move_overhead_ms: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            threads: 1,
            batch_size: 8,
            use_transposition_table: true,
            cpuct_init: 2.5,
            cpuct_base: 19652.0,
            dirichlet_epsilon: 0.25,
            dirichlet_alpha: 0.2,
            node_policy_temperature: 1.0,
            virtual_loss: 3,
            q_value_weight: 1.0,
            q_thresh_init: 0.5,
            q_thresh_max: 0.9,
            q_thresh_base: 1369,
            allow_early_stopping: true,
            random_move_factor: 0.0,
            max_depth: 256,
            move_overhead_ms: 0,
        }
    }
}

/// Per-`go` search limits. `0`/`None` means unbounded for the fields
/// that support it.
#[derive(Clone, Debug, Default)]
pub struct SearchLimits {
    /// Maximum total root visits; `0` = unlimited.
    pub nodes: u64,
    pub movetime_ms: Option<u64>,
    pub wtime_ms: Option<u64>,
    pub btime_ms: Option<u64>,
    pub winc_ms: Option<u64>,
    pub binc_ms: Option<u64>,
    pub moves_to_go: Option<u32>,
    pub depth: Option<u32>,
    pub move_overhead_ms: u64,
    pub infinite: bool,
    pub ponder: bool,
    /// Playout-cap randomization (`Centi_Node_Random_Factor`): a fraction
    /// in `[0, 1]` by which the effective node budget is perturbed before
    /// a search starts, so that self-play games do not always stop at
    /// exactly `nodes`.
    pub node_random_factor: f32,
}

/// Why a search stopped. `BudgetExhausted` is the normal case and is
/// never treated as an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    NodesExhausted,
    TimeExpired,
    DepthReached,
    ExternalStop,
    EarlyStopping,
}
