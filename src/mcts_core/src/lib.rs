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

//! Parallel PUCT search core. Everything game-specific lives behind
//! `position::GamePosition` and `nn::Evaluator`; this crate only ever
//! speaks those two contracts, plus the tree, transposition map,
//! mini-batch and worker/coordinator machinery that drive them.

mod batch;
mod coordinator;
mod dirichlet;
mod error;
mod node;
mod options;
mod policy;
mod time_control;
mod transposition;
mod worker;

pub use coordinator::{ChildDiagnostic, SearchCoordinator, SearchReport};
pub use error::SearchError;
pub use options::{SearchLimits, SearchSettings, StopReason};
pub use time_control::TimeManager;
