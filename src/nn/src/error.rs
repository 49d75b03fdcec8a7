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

use thiserror::Error;

/// The model failed to load, or the device backing it failed
/// mid-search. Either aborts the in-flight search.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("failed to load model from `{0}`")]
    ModelLoadFailed(String),

    #[error("device failed during evaluation: {0}")]
    DeviceFailed(String),
}
