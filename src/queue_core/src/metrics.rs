// Copyright 2024 RisingWave Labs
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

//! A read-only snapshot of manager state, for observability (see `SPEC_FULL.md` §10.5).

use std::time::Duration;

/// Point-in-time view over the counters a [`QueueManager`](crate::manager::QueueManager)
/// already maintains for correctness (spec §3 `QueueManager state`). This
/// exposes no state the core doesn't already track internally.
#[derive(Debug, Clone, Copy)]
pub struct QueueManagerMetrics {
    /// Number of generations currently in `activeQueues`.
    pub active_generations: usize,
    /// Number of retired generations sitting in the reuse cache.
    pub cached_generations: usize,
    /// Time elapsed since the last outgoing barrier was observed.
    pub last_barrier_age: Duration,
    /// Non-barrier messages emitted since that barrier.
    pub non_barrier_messages: u32,
}
