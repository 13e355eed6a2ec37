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

//! Immutable per-[`QueueManager`](crate::manager::QueueManager) configuration (spec §6).

use std::time::Duration;

/// Configuration surface for one [`QueueManager`](crate::manager::QueueManager).
///
/// Constructed by the embedding application and handed to
/// `QueueManager::new`; this crate never reads it from a file or the
/// environment (spec §1 non-goal "configuration loading" — callers that want
/// `serde`-based loading layer it on top).
#[derive(Debug, Clone, Copy)]
pub struct QueueManagerConfig {
    /// Maximum non-barrier entries per generation. Generation capacity is
    /// `queue_size + 1`, the extra slot reserved for a trailing barrier.
    pub queue_size: u32,
    /// Upper bound on time between outgoing barriers.
    pub max_barrier_interval: Duration,
    /// Wall-clock budget for a single flush loop iteration.
    pub max_work_time: Duration,
    /// Messages written between work-budget rechecks inside one flush call.
    pub worktime_recheck_interval: u32,
    /// Number of retired generations kept around for reuse.
    pub queue_cache_capacity: usize,
}

impl Default for QueueManagerConfig {
    /// Mirrors spec §6's "typical value" column where one is given;
    /// `queue_size` and `max_barrier_interval` have no specified default in
    /// the source material, so these pick values consistent with the
    /// capacity math in §3 (see `DESIGN.md` for the rationale).
    fn default() -> Self {
        Self {
            queue_size: 256,
            max_barrier_interval: Duration::from_secs(1),
            max_work_time: Duration::from_micros(100),
            worktime_recheck_interval: 64,
            queue_cache_capacity: 4,
        }
    }
}

impl QueueManagerConfig {
    /// Capacity of one generation under this config (`queue_size + 1`).
    pub fn generation_capacity(&self) -> u32 {
        self.queue_size + 1
    }
}
