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

use thiserror::Error;

use crate::frame::Frame;

pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors that reach a caller, either synchronously from [`reserve`](crate::manager::QueueManager::reserve)
/// or asynchronously through a request's completion callback.
///
/// `ProtocolMismatch` (spec §7.4) is intentionally absent: the manager never
/// escalates an unpaired response to the caller, it only logs and drops it.
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("no capacity remaining in the current queue generation")]
    CapacityExhausted,
    #[error("channel disconnected while the request was in flight")]
    Disconnected,
    #[error("channel rejected the write after the request was accepted")]
    RejectedExecution,
}

impl QueueError {
    /// Whether a caller might reasonably retry after seeing this error.
    pub fn retryable(&self) -> bool {
        match self {
            QueueError::CapacityExhausted => true,
            QueueError::Disconnected | QueueError::RejectedExecution => false,
        }
    }
}

/// A one-shot completion callback for a single reserved entry (spec §6
/// "Per-request completion callback").
///
/// - `Ok(Some(response))`: a direct response was paired to this request.
/// - `Ok(None)`: implied success — a later barrier closed this entry's
///   generation before a direct response arrived.
/// - `Err(e)`: flush-time rejection, disconnect, or another terminal error.
pub type Completion<F> = Box<dyn FnOnce(std::result::Result<Option<F>, QueueError>) + Send>;

pub(crate) fn complete<F: Frame>(completion: Option<Completion<F>>, result: std::result::Result<Option<F>, QueueError>) {
    if let Some(completion) = completion {
        completion(result);
    }
}
