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

//! A single slot in an [`OutboundQueue`](crate::queue::OutboundQueue) generation (spec §3/§4.1).

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::error::Completion;
use crate::frame::Frame;

/// Monotonic forward states a slot passes through within one queue generation.
///
/// No state is ever revisited; `reset` (used when a finished generation is
/// recycled from the cache) is the only place a slot returns to `Free`, and
/// that only happens once every slot in the generation has reached
/// `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum EntryState {
    Free = 0,
    Reserved = 1,
    Committed = 2,
    Flushed = 3,
    Completed = 4,
}

impl EntryState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => EntryState::Free,
            1 => EntryState::Reserved,
            2 => EntryState::Committed,
            3 => EntryState::Flushed,
            4 => EntryState::Completed,
            _ => unreachable!("invalid entry state byte {v}"),
        }
    }
}

/// The mutable payload of a slot, guarded by a short-lived lock.
///
/// Only the request/completion/barrier fields live behind the lock; the
/// state transition itself is a separate atomic so a flusher can check
/// `is_empty`/`is_flushed` without taking it.
pub(crate) struct SlotCell<F> {
    pub(crate) request: Option<F>,
    pub(crate) completion: Option<Completion<F>>,
    pub(crate) is_barrier: bool,
}

impl<F> Default for SlotCell<F> {
    fn default() -> Self {
        Self {
            request: None,
            completion: None,
            is_barrier: false,
        }
    }
}

/// One addressable slot of a generation. `slots[i].xid == base_xid + i`.
pub(crate) struct Slot<F> {
    state: AtomicU8,
    cell: Mutex<SlotCell<F>>,
}

impl<F> Default for Slot<F> {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(EntryState::Free as u8),
            cell: Mutex::new(SlotCell::default()),
        }
    }
}

impl<F: Frame> Slot<F> {
    pub(crate) fn state(&self) -> EntryState {
        EntryState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Reserves the slot for `is_barrier`, transitioning `Free -> Reserved`.
    ///
    /// Callers are expected to have already claimed this slot's index via
    /// the generation's reservation cursor; this only writes the payload
    /// and publishes the state transition.
    pub(crate) fn reserve(&self, is_barrier: bool) {
        self.cell.lock().is_barrier = is_barrier;
        self.state.store(EntryState::Reserved as u8, Ordering::Release);
    }

    /// Commits `request`/`completion` into a `Reserved` slot.
    ///
    /// Returns `false` if the slot was not in `Reserved` state (a precondition
    /// violation per spec §4.1 — the caller supplied a stale or already-used xid).
    pub(crate) fn commit(&self, request: F, completion: Option<Completion<F>>) -> bool {
        if self.state() != EntryState::Reserved {
            return false;
        }
        {
            let mut cell = self.cell.lock();
            cell.request = Some(request);
            cell.completion = completion;
        }
        self.state.store(EntryState::Committed as u8, Ordering::Release);
        true
    }

    /// Takes the request out of a `Committed` slot and marks it `Flushed`.
    pub(crate) fn flush(&self) -> (F, bool) {
        debug_assert_eq!(self.state(), EntryState::Committed);
        let (request, is_barrier) = {
            let mut cell = self.cell.lock();
            (
                cell.request.take().expect("committed slot carries a request"),
                cell.is_barrier,
            )
        };
        self.state.store(EntryState::Flushed as u8, Ordering::Release);
        (request, is_barrier)
    }

    /// Completes a `Flushed` slot, returning its completion (if any) and barrier flag.
    pub(crate) fn complete(&self) -> (Option<Completion<F>>, bool) {
        let completion = self.cell.lock().completion.take();
        let is_barrier = self.cell.lock().is_barrier;
        self.state.store(EntryState::Completed as u8, Ordering::Release);
        (completion, is_barrier)
    }

    /// Resets the slot to `Free` for reuse by a later generation. Caller must
    /// already know the slot reached `Completed` (see `OutboundQueue::reset`).
    pub(crate) fn reset(&self) {
        let mut cell = self.cell.lock();
        cell.request = None;
        cell.completion = None;
        cell.is_barrier = false;
        self.state.store(EntryState::Free as u8, Ordering::Relaxed);
    }
}
