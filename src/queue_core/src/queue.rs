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

//! One generation of the outbound queue (spec §4.1 `OutboundQueue`).

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::entry::{EntryState, Slot};
use crate::error::{complete, Completion, QueueError};
use crate::frame::Frame;

/// A frame pulled off the queue by the flush loop, still paired with its xid
/// and barrier flag so the manager can do barrier bookkeeping without
/// re-parsing the frame.
pub(crate) struct FlushedEntry<F> {
    pub(crate) xid: u32,
    pub(crate) frame: F,
    pub(crate) is_barrier: bool,
}

/// Result of [`OutboundQueue::pair_request`]: either the response matched a
/// slot in this generation, or it is handed back unmatched so the manager can
/// try the next-older generation without cloning the frame.
pub(crate) enum PairOutcome<F> {
    Matched { is_barrier: bool },
    NoMatch(F),
}

/// A fixed-capacity, append-only generation of [`Slot`]s sharing one
/// contiguous xid range (`base_xid .. base_xid + capacity`).
///
/// `reserve_index` and `commit_index` are written from producer threads
/// (spec §5 "reserveEntry and commitEntry are called by producer threads");
/// `flush_index` and `completed_count` are only ever touched from the
/// channel's event-loop thread. All four are still plain atomics rather than
/// `Cell`s purely so the type stays `Sync` for sharing via `Arc` across that
/// boundary — the event-loop-only fields never see concurrent writers.
pub struct OutboundQueue<F: Frame> {
    base_xid: AtomicU32,
    capacity: u32,
    slots: Vec<Slot<F>>,
    reserve_index: AtomicU32,
    /// Guards the "commits proceed in reservation order" invariant: commits
    /// may *arrive* out of order from concurrent producers, so this advances
    /// only over the contiguous prefix of already-committed slots, the same
    /// idiom `pair_request` uses for `completed_count`.
    commit_index: Mutex<u32>,
    flush_index: AtomicU32,
    completed_count: AtomicU32,
}

impl<F: Frame> OutboundQueue<F> {
    /// Allocates a fresh generation. `capacity` is `queue_size + 1`, the
    /// extra slot reserved for a trailing barrier (spec §3).
    pub(crate) fn new(base_xid: u32, capacity: u32) -> Self {
        let mut slots = Vec::with_capacity(capacity as usize);
        slots.resize_with(capacity as usize, Slot::default);
        Self {
            base_xid: AtomicU32::new(base_xid),
            capacity,
            slots,
            reserve_index: AtomicU32::new(0),
            commit_index: Mutex::new(0),
            flush_index: AtomicU32::new(0),
            completed_count: AtomicU32::new(0),
        }
    }

    pub fn base_xid(&self) -> u32 {
        self.base_xid.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Reserves the next free slot for `is_barrier`, returning its xid.
    /// Returns `None` once every slot in this generation has been reserved
    /// (spec §4.1 — the manager surfaces this as `CapacityExhausted`).
    pub(crate) fn reserve_entry(&self, is_barrier: bool) -> Option<u32> {
        loop {
            let idx = self.reserve_index.load(Ordering::Acquire);
            if idx >= self.capacity {
                return None;
            }
            if self
                .reserve_index
                .compare_exchange(idx, idx + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.slots[idx as usize].reserve(is_barrier);
                return Some(self.base_xid() + idx);
            }
        }
    }

    /// Commits a previously reserved `xid`. Fails if the slot is not
    /// `Reserved` (stale xid, double commit, or a foreign generation).
    pub(crate) fn commit_entry(
        &self,
        xid: u32,
        request: F,
        completion: Option<Completion<F>>,
    ) -> Result<(), QueueError> {
        let idx = xid
            .checked_sub(self.base_xid())
            .filter(|&idx| idx < self.capacity)
            .ok_or(QueueError::CapacityExhausted)?;
        if !self.slots[idx as usize].commit(request, completion) {
            return Err(QueueError::CapacityExhausted);
        }

        let mut commit_index = self.commit_index.lock();
        while *commit_index < self.capacity
            && self.slots[*commit_index as usize].state() == EntryState::Committed
        {
            *commit_index += 1;
        }
        Ok(())
    }

    /// Pulls the next committed entry off the queue in reservation order, or
    /// `None` if nothing committed is waiting (spec P4).
    pub(crate) fn flush_entry(&self) -> Option<FlushedEntry<F>> {
        let flush_index = self.flush_index.load(Ordering::Relaxed);
        let commit_index = *self.commit_index.lock();
        if flush_index >= commit_index {
            return None;
        }
        let (frame, is_barrier) = self.slots[flush_index as usize].flush();
        self.flush_index.store(flush_index + 1, Ordering::Relaxed);
        Some(FlushedEntry {
            xid: self.base_xid() + flush_index,
            frame,
            is_barrier,
        })
    }

    /// Scans `[completed_count, flush_index)` for a `Flushed` slot matching
    /// `response`'s xid, invoking its completion with `Ok(Some(response))` on
    /// a match (spec §4.1 `pairRequest`).
    pub(crate) fn pair_request(&self, response: F) -> PairOutcome<F> {
        let flush_index = self.flush_index.load(Ordering::Relaxed);
        let start = self.completed_count.load(Ordering::Relaxed);
        let target = response.xid();
        let base = self.base_xid();

        for i in start..flush_index {
            if base + i != target {
                continue;
            }
            if self.slots[i as usize].state() != EntryState::Flushed {
                break;
            }
            let (completion, is_barrier) = self.slots[i as usize].complete();
            complete(completion, Ok(Some(response)));
            self.advance_completed_prefix();
            return PairOutcome::Matched { is_barrier };
        }
        PairOutcome::NoMatch(response)
    }

    fn advance_completed_prefix(&self) {
        let reserve_index = self.reserve_index.load(Ordering::Acquire);
        let mut completed = self.completed_count.load(Ordering::Relaxed);
        while completed < reserve_index && self.slots[completed as usize].state() == EntryState::Completed {
            completed += 1;
        }
        self.completed_count.store(completed, Ordering::Relaxed);
    }

    /// Implied-success completion: every still-`Flushed` slot in
    /// `[completed_count, reserve_index)` is completed with `Ok(None)`, in
    /// xid order (spec §4.1 `completeAll`, P7).
    pub(crate) fn complete_all(&self) {
        let reserve_index = self.reserve_index.load(Ordering::Acquire);
        let start = self.completed_count.load(Ordering::Relaxed);
        for i in start..reserve_index {
            if self.slots[i as usize].state() == EntryState::Flushed {
                let (completion, _is_barrier) = self.slots[i as usize].complete();
                complete(completion, Ok(None));
            }
        }
        self.completed_count.store(reserve_index, Ordering::Relaxed);
    }

    /// Implied-success completion restricted to entries at or before
    /// `barrier_xid`, scanning only `[completed_count, flush_index)`.
    ///
    /// Used when *this* generation's own barrier is matched: a barrier
    /// reserved mid-generation (the time-triggered case) is not necessarily
    /// trailing, so entries committed after it in the same generation must
    /// not be swept up as implied successes (spec §6 — implied success is an
    /// *earlier* entry closed by a *later* barrier). Bounding the scan by
    /// `flush_index` rather than `reserve_index` also means a `Committed`
    /// but not-yet-flushed slot is left untouched rather than silently
    /// marked done.
    pub(crate) fn complete_up_to(&self, barrier_xid: u32) {
        let flush_index = self.flush_index.load(Ordering::Relaxed);
        let start = self.completed_count.load(Ordering::Relaxed);
        let base = self.base_xid();
        for i in start..flush_index {
            if base + i > barrier_xid {
                break;
            }
            if self.slots[i as usize].state() == EntryState::Flushed {
                let (completion, _is_barrier) = self.slots[i as usize].complete();
                complete(completion, Ok(None));
            }
        }
        self.advance_completed_prefix();
    }

    /// Fails every not-yet-`Completed` slot in `[completed_count,
    /// reserve_index)` with `cause`, in xid order (spec §4.1 `failAll`, P8).
    /// Returns the number of entries failed.
    pub(crate) fn fail_all(&self, cause: QueueError) -> u32 {
        let reserve_index = self.reserve_index.load(Ordering::Acquire);
        let start = self.completed_count.load(Ordering::Relaxed);
        let mut failed = 0;
        for i in start..reserve_index {
            if self.slots[i as usize].state() != EntryState::Completed {
                let (completion, _is_barrier) = self.slots[i as usize].complete();
                complete(completion, Err(cause.clone()));
                failed += 1;
            }
        }
        self.completed_count.store(reserve_index, Ordering::Relaxed);
        failed
    }

    pub fn is_empty(&self) -> bool {
        self.flush_index.load(Ordering::Relaxed) == *self.commit_index.lock()
    }

    pub fn is_flushed(&self) -> bool {
        self.flush_index.load(Ordering::Relaxed) == self.capacity
    }

    pub fn is_finished(&self) -> bool {
        self.completed_count.load(Ordering::Relaxed) == self.reserve_index.load(Ordering::Acquire)
    }

    /// Resets every cursor and slot to start a new generation without
    /// reallocating the slot array. Precondition: `is_finished()`.
    pub(crate) fn reset(&self, base_xid: u32) {
        debug_assert!(self.is_finished(), "reuse of an unfinished queue generation");
        for slot in &self.slots {
            slot.reset();
        }
        self.base_xid.store(base_xid, Ordering::Relaxed);
        self.reserve_index.store(0, Ordering::Relaxed);
        *self.commit_index.lock() = 0;
        self.flush_index.store(0, Ordering::Relaxed);
        self.completed_count.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;

    #[derive(Debug, Clone)]
    struct TestFrame {
        xid: u32,
        barrier: bool,
    }

    impl Frame for TestFrame {
        fn xid(&self) -> u32 {
            self.xid
        }

        fn is_barrier(&self) -> bool {
            self.barrier
        }
    }

    fn commit(queue: &OutboundQueue<TestFrame>, barrier: bool) -> u32 {
        let xid = queue.reserve_entry(barrier).expect("capacity available");
        queue
            .commit_entry(xid, TestFrame { xid, barrier }, None)
            .unwrap();
        xid
    }

    #[test]
    fn reserve_commit_flush_round_trip() {
        let queue = OutboundQueue::<TestFrame>::new(0, 4);
        let xids: Vec<_> = (0..3).map(|_| commit(&queue, false)).collect();
        assert_eq!(xids, vec![0, 1, 2]);

        for expected in xids {
            let flushed = queue.flush_entry().unwrap();
            assert_eq!(flushed.xid, expected);
        }
        assert!(queue.flush_entry().is_none());
        assert!(!queue.is_finished());
    }

    #[test]
    fn reserve_exhausted_returns_none() {
        let queue = OutboundQueue::<TestFrame>::new(0, 2);
        assert!(queue.reserve_entry(false).is_some());
        assert!(queue.reserve_entry(false).is_some());
        assert!(queue.reserve_entry(false).is_none());
    }

    #[test]
    fn pair_request_out_of_order_advances_contiguous_prefix() {
        let queue = OutboundQueue::<TestFrame>::new(0, 8);
        for _ in 0..8 {
            commit(&queue, false);
        }
        for _ in 0..8 {
            queue.flush_entry().unwrap();
        }

        // Pair 3 first: nothing contiguous from 0 yet, so completed_count stays 0.
        match queue.pair_request(TestFrame { xid: 3, barrier: false }) {
            PairOutcome::Matched { is_barrier } => assert!(!is_barrier),
            PairOutcome::NoMatch(_) => panic!("expected match"),
        }
        assert!(!queue.is_finished());

        for xid in [0, 1, 2] {
            assert!(matches!(
                queue.pair_request(TestFrame { xid, barrier: false }),
                PairOutcome::Matched { .. }
            ));
        }
        // completed_count should now have swept past xid 3 too.
        for xid in [4, 5, 6, 7] {
            assert!(matches!(
                queue.pair_request(TestFrame { xid, barrier: false }),
                PairOutcome::Matched { .. }
            ));
        }
        assert!(queue.is_finished());
    }

    #[test]
    fn pair_request_unmatched_is_handed_back() {
        let queue = OutboundQueue::<TestFrame>::new(0, 4);
        commit(&queue, false);
        queue.flush_entry().unwrap();
        match queue.pair_request(TestFrame { xid: 99, barrier: false }) {
            PairOutcome::NoMatch(frame) => assert_eq!(frame.xid, 99),
            PairOutcome::Matched { .. } => panic!("expected no match"),
        }
    }

    #[test]
    fn fail_all_covers_every_outstanding_entry() {
        let queue = OutboundQueue::<TestFrame>::new(0, 4);
        for _ in 0..3 {
            commit(&queue, false);
        }
        queue.flush_entry().unwrap();
        queue.flush_entry().unwrap();
        // third stays Committed, unflushed.

        let failed = queue.fail_all(QueueError::Disconnected);
        assert_eq!(failed, 3);
        assert!(queue.is_finished());
    }

    #[test]
    fn reset_allows_generation_reuse() {
        let queue = OutboundQueue::<TestFrame>::new(0, 2);
        commit(&queue, false);
        commit(&queue, false);
        queue.flush_entry().unwrap();
        queue.flush_entry().unwrap();
        queue.fail_all(QueueError::Disconnected);
        assert!(queue.is_finished());

        queue.reset(100);
        assert_eq!(queue.base_xid(), 100);
        assert!(queue.is_empty());
        assert!(!queue.is_flushed());
        let xid = queue.reserve_entry(false).unwrap();
        assert_eq!(xid, 100);
    }
}
