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

//! Owns the active generations for one channel, runs the flush loop, and
//! schedules periodic barriers (spec §4.2 `QueueManager`).

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::channel::ChannelAdapter;
use crate::config::QueueManagerConfig;
use crate::error::{Completion, QueueError, Result};
use crate::frame::Frame;
use crate::handler::{ConnectionHandler, Envelope};
use crate::metrics::QueueManagerMetrics;
use crate::queue::{OutboundQueue, PairOutcome};

struct ManagerState<F: Frame> {
    active_queues: VecDeque<Arc<OutboundQueue<F>>>,
    queue_cache: VecDeque<Arc<OutboundQueue<F>>>,
    last_xid: u32,
    last_barrier_at: Instant,
    non_barrier_messages: u32,
    shut_down: bool,
}

/// Owns the generation list for one channel and drives the flush and
/// barrier-timer loops. Cheaply cloneable; every clone refers to the same
/// underlying state (spec §5 "Each channel has its own `QueueManager`").
pub struct QueueManager<F: Frame> {
    config: QueueManagerConfig,
    channel: Arc<dyn ChannelAdapter<F>>,
    handler: Arc<dyn ConnectionHandler<F>>,
    /// `Some` puts every flushed frame in a [`Envelope::Udp`] addressed here;
    /// `None` uses [`Envelope::Tcp`].
    remote_addr: Option<SocketAddr>,
    state: Mutex<ManagerState<F>>,
    flush_scheduled: AtomicU8,
}

impl<F: Frame> QueueManager<F> {
    /// Creates a manager for a newly active TCP channel: allocates the first
    /// generation and arms the periodic barrier timer (spec §4.2 "Lifecycle").
    pub fn new_tcp(
        config: QueueManagerConfig,
        channel: Arc<dyn ChannelAdapter<F>>,
        handler: Arc<dyn ConnectionHandler<F>>,
    ) -> Arc<Self> {
        Self::new_inner(config, channel, handler, None)
    }

    /// Like [`Self::new_tcp`], but every flushed frame is wrapped for `remote_addr`.
    pub fn new_udp(
        config: QueueManagerConfig,
        channel: Arc<dyn ChannelAdapter<F>>,
        handler: Arc<dyn ConnectionHandler<F>>,
        remote_addr: SocketAddr,
    ) -> Arc<Self> {
        Self::new_inner(config, channel, handler, Some(remote_addr))
    }

    fn new_inner(
        config: QueueManagerConfig,
        channel: Arc<dyn ChannelAdapter<F>>,
        handler: Arc<dyn ConnectionHandler<F>>,
        remote_addr: Option<SocketAddr>,
    ) -> Arc<Self> {
        let now = Instant::now();
        let manager = Arc::new(Self {
            config,
            channel,
            handler,
            remote_addr,
            state: Mutex::new(ManagerState {
                active_queues: VecDeque::new(),
                queue_cache: VecDeque::new(),
                last_xid: 0,
                last_barrier_at: now,
                non_barrier_messages: 0,
                shut_down: false,
            }),
            flush_scheduled: AtomicU8::new(0),
        });
        manager.allocate_generation();
        manager.arm_barrier_timer(config.max_barrier_interval);
        manager
    }

    /// Current generation accepting reservations, or `None` if the channel
    /// has gone inactive.
    fn current_queue(&self) -> Option<Arc<OutboundQueue<F>>> {
        let state = self.state.lock();
        if state.shut_down {
            None
        } else {
            state.active_queues.back().cloned()
        }
    }

    fn build_envelope(&self, frame: F) -> Envelope<F> {
        match self.remote_addr {
            Some(addr) => Envelope::Udp(frame, addr),
            None => Envelope::Tcp(frame),
        }
    }

    /// Reserves and commits a caller request onto the current generation
    /// (spec data flow: "caller -> reserve -> commit -> scheduleFlush").
    pub fn submit(
        self: &Arc<Self>,
        build: impl FnOnce(u32) -> F,
        completion: Option<Completion<F>>,
    ) -> Result<u32> {
        let queue = self.current_queue().ok_or(QueueError::Disconnected)?;
        let xid = queue
            .reserve_entry(false)
            .ok_or(QueueError::CapacityExhausted)?;
        let frame = build(xid);
        queue.commit_entry(xid, frame, completion)?;
        tracing::trace!(xid, "committed request entry");
        // `ensure_flushing`'s CAS makes this a no-op if a flush is already
        // scheduled, so we don't need to special-case "queue was empty"
        // (spec §4.1's "subsequently call ensureFlushing after commit").
        self.ensure_flushing();
        Ok(xid)
    }

    fn allocate_generation(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.shut_down {
            return;
        }
        let base_xid = state.last_xid;
        let capacity = self.config.generation_capacity();
        let queue = if let Some(cached) = state.queue_cache.pop_front() {
            cached.reset(base_xid);
            tracing::debug!(base_xid, "reused cached queue generation");
            cached
        } else {
            tracing::debug!(base_xid, "allocated fresh queue generation");
            Arc::new(OutboundQueue::new(base_xid, capacity))
        };
        state.last_xid += capacity;
        state.active_queues.push_back(Arc::clone(&queue));
        drop(state);
        self.handler.on_connection_queue_changed(Some(queue));
    }

    fn retire_if_finished(&self, queue: &Arc<OutboundQueue<F>>) {
        if !queue.is_finished() {
            return;
        }
        let mut state = self.state.lock();
        if let Some(pos) = state
            .active_queues
            .iter()
            .position(|candidate| Arc::ptr_eq(candidate, queue))
        {
            state.active_queues.remove(pos);
        }
        let base_xid = queue.base_xid();
        if state.queue_cache.len() < self.config.queue_cache_capacity {
            state.queue_cache.push_back(Arc::clone(queue));
            tracing::debug!(base_xid, "retired generation to cache");
        } else {
            tracing::debug!(base_xid, "retired generation (cache full, dropped)");
        }
    }

    /// CASes `flush_scheduled` 0->1 and, on success, submits [`Self::flush`]
    /// to the event loop. A failed CAS means a flush is already in flight;
    /// this is the "enqueue-then-recheck" half of the coalescing protocol
    /// (spec §5, P9).
    fn ensure_flushing(self: &Arc<Self>) {
        if self
            .flush_scheduled
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let this = Arc::clone(self);
            self.channel.event_loop().execute(Box::new(move || this.flush()));
        }
    }

    /// Only schedules a flush if there's something to flush; used by the
    /// channel-writability hooks (spec §4.2.5 `conditionalFlush`).
    fn conditional_flush(self: &Arc<Self>) {
        if self.current_queue().is_some_and(|queue| !queue.is_empty()) {
            self.ensure_flushing();
        }
    }

    /// The flush loop (spec §4.2.2). Runs on the channel's event loop.
    fn flush(self: &Arc<Self>) {
        let start = Instant::now();
        let mut wrote_any = false;
        let mut since_check = 0u32;

        loop {
            if !self.channel.is_writable() {
                break;
            }
            let Some(queue) = self.current_queue() else {
                break;
            };
            let Some(flushed) = queue.flush_entry() else {
                break;
            };
            wrote_any = true;

            if flushed.is_barrier {
                let mut state = self.state.lock();
                state.last_barrier_at = start;
                state.non_barrier_messages = 0;
                drop(state);
                tracing::trace!(xid = flushed.xid, "flushed barrier frame");
            } else {
                let reached_limit = {
                    let mut state = self.state.lock();
                    state.non_barrier_messages += 1;
                    state.non_barrier_messages >= self.config.queue_size
                };
                tracing::trace!(xid = flushed.xid, "flushed request frame");
                if reached_limit {
                    self.schedule_barrier_message(&queue);
                }
            }

            let envelope = self.build_envelope(flushed.frame);
            self.channel.write(envelope);

            if queue.is_flushed() {
                self.allocate_generation();
            }

            since_check += 1;
            if since_check >= self.config.worktime_recheck_interval {
                since_check = 0;
                if start.elapsed() >= self.config.max_work_time {
                    break;
                }
            }
        }

        if wrote_any {
            self.channel.flush();
        }

        self.flush_scheduled.store(0, Ordering::Release);
        // Re-check after clearing the flag: a producer may have committed
        // while we were on our way out and seen `flush_scheduled == 1`.
        if self.current_queue().is_some_and(|queue| !queue.is_empty()) {
            self.ensure_flushing();
        }
    }

    /// Reserves and commits a barrier request into `queue` (spec
    /// `scheduleBarrierMessage`). Resets `non_barrier_messages`: the source
    /// resets this counter both here and when a barrier is later observed
    /// flushing, a deliberate double reset (spec §9 open question) that
    /// prevents a flush-path reschedule shortly after a scheduling-path one.
    fn schedule_barrier_message(&self, queue: &Arc<OutboundQueue<F>>) {
        let Some(xid) = queue.reserve_entry(true) else {
            tracing::warn!("no capacity left to reserve a trailing barrier");
            return;
        };
        let frame = self.handler.create_barrier_request(xid);
        if queue.commit_entry(xid, frame, None).is_err() {
            tracing::warn!(xid, "failed to commit scheduled barrier entry");
            return;
        }
        self.state.lock().non_barrier_messages = 0;
        tracing::debug!(xid, "scheduled barrier message");
    }

    /// Pairs an incoming response to its originating request, scanning
    /// generations oldest-first. A matched barrier implies completion of
    /// every earlier entry — both the ones still outstanding in its own
    /// generation (bounded by the barrier's own xid, since a mid-generation
    /// barrier is not necessarily trailing) and every entry in every
    /// strictly older generation — since the switch would not have
    /// acknowledged the barrier without processing everything queued ahead
    /// of it (spec §4.2.3, P7). Callbacks run oldest-generation-first (spec
    /// §5 ordering guarantee #3): the strictly-older generations are cleared
    /// before the matched generation's own earlier entries.
    pub fn on_message(self: &Arc<Self>, response: F) -> bool {
        let queues: Vec<_> = self.state.lock().active_queues.iter().cloned().collect();
        let mut remaining = response;
        for (idx, queue) in queues.iter().enumerate() {
            let target_xid = remaining.xid();
            remaining = match queue.pair_request(remaining) {
                PairOutcome::Matched { is_barrier } => {
                    if is_barrier {
                        for older in &queues[..idx] {
                            older.complete_all();
                            self.retire_if_finished(older);
                        }
                        queue.complete_up_to(target_xid);
                    }
                    self.retire_if_finished(queue);
                    return true;
                }
                PairOutcome::NoMatch(frame) => frame,
            };
        }
        tracing::warn!(xid = remaining.xid(), "no matching request for response");
        false
    }

    /// Arms a one-shot barrier timer firing at `now + delay`.
    fn arm_barrier_timer(self: &Arc<Self>, delay: Duration) {
        let this = Arc::clone(self);
        self.channel
            .event_loop()
            .schedule(Box::new(move || this.on_barrier_timer()), delay);
    }

    /// Periodic barrier firing (spec §4.2.4).
    fn on_barrier_timer(self: &Arc<Self>) {
        let (shut_down, last_barrier_at, non_barrier_messages) = {
            let state = self.state.lock();
            (state.shut_down, state.last_barrier_at, state.non_barrier_messages)
        };
        if shut_down {
            return;
        }

        let now = Instant::now();
        if now.duration_since(last_barrier_at) >= self.config.max_barrier_interval
            && non_barrier_messages > 0
        {
            if let Some(queue) = self.current_queue() {
                self.schedule_barrier_message(&queue);
                self.ensure_flushing();
            }
        }

        let next_base = last_barrier_at.max(now);
        let mut next_fire = next_base + self.config.max_barrier_interval;
        if next_fire <= now {
            // The computed fire time already elapsed; avoid a tight loop.
            next_fire = now + self.config.max_barrier_interval;
        }
        self.arm_barrier_timer(next_fire.saturating_duration_since(now));
    }

    /// Channel became active: start draining any pre-enqueued commits
    /// (spec §4.2.5 `channelActive`).
    pub fn channel_active(self: &Arc<Self>) {
        tracing::info!("channel active");
        self.conditional_flush();
    }

    /// Channel may have just become writable again (spec §4.2.5
    /// `channelWritabilityChanged`).
    pub fn channel_writability_changed(self: &Arc<Self>) {
        self.conditional_flush();
    }

    /// Channel became inactive: fail every outstanding entry and discard all
    /// generations without caching them (spec §4.2.5 `channelInactive`).
    pub fn channel_inactive(self: &Arc<Self>) {
        tracing::info!("channel inactive");
        let queues: Vec<_> = {
            let mut state = self.state.lock();
            state.shut_down = true;
            let queues = state.active_queues.drain(..).collect::<Vec<_>>();
            state.queue_cache.clear();
            queues
        };
        self.handler.on_connection_queue_changed(None);

        let mut total_failed = 0u32;
        for queue in &queues {
            total_failed += queue.fail_all(QueueError::Disconnected);
        }
        tracing::info!(failed = total_failed, "failed outstanding requests on disconnect");
    }

    /// A read-only snapshot of the counters this manager already maintains.
    pub fn metrics(&self) -> QueueManagerMetrics {
        let state = self.state.lock();
        QueueManagerMetrics {
            active_generations: state.active_queues.len(),
            cached_generations: state.queue_cache.len(),
            last_barrier_age: Instant::now().saturating_duration_since(state.last_barrier_at),
            non_barrier_messages: state.non_barrier_messages,
        }
    }
}
