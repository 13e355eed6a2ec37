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

//! The transport collaborator interface (spec §4.3 `ChannelAdapter`).

use std::time::Duration;

use crate::frame::Frame;
use crate::handler::Envelope;

/// A unit of work submitted to the channel's event loop.
pub type BoxTask = Box<dyn FnOnce() + Send + 'static>;

/// The event loop backing one channel: single-threaded, cooperative,
/// reachable from arbitrary producer threads for submission (spec §5).
pub trait EventLoop: Send + Sync + 'static {
    /// Enqueues `task` to run on the loop thread with no delay.
    fn execute(&self, task: BoxTask);

    /// Enqueues `task` to run once, after `delay` has elapsed.
    fn schedule(&self, task: BoxTask, delay: Duration);
}

/// The transport primitives the manager needs from a channel (spec §4.3,
/// §6 "Frame contract"/"Wire compatibility"). The codec, the socket, and
/// connection/TLS/handshake logic all live on the other side of this trait
/// and are out of scope for this crate (spec §1).
pub trait ChannelAdapter<F: Frame>: Send + Sync + 'static {
    /// Whether the channel can currently accept another non-blocking write.
    fn is_writable(&self) -> bool;

    /// Buffers `envelope` for transmission. Never blocks.
    fn write(&self, envelope: Envelope<F>);

    /// Flushes any buffered writes to the transport.
    fn flush(&self);

    /// The event loop this channel's callbacks run on.
    fn event_loop(&self) -> &dyn EventLoop;
}

/// A [`EventLoop`] backed by a `tokio` runtime handle, the ordinary choice
/// for any channel in this workspace's stack.
pub struct TokioEventLoop {
    handle: tokio::runtime::Handle,
}

impl TokioEventLoop {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl EventLoop for TokioEventLoop {
    fn execute(&self, task: BoxTask) {
        self.handle.spawn(async move { task() });
    }

    fn schedule(&self, task: BoxTask, delay: Duration) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}
