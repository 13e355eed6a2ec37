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

//! The caller-supplied collaborator interface (spec §6 "Handler callback interface").

use std::net::SocketAddr;
use std::sync::Arc;

use crate::frame::Frame;
use crate::queue::OutboundQueue;

/// Callbacks the manager invokes back into the embedding connection.
///
/// Modeled as a trait rather than a bag of closures per spec §9's redesign
/// note ("dynamic dispatch on handler callbacks... model as a trait").
pub trait ConnectionHandler<F: Frame>: Send + Sync + 'static {
    /// Builds a barrier request frame carrying `xid`.
    fn create_barrier_request(&self, xid: u32) -> F;

    /// Notified whenever the reservation target changes. `None` during
    /// shutdown (spec §4.2.5 `channelInactive`).
    fn on_connection_queue_changed(&self, current_queue: Option<Arc<OutboundQueue<F>>>);
}

/// The transport-appropriate envelope a flushed frame is wrapped in before
/// being handed to [`ChannelAdapter::write`](crate::channel::ChannelAdapter::write)
/// (spec §4.2.2).
pub enum Envelope<F> {
    /// TCP transport: the frame alone, the stream carries the peer identity.
    Tcp(F),
    /// UDP transport: the frame plus the remote address it is addressed to.
    Udp(F, SocketAddr),
}

impl<F: Frame> Envelope<F> {
    pub fn frame(&self) -> &F {
        match self {
            Envelope::Tcp(frame) => frame,
            Envelope::Udp(frame, _) => frame,
        }
    }
}
