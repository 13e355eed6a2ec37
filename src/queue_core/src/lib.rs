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

//! Outbound request/response queue core for an OpenFlow controller-side
//! protocol library.
//!
//! Multiplexes an unbounded stream of caller-issued requests onto a single
//! duplex transport channel to a switch: it tracks in-flight requests by
//! transaction id (xid), pairs incoming responses back to their originating
//! request, and periodically injects barrier requests so the switch's
//! out-of-order execution model stays bounded in both time and message
//! count.
//!
//! The pieces, leaves-first:
//! - [`frame`] — the opaque wire-frame contract the core requires.
//! - [`entry`] — a single slot inside one queue generation.
//! - [`queue`] — [`queue::OutboundQueue`], one fixed-capacity generation of slots.
//! - [`channel`] / [`handler`] — the transport and connection-handler
//!   collaborators the manager drives; both external to this crate in the
//!   original system, specified here only as traits.
//! - [`manager`] — [`manager::QueueManager`], which owns a channel's
//!   generations and runs the flush and barrier-timer loops.
//!
//! What this crate does *not* do: parse or serialize wire frames, own a
//! socket, negotiate a protocol version, or reorder/coalesce caller
//! requests. Those are the embedding application's job.

pub mod channel;
pub mod config;
mod entry;
pub mod error;
pub mod frame;
pub mod handler;
pub mod manager;
pub mod metrics;
pub mod queue;

pub use channel::{BoxTask, ChannelAdapter, EventLoop, TokioEventLoop};
pub use config::QueueManagerConfig;
pub use error::{Completion, QueueError, Result};
pub use frame::Frame;
pub use handler::{ConnectionHandler, Envelope};
pub use manager::QueueManager;
pub use metrics::QueueManagerMetrics;
pub use queue::OutboundQueue;
