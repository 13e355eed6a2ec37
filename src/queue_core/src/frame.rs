//! The wire-frame contract the core treats as opaque (spec §6 "Frame contract").

/// A single OpenFlow message, as seen by the queue core.
///
/// The core never parses or mutates a frame's body; it only needs the two
/// properties below to allocate XIDs, pair responses, and decide when to
/// inject a barrier.
pub trait Frame: Send + 'static {
    /// The transaction id carried by this frame.
    fn xid(&self) -> u32;

    /// Whether this frame is a barrier request/reply.
    fn is_barrier(&self) -> bool;
}
