//! Packet representation shared by all queue sets.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static PACKET_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Value delivered on a packet's completion signal. Exactly one is ever sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The packet was dequeued at the given instant; the caller should execute.
    Dispatched(Instant),
    /// The packet waited past the request wait limit and was evicted; the caller must not execute.
    TimedOut,
}

/// A single queued unit of work.
///
/// Each [`Packet`] lives in exactly one [`Queue`](crate::queue::Queue) until it is either
/// dispatched or evicted. Both paths consume the packet, so the completion signal can fire at
/// most once and the packet can never be reused.
#[derive(Debug)]
pub struct Packet {
    pub id: u64,
    /// Stable identifier of the queue holding this packet.
    pub queue_id: u64,
    pub enqueue_time: Instant,
    /// Stamped when the packet is dequeued for service.
    pub start_time: Option<Instant>,
    completion: Sender<Signal>,
}

impl Packet {
    /// Create a packet bound for `queue_id` together with the receiving half of its signal.
    pub(crate) fn new(queue_id: u64, enqueue_time: Instant) -> (Packet, Receiver<Signal>) {
        let (tx, rx) = bounded(1);
        let packet = Packet {
            id: PACKET_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            queue_id,
            enqueue_time,
            start_time: None,
            completion: tx,
        };
        (packet, rx)
    }

    /// Whether the packet has waited strictly longer than allowed by `cutoff`.
    pub fn expired(&self, cutoff: Instant) -> bool {
        self.enqueue_time < cutoff
    }

    /// Stamp the start time and tell the waiter to execute.
    ///
    /// Returns `false` when nobody is listening any more (the ticket was dropped), in which case
    /// the caller must not account the packet as executing.
    pub(crate) fn dispatch(mut self, now: Instant) -> bool {
        self.start_time = Some(now);
        self.completion.try_send(Signal::Dispatched(now)).is_ok()
    }

    /// Tell the waiter its request timed out in the queue.
    pub(crate) fn time_out(self) {
        // A dropped ticket has nothing left to notify.
        let _ = self.completion.try_send(Signal::TimedOut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn dispatch_delivers_start_time_once() {
        let now = Instant::now();
        let (packet, rx) = Packet::new(7, now);
        assert_eq!(packet.queue_id, 7);
        let later = now + Duration::from_millis(3);
        assert!(packet.dispatch(later));
        assert_eq!(rx.try_recv().unwrap(), Signal::Dispatched(later));
        // The sender was consumed with the packet.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dispatch_reports_abandoned_waiter() {
        let (packet, rx) = Packet::new(0, Instant::now());
        drop(rx);
        assert!(!packet.dispatch(Instant::now()));
    }

    #[test]
    fn expiry_is_strictly_before_cutoff() {
        let now = Instant::now();
        let (packet, _rx) = Packet::new(0, now);
        assert!(!packet.expired(now));
        assert!(packet.expired(now + Duration::from_nanos(1)));
    }

    #[test]
    fn packet_ids_are_unique() {
        let now = Instant::now();
        let (a, _ra) = Packet::new(0, now);
        let (b, _rb) = Packet::new(0, now);
        assert_ne!(a.id, b.id);
    }
}
