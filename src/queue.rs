//! Per-queue fairness bookkeeping.

use crate::packet::Packet;
use std::collections::VecDeque;
use std::time::Instant;

/// FIFO of packets plus the virtual-time state the fair-queuing dispatcher needs.
///
/// `index` mirrors the queue's position inside its queue set and is used to garbage-collect
/// queues beyond the desired count once they drain. `id` never changes, so packets and
/// in-flight requests can find their queue again after earlier queues were removed.
#[derive(Debug)]
pub struct Queue {
    pub(crate) id: u64,
    pub(crate) packets: VecDeque<Packet>,
    pub(crate) virtual_start: f64,
    pub(crate) requests_executing: usize,
    pub(crate) index: usize,
}

impl Queue {
    pub fn new(id: u64, index: usize) -> Self {
        Self {
            id,
            packets: VecDeque::new(),
            virtual_start: 0.0,
            requests_executing: 0,
            index,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn virtual_start(&self) -> f64 {
        self.virtual_start
    }

    pub fn requests_executing(&self) -> usize {
        self.requests_executing
    }

    /// No packets waiting and nothing executing.
    pub fn is_drained(&self) -> bool {
        self.packets.is_empty() && self.requests_executing == 0
    }

    /// Either waiting packets or executing requests.
    pub fn is_active(&self) -> bool {
        !self.is_drained()
    }

    /// Virtual finish time of the packet at position `j` (0 = head) given service estimate `g`.
    pub fn virtual_finish(&self, j: usize, g: f64) -> f64 {
        (j + 1) as f64 * g + self.virtual_start
    }

    pub(crate) fn enqueue(&mut self, packet: Packet) {
        self.packets.push_back(packet);
    }

    pub(crate) fn dequeue(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    /// Evict the expired prefix of the queue, signalling each evicted waiter.
    ///
    /// Packets are ordered oldest first, so the scan stops at the first packet that is still
    /// within its wait limit. Returns the number of packets removed.
    pub(crate) fn remove_expired(&mut self, cutoff: Instant) -> usize {
        let expired = self
            .packets
            .iter()
            .position(|packet| !packet.expired(cutoff))
            .unwrap_or(self.packets.len());
        for packet in self.packets.drain(..expired) {
            packet.time_out();
        }
        expired
    }
}
