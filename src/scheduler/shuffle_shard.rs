//! Shuffle sharding: deal a small hand of queues out of a large deck.
//!
//! Two flows only collide completely when every card in their hands matches, so a heavy flow
//! can hurt at most the few flows that share its entire hand.
//!
//! Algorithm:
//! 1. Start from the ascending list of all queue indices
//! 2. For each card: take `hash % remaining` as a position, divide the hash by `remaining`
//! 3. Remove the element at that position from the list (order preserving) and deal it
//! 4. Among the dealt queues, pick the one with the fewest waiting packets (first one wins ties)

/// Deal `hand_size` distinct queue indices from `0..num_queues`.
///
/// The hand is clamped to `num_queues`. The result is fully determined by the arguments.
pub fn deal_hand(hash: u64, num_queues: usize, hand_size: usize) -> Vec<usize> {
    let mut hand = Vec::with_capacity(hand_size.min(num_queues));
    deal(hash, num_queues, hand_size, |index| hand.push(index));
    hand
}

/// Pick the shortest queue out of the hand dealt for `hash`.
///
/// `len_of` reports how many packets queue `index` currently holds. Returns 0 when there are
/// no queues at all; callers keep at least one queue around.
pub fn choose_queue_idx<F>(hash: u64, num_queues: usize, hand_size: usize, len_of: F) -> usize
where
    F: Fn(usize) -> usize,
{
    let mut best: Option<(usize, usize)> = None;
    deal(hash, num_queues, hand_size, |index| {
        let len = len_of(index);
        if best.map_or(true, |(_, shortest)| len < shortest) {
            best = Some((index, len));
        }
    });
    best.map_or(0, |(index, _)| index)
}

fn deal<F>(mut hash: u64, num_queues: usize, hand_size: usize, mut visit: F)
where
    F: FnMut(usize),
{
    let mut remaining: Vec<usize> = (0..num_queues).collect();
    for _ in 0..hand_size.min(num_queues) {
        let left = remaining.len() as u64;
        let position = (hash % left) as usize;
        hash /= left;
        visit(remaining.remove(position));
    }
}
