use std::cmp::Ordering;
use std::time::Instant;

/// An entry in the reactor timer queue.
///
/// `TimerEntry` represents a scheduled one-shot firing at a specific
/// deadline. It is stored inside a binary heap, while the callback
/// itself lives in the reactor's timer slab under `key`.
///
/// Disarming a timer only removes the slab slot; the heap entry becomes
/// stale and is skipped once it surfaces, which is detected by comparing
/// `seq` with the sequence number recorded in the slot.
pub(crate) struct TimerEntry {
    /// The time at which the timer should fire.
    pub(crate) deadline: Instant,

    /// Arming order, used to break deadline ties.
    pub(crate) seq: u64,

    /// Slab key of the armed callback.
    pub(crate) key: usize,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    /// Orders timer entries by deadline, then by arming order.
    ///
    /// The comparison is **reversed** so that a `BinaryHeap<TimerEntry>`
    /// behaves as a min-heap: the earliest deadline is popped first, and
    /// timers sharing a deadline fire in the order they were armed.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BinaryHeap;
    use std::time::Duration;

    #[test]
    fn earliest_deadline_pops_first() {
        let now = Instant::now();
        let mut heap = BinaryHeap::new();

        for (seq, ms) in [(0, 30), (1, 10), (2, 20)] {
            heap.push(TimerEntry {
                deadline: now + Duration::from_millis(ms),
                seq,
                key: seq as usize,
            });
        }

        let order: Vec<usize> = std::iter::from_fn(|| heap.pop().map(|e| e.key)).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn equal_deadlines_fire_in_arming_order() {
        let deadline = Instant::now();
        let mut heap = BinaryHeap::new();

        for seq in [3, 1, 2] {
            heap.push(TimerEntry {
                deadline,
                seq,
                key: seq as usize,
            });
        }

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|e| e.seq)).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }
}
