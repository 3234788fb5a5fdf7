use std::cmp::Ordering;
use std::time::Instant;

/// An entry in the reactor timer queue.
///
/// `TimerEntry` represents a scheduled callback at a specific deadline.
/// The callback itself lives in the reactor's table of armed timers; an
/// entry whose id is no longer in that table has been disarmed and is
/// skipped when it reaches the front of the heap.
pub(crate) struct TimerEntry {
    /// The time at which the timer should fire.
    pub(crate) deadline: Instant,

    /// Identifier of the armed callback.
    pub(crate) id: u64,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Ord for TimerEntry {
    /// Orders timer entries by deadline, then by arming order.
    ///
    /// The comparison is **reversed** so that a `BinaryHeap<TimerEntry>`
    /// behaves as a min-heap, where the earliest deadline is popped first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
