use std::collections::{HashSet, VecDeque};

/// Bounded recent-set of processed update ids. Telegram re-delivers a webhook
/// update when it doesn't get a timely 200, so an id seen twice within the
/// window is a duplicate delivery, not a new event.
pub struct RecentUpdates {
    capacity: usize,
    seen: HashSet<i64>,
    order: VecDeque<i64>,
}

impl RecentUpdates {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Records an update id. Returns `false` when the id was already present,
    /// i.e. the delivery should be dropped.
    pub fn insert(&mut self, id: i64) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}
