//! Polled timer scheduler keyed by symbolic event names.
//!
//! Recurring timers are not built in; a handler that wants a heartbeat
//! reschedules explicitly when it fires (see `crate::hsm`'s `Heartbeat`
//! handling). This keeps the scheduler stateless beyond its pending set.

use crate::error::TimerError;
use crate::event::EventName;

/// A single pending timer.
#[derive(Debug, Clone)]
struct TimerEntry {
    id: u64,
    deadline_ns: i64,
    event_name: EventName,
    /// Monotonically increasing insertion order, used to break ties
    /// between timers with equal deadlines.
    seq: u64,
}

/// Fires named timers when their deadline has passed. Preallocated;
/// `schedule`/`cancel` never reallocate past warmup capacity under normal
/// operation (the Vec may reallocate if more timers are live at once than
/// `with_capacity` reserved, same discipline as the poller registry).
pub struct TimerScheduler {
    pending: Vec<TimerEntry>,
    next_id: u64,
    next_seq: u64,
}

impl TimerScheduler {
    pub fn with_capacity(cap: usize) -> Self {
        TimerScheduler {
            pending: Vec::with_capacity(cap),
            next_id: 1,
            next_seq: 0,
        }
    }

    fn insert(&mut self, deadline_ns: i64, event_name: EventName) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(TimerEntry {
            id,
            deadline_ns,
            event_name,
            seq,
        });
        id
    }

    /// Schedules `event` to fire `delay_ns` after `now_ns`.
    pub fn schedule(&mut self, now_ns: i64, delay_ns: i64, event: EventName) -> Result<u64, TimerError> {
        if delay_ns < 0 {
            return Err(TimerError::InvalidTimer(format!(
                "negative delay {delay_ns}"
            )));
        }
        Ok(self.insert(now_ns + delay_ns, event))
    }

    /// Schedules `event` to fire at an absolute deadline.
    pub fn schedule_at(&mut self, deadline_ns: i64, event: EventName) -> Result<u64, TimerError> {
        Ok(self.insert(deadline_ns, event))
    }

    /// Cancels a single timer by id.
    pub fn cancel(&mut self, id: u64) -> Result<(), TimerError> {
        let before = self.pending.len();
        self.pending.retain(|t| t.id != id);
        if self.pending.len() == before {
            return Err(TimerError::TimerNotFound(id));
        }
        Ok(())
    }

    /// Cancels every timer carrying `event`, returning the count removed.
    pub fn cancel_by_name(&mut self, event: EventName) -> usize {
        let before = self.pending.len();
        self.pending.retain(|t| t.event_name != event);
        before - self.pending.len()
    }

    pub fn cancel_all(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Fires every timer due at or before `now_ns`, removing each as it
    /// fires and invoking `callback(event_name, deadline_ns)`. Ordering
    /// among timers due in the same poll is by deadline then insertion
    /// order. Returns the count fired.
    pub fn poll<F>(&mut self, now_ns: i64, mut callback: F) -> u32
    where
        F: FnMut(EventName, i64),
    {
        let mut due: Vec<usize> = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline_ns <= now_ns)
            .map(|(i, _)| i)
            .collect();
        due.sort_by_key(|&i| (self.pending[i].deadline_ns, self.pending[i].seq));

        let fired: Vec<TimerEntry> = due.iter().map(|&i| self.pending[i].clone()).collect();
        let due_set: std::collections::HashSet<u64> = fired.iter().map(|t| t.id).collect();
        self.pending.retain(|t| !due_set.contains(&t.id));

        for t in &fired {
            callback(t.event_name, t.deadline_ns);
        }
        fired.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_deadline_then_insertion_order() {
        let mut s = TimerScheduler::with_capacity(8);
        let a = EventName::new("A");
        let b = EventName::new("B");
        let c = EventName::new("C");
        s.schedule_at(100, a).unwrap();
        s.schedule_at(50, b).unwrap();
        s.schedule_at(50, c).unwrap();

        let mut order = Vec::new();
        let fired = s.poll(1000, |name, _| order.push(name));
        assert_eq!(fired, 3);
        assert_eq!(order, vec![b, c, a]);
        assert!(s.is_empty());
    }

    #[test]
    fn cancel_by_name_removes_all_matching() {
        let mut s = TimerScheduler::with_capacity(8);
        let hb = EventName::new("Heartbeat");
        let other = EventName::new("Other");
        s.schedule_at(10, hb).unwrap();
        s.schedule_at(20, hb).unwrap();
        s.schedule_at(30, other).unwrap();

        assert_eq!(s.cancel_by_name(hb), 2);
        assert_eq!(s.len(), 1);
        let mut order = Vec::new();
        s.poll(1000, |name, _| order.push(name));
        assert_eq!(order, vec![other]);
    }

    #[test]
    fn cancel_unknown_id_errors() {
        let mut s = TimerScheduler::with_capacity(1);
        assert!(matches!(s.cancel(42), Err(TimerError::TimerNotFound(42))));
    }

    #[test]
    fn only_due_timers_fire() {
        let mut s = TimerScheduler::with_capacity(4);
        let e = EventName::new("E");
        s.schedule_at(1_000_000, e).unwrap();
        let fired = s.poll(999_999, |_, _| panic!("should not fire yet"));
        assert_eq!(fired, 0);
        let fired = s.poll(1_000_000, |_, _| {});
        assert_eq!(fired, 1);
    }
}
