//! Priority-ordered poller registry with deferred add/remove.
//!
//! Adapted from the teacher's `batch-system::Poller`/`PollHandler` split
//! (a dedicated handler trait driven by a registry that owns scheduling
//! policy) but collapsed onto a single thread: there is one poller list,
//! no cross-thread mailbox, and structural mutation is deferred to
//! between duty cycles rather than released back to a router.

use std::cmp::Ordering;

use crate::error::AgentError;

/// A named, priority-ordered unit of work invoked once per duty cycle.
/// Lower `priority` runs first; equal priorities run in registration
/// order. Implementations capture whatever they need by holding state in
/// `Self`, matching the redesign note that closures-capturing-the-agent
/// become a trait method taking `&mut Agent` instead.
pub trait Poller<A> {
    /// Runs one duty cycle's worth of work for this poller, returning the
    /// amount of work done (added to the cycle's total).
    fn poll(&mut self, agent: &mut A) -> u32;
}

/// A boxed poller plus its registration metadata.
struct Entry<A> {
    name: &'static str,
    priority: i32,
    poller: Box<dyn Poller<A>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateName,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateName => write!(f, "duplicate poller name"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<RegistryError> for AgentError {
    fn from(e: RegistryError) -> Self {
        AgentError::AgentConfiguration {
            message: e.to_string(),
        }
    }
}

/// The active poller list plus its two pending-mutation buffers. See
/// `SPEC_FULL.md` §4.2 for the apply algorithm.
pub struct PollerRegistry<A> {
    active: Vec<Entry<A>>,
    pending_add: Vec<Entry<A>>,
    pending_remove: Vec<&'static str>,
}

impl<A> Default for PollerRegistry<A> {
    fn default() -> Self {
        PollerRegistry::with_capacity(8)
    }
}

impl<A> PollerRegistry<A> {
    pub fn with_capacity(cap: usize) -> Self {
        PollerRegistry {
            active: Vec::with_capacity(cap),
            pending_add: Vec::with_capacity(cap),
            pending_remove: Vec::with_capacity(cap),
        }
    }

    fn name_in_active_or_pending_add(&self, name: &str) -> bool {
        let active_and_not_removing =
            self.active.iter().any(|e| e.name == name) && !self.pending_remove.contains(&name);
        active_and_not_removing || self.pending_add.iter().any(|e| e.name == name)
    }

    /// Queues `poller` for addition; it first runs in the *next* cycle.
    /// Fails if `name` is already active or already pending addition. A
    /// name that is only in `pending_remove` is allowed, which is what
    /// makes unregister-then-register within one cycle work.
    pub fn register(
        &mut self,
        name: &'static str,
        priority: i32,
        poller: Box<dyn Poller<A>>,
    ) -> Result<(), RegistryError> {
        if self.name_in_active_or_pending_add(name) {
            return Err(RegistryError::DuplicateName);
        }
        self.pending_add.push(Entry {
            name,
            priority,
            poller,
        });
        Ok(())
    }

    /// Queues `name` for removal (idempotent). If `name` is only pending
    /// addition, cancels that addition instead of queuing a removal.
    pub fn unregister(&mut self, name: &str) {
        if let Some(idx) = self.pending_add.iter().position(|e| e.name == name) {
            self.pending_add.remove(idx);
            return;
        }
        if self.active.iter().any(|e| e.name == name) && !self.pending_remove.contains(&name) {
            // `name` is `&str` here but pending_remove stores `&'static str`;
            // active entries are always `&'static str` so this lookup is safe
            // to promote via the active entry itself.
            if let Some(e) = self.active.iter().find(|e| e.name == name) {
                self.pending_remove.push(e.name);
            }
        }
    }

    /// Immediately wipes the active set and both pending buffers,
    /// returning the number of pollers removed from `active`.
    pub fn clear(&mut self) -> usize {
        let n = self.active.len();
        self.active.clear();
        self.pending_add.clear();
        self.pending_remove.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.active.iter().any(|e| e.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.active.iter().map(|e| e.name)
    }

    /// Runs every active poller, in stored (priority-then-FIFO) order,
    /// accumulating work done. Structural changes requested by a poller
    /// land in the pending buffers and are not visible to this pass.
    pub fn poll_all(&mut self, agent: &mut A) -> u32 {
        let mut total = 0u32;
        for entry in &mut self.active {
            total = total.saturating_add(entry.poller.poll(agent));
        }
        total
    }

    /// Applies pending removals, then pending additions, restoring the
    /// `active` list's priority-then-FIFO invariant. Called once at the
    /// end of every duty cycle.
    pub fn apply(&mut self) {
        if !self.pending_remove.is_empty() {
            let remove: &[&'static str] = &self.pending_remove;
            self.active.retain(|e| !remove.contains(&e.name));
            self.pending_remove.clear();
        }
        for entry in self.pending_add.drain(..) {
            let idx = match self
                .active
                .binary_search_by(|probe| match probe.priority.cmp(&entry.priority) {
                    Ordering::Equal => Ordering::Less,
                    other => other,
                }) {
                Ok(i) | Err(i) => i,
            };
            self.active.insert(idx, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingPoller(u32);
    impl<A> Poller<A> for CountingPoller {
        fn poll(&mut self, _agent: &mut A) -> u32 {
            self.0
        }
    }

    struct RecordingPoller {
        name: &'static str,
        log: std::rc::Rc<std::cell::RefCell<Vec<&'static str>>>,
    }
    impl Poller<()> for RecordingPoller {
        fn poll(&mut self, _agent: &mut ()) -> u32 {
            self.log.borrow_mut().push(self.name);
            1
        }
    }

    #[test]
    fn priority_then_fifo_ordering() {
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut reg: PollerRegistry<()> = PollerRegistry::default();
        for (name, prio) in [("A", 5), ("B", 100), ("C", 20), ("D", 500)] {
            reg.register(
                name,
                prio,
                Box::new(RecordingPoller { name, log: log.clone() }),
            )
            .unwrap();
        }
        reg.apply();
        let mut agent = ();
        reg.poll_all(&mut agent);
        assert_eq!(*log.borrow(), vec!["A", "C", "B", "D"]);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut reg: PollerRegistry<()> = PollerRegistry::default();
        reg.register("P", 150, Box::new(RecordingPoller { name: "P", log: log.clone() }))
            .unwrap();
        reg.register("Q", 150, Box::new(RecordingPoller { name: "Q", log: log.clone() }))
            .unwrap();
        reg.apply();
        reg.poll_all(&mut ());
        assert_eq!(*log.borrow(), vec!["P", "Q"]);
    }

    #[test]
    fn registered_poller_runs_from_next_cycle() {
        let mut reg: PollerRegistry<()> = PollerRegistry::default();
        reg.register("a", 0, Box::new(CountingPoller(1))).unwrap();
        reg.apply();
        assert_eq!(reg.poll_all(&mut ()), 1);

        reg.register("b", 0, Box::new(CountingPoller(1))).unwrap();
        // not yet applied: "b" must not run this cycle
        assert_eq!(reg.poll_all(&mut ()), 1);
        reg.apply();
        assert_eq!(reg.poll_all(&mut ()), 2);
    }

    #[test]
    fn unregistered_poller_stops_next_cycle() {
        let mut reg: PollerRegistry<()> = PollerRegistry::default();
        reg.register("a", 0, Box::new(CountingPoller(1))).unwrap();
        reg.apply();
        reg.unregister("a");
        // still active this cycle
        assert_eq!(reg.poll_all(&mut ()), 1);
        reg.apply();
        assert_eq!(reg.poll_all(&mut ()), 0);
    }

    #[test]
    fn register_then_unregister_same_cycle_is_noop_after_apply() {
        let mut reg: PollerRegistry<()> = PollerRegistry::default();
        reg.register("n", 0, Box::new(CountingPoller(1))).unwrap();
        reg.unregister("n");
        reg.apply();
        assert!(!reg.contains("n"));
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn unregister_then_register_same_cycle_yields_new_entry() {
        let mut reg: PollerRegistry<()> = PollerRegistry::default();
        reg.register("n", 0, Box::new(CountingPoller(1))).unwrap();
        reg.apply();
        reg.unregister("n");
        reg.register("n", 7, Box::new(CountingPoller(3))).unwrap();
        reg.apply();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.poll_all(&mut ()), 3);
    }

    #[test]
    fn duplicate_register_is_rejected() {
        let mut reg: PollerRegistry<()> = PollerRegistry::default();
        reg.register("n", 0, Box::new(CountingPoller(1))).unwrap();
        reg.apply();
        assert_eq!(
            reg.register("n", 0, Box::new(CountingPoller(1))),
            Err(RegistryError::DuplicateName)
        );
    }

    #[test]
    fn clear_wipes_active_and_pending() {
        let mut reg: PollerRegistry<()> = PollerRegistry::default();
        reg.register("n", 0, Box::new(CountingPoller(1))).unwrap();
        reg.apply();
        reg.register("m", 0, Box::new(CountingPoller(1))).unwrap();
        assert_eq!(reg.clear(), 1);
        reg.apply();
        assert_eq!(reg.len(), 0);
    }
}
