//! Fixed set of atomic observability counters, labelled by
//! `(agent_id, agent_name)` for an out-of-process sidecar.

use std::sync::atomic::{AtomicU64, Ordering};

/// The small, fixed set of counters every agent exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterName {
    TotalDutyCycles,
    TotalWorkDone,
    PropertiesPublished,
}

impl CounterName {
    fn as_str(self) -> &'static str {
        match self {
            CounterName::TotalDutyCycles => "TotalDutyCycles",
            CounterName::TotalWorkDone => "TotalWorkDone",
            CounterName::PropertiesPublished => "PropertiesPublished",
        }
    }
}

/// A single named, atomically updated counter with a display label of
/// `"<counter_name>: NodeId=<id> Name=<name>"`.
pub struct Counter {
    label: String,
    value: AtomicU64,
}

impl Counter {
    fn new(name: CounterName, agent_id: u64, agent_name: &str) -> Self {
        Counter {
            label: format!("{}: NodeId={} Name={}", name.as_str(), agent_id, agent_name),
            value: AtomicU64::new(0),
        }
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Holds every counter an agent exposes. Constructed once at startup;
/// updates are lock-free atomic ops on the hot path.
pub struct Counters {
    pub total_duty_cycles: Counter,
    pub total_work_done: Counter,
    pub properties_published: Counter,
}

impl Counters {
    pub fn new(agent_id: u64, agent_name: &str) -> Self {
        Counters {
            total_duty_cycles: Counter::new(CounterName::TotalDutyCycles, agent_id, agent_name),
            total_work_done: Counter::new(CounterName::TotalWorkDone, agent_id, agent_name),
            properties_published: Counter::new(CounterName::PropertiesPublished, agent_id, agent_name),
        }
    }

    /// Called once per duty cycle after the poller registry has run.
    pub fn record_duty_cycle(&self, work_done: u32) {
        self.total_duty_cycles.increment();
        self.total_work_done.add(work_done as u64);
    }

    /// Out-of-process observability close: a no-op placeholder for
    /// whatever the sidecar's deregistration hook requires. Exists so
    /// `BaseAgent::on_close` has a single call site regardless of the
    /// transport's shutdown semantics.
    pub fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_matches_documented_format() {
        let c = Counters::new(7, "demo");
        assert_eq!(c.total_duty_cycles.label(), "TotalDutyCycles: NodeId=7 Name=demo");
    }

    #[test]
    fn record_duty_cycle_bumps_both_counters() {
        let c = Counters::new(1, "a");
        c.record_duty_cycle(3);
        assert_eq!(c.total_duty_cycles.get(), 1);
        assert_eq!(c.total_work_done.get(), 3);
        c.record_duty_cycle(2);
        assert_eq!(c.total_duty_cycles.get(), 2);
        assert_eq!(c.total_work_done.get(), 5);
    }
}
