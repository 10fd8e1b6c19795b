//! Checks the zero-allocation claim from `SPEC_FULL.md` §5/§8a: once an
//! agent has warmed up (on_start, plus a full timer period's worth of
//! duty cycles so every preallocated buffer has been touched at least
//! once), a further duty cycle performs no net heap allocation.
//!
//! Only runs under `--features test-alloc-counter`; the counting
//! allocator is process-global, so it is unsuitable for a normal test
//! binary that shares a process with unrelated tests.

#![cfg(feature = "test-alloc-counter")]

use std::collections::HashMap;

use rtc_agent::agent::BaseAgent;
use rtc_agent::alloc_counter::{live_bytes, CountingAllocator};
use rtc_agent::clock::ManualClock;
use rtc_agent::config;
use rtc_agent::property::Property;
use rtc_agent::transport::MemoryTransport;
use rtc_agent_derive::PropertyStore;

#[global_allocator]
static ALLOC: CountingAllocator = CountingAllocator;

#[derive(PropertyStore)]
struct SensorProperties {
    #[property(mode = "rw")]
    temperature: Property<f64>,
}

fn demo_config() -> config::AgentConfig {
    let mut env = HashMap::new();
    env.insert("BLOCK_NAME", "sensor");
    env.insert("BLOCK_ID", "1");
    env.insert("STATUS_URI", "memory://status");
    env.insert("STATUS_STREAM_ID", "1");
    env.insert("CONTROL_URI", "memory://control");
    env.insert("CONTROL_STREAM_ID", "2");
    env.insert("HEARTBEAT_PERIOD_NS", "1000000");
    config::from_env(config::lookup_from_map(env)).unwrap()
}

#[test]
fn duty_cycle_after_warmup_allocates_nothing() {
    let transport = MemoryTransport::new();
    let mut agent: BaseAgent<ManualClock, SensorProperties, _, _> = BaseAgent::new(
        demo_config(),
        ManualClock(0),
        SensorProperties { temperature: Property::new(0.0) },
        slog::Logger::root(slog::Discard, slog::o!()),
        |uri, stream_id| transport.add_publication(uri, stream_id),
        |uri, stream_id| transport.add_subscription(uri, stream_id),
    );
    agent.on_start().unwrap();

    // Warm up: run past one full heartbeat period so the heartbeat timer
    // has fired and rescheduled at least once, touching every
    // preallocated path (timers, proxies, counters).
    for cycle in 1..=5 {
        agent.state_mut().clock_source_mut().0 = cycle * 1_000_000;
        agent.do_work();
    }

    let before = live_bytes();
    agent.state_mut().clock_source_mut().0 += 1;
    agent.do_work();
    let after = live_bytes();

    assert_eq!(after, before, "duty cycle allocated net {} bytes after warmup", after - before);

    agent.on_close();
}
