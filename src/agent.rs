//! `BaseAgent`: wires the clock cache, property store, id generator,
//! timer scheduler, poller registry, publication registry, counters,
//! proxies, and stream adapters into the single duty-cycle loop
//! described in `SPEC_FULL.md` §4.1 and §4.8.
//!
//! The registry that owns the pollers is kept as a sibling field to
//! everything the pollers operate on ([`AgentState`]), not a member of
//! it — the same split the teacher's `batch-system::Poller` /
//! `PollHandler` draws between the router doing the polling and the
//! peer state a poll handler mutates. Collapsing the two into one
//! struct would mean a poller's `&mut AgentState` argument aliases the
//! `PollerRegistry` currently iterating it, which the borrow checker
//! correctly refuses.

use crate::adapter::{ControlAdapter, InputAdapter};
use crate::clock::{ClockCache, ClockSource};
use crate::config::AgentConfig;
use crate::error::{AgentError, AgentTermination};
use crate::event::{Event, EventName, Payload};
use crate::hsm::{Effect, StateMachine};
use crate::id::IdGenerator;
use crate::poller::{Poller, PollerRegistry};
use crate::property::{PropertyStore, PropertyValue};
use crate::proxy::MessageProxy;
use crate::publication::PublicationRegistry;
use crate::timer::TimerScheduler;
use crate::transport::{Publication, Subscription};
use crate::counters::Counters;

fn heartbeat_name() -> EventName {
    EventName::new("Heartbeat")
}
fn stats_update_name() -> EventName {
    EventName::new("StatsUpdate")
}
fn gc_stats_name() -> EventName {
    EventName::new("GCStats")
}

/// Scratch state for stats derivation, per §4.8's field list.
#[derive(Debug, Default, Clone, Copy)]
struct Stats {
    last_stats_time_ns: i64,
    last_msg_count: u64,
    last_work_count: u64,
}

fn payload_to_value(payload: Payload) -> PropertyValue {
    match payload {
        Payload::Nothing => PropertyValue::Nothing,
        Payload::Int(v) => PropertyValue::Int(v),
        Payload::Float(v) => PropertyValue::Float(v),
        Payload::Bool(v) => PropertyValue::Bool(v),
        Payload::Symbol(s) => PropertyValue::Symbol(s),
        Payload::Text(s) => PropertyValue::String(s),
    }
}

/// Everything a poller operates on: the property store, timers, proxies,
/// adapters, state machine, and bookkeeping. Does *not* include the
/// poller registry itself — see the module doc comment.
pub struct AgentState<C, PS, Pub, Sub> {
    clock: ClockCache<C>,
    properties: PS,
    id_gen: IdGenerator,
    timers: TimerScheduler,
    publications: PublicationRegistry,
    counters: Counters,
    state_machine: StateMachine,
    status_proxy: Option<MessageProxy<Pub>>,
    property_proxies: Vec<MessageProxy<Pub>>,
    control_adapter: Option<ControlAdapter<Sub>>,
    input_adapter: Option<InputAdapter<Sub>>,
    config: AgentConfig,
    stats: Stats,
    log: slog::Logger,
}

impl<C, PS, Pub, Sub> AgentState<C, PS, Pub, Sub>
where
    C: ClockSource,
    PS: PropertyStore,
    Pub: Publication,
    Sub: Subscription,
{
    pub fn properties(&self) -> &PS {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut PS {
        &mut self.properties
    }

    pub fn publications_mut(&mut self) -> &mut PublicationRegistry {
        &mut self.publications
    }

    pub fn timers_mut(&mut self) -> &mut TimerScheduler {
        &mut self.timers
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn current_state(&self) -> crate::hsm::State {
        self.state_machine.current()
    }

    pub fn now_ns(&self) -> i64 {
        self.clock.now_ns()
    }

    /// Direct access to the underlying clock source, for test/demo
    /// drivers built on [`crate::clock::ManualClock`].
    pub fn clock_source_mut(&mut self) -> &mut C {
        self.clock.source_mut()
    }

    fn status_proxy_mut(&mut self) -> &mut MessageProxy<Pub> {
        self.status_proxy
            .as_mut()
            .expect("status proxy used before on_start or after on_close")
    }

    /// `stream_index` is the spec's 1-based index into the configured
    /// `PUB_DATA_URI_*`/`PUB_DATA_STREAM_*` set (`PublicationConfig::
    /// stream_index`'s own doc comment); `property_proxies` is the
    /// 0-based `Vec` those were collected into, so every lookup through
    /// this method shifts by one.
    fn property_proxy_mut(&mut self, stream_index: usize) -> Result<&mut MessageProxy<Pub>, AgentError> {
        stream_index
            .checked_sub(1)
            .and_then(|i| self.property_proxies.get_mut(i))
            .ok_or(AgentError::StreamNotFound {
                stream_name: "property",
                stream_index,
            })
    }

    /// Dispatches `event` through the state machine, carrying out every
    /// effect it returns. A non-terminating error encountered while
    /// carrying out an effect is converted to an `Error` event and
    /// re-dispatched rather than propagated, per §4.4's exception policy;
    /// only [`AgentTermination`] unwinds out of this call.
    pub fn dispatch(&mut self, event: Event) -> Result<(), AgentTermination> {
        let source_event = event.name();
        if let Event::Error { message, .. } = &event {
            slog::warn!(self.log, "agent error"; "source_event" => source_event.as_str(), "message" => message);
        }
        let effects = self.state_machine.dispatch(&event)?;
        for effect in effects {
            if let Err(message) = self.apply_effect(effect) {
                self.dispatch(Event::Error { source_event, message })?;
            }
        }
        Ok(())
    }

    fn apply_effect(&mut self, effect: Effect) -> Result<(), String> {
        match effect {
            Effect::PublishState => {
                let state_name = self.state_machine.current().name();
                slog::info!(self.log, "state transition"; "state" => state_name);
                self.publish_status(EventName::new("StateChange"), PropertyValue::Symbol(EventName::new(state_name)))
            }
            Effect::PublishResponse { source_event, message } => {
                self.publish_status(source_event, PropertyValue::String(message))
            }
            Effect::RescheduleHeartbeat { now_ns } => self
                .timers
                .schedule(now_ns, self.config.heartbeat_period_ns, heartbeat_name())
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Effect::PublishProperty(handle) => self.publish_due_property(handle),
            Effect::PublishAllProperties => self.publish_all_properties(),
            Effect::PropertyAccess { name, value } => self.handle_property_access(name, value),
        }
    }

    fn publish_status(&mut self, key: EventName, value: PropertyValue) -> Result<(), String> {
        let correlation_id = self.id_gen.next_correlation_id();
        let now_ns = self.clock.now_ns();
        let published = self
            .status_proxy_mut()
            .publish(correlation_id, now_ns, key, value)
            .map_err(|e| e.to_string())?;
        if !published {
            slog::warn!(self.log, "dropped status publish"; "field" => key.as_str());
        }
        Ok(())
    }

    fn publish_due_property(&mut self, handle: crate::publication::PublicationHandle) -> Result<(), String> {
        let cfg = self.publications.get(handle).clone();
        let Some(key) = PS::key_by_name(cfg.field) else {
            return Err(format!("property {:?} not found", cfg.field));
        };
        let value = self.properties.get(key).map_err(|e| e.to_string())?;
        let correlation_id = self.id_gen.next_correlation_id();
        let now_ns = self.clock.now_ns();
        let published = self
            .property_proxy_mut(cfg.stream_index)
            .map_err(|e| e.to_string())?
            .publish(correlation_id, now_ns, cfg.field, value)
            .map_err(|e| e.to_string())?;
        if !published {
            slog::warn!(self.log, "dropped property publish"; "field" => cfg.field.as_str());
        }
        Ok(())
    }

    fn publish_all_properties(&mut self) -> Result<(), String> {
        for &key in PS::keys() {
            if !PS::access_mode(key).is_readable() {
                continue;
            }
            let value = self.properties.get(key).map_err(|e| e.to_string())?;
            let name = PS::key_name(key);
            self.publish_status(name, value)?;
        }
        Ok(())
    }

    fn handle_property_access(&mut self, name: EventName, value: Payload) -> Result<(), String> {
        let Some(key) = PS::key_by_name(name) else {
            return Err(format!("property {name:?} not found"));
        };
        if matches!(value, Payload::Nothing) {
            let current = self.properties.get(key).map_err(|e| e.to_string())?;
            self.publish_status(name, current)
        } else {
            let now_ns = self.clock.now_ns();
            self.properties
                .set(key, payload_to_value(value), now_ns)
                .map_err(|e| e.to_string())?;
            let echoed = self.properties.get(key).map_err(|e| e.to_string())?;
            self.publish_status(name, echoed)
        }
    }

    fn poll_input_streams(&mut self) -> u32 {
        let Some(mut adapter) = self.input_adapter.take() else {
            return 0;
        };
        let now_ns = self.clock.now_ns();
        let mut events = Vec::new();
        let delivered = adapter.poll(now_ns, &mut |e| events.push(e));
        self.input_adapter = Some(adapter);
        for event in events {
            let _ = self.dispatch(event);
        }
        delivered
    }

    fn poll_control_stream(&mut self) -> u32 {
        let Some(mut adapter) = self.control_adapter.take() else {
            return 0;
        };
        let now_ns = self.clock.now_ns();
        let mut events = Vec::new();
        let delivered = adapter.poll(now_ns, &mut |e| events.push(e));
        self.control_adapter = Some(adapter);
        for event in events {
            let _ = self.dispatch(event);
        }
        delivered
    }

    fn poll_properties(&mut self) -> u32 {
        let now_ns = self.clock.now_ns();
        let mut due = Vec::new();
        for (handle, cfg) in self.publications.iter() {
            let Some(key) = PS::key_by_name(cfg.field) else {
                continue;
            };
            let property_ts_ns = self.properties.last_update_ns(key);
            if cfg
                .strategy
                .should_publish(cfg.last_published_ns, property_ts_ns, now_ns)
            {
                due.push((handle, property_ts_ns));
            }
        }
        let mut work = 0u32;
        for (handle, property_ts_ns) in due {
            let _ = self.dispatch(Event::PublishProperty(handle));
            self.publications.record_published(handle, property_ts_ns, now_ns);
            self.counters.properties_published.increment();
            work += 1;
        }
        work
    }

    fn poll_timers(&mut self) -> u32 {
        let now_ns = self.clock.now_ns();
        let mut fired = Vec::new();
        let count = self.timers.poll(now_ns, |name, deadline_ns| fired.push((name, deadline_ns)));
        for (name, deadline_ns) in fired {
            if name == stats_update_name() {
                self.handle_stats_update(deadline_ns);
            } else if name == gc_stats_name() {
                self.handle_gc_stats(deadline_ns);
            } else if name == heartbeat_name() {
                let _ = self.dispatch(Event::Heartbeat { now_ns: deadline_ns });
            } else {
                let _ = self.dispatch(Event::Custom {
                    name,
                    payload: Payload::Nothing,
                });
            }
        }
        count
    }

    /// No dedicated HSM event covers periodic stats derivation; it is
    /// scratch bookkeeping only (deltas against the last sample), then
    /// reschedules itself.
    fn handle_stats_update(&mut self, deadline_ns: i64) {
        self.stats.last_stats_time_ns = deadline_ns;
        self.stats.last_msg_count = self.counters.total_work_done.get();
        self.stats.last_work_count = self.counters.total_duty_cycles.get();
        let _ = self
            .timers
            .schedule(deadline_ns, self.config.stats_period_ns, stats_update_name());
    }

    /// Nothing to collect — the allocation discipline means there is no
    /// growable scratch state to trim. Kept as a no-op timer so a future
    /// allocator-backed collector has a place to hook in.
    fn handle_gc_stats(&mut self, deadline_ns: i64) {
        let _ = self
            .timers
            .schedule(deadline_ns, self.config.gc_stats_period_ns, gc_stats_name());
    }
}

struct InputStreamsPoller;
struct PropertiesPoller;
struct TimersPoller;
struct ControlStreamPoller;

impl<C, PS, Pub, Sub> Poller<AgentState<C, PS, Pub, Sub>> for InputStreamsPoller
where
    C: ClockSource,
    PS: PropertyStore,
    Pub: Publication,
    Sub: Subscription,
{
    fn poll(&mut self, agent: &mut AgentState<C, PS, Pub, Sub>) -> u32 {
        agent.poll_input_streams()
    }
}

impl<C, PS, Pub, Sub> Poller<AgentState<C, PS, Pub, Sub>> for PropertiesPoller
where
    C: ClockSource,
    PS: PropertyStore,
    Pub: Publication,
    Sub: Subscription,
{
    fn poll(&mut self, agent: &mut AgentState<C, PS, Pub, Sub>) -> u32 {
        agent.poll_properties()
    }
}

impl<C, PS, Pub, Sub> Poller<AgentState<C, PS, Pub, Sub>> for TimersPoller
where
    C: ClockSource,
    PS: PropertyStore,
    Pub: Publication,
    Sub: Subscription,
{
    fn poll(&mut self, agent: &mut AgentState<C, PS, Pub, Sub>) -> u32 {
        agent.poll_timers()
    }
}

impl<C, PS, Pub, Sub> Poller<AgentState<C, PS, Pub, Sub>> for ControlStreamPoller
where
    C: ClockSource,
    PS: PropertyStore,
    Pub: Publication,
    Sub: Subscription,
{
    fn poll(&mut self, agent: &mut AgentState<C, PS, Pub, Sub>) -> u32 {
        agent.poll_control_stream()
    }
}

/// The single-threaded, long-lived unit of work described by
/// `SPEC_FULL.md` §4.8. Neither copyable nor shareable across threads —
/// it owns `!Send` resources (the proxies' transport handles) and is
/// meant to be pinned to one thread by its runner.
pub struct BaseAgent<C, PS, Pub, Sub> {
    state: AgentState<C, PS, Pub, Sub>,
    pollers: PollerRegistry<AgentState<C, PS, Pub, Sub>>,
    started: bool,
}

impl<C, PS, Pub, Sub> BaseAgent<C, PS, Pub, Sub>
where
    C: ClockSource,
    PS: PropertyStore,
    Pub: Publication,
    Sub: Subscription,
{
    /// Builds the agent. `make_publication`/`make_subscription` bind the
    /// config's URIs to concrete transport endpoints — kept as
    /// caller-supplied closures so this module stays transport-agnostic.
    /// `log` is held for the lifetime of the agent and never replaced by
    /// a hidden global, per §6b.
    pub fn new<FPub, FSub>(
        config: AgentConfig,
        clock_source: C,
        properties: PS,
        log: slog::Logger,
        mut make_publication: FPub,
        mut make_subscription: FSub,
    ) -> Self
    where
        FPub: FnMut(&str, i32) -> Pub,
        FSub: FnMut(&str, i32) -> Sub,
    {
        let status_publication = make_publication(&config.status_uri, config.status_stream_id);
        let control_subscription = make_subscription(&config.control_uri, config.control_stream_id);

        let mut input_adapter =
            InputAdapter::with_capacity(config.sub_streams.len()).with_late_threshold(config.late_message_threshold_ns);
        for (i, s) in config.sub_streams.iter().enumerate() {
            let name: &'static str = Box::leak(format!("input-{i}").into_boxed_str());
            input_adapter.add_stream(name, make_subscription(&s.uri, s.stream_id), 4096);
        }

        let property_proxies = config
            .pub_streams
            .iter()
            .map(|s| MessageProxy::new(make_publication(&s.uri, s.stream_id), config.block_name.clone(), 4096))
            .collect();

        let state = AgentState {
            clock: ClockCache::new(clock_source),
            properties,
            id_gen: IdGenerator::new(config.block_id),
            timers: TimerScheduler::with_capacity(8),
            publications: PublicationRegistry::with_capacity(PS::keys().len()),
            counters: Counters::new(config.block_id, &config.block_name),
            state_machine: StateMachine::new(),
            status_proxy: Some(MessageProxy::new(status_publication, config.block_name.clone(), 4096)),
            property_proxies,
            control_adapter: Some(
                ControlAdapter::new(control_subscription, 4096).with_late_threshold(config.late_message_threshold_ns),
            ),
            input_adapter: Some(input_adapter),
            config,
            stats: Stats::default(),
            log,
        };

        BaseAgent {
            state,
            pollers: PollerRegistry::with_capacity(8),
            started: false,
        }
    }

    pub fn state(&self) -> &AgentState<C, PS, Pub, Sub> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AgentState<C, PS, Pub, Sub> {
        &mut self.state
    }

    pub fn pollers_mut(&mut self) -> &mut PollerRegistry<AgentState<C, PS, Pub, Sub>> {
        &mut self.pollers
    }

    /// Registers built-in pollers, schedules the recurring timers, and
    /// dispatches `AgentStarted`. Idempotent guard: calling twice is a
    /// configuration error, not silently ignored, since double
    /// registration would panic deep inside `PollerRegistry::register`.
    pub fn on_start(&mut self) -> Result<(), AgentError> {
        if self.started {
            return Err(AgentError::AgentState {
                current_state: "started",
                attempted_op: "on_start",
            });
        }
        self.pollers
            .register("input_streams", 10, Box::new(InputStreamsPoller))?;
        self.pollers.register("properties", 50, Box::new(PropertiesPoller))?;
        self.pollers.register("timers", 75, Box::new(TimersPoller))?;
        self.pollers
            .register("control_stream", 200, Box::new(ControlStreamPoller))?;
        self.pollers.apply();

        self.state.state_machine.enter_initial();
        let now_ns = self.state.clock.now_ns();
        self.state
            .timers
            .schedule(now_ns, self.state.config.heartbeat_period_ns, heartbeat_name())
            .map_err(AgentError::from)?;
        self.state
            .timers
            .schedule(now_ns, self.state.config.stats_period_ns, stats_update_name())
            .map_err(AgentError::from)?;
        self.state
            .timers
            .schedule(now_ns, self.state.config.gc_stats_period_ns, gc_stats_name())
            .map_err(AgentError::from)?;

        self.started = true;
        self.state
            .dispatch(Event::AgentStarted)
            .map_err(|_| AgentError::AgentState {
                current_state: "Exit",
                attempted_op: "on_start",
            })
    }

    /// Cancels all timers, clears all pollers, closes the counters, and
    /// drops the proxies/adapters — the transport resources they hold
    /// are released with them.
    pub fn on_close(&mut self) {
        let _ = self.state.dispatch(Event::AgentOnClose);
        self.state.timers.cancel_all();
        self.pollers.clear();
        self.state.counters.close();
        self.state.status_proxy = None;
        self.state.property_proxies.clear();
        self.state.control_adapter = None;
        self.state.input_adapter = None;
        self.started = false;
    }

    /// One duty cycle: refresh the clock, run every active poller once,
    /// apply deferred poller mutations, bump the cycle counters, and
    /// return the work done.
    pub fn do_work(&mut self) -> u32 {
        self.state.clock.refresh();
        let work = self.pollers.poll_all(&mut self.state);
        self.pollers.apply();
        self.state.counters.record_duty_cycle(work);
        work
    }
}
