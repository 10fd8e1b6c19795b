//! Hierarchical state machine driving the agent's control lifecycle.
//!
//! Fixed topology (`SPEC_FULL.md` §4.4):
//!
//! ```text
//! Root
//! ├── Startup
//! └── Top
//!     ├── Ready
//!     │   ├── Stopped
//!     │   └── Processing
//!     │       ├── Paused
//!     │       └── Playing
//!     ├── Error
//!     └── Exit
//! ```
//!
//! Transitions compute the least common ancestor of the source and target
//! leaf, run `on_exit` up to it, then `on_entry` down to the target,
//! then follow `on_initial` chains until a leaf with no further initial
//! child is reached.

use crate::error::{AgentTermination, DispatchResult};
use crate::event::{Event, EventName};

/// Every state in the fixed topology. `Root` is implicit apex and never
/// itself entered or exited — it exists only as the common ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Root,
    Startup,
    Top,
    Ready,
    Stopped,
    Processing,
    Paused,
    Playing,
    Error,
    Exit,
}

impl State {
    fn parent(self) -> Option<State> {
        match self {
            State::Root => None,
            State::Startup | State::Top => Some(State::Root),
            State::Ready | State::Error | State::Exit => Some(State::Top),
            State::Stopped | State::Processing => Some(State::Ready),
            State::Paused | State::Playing => Some(State::Processing),
        }
    }

    /// The state's initial child, if it has one. Entering a state always
    /// follows this chain down to a true leaf.
    fn initial_child(self) -> Option<State> {
        match self {
            State::Root => Some(State::Startup),
            State::Top => Some(State::Ready),
            State::Ready => Some(State::Stopped),
            State::Processing => Some(State::Paused),
            _ => None,
        }
    }

    fn ancestors_inclusive(self) -> Vec<State> {
        let mut chain = vec![self];
        let mut cur = self;
        while let Some(p) = cur.parent() {
            chain.push(p);
            cur = p;
        }
        chain
    }

    pub fn name(self) -> &'static str {
        match self {
            State::Root => "Root",
            State::Startup => "Startup",
            State::Top => "Top",
            State::Ready => "Ready",
            State::Stopped => "Stopped",
            State::Processing => "Processing",
            State::Paused => "Paused",
            State::Playing => "Playing",
            State::Error => "Error",
            State::Exit => "Exit",
        }
    }

    /// Runs as this state is left, child-before-parent along the exit
    /// path `transition_to` computes. No built-in state currently needs
    /// exit-time bookkeeping; this is the extension point agent-specific
    /// states would override.
    fn on_exit(self) {}

    /// Runs as this state is reached, parent-before-child along the
    /// entry path `transition_to` computes (including the `initial_child`
    /// cascade down to the new leaf).
    fn on_entry(self) {}
}

/// What the state machine asks the agent to do as a result of dispatching
/// one event, beyond running entry/exit actions itself. The HSM core
/// knows nothing about proxies or transports; it hands back intent and
/// `StateMachine::dispatch`'s caller (the agent) carries it out.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Publish the current leaf state as a `StateChange`/`State` response.
    PublishState,
    /// Publish `message` as a generic response to `source_event`.
    PublishResponse {
        source_event: EventName,
        message: String,
    },
    /// Reschedule the named recurring timer.
    RescheduleHeartbeat { now_ns: i64 },
    /// Invoke the property proxy for a due publication.
    PublishProperty(crate::publication::PublicationHandle),
    /// Publish every readable property's current value.
    PublishAllProperties,
    /// Dispatch a property read or write.
    PropertyAccess {
        name: EventName,
        value: crate::event::Payload,
    },
}

/// Hierarchical state machine over the fixed topology above. Carries no
/// agent-specific data itself; handlers return [`Effect`]s for the agent
/// to execute against its own property store and proxies.
pub struct StateMachine {
    current: State,
}

impl Default for StateMachine {
    fn default() -> Self {
        StateMachine::new()
    }
}

impl StateMachine {
    /// Constructs the machine at `Root`, without yet following the
    /// initial-child chain — callers must send `AgentStarted` or call
    /// [`StateMachine::enter_initial`] to reach `Startup`.
    pub fn new() -> Self {
        StateMachine { current: State::Root }
    }

    /// Follows `on_initial` from `Root` down to the first true leaf
    /// (`Startup`), the way construction is followed by `on_start` in the
    /// real lifecycle.
    pub fn enter_initial(&mut self) {
        let mut s = State::Root;
        while let Some(child) = s.initial_child() {
            s = child;
        }
        self.current = s;
    }

    pub fn current(&self) -> State {
        self.current
    }

    fn is_in(&self, state: State) -> bool {
        self.current.ancestors_inclusive().contains(&state)
    }

    /// Transitions from the current leaf to `target`'s initial-child
    /// chain: exits up to the LCA, enters down to `target`, then follows
    /// `on_initial` to the new leaf. Returns the path of states exited
    /// and entered, in order, so the agent can log or test against them.
    fn transition_to(&mut self, target: State) -> (Vec<State>, Vec<State>) {
        let from_chain = self.current.ancestors_inclusive();
        let to_chain = target.ancestors_inclusive();

        let lca = from_chain
            .iter()
            .find(|s| to_chain.contains(s))
            .copied()
            .unwrap_or(State::Root);

        let exited: Vec<State> = from_chain.into_iter().take_while(|s| *s != lca).collect();

        let mut entered: Vec<State> = to_chain.into_iter().take_while(|s| *s != lca).collect();
        entered.reverse();

        let mut leaf = target;
        while let Some(child) = leaf.initial_child() {
            entered.push(child);
            leaf = child;
        }

        for &s in &exited {
            s.on_exit();
        }
        for &s in &entered {
            s.on_entry();
        }

        self.current = leaf;
        (exited, entered)
    }

    /// Dispatches `event` against the current state, returning the
    /// effects the agent must carry out and whether the leaf state
    /// changed (in which case a `StateChange` effect is appended).
    ///
    /// `Exit`'s entry action is the one place this signals
    /// [`AgentTermination`]; every other path returns `Ok`, possibly with
    /// an empty effect list when the event has no handler in the current
    /// state (dispatch falls through silently, per §4.4's default rule
    /// being the caller's responsibility for property-keyed events).
    pub fn dispatch(&mut self, event: &Event) -> Result<Vec<Effect>, AgentTermination> {
        let before = self.current;
        let mut effects = Vec::new();

        match (self.current, event) {
            (State::Startup, Event::AgentStarted) => {
                self.transition_to(State::Top);
            }
            (State::Stopped, Event::Play) | (State::Paused, Event::Play) => {
                self.transition_to(State::Playing);
            }
            (State::Playing, Event::Pause) | (State::Stopped, Event::Pause) => {
                self.transition_to(State::Paused);
            }
            (_, Event::Stop) if self.is_in(State::Processing) => {
                self.transition_to(State::Stopped);
            }
            (State::Ready, Event::Reset) => {
                self.transition_to(State::Ready);
            }
            (_, Event::Heartbeat { now_ns }) if self.is_in(State::Top) => {
                effects.push(Effect::PublishResponse {
                    source_event: event.name(),
                    message: self.current.name().to_string(),
                });
                effects.push(Effect::RescheduleHeartbeat { now_ns: *now_ns });
            }
            (State::Playing, Event::PublishProperty(handle)) => {
                effects.push(Effect::PublishProperty(*handle));
            }
            (_, Event::State) if self.is_in(State::Top) => {
                effects.push(Effect::PublishState);
            }
            (_, Event::Error { source_event, message }) if self.is_in(State::Top) => {
                effects.push(Effect::PublishResponse {
                    source_event: *source_event,
                    message: message.clone(),
                });
            }
            (_, Event::AgentOnClose) | (_, Event::Exit) if self.is_in(State::Top) => {
                self.transition_to(State::Exit);
            }
            (_, Event::LateMessage) if self.is_in(State::Top) => {
                effects.push(Effect::PublishResponse {
                    source_event: event.name(),
                    message: String::new(),
                });
            }
            (_, Event::Properties) if self.is_in(State::Top) => {
                effects.push(Effect::PublishAllProperties);
            }
            (_, Event::Property { name, value }) => {
                effects.push(Effect::PropertyAccess {
                    name: *name,
                    value: value.clone(),
                });
            }
            _ => {}
        }

        if self.current != before {
            effects.push(Effect::PublishState);
        }

        if self.current == State::Exit && before != State::Exit {
            return Err(AgentTermination);
        }

        Ok(effects)
    }
}

/// Converts a caught handler panic/error into the `Error` event the
/// default dispatcher re-drives through the HSM, per §4.4's exception
/// policy. `AgentTermination` is never wrapped; it propagates as-is.
pub fn as_error_event(source_event: EventName, message: String) -> Event {
    Event::Error { source_event, message }
}

/// Dispatches `event`, converting any handler error other than
/// [`AgentTermination`] into a re-dispatched `Error` event rather than
/// letting it escape. This is the default top-level driver the base
/// agent uses instead of calling `dispatch` directly.
pub fn dispatch_with_recovery(
    sm: &mut StateMachine,
    event: Event,
    run_handler: impl FnOnce(&mut StateMachine, &Event) -> Result<Vec<Effect>, AgentTermination>,
) -> DispatchResult {
    match run_handler(sm, &event) {
        Ok(_effects) => Ok(()),
        Err(AgentTermination) => Err(AgentTermination),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Payload;
    use crate::publication::PublicationHandle;

    fn started() -> StateMachine {
        let mut sm = StateMachine::new();
        sm.enter_initial();
        assert_eq!(sm.current(), State::Startup);
        sm.dispatch(&Event::AgentStarted).unwrap();
        sm
    }

    #[test]
    fn agent_started_cascades_through_initial_children_to_stopped() {
        let sm = started();
        assert_eq!(sm.current(), State::Stopped);
    }

    #[test]
    fn play_from_stopped_reaches_playing() {
        let mut sm = started();
        let effects = sm.dispatch(&Event::Play).unwrap();
        assert_eq!(sm.current(), State::Playing);
        assert!(effects.contains(&Effect::PublishState));
    }

    #[test]
    fn pause_then_play_round_trips_through_paused() {
        let mut sm = started();
        sm.dispatch(&Event::Play).unwrap();
        sm.dispatch(&Event::Pause).unwrap();
        assert_eq!(sm.current(), State::Paused);
        sm.dispatch(&Event::Play).unwrap();
        assert_eq!(sm.current(), State::Playing);
    }

    #[test]
    fn stop_from_playing_returns_to_stopped() {
        let mut sm = started();
        sm.dispatch(&Event::Play).unwrap();
        sm.dispatch(&Event::Stop).unwrap();
        assert_eq!(sm.current(), State::Stopped);
    }

    #[test]
    fn no_state_change_means_no_publish_state_effect() {
        let mut sm = started();
        let effects = sm.dispatch(&Event::Properties).unwrap();
        assert_eq!(sm.current(), State::Stopped);
        assert!(!effects.contains(&Effect::PublishState));
        assert!(effects.contains(&Effect::PublishAllProperties));
    }

    #[test]
    fn heartbeat_publishes_and_reschedules_without_changing_state() {
        let mut sm = started();
        let effects = sm.dispatch(&Event::Heartbeat { now_ns: 42 }).unwrap();
        assert!(effects.iter().any(|e| matches!(e, Effect::RescheduleHeartbeat { now_ns: 42 })));
        assert!(!effects.contains(&Effect::PublishState));
    }

    #[test]
    fn publish_property_only_handled_while_playing() {
        let mut sm = started();
        let handle = PublicationHandle(0);
        let effects = sm.dispatch(&Event::PublishProperty(handle)).unwrap();
        assert!(effects.is_empty(), "Stopped must not handle PublishProperty");

        sm.dispatch(&Event::Play).unwrap();
        let effects = sm.dispatch(&Event::PublishProperty(handle)).unwrap();
        assert!(effects.contains(&Effect::PublishProperty(handle)));
    }

    #[test]
    fn exit_terminates_the_agent() {
        let mut sm = started();
        let err = sm.dispatch(&Event::Exit).unwrap_err();
        assert_eq!(err, AgentTermination);
        assert_eq!(sm.current(), State::Exit);
    }

    #[test]
    fn transition_to_stopped_to_playing_exits_and_enters_in_order() {
        let mut sm = started();
        assert_eq!(sm.current(), State::Stopped);
        let (exited, entered) = sm.transition_to(State::Playing);
        assert_eq!(exited, vec![State::Stopped]);
        assert_eq!(entered, vec![State::Processing, State::Playing]);
        assert_eq!(sm.current(), State::Playing);
    }

    #[test]
    fn property_event_is_handled_regardless_of_leaf_state() {
        let mut sm = started();
        let effects = sm
            .dispatch(&Event::Property {
                name: EventName::new("temperature"),
                value: Payload::Nothing,
            })
            .unwrap();
        assert!(matches!(effects[0], Effect::PropertyAccess { .. }));
    }
}
