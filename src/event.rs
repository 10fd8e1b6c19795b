//! Event and property names as interned integer tags.
//!
//! The source represents these as symbols; per the redesign notes we use
//! small integer tags with a side table of string names for diagnostics,
//! so that HSM dispatch is a match over `u32` rather than a string
//! comparison on the hot path.

use std::fmt;
use std::sync::Mutex;

use fxhash::FxHashMap;
use lazy_static::lazy_static;

lazy_static! {
    static ref INTERNER: Mutex<Interner> = Mutex::new(Interner::new());
}

struct Interner {
    names: Vec<&'static str>,
    ids: FxHashMap<&'static str, u32>,
}

impl Interner {
    fn new() -> Self {
        Interner {
            names: Vec::new(),
            ids: FxHashMap::default(),
        }
    }

    fn intern(&mut self, name: &'static str) -> u32 {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = self.names.len() as u32;
        self.names.push(name);
        self.ids.insert(name, id);
        id
    }

    fn name(&self, id: u32) -> &'static str {
        self.names[id as usize]
    }
}

/// An interned event or property name. Cheap to copy and compare;
/// construction (via [`EventName::new`]) is the only operation that
/// touches the (mutex-guarded) interner, so it should happen at
/// registration time, not on the duty-cycle hot path.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventName(u32);

impl EventName {
    pub fn new(name: &'static str) -> Self {
        EventName(INTERNER.lock().unwrap().intern(name))
    }

    pub fn as_str(&self) -> &'static str {
        INTERNER.lock().unwrap().name(self.0)
    }
}

impl fmt::Debug for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&'static str> for EventName {
    fn from(name: &'static str) -> Self {
        EventName::new(name)
    }
}

/// A decoded inbound/outbound value, carried either in wire messages or
/// as an event payload. See `crate::property::PropertyValue` for the
/// richer, property-store-facing version; this is the event-dispatch
/// facing subset used by generic (non-property) events.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Nothing,
    Int(i64),
    Float(f64),
    Bool(bool),
    Symbol(EventName),
    Text(String),
}

/// Built-in event kinds dispatched through the HSM. Custom agents may
/// extend this via [`Event::Custom`] carrying an interned name and a
/// payload decoded by the stream adapters.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    AgentStarted,
    AgentOnClose,
    Play,
    Pause,
    Stop,
    Reset,
    Exit,
    Heartbeat { now_ns: i64 },
    State,
    Properties,
    LateMessage,
    PublishProperty(crate::publication::PublicationHandle),
    /// A property read or write addressed by name; `value` is `Nothing`
    /// for a read.
    Property { name: EventName, value: Payload },
    Error {
        source_event: EventName,
        message: String,
    },
    /// Any event not covered above, dispatched by interned name with a
    /// decoded payload (used by custom pollers and inbound streams).
    Custom { name: EventName, payload: Payload },
}

impl Event {
    pub fn name(&self) -> EventName {
        match self {
            Event::AgentStarted => EventName::new("AgentStarted"),
            Event::AgentOnClose => EventName::new("AgentOnClose"),
            Event::Play => EventName::new("Play"),
            Event::Pause => EventName::new("Pause"),
            Event::Stop => EventName::new("Stop"),
            Event::Reset => EventName::new("Reset"),
            Event::Exit => EventName::new("Exit"),
            Event::Heartbeat { .. } => EventName::new("Heartbeat"),
            Event::State => EventName::new("State"),
            Event::Properties => EventName::new("Properties"),
            Event::LateMessage => EventName::new("LateMessage"),
            Event::PublishProperty(_) => EventName::new("PublishProperty"),
            Event::Property { name, .. } => *name,
            Event::Error { .. } => EventName::new("Error"),
            Event::Custom { name, .. } => *name,
        }
    }
}
