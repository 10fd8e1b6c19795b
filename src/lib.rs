//! A single-threaded, zero-allocation cooperative scheduler for
//! real-time control agents: a priority poller registry, a hierarchical
//! state machine, a publication-strategy engine, and a polled timer
//! scheduler, driving pub/sub messaging over an abstract transport.
//!
//! See `SPEC_FULL.md` for the full design; `agent::BaseAgent` is the
//! entry point most consumers construct directly or via
//! `#[derive(rtc_agent_derive::PropertyStore)]` on their property set.

// Lets `#[derive(rtc_agent_derive::PropertyStore)]`'s generated code
// refer to `rtc_agent::...` uniformly, including from this crate's own
// tests where there is otherwise no `rtc_agent` extern prelude entry.
extern crate self as rtc_agent;

#[cfg(feature = "test-alloc-counter")]
pub mod alloc_counter;

pub mod adapter;
pub mod agent;
pub mod clock;
pub mod codec;
pub mod config;
pub mod counters;
pub mod error;
pub mod event;
pub mod hsm;
pub mod id;
pub mod poller;
pub mod property;
pub mod proxy;
pub mod publication;
pub mod timer;
pub mod transport;

pub use error::{AgentError, AgentTermination};
pub use event::{Event, EventName};
pub use property::{Property, PropertyStore, PropertyValue};
