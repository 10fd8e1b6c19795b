//! Stream adapters: the inbound half of the transport contract.
//!
//! A control adapter owns a single subscription and polls it with a low
//! fragment limit (default 1) each cycle; an input adapter owns N
//! subscriptions and polls each with a higher limit (default 10). Both
//! reconstruct fragmented payloads through a [`FragmentAssembler`] before
//! decoding and dispatching, per `SPEC_FULL.md` §4.7.

use crate::codec;
use crate::event::{Event, EventName, Payload};
use crate::property::PropertyValue;
use crate::transport::Subscription;

/// A fragment's position within its message, carried as the first byte
/// of every fragment the transport delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FragmentFlag {
    Whole,
    Begin,
    Continue,
    End,
}

impl FragmentFlag {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(FragmentFlag::Whole),
            1 => Some(FragmentFlag::Begin),
            2 => Some(FragmentFlag::Continue),
            3 => Some(FragmentFlag::End),
            _ => None,
        }
    }
}

/// Reassembles begin/continue/end-flagged fragments from the transport
/// into complete message payloads. One assembler per subscription: a
/// begin fragment starts accumulation, continue fragments extend it, an
/// end fragment completes it and the assembled bytes are handed to the
/// caller. A bare `Whole` fragment (the common case — single-fragment
/// messages) completes immediately without touching the scratch buffer.
pub struct FragmentAssembler {
    scratch: Vec<u8>,
    assembling: bool,
}

impl FragmentAssembler {
    pub fn with_capacity(cap: usize) -> Self {
        FragmentAssembler {
            scratch: Vec::with_capacity(cap),
            assembling: false,
        }
    }

    /// Feeds one raw fragment (flag byte + payload). Calls `on_complete`
    /// with the reassembled bytes whenever a message is finished.
    /// Malformed fragments (missing flag byte, continue/end with nothing
    /// being assembled) are dropped silently — the sender is expected to
    /// retry or the next begin fragment resynchronizes the assembler.
    fn feed(&mut self, fragment: &[u8], on_complete: &mut dyn FnMut(&[u8])) {
        let Some((&flag_byte, body)) = fragment.split_first() else {
            return;
        };
        let Some(flag) = FragmentFlag::from_byte(flag_byte) else {
            return;
        };
        match flag {
            FragmentFlag::Whole => on_complete(body),
            FragmentFlag::Begin => {
                self.scratch.clear();
                self.scratch.extend_from_slice(body);
                self.assembling = true;
            }
            FragmentFlag::Continue => {
                if self.assembling {
                    self.scratch.extend_from_slice(body);
                }
            }
            FragmentFlag::End => {
                if self.assembling {
                    self.scratch.extend_from_slice(body);
                    self.assembling = false;
                    on_complete(&self.scratch);
                }
            }
        }
    }
}

/// Control/input messages carrying one of these names and a `Nothing`
/// payload are discrete commands, not property reads/writes; every other
/// message is a property get (`Nothing` value) or set (any other value).
fn named_command(name: EventName) -> Option<Event> {
    match name.as_str() {
        "AgentStarted" => Some(Event::AgentStarted),
        "AgentOnClose" => Some(Event::AgentOnClose),
        "Play" => Some(Event::Play),
        "Pause" => Some(Event::Pause),
        "Stop" => Some(Event::Stop),
        "Reset" => Some(Event::Reset),
        "Exit" => Some(Event::Exit),
        "State" => Some(Event::State),
        "Properties" => Some(Event::Properties),
        _ => None,
    }
}

/// Decodes one reassembled message into an event. `late_threshold_ns`,
/// when set, overrides the decoded command/property event with
/// `Event::LateMessage` once `now_ns - message.header.timestamp_ns`
/// exceeds it — per `SPEC_FULL.md` §6's `LATE_MESSAGE_THRESHOLD_NS`.
fn decode_to_event(bytes: &[u8], now_ns: i64, late_threshold_ns: Option<i64>) -> Option<Event> {
    let message = codec::decode(bytes).ok()?;
    if let Some(threshold_ns) = late_threshold_ns {
        if now_ns - message.header.timestamp_ns > threshold_ns {
            return Some(Event::LateMessage);
        }
    }
    if message.value == PropertyValue::Nothing {
        if let Some(event) = named_command(message.key) {
            return Some(event);
        }
    }
    let value = match message.value {
        PropertyValue::Nothing => Payload::Nothing,
        PropertyValue::Int(v) => Payload::Int(v),
        PropertyValue::Float(v) => Payload::Float(v),
        PropertyValue::Bool(v) => Payload::Bool(v),
        PropertyValue::Symbol(s) => Payload::Symbol(s),
        PropertyValue::String(s) => Payload::Text(s),
        PropertyValue::Array { .. } => Payload::Nothing,
        PropertyValue::Tuple(_) => Payload::Nothing,
    };
    Some(Event::Property {
        name: message.key,
        value,
    })
}

/// Single-subscription adapter for the control stream: low fragment
/// limit, one reassembly buffer.
pub struct ControlAdapter<S> {
    subscription: S,
    assembler: FragmentAssembler,
    fragment_limit: u32,
    late_threshold_ns: Option<i64>,
}

impl<S: Subscription> ControlAdapter<S> {
    pub fn new(subscription: S, scratch_capacity: usize) -> Self {
        ControlAdapter {
            subscription,
            assembler: FragmentAssembler::with_capacity(scratch_capacity),
            fragment_limit: 1,
            late_threshold_ns: None,
        }
    }

    pub fn with_fragment_limit(mut self, limit: u32) -> Self {
        self.fragment_limit = limit;
        self
    }

    pub fn with_late_threshold(mut self, threshold_ns: Option<i64>) -> Self {
        self.late_threshold_ns = threshold_ns;
        self
    }

    /// Polls the subscription, dispatching each reassembled message to
    /// `on_event`. Returns the number of fragments delivered by the
    /// transport this call (not the number of complete messages).
    pub fn poll(&mut self, now_ns: i64, on_event: &mut dyn FnMut(Event)) -> u32 {
        let assembler = &mut self.assembler;
        let late_threshold_ns = self.late_threshold_ns;
        let mut events = Vec::new();
        let delivered = self.subscription.poll(
            &mut |fragment| {
                assembler.feed(fragment, &mut |bytes| {
                    if let Some(event) = decode_to_event(bytes, now_ns, late_threshold_ns) {
                        events.push(event);
                    }
                });
            },
            self.fragment_limit,
        );
        for event in events {
            on_event(event);
        }
        delivered
    }
}

/// One named input subscription plus its own fragment assembler. Input
/// streams are independent: a partial message on one never blocks
/// another.
struct InputStream<S> {
    name: &'static str,
    subscription: S,
    assembler: FragmentAssembler,
}

/// Multi-subscription adapter for data input streams: higher fragment
/// limit per poll, one assembler per stream.
pub struct InputAdapter<S> {
    streams: Vec<InputStream<S>>,
    fragment_limit: u32,
    late_threshold_ns: Option<i64>,
}

impl<S: Subscription> InputAdapter<S> {
    pub fn with_capacity(cap: usize) -> Self {
        InputAdapter {
            streams: Vec::with_capacity(cap),
            fragment_limit: 10,
            late_threshold_ns: None,
        }
    }

    pub fn with_fragment_limit(mut self, limit: u32) -> Self {
        self.fragment_limit = limit;
        self
    }

    pub fn with_late_threshold(mut self, threshold_ns: Option<i64>) -> Self {
        self.late_threshold_ns = threshold_ns;
        self
    }

    pub fn add_stream(&mut self, name: &'static str, subscription: S, scratch_capacity: usize) {
        self.streams.push(InputStream {
            name,
            subscription,
            assembler: FragmentAssembler::with_capacity(scratch_capacity),
        });
    }

    pub fn stream_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.streams.iter().map(|s| s.name)
    }

    /// Polls every input stream once, dispatching each reassembled
    /// message to `on_event`. Returns the total fragments delivered
    /// across all streams.
    pub fn poll(&mut self, now_ns: i64, on_event: &mut dyn FnMut(Event)) -> u32 {
        let fragment_limit = self.fragment_limit;
        let late_threshold_ns = self.late_threshold_ns;
        let mut total = 0u32;
        let mut events = Vec::new();
        for stream in &mut self.streams {
            let assembler = &mut stream.assembler;
            total += stream.subscription.poll(
                &mut |fragment| {
                    assembler.feed(fragment, &mut |bytes| {
                        if let Some(event) = decode_to_event(bytes, now_ns, late_threshold_ns) {
                            events.push(event);
                        }
                    });
                },
                fragment_limit,
            );
        }
        for event in events {
            on_event(event);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Message, MessageHeader};
    use crate::transport::{MemoryTransport, Publication};

    fn whole_fragment(message: &Message) -> Vec<u8> {
        let mut buf = vec![0u8; 256];
        let n = codec::encode(&mut buf[1..], message).unwrap();
        buf[0] = 0; // Whole
        buf.truncate(n + 1);
        buf
    }

    #[test]
    fn control_adapter_decodes_whole_fragments() {
        let transport = MemoryTransport::new();
        let (mut publ, sub) = transport.add_loopback(512, 4);
        let mut adapter = ControlAdapter::new(sub, 512);

        let message = Message {
            header: MessageHeader {
                timestamp_ns: 1,
                correlation_id: 1,
                tag: "t".into(),
            },
            key: EventName::new("Play"),
            value: PropertyValue::Nothing,
        };
        let frame = whole_fragment(&message);
        publ.offer(&[&frame]);

        let mut events = Vec::new();
        adapter.poll(0, &mut |e| events.push(e));
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Play));
    }

    #[test]
    fn control_adapter_reports_late_message_beyond_threshold() {
        let transport = MemoryTransport::new();
        let (mut publ, sub) = transport.add_loopback(512, 4);
        let mut adapter = ControlAdapter::new(sub, 512).with_late_threshold(Some(100));

        let message = Message {
            header: MessageHeader {
                timestamp_ns: 0,
                correlation_id: 1,
                tag: "t".into(),
            },
            key: EventName::new("Play"),
            value: PropertyValue::Nothing,
        };
        let frame = whole_fragment(&message);
        publ.offer(&[&frame]);

        let mut events = Vec::new();
        adapter.poll(1_000, &mut |e| events.push(e));
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::LateMessage));
    }

    #[test]
    fn assembler_reconstructs_split_message() {
        let message = Message {
            header: MessageHeader {
                timestamp_ns: 1,
                correlation_id: 1,
                tag: "t".into(),
            },
            key: EventName::new("Speed"),
            value: PropertyValue::Int(42),
        };
        let mut full = vec![0u8; 256];
        let n = codec::encode(&mut full, &message).unwrap();
        full.truncate(n);

        let (first, second) = full.split_at(n / 2);
        let mut begin = vec![1u8];
        begin.extend_from_slice(first);
        let mut end = vec![3u8];
        end.extend_from_slice(second);

        let mut assembler = FragmentAssembler::with_capacity(256);
        let mut completed = Vec::new();
        assembler.feed(&begin, &mut |bytes| completed.push(bytes.to_vec()));
        assert!(completed.is_empty());
        assembler.feed(&end, &mut |bytes| completed.push(bytes.to_vec()));
        assert_eq!(completed.len(), 1);

        let decoded = codec::decode(&completed[0]).unwrap();
        assert_eq!(decoded.value, PropertyValue::Int(42));
    }

    #[test]
    fn input_adapter_polls_every_registered_stream() {
        let transport = MemoryTransport::new();
        let (mut publ_a, sub_a) = transport.add_loopback(512, 4);
        let (mut publ_b, sub_b) = transport.add_loopback(512, 4);
        let mut adapter = InputAdapter::with_capacity(2);
        adapter.add_stream("a", sub_a, 512);
        adapter.add_stream("b", sub_b, 512);

        let msg = |key: &'static str| Message {
            header: MessageHeader {
                timestamp_ns: 0,
                correlation_id: 0,
                tag: "t".into(),
            },
            key: EventName::new(key),
            value: PropertyValue::Nothing,
        };
        let frame_a = whole_fragment(&msg("A"));
        let frame_b = whole_fragment(&msg("B"));
        publ_a.offer(&[&frame_a]);
        publ_b.offer(&[&frame_b]);

        let mut names = Vec::new();
        adapter.poll(0, &mut |e| names.push(e.name().as_str()));
        names.sort();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(adapter.stream_names().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
