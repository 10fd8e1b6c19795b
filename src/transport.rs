//! The transport contract (`SPEC_FULL.md` §6) and an in-process
//! implementation of it.
//!
//! The wire transport is an external collaborator by design — the real
//! deployment swaps in a networked implementation of the same three
//! traits. `MemoryTransport` exists so the agent, its adapters, and its
//! proxies can be exercised end-to-end in tests without a network
//! dependency, the way the teacher's `test_raftstore` stands in for a
//! real cluster.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Outcome of a vectored `offer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferResult {
    Success,
    BackPressure,
    NotConnected,
    AdminAction,
}

/// Receives the bytes a [`Claim`] was committed with. Kept as a separate
/// trait (rather than giving `Claim` a back-reference to its
/// `Publication`) so `Claim` can borrow the writable region and the
/// commit sink as two disjoint borrows of the same publication.
pub trait ClaimSink {
    /// Returns `true` if the commit was accepted, `false` on
    /// back-pressure (the claimed region is dropped either way; a claim,
    /// once obtained, is never retried).
    fn commit(&mut self, data: &[u8]) -> bool;
}

/// A zero-copy writable region obtained from [`Publication::try_claim`].
/// Must be explicitly `commit`ed to publish, or `abort`ed to discard.
pub struct Claim<'a> {
    bytes: &'a mut [u8],
    sink: &'a mut dyn ClaimSink,
    resolved: bool,
}

impl<'a> Claim<'a> {
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Publishes the first `written` bytes of the claimed region.
    pub fn commit(mut self, written: usize) {
        self.sink.commit(&self.bytes[..written]);
        self.resolved = true;
    }

    pub fn abort(mut self) {
        self.resolved = true;
    }
}

impl<'a> Drop for Claim<'a> {
    fn drop(&mut self) {
        debug_assert!(self.resolved, "a Claim must be explicitly committed or aborted");
    }
}

/// An outbound, unidirectional byte-message channel.
pub trait Publication {
    /// Obtains a zero-copy writable region of `len` bytes, or `None` if
    /// none is currently available (back-pressure; the caller must drop
    /// the publish for this cycle).
    fn try_claim(&mut self, len: usize) -> Option<Claim<'_>>;

    /// Publishes a vectored message (e.g. a tensor header followed by
    /// its value payload) in one write.
    fn offer(&mut self, fragments: &[&[u8]]) -> OfferResult;
}

/// An inbound, unidirectional byte-message channel.
pub trait Subscription {
    /// Delivers up to `fragment_limit` pending fragments to `handler`,
    /// returning the count delivered.
    fn poll(&mut self, handler: &mut dyn FnMut(&[u8]), fragment_limit: u32) -> u32;
}

/// Fixed-capacity slot, one message (post-fragmentation) per frame.
struct Frame {
    len: usize,
    data: Box<[u8]>,
}

/// A bounded, preallocated collection of message slots shared between a
/// [`MemoryPublication`] and its paired [`MemorySubscription`]. Slots
/// are fixed-capacity (`mtu` bytes); `try_claim`/`offer` never grow the
/// slot count past `capacity`.
struct Channel {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl Channel {
    fn new(capacity: usize) -> Self {
        Channel {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, bytes: &[u8]) -> bool {
        if self.frames.len() >= self.capacity {
            return false;
        }
        let mut data = vec![0u8; bytes.len()].into_boxed_slice();
        data.copy_from_slice(bytes);
        self.frames.push_back(Frame { len: bytes.len(), data });
        true
    }
}

type SharedChannel = Rc<RefCell<Channel>>;

struct ChannelSink(SharedChannel);

impl ClaimSink for ChannelSink {
    fn commit(&mut self, data: &[u8]) -> bool {
        self.0.borrow_mut().push(data)
    }
}

/// An in-process publication over a shared, bounded channel of frames.
pub struct MemoryPublication {
    sink: ChannelSink,
    scratch: Vec<u8>,
}

impl MemoryPublication {
    fn new(channel: SharedChannel, mtu: usize) -> Self {
        MemoryPublication {
            sink: ChannelSink(channel),
            scratch: vec![0u8; mtu],
        }
    }
}

impl Publication for MemoryPublication {
    fn try_claim(&mut self, len: usize) -> Option<Claim<'_>> {
        if len > self.scratch.len() {
            return None;
        }
        if self.sink.0.borrow().frames.len() >= self.sink.0.borrow().capacity {
            return None;
        }
        Some(Claim {
            bytes: &mut self.scratch[..len],
            sink: &mut self.sink,
            resolved: false,
        })
    }

    fn offer(&mut self, fragments: &[&[u8]]) -> OfferResult {
        let total: usize = fragments.iter().map(|f| f.len()).sum();
        if total > self.scratch.len() {
            return OfferResult::AdminAction;
        }
        let mut n = 0;
        for f in fragments {
            self.scratch[n..n + f.len()].copy_from_slice(f);
            n += f.len();
        }
        if self.sink.commit(&self.scratch[..n]) {
            OfferResult::Success
        } else {
            OfferResult::BackPressure
        }
    }
}

/// An in-process subscription draining the same shared channel its
/// paired publication writes into.
pub struct MemorySubscription {
    channel: SharedChannel,
}

impl Subscription for MemorySubscription {
    fn poll(&mut self, handler: &mut dyn FnMut(&[u8]), fragment_limit: u32) -> u32 {
        let mut delivered = 0;
        let mut ch = self.channel.borrow_mut();
        while delivered < fragment_limit {
            let Some(frame) = ch.frames.pop_front() else {
                break;
            };
            handler(&frame.data[..frame.len]);
            delivered += 1;
        }
        delivered
    }
}

/// An in-memory stand-in for the networked transport, addressed by
/// `(uri, stream_id)` the same way the real transport is: a publication
/// and a subscription opened against the same address share a channel,
/// so wiring an agent's control/input endpoints up to a test driver is
/// just opening the same address from both sides.
pub struct MemoryTransport {
    mtu: usize,
    slot_capacity: usize,
    channels: RefCell<std::collections::HashMap<(String, i32), SharedChannel>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        MemoryTransport::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport {
            mtu: 4096,
            slot_capacity: 64,
            channels: RefCell::new(std::collections::HashMap::new()),
        }
    }

    pub fn with_capacity(mtu: usize, slot_capacity: usize) -> Self {
        MemoryTransport {
            mtu,
            slot_capacity,
            channels: RefCell::new(std::collections::HashMap::new()),
        }
    }

    fn channel_for(&self, uri: &str, stream_id: i32) -> SharedChannel {
        self.channels
            .borrow_mut()
            .entry((uri.to_string(), stream_id))
            .or_insert_with(|| Rc::new(RefCell::new(Channel::new(self.slot_capacity))))
            .clone()
    }

    /// Opens a publication at `(uri, stream_id)`, creating the backing
    /// channel on first use.
    pub fn add_publication(&self, uri: &str, stream_id: i32) -> MemoryPublication {
        MemoryPublication::new(self.channel_for(uri, stream_id), self.mtu)
    }

    /// Opens a subscription at `(uri, stream_id)`, draining whatever a
    /// publication opened at the same address writes.
    pub fn add_subscription(&self, uri: &str, stream_id: i32) -> MemorySubscription {
        MemorySubscription {
            channel: self.channel_for(uri, stream_id),
        }
    }

    /// Creates a paired publication/subscription over a fresh, unshared
    /// channel — for tests that want a loopback without going through an
    /// address.
    pub fn add_loopback(&self, mtu: usize, slot_capacity: usize) -> (MemoryPublication, MemorySubscription) {
        let channel = Rc::new(RefCell::new(Channel::new(slot_capacity)));
        (
            MemoryPublication::new(channel.clone(), mtu),
            MemorySubscription { channel },
        )
    }
}
