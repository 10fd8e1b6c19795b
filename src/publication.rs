//! Publication-strategy engine: decides, for each registered
//! (property, stream) pair, whether it is due to be published this cycle.

use crate::clock::NEVER;
use crate::event::EventName;

/// A 1-based index into the agent's output stream set.
pub type StreamIndex = usize;

/// The four publication timing strategies. Pure, table-driven dispatch —
/// no allocation, no trait objects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PublicationStrategy {
    OnUpdate,
    Periodic { interval_ns: i64 },
    RateLimited { min_interval_ns: i64 },
    Scheduled { at_ns: i64 },
}

impl PublicationStrategy {
    /// Whether a property last written at `property_ts_ns` and last
    /// published per `last_published_ns` should publish again `now_ns`.
    pub fn should_publish(&self, last_published_ns: i64, property_ts_ns: i64, now_ns: i64) -> bool {
        match *self {
            PublicationStrategy::OnUpdate => property_ts_ns > last_published_ns,
            PublicationStrategy::Periodic { interval_ns } => {
                last_published_ns == NEVER || now_ns - last_published_ns >= interval_ns
            }
            PublicationStrategy::RateLimited { min_interval_ns } => {
                property_ts_ns > last_published_ns
                    && (last_published_ns == NEVER || now_ns - last_published_ns >= min_interval_ns)
            }
            PublicationStrategy::Scheduled { at_ns } => now_ns >= at_ns && last_published_ns < at_ns,
        }
    }

    /// The next time this strategy expects to fire, used to precompute
    /// `next_scheduled_ns`. `-1` means "no schedule" (only `OnUpdate`).
    pub fn next_time(&self, now_ns: i64) -> i64 {
        match *self {
            PublicationStrategy::OnUpdate => NEVER,
            PublicationStrategy::Periodic { interval_ns } => now_ns + interval_ns,
            PublicationStrategy::RateLimited { min_interval_ns } => now_ns + min_interval_ns,
            PublicationStrategy::Scheduled { at_ns } => at_ns,
        }
    }
}

/// A handle identifying one registered (field, stream) publication, cheap
/// to copy and carried as the payload of a `PublishProperty` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicationHandle(pub usize);

/// A mutable record tying a property to an output stream and a publish
/// strategy. See `SPEC_FULL.md` §3 for the field invariants.
#[derive(Debug, Clone)]
pub struct PublicationConfig {
    pub field: EventName,
    pub stream_index: StreamIndex,
    pub strategy: PublicationStrategy,
    pub last_published_ns: i64,
    pub next_scheduled_ns: i64,
}

impl PublicationConfig {
    pub fn new(field: EventName, stream_index: StreamIndex, strategy: PublicationStrategy) -> Self {
        PublicationConfig {
            field,
            stream_index,
            strategy,
            last_published_ns: NEVER,
            next_scheduled_ns: NEVER,
        }
    }
}

/// The registry of all (field, stream) publication configs for an agent.
/// Preallocated at `on_start`; never grows on the hot path.
#[derive(Debug, Default)]
pub struct PublicationRegistry {
    configs: Vec<PublicationConfig>,
}

impl PublicationRegistry {
    pub fn with_capacity(cap: usize) -> Self {
        PublicationRegistry {
            configs: Vec::with_capacity(cap),
        }
    }

    /// Registers a new (field, stream, strategy) and returns a stable
    /// handle for later lookup. `stream_index` validity is the caller's
    /// responsibility at registration time (see `StreamNotFound`).
    pub fn register(
        &mut self,
        field: EventName,
        stream_index: StreamIndex,
        strategy: PublicationStrategy,
    ) -> PublicationHandle {
        let handle = PublicationHandle(self.configs.len());
        self.configs
            .push(PublicationConfig::new(field, stream_index, strategy));
        handle
    }

    pub fn get(&self, handle: PublicationHandle) -> &PublicationConfig {
        &self.configs[handle.0]
    }

    pub fn get_mut(&mut self, handle: PublicationHandle) -> &mut PublicationConfig {
        &mut self.configs[handle.0]
    }

    /// Iterates configs in registration order, the order `PublishProperty`
    /// events are dispatched in.
    pub fn iter(&self) -> impl Iterator<Item = (PublicationHandle, &PublicationConfig)> {
        self.configs
            .iter()
            .enumerate()
            .map(|(i, c)| (PublicationHandle(i), c))
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Records a successful publish and recomputes `next_scheduled_ns`.
    /// `last_published_ns` tracks whichever clock `should_publish` judges
    /// the strategy against: `OnUpdate`/`RateLimited` are defined over
    /// property writes, so they take the *property's* timestamp (not
    /// wall time — critical so a property written once and never again
    /// doesn't look newly due); `Periodic`/`Scheduled` are purely
    /// time-based and take `now_ns`, since a property that is never
    /// rewritten must not make them re-fire every cycle. See
    /// `SPEC_FULL.md` §4.3.
    pub fn record_published(&mut self, handle: PublicationHandle, property_ts_ns: i64, now_ns: i64) {
        let cfg = self.get_mut(handle);
        cfg.last_published_ns = match cfg.strategy {
            PublicationStrategy::OnUpdate | PublicationStrategy::RateLimited { .. } => property_ts_ns,
            PublicationStrategy::Periodic { .. } | PublicationStrategy::Scheduled { .. } => now_ns,
        };
        cfg.next_scheduled_ns = cfg.strategy.next_time(now_ns);
    }
}
