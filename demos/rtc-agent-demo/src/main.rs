//! Wires a two-property agent over the in-memory transport and drives
//! it through a handful of duty cycles, demonstrating the Play/Pause
//! control flow and a periodic property publish.

use std::collections::HashMap;

use rtc_agent::agent::BaseAgent;
use rtc_agent::clock::ManualClock;
use rtc_agent::config;
use rtc_agent::event::Event;
use rtc_agent::property::Property;
use rtc_agent::publication::PublicationStrategy;
use rtc_agent::transport::{MemoryTransport, Publication};
use rtc_agent_derive::PropertyStore;

#[derive(PropertyStore)]
struct EngineProperties {
    #[property(mode = "rw")]
    throttle: Property<f64>,
    #[property(mode = "r")]
    rpm: Property<i64>,
}

fn build_logger() -> slog::Logger {
    use slog::Drain;
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!("block" => "engine-demo"))
}

fn demo_config() -> config::AgentConfig {
    let mut env = HashMap::new();
    env.insert("BLOCK_NAME", "engine-demo");
    env.insert("BLOCK_ID", "1");
    env.insert("STATUS_URI", "memory://status");
    env.insert("STATUS_STREAM_ID", "1");
    env.insert("CONTROL_URI", "memory://control");
    env.insert("CONTROL_STREAM_ID", "2");
    env.insert("PUB_DATA_URI_1", "memory://engine");
    env.insert("PUB_DATA_STREAM_1", "3");
    env.insert("HEARTBEAT_PERIOD_NS", "1000000000");
    config::from_env(config::lookup_from_map(env)).expect("demo config is valid")
}

fn main() {
    let log = build_logger();
    let transport = MemoryTransport::new();
    let control = transport.add_publication("memory://control", 2);

    let mut agent: BaseAgent<ManualClock, EngineProperties, _, _> = BaseAgent::new(
        demo_config(),
        ManualClock(0),
        EngineProperties {
            throttle: Property::new(0.0),
            rpm: Property::new(800),
        },
        log.clone(),
        |uri, stream_id| transport.add_publication(uri, stream_id),
        |uri, stream_id| transport.add_subscription(uri, stream_id),
    );

    agent.on_start().expect("on_start");
    slog::info!(log, "agent started"; "state" => ?agent.state().current_state());

    agent
        .state_mut()
        .publications_mut()
        .register(
            rtc_agent::EventName::new("throttle"),
            1,
            PublicationStrategy::Periodic { interval_ns: 2_000_000_000 },
        );

    let mut control = control;
    let frame = encode_control(Event::Play);
    control.offer(&[&frame]);

    for cycle in 0..5 {
        agent.state_mut().clock_source_mut().0 = cycle * 1_000_000_000;
        let work = agent.do_work();
        slog::info!(log, "duty cycle"; "cycle" => cycle, "work" => work, "state" => ?agent.state().current_state());
    }

    agent.on_close();
    slog::info!(log, "agent closed");
}

fn encode_control(event: Event) -> Vec<u8> {
    let name = event.name();
    let message = rtc_agent::codec::Message {
        header: rtc_agent::codec::MessageHeader {
            timestamp_ns: 0,
            correlation_id: 0,
            tag: name.to_string(),
        },
        key: name,
        value: rtc_agent::property::PropertyValue::Nothing,
    };
    let mut buf = vec![0u8; 256];
    buf[0] = 0; // FragmentFlag::Whole
    let n = rtc_agent::codec::encode(&mut buf[1..], &message).expect("encode fits");
    buf.truncate(n + 1);
    buf
}
