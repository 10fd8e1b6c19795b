//! Environment-driven configuration, read once at property-store /
//! base-agent construction. Grounded on the teacher's `online_config`
//! crate's separation of config parsing from business logic, adapted
//! from a TOML-file source to the environment-variable source this
//! spec's transport layer expects.

use std::collections::HashMap;
use std::env::VarError;

use crate::error::AgentError;

const DEFAULT_HEARTBEAT_PERIOD_NS: i64 = 10_000_000_000;
const DEFAULT_STATS_PERIOD_NS: i64 = 5_000_000_000;
const DEFAULT_GC_STATS_PERIOD_NS: i64 = 10_000_000_000;

/// A `uri`/`stream_id` pair describing one output or input stream.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct StreamEndpoint {
    pub uri: String,
    pub stream_id: i32,
}

/// Parsed configuration for one agent, read once from the environment
/// variables documented in `SPEC_FULL.md` §6. `Deserialize` so tests can
/// construct an `AgentConfig` directly (e.g. from a JSON fixture)
/// without going through process environment variables.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AgentConfig {
    pub block_name: String,
    pub block_id: u64,
    pub status_uri: String,
    pub status_stream_id: i32,
    pub control_uri: String,
    pub control_stream_id: i32,
    pub control_filter: Option<String>,
    #[serde(default = "default_heartbeat_period_ns")]
    pub heartbeat_period_ns: i64,
    pub late_message_threshold_ns: Option<i64>,
    #[serde(default = "default_stats_period_ns")]
    pub stats_period_ns: i64,
    #[serde(default = "default_gc_stats_period_ns")]
    pub gc_stats_period_ns: i64,
    pub log_level: Option<String>,
    #[serde(default)]
    pub pub_streams: Vec<StreamEndpoint>,
    #[serde(default)]
    pub sub_streams: Vec<StreamEndpoint>,
}

fn default_heartbeat_period_ns() -> i64 {
    DEFAULT_HEARTBEAT_PERIOD_NS
}
fn default_stats_period_ns() -> i64 {
    DEFAULT_STATS_PERIOD_NS
}
fn default_gc_stats_period_ns() -> i64 {
    DEFAULT_GC_STATS_PERIOD_NS
}

/// Reads and validates process environment variables via a
/// caller-supplied lookup function, so production code can pass
/// `std::env::var` while tests pass an in-memory map.
fn required(lookup: &mut impl FnMut(&str) -> Result<String, VarError>, name: &'static str) -> Result<String, AgentError> {
    lookup(name).map_err(|_| AgentError::EnvironmentVariable { name })
}

fn optional(lookup: &mut impl FnMut(&str) -> Result<String, VarError>, name: &str) -> Option<String> {
    lookup(name).ok()
}

fn optional_i64(
    lookup: &mut impl FnMut(&str) -> Result<String, VarError>,
    name: &str,
    default: i64,
) -> Result<i64, AgentError> {
    match lookup(name) {
        Ok(v) => v.parse::<i64>().map_err(|e| AgentError::AgentConfiguration {
            message: format!("{name} must be an integer: {e}"),
        }),
        Err(_) => Ok(default),
    }
}

fn collect_stream_endpoints(
    lookup: &mut impl FnMut(&str) -> Result<String, VarError>,
    uri_prefix: &str,
    stream_prefix: &str,
) -> Result<Vec<StreamEndpoint>, AgentError> {
    let mut streams = Vec::new();
    let mut n = 1;
    loop {
        let uri_key = format!("{uri_prefix}{n}");
        let stream_key = format!("{stream_prefix}{n}");
        let (Some(uri), Some(stream_id)) = (optional(lookup, &uri_key), optional(lookup, &stream_key)) else {
            break;
        };
        let stream_id = stream_id.parse::<i32>().map_err(|e| AgentError::AgentConfiguration {
            message: format!("{stream_key} must be an i32: {e}"),
        })?;
        streams.push(StreamEndpoint { uri, stream_id });
        n += 1;
    }
    Ok(streams)
}

pub fn from_env<F>(mut lookup: F) -> Result<AgentConfig, AgentError>
where
    F: FnMut(&str) -> Result<String, VarError>,
{
    let block_name = required(&mut lookup, "BLOCK_NAME")?;
    let block_id = required(&mut lookup, "BLOCK_ID")?
        .parse::<u64>()
        .map_err(|e| AgentError::AgentConfiguration {
            message: format!("BLOCK_ID must be a u64: {e}"),
        })?;
    let status_uri = required(&mut lookup, "STATUS_URI")?;
    let status_stream_id = required(&mut lookup, "STATUS_STREAM_ID")?
        .parse::<i32>()
        .map_err(|e| AgentError::AgentConfiguration {
            message: format!("STATUS_STREAM_ID must be an i32: {e}"),
        })?;
    let control_uri = required(&mut lookup, "CONTROL_URI")?;
    let control_stream_id = required(&mut lookup, "CONTROL_STREAM_ID")?
        .parse::<i32>()
        .map_err(|e| AgentError::AgentConfiguration {
            message: format!("CONTROL_STREAM_ID must be an i32: {e}"),
        })?;

    let pub_streams = collect_stream_endpoints(&mut lookup, "PUB_DATA_URI_", "PUB_DATA_STREAM_")?;
    let sub_streams = collect_stream_endpoints(&mut lookup, "SUB_DATA_URI_", "SUB_DATA_STREAM_")?;

    let control_filter = optional(&mut lookup, "CONTROL_FILTER");
    let heartbeat_period_ns = optional_i64(&mut lookup, "HEARTBEAT_PERIOD_NS", DEFAULT_HEARTBEAT_PERIOD_NS)?;
    let late_message_threshold_ns = match lookup("LATE_MESSAGE_THRESHOLD_NS") {
        Ok(v) => Some(v.parse::<i64>().map_err(|e| AgentError::AgentConfiguration {
            message: format!("LATE_MESSAGE_THRESHOLD_NS must be an integer: {e}"),
        })?),
        Err(_) => None,
    };
    let stats_period_ns = optional_i64(&mut lookup, "STATS_PERIOD_NS", DEFAULT_STATS_PERIOD_NS)?;
    let gc_stats_period_ns = optional_i64(&mut lookup, "GC_STATS_PERIOD_NS", DEFAULT_GC_STATS_PERIOD_NS)?;
    let log_level = optional(&mut lookup, "LOG_LEVEL");

    Ok(AgentConfig {
        block_name,
        block_id,
        status_uri,
        status_stream_id,
        control_uri,
        control_stream_id,
        control_filter,
        heartbeat_period_ns,
        late_message_threshold_ns,
        stats_period_ns,
        gc_stats_period_ns,
        log_level,
        pub_streams,
        sub_streams,
    })
}

/// Convenience wrapper over [`from_env`] backed by `std::env::var`, so
/// the common path (read from the real process environment) is a single
/// call.
pub fn from_process_env() -> Result<AgentConfig, AgentError> {
    from_env(|name| std::env::var(name))
}

/// Builds a lookup closure over an in-memory map, for tests.
pub fn lookup_from_map(map: HashMap<&'static str, &'static str>) -> impl FnMut(&str) -> Result<String, VarError> {
    move |key: &str| map.get(key).map(|v| v.to_string()).ok_or(VarError::NotPresent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("BLOCK_NAME", "demo"),
            ("BLOCK_ID", "7"),
            ("STATUS_URI", "memory://status"),
            ("STATUS_STREAM_ID", "1"),
            ("CONTROL_URI", "memory://control"),
            ("CONTROL_STREAM_ID", "2"),
        ])
    }

    #[test]
    fn required_vars_missing_is_an_error() {
        let err = from_env(lookup_from_map(HashMap::new())).unwrap_err();
        assert!(matches!(err, AgentError::EnvironmentVariable { name: "BLOCK_NAME" }));
    }

    #[test]
    fn defaults_apply_when_optional_vars_absent() {
        let cfg = from_env(lookup_from_map(base_env())).unwrap();
        assert_eq!(cfg.heartbeat_period_ns, DEFAULT_HEARTBEAT_PERIOD_NS);
        assert_eq!(cfg.stats_period_ns, DEFAULT_STATS_PERIOD_NS);
        assert!(cfg.pub_streams.is_empty());
    }

    #[test]
    fn pub_streams_collected_until_gap() {
        let mut env = base_env();
        env.insert("PUB_DATA_URI_1", "memory://out1");
        env.insert("PUB_DATA_STREAM_1", "10");
        env.insert("PUB_DATA_URI_2", "memory://out2");
        env.insert("PUB_DATA_STREAM_2", "11");
        // gap at 3, so a would-be stream 4 must not be picked up
        env.insert("PUB_DATA_URI_4", "memory://out4");
        env.insert("PUB_DATA_STREAM_4", "12");
        let cfg = from_env(lookup_from_map(env)).unwrap();
        assert_eq!(
            cfg.pub_streams,
            vec![
                StreamEndpoint { uri: "memory://out1".into(), stream_id: 10 },
                StreamEndpoint { uri: "memory://out2".into(), stream_id: 11 },
            ]
        );
    }
}
