use std::{env, str::FromStr, time::Duration};
use crate::error::{AppErr, AppResult};

pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_FRAME_LIMIT: usize = 100 * 1024 * 1024;
pub const DEFAULT_SWEEP_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr:           String,
    /// Largest single WebSocket message the server will accept.
    pub max_frame:      usize,
    /// `None` keeps a silent connection open forever.
    pub idle_timeout:   Option<Duration>,
    /// `None` keeps every room until the process exits.
    pub room_ttl:       Option<Duration>,
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr:           DEFAULT_ADDR.into(),
            max_frame:      DEFAULT_FRAME_LIMIT,
            idle_timeout:   None,
            room_ttl:       None,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_SECS),
        }
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process env.
    pub fn from_lookup<F>(get: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        Ok(Self {
            addr:           get("RELAY_ADDR").filter(|s| !s.trim().is_empty()).unwrap_or(d.addr),
            max_frame:      parse(&get, "MAX_FRAME_BYTES")?.unwrap_or(d.max_frame),
            idle_timeout:   positive_secs(&get, "IDLE_TIMEOUT_SECS")?,
            room_ttl:       parse(&get, "ROOM_TTL_SECS")?.map(Duration::from_secs),
            sweep_interval: positive_secs(&get, "SWEEP_INTERVAL_SECS")?.unwrap_or(d.sweep_interval),
        })
    }
}

fn parse<T, F>(get: &F, key: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| AppErr::Config(format!("{key}={raw}: {e}"))),
    }
}

/// Seconds that must be at least 1; a zero period or timeout is a config error.
fn positive_secs<F>(get: &F, key: &str) -> AppResult<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match parse::<u64, F>(get, key)? {
        Some(0) => Err(AppErr::Config(format!("{key} must be greater than 0"))),
        other => Ok(other.map(Duration::from_secs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let c = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(c.addr, DEFAULT_ADDR);
        assert_eq!(c.max_frame, DEFAULT_FRAME_LIMIT);
        assert!(c.idle_timeout.is_none());
        assert!(c.room_ttl.is_none());
        assert_eq!(c.sweep_interval, Duration::from_secs(DEFAULT_SWEEP_SECS));
    }

    #[test]
    fn reads_overrides() {
        let c = Config::from_lookup(lookup(&[
            ("RELAY_ADDR", "127.0.0.1:9000"),
            ("IDLE_TIMEOUT_SECS", "15"),
            ("ROOM_TTL_SECS", "600"),
            ("MAX_FRAME_BYTES", "4096"),
        ]))
        .unwrap();
        assert_eq!(c.addr, "127.0.0.1:9000");
        assert_eq!(c.idle_timeout, Some(Duration::from_secs(15)));
        assert_eq!(c.room_ttl, Some(Duration::from_secs(600)));
        assert_eq!(c.max_frame, 4096);
    }

    #[test]
    fn rejects_zero_durations() {
        for key in ["IDLE_TIMEOUT_SECS", "SWEEP_INTERVAL_SECS"] {
            let err = Config::from_lookup(lookup(&[(key, "0")])).unwrap_err();
            assert!(matches!(err, AppErr::Config(ref m) if m.contains(key)), "{key}: {err}");
        }
        let c = Config::from_lookup(lookup(&[("ROOM_TTL_SECS", "0")])).unwrap();
        assert_eq!(c.room_ttl, Some(Duration::ZERO));
    }

    #[test]
    fn rejects_garbage_numbers() {
        let err = Config::from_lookup(lookup(&[("ROOM_TTL_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, AppErr::Config(_)));
    }
}
