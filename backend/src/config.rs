use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use log::warn;

use crate::status::DEFAULT_CRITICAL_FRACTION;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub http_bind: String,
    pub udp_bind: Option<String>, // None disables the UDP listener
    pub device_api_key: Option<String>,
    pub frontend_origin: String,
    pub stale_after: Duration,
    pub heartbeat: Duration,
    pub critical_fraction: f64,
    pub device_push_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: ":memory:".to_string(),
            http_bind: "127.0.0.1:8081".to_string(),
            udp_bind: Some("0.0.0.0:8989".to_string()),
            device_api_key: None,
            frontend_origin: "http://127.0.0.1:8080".to_string(),
            stale_after: Duration::from_secs(60),
            heartbeat: Duration::from_secs(15),
            critical_fraction: DEFAULT_CRITICAL_FRACTION,
            device_push_timeout: Duration::from_millis(3000),
        }
    }
}

fn parse<T>(name: &str, value: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} has invalid value {:?}: {}", name, raw, e)),
    }
}

impl Settings {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;

        let udp_bind = match lookup("UDP_BIND") {
            Some(v) if v.eq_ignore_ascii_case("off") => None,
            Some(v) => Some(v),
            None => defaults.udp_bind,
        };

        let device_api_key = lookup("DEVICE_API_KEY").filter(|k| !k.is_empty());
        if device_api_key.is_none() {
            warn!("No DEVICE_API_KEY set, device readings are accepted without a key");
        }

        let critical_fraction = parse(
            "CRITICAL_FRACTION",
            lookup("CRITICAL_FRACTION"),
            defaults.critical_fraction,
        )?;
        if !(0.0..1.0).contains(&critical_fraction) {
            bail!("CRITICAL_FRACTION must be within [0, 1), got {}", critical_fraction);
        }

        let heartbeat_secs: u64 = parse(
            "STREAM_HEARTBEAT_SECS",
            lookup("STREAM_HEARTBEAT_SECS"),
            defaults.heartbeat.as_secs(),
        )?;
        if heartbeat_secs == 0 {
            bail!("STREAM_HEARTBEAT_SECS must be at least 1");
        }

        Ok(Self {
            database_url,
            http_bind: lookup("HTTP_BIND").unwrap_or(defaults.http_bind),
            udp_bind,
            device_api_key,
            frontend_origin: lookup("FRONTEND_ORIGIN").unwrap_or(defaults.frontend_origin),
            stale_after: Duration::from_secs(parse(
                "SNAPSHOT_STALE_SECS",
                lookup("SNAPSHOT_STALE_SECS"),
                defaults.stale_after.as_secs(),
            )?),
            heartbeat: Duration::from_secs(heartbeat_secs),
            critical_fraction,
            device_push_timeout: Duration::from_millis(parse(
                "DEVICE_PUSH_TIMEOUT_MS",
                lookup("DEVICE_PUSH_TIMEOUT_MS"),
                defaults.device_push_timeout.as_millis() as u64,
            )?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_is_set() {
        let s = settings(&[("DATABASE_URL", "tanks.sqlite")]).unwrap();
        assert_eq!(s.database_url, "tanks.sqlite");
        assert_eq!(s.http_bind, "127.0.0.1:8081");
        assert_eq!(s.udp_bind.as_deref(), Some("0.0.0.0:8989"));
        assert_eq!(s.device_api_key, None);
        assert_eq!(s.critical_fraction, 0.5);
        assert_eq!(s.stale_after, Duration::from_secs(60));
    }

    #[test]
    fn database_url_is_required() {
        assert!(settings(&[]).is_err());
    }

    #[test]
    fn reads_overrides() {
        let s = settings(&[
            ("DATABASE_URL", "x.sqlite"),
            ("UDP_BIND", "off"),
            ("DEVICE_API_KEY", "secret"),
            ("SNAPSHOT_STALE_SECS", "5"),
            ("STREAM_HEARTBEAT_SECS", "2"),
            ("CRITICAL_FRACTION", "0.25"),
            ("DEVICE_PUSH_TIMEOUT_MS", "750"),
        ])
        .unwrap();
        assert_eq!(s.udp_bind, None);
        assert_eq!(s.device_api_key.as_deref(), Some("secret"));
        assert_eq!(s.stale_after, Duration::from_secs(5));
        assert_eq!(s.heartbeat, Duration::from_secs(2));
        assert_eq!(s.critical_fraction, 0.25);
        assert_eq!(s.device_push_timeout, Duration::from_millis(750));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(settings(&[("DATABASE_URL", "x"), ("CRITICAL_FRACTION", "1.5")]).is_err());
        assert!(settings(&[("DATABASE_URL", "x"), ("STREAM_HEARTBEAT_SECS", "0")]).is_err());
        assert!(settings(&[("DATABASE_URL", "x"), ("SNAPSHOT_STALE_SECS", "soon")]).is_err());
    }
}
