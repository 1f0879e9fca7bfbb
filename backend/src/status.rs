//! Water level derivation from a raw distance reading.
//!
//! The sensor sits at the top of the tank and measures the distance down to the
//! water surface, so the fill height is `tank_height - distance`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::req::{Freshness, RealtimeSnapshot, TankConfig, TankStatus};

use crate::error::TankError;

/// Fraction of the min water height below which a low tank becomes critical,
/// used when the tank has no explicit critical height.
pub const DEFAULT_CRITICAL_FRACTION: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Derivation {
    pub fill_height_cm: f64,
    pub water_level_percent: f64,
    pub status: TankStatus,
}

impl Derivation {
    const NO_DATA: Derivation = Derivation {
        fill_height_cm: 0.0,
        water_level_percent: 0.0,
        status: TankStatus::NoData,
    };

    pub fn into_snapshot(
        self,
        tank_code: &str,
        distance_cm: f64,
        updated_at: DateTime<Utc>,
    ) -> RealtimeSnapshot {
        RealtimeSnapshot {
            tank_code: tank_code.to_string(),
            distance_cm,
            fill_height_cm: self.fill_height_cm,
            water_level_percent: self.water_level_percent,
            status: self.status,
            status_text: self.status.text().to_string(),
            updated_at,
        }
    }
}

/// Effective LOW/CRITICAL boundary of a config.
pub fn critical_height(config: &TankConfig, critical_fraction: f64) -> f64 {
    config
        .critical_water_height_cm
        .unwrap_or(config.min_water_height_cm * critical_fraction)
}

pub fn validate_config(config: &TankConfig) -> Result<(), TankError> {
    let values = [
        config.tank_height_cm,
        config.ideal_water_height_cm,
        config.min_water_height_cm,
        config.max_water_height_cm,
    ];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(TankError::InvalidConfig(
            "heights must be finite numbers".to_string(),
        ));
    }
    if config.tank_height_cm <= 0.0 {
        return Err(TankError::InvalidConfig(format!(
            "tank height must be positive, got {}",
            config.tank_height_cm
        )));
    }

    let ordered = 0.0 < config.min_water_height_cm
        && config.min_water_height_cm < config.ideal_water_height_cm
        && config.ideal_water_height_cm < config.max_water_height_cm
        && config.max_water_height_cm < config.tank_height_cm;
    if !ordered {
        return Err(TankError::InvalidConfig(format!(
            "expected 0 < min ({}) < ideal ({}) < max ({}) < tank height ({})",
            config.min_water_height_cm,
            config.ideal_water_height_cm,
            config.max_water_height_cm,
            config.tank_height_cm
        )));
    }

    if let Some(critical) = config.critical_water_height_cm {
        if !critical.is_finite() || critical < 0.0 || critical >= config.min_water_height_cm {
            return Err(TankError::InvalidConfig(format!(
                "critical height {} must be within [0, min)",
                critical
            )));
        }
    }

    Ok(())
}

pub fn validate_reading(distance_cm: f64) -> Result<(), TankError> {
    if !distance_cm.is_finite() {
        return Err(TankError::InvalidReading(
            "distance is not a number".to_string(),
        ));
    }
    if distance_cm < 0.0 {
        return Err(TankError::InvalidReading(format!(
            "distance must not be negative, got {}",
            distance_cm
        )));
    }
    Ok(())
}

/// Computes fill height, level percentage and status for a reading.
///
/// A tank without config yields [`TankStatus::NoData`]. In demo mode the
/// percentage is relative to the ideal height instead of the tank height, so a
/// small demo rig reads 100% once it reaches its ideal level.
pub fn derive(
    distance_cm: f64,
    config: Option<&TankConfig>,
    critical_fraction: f64,
) -> Result<Derivation, TankError> {
    validate_reading(distance_cm)?;

    let config = match config {
        Some(config) => config,
        None => return Ok(Derivation::NO_DATA),
    };
    validate_config(config)?;

    let fill = (config.tank_height_cm - distance_cm).clamp(0.0, config.tank_height_cm);
    let reference = if config.is_demo_mode {
        config.ideal_water_height_cm
    } else {
        config.tank_height_cm
    };
    let percent = (fill / reference * 100.0).clamp(0.0, 100.0);

    let status = if fill < critical_height(config, critical_fraction) {
        TankStatus::Critical
    } else if fill < config.min_water_height_cm {
        TankStatus::Low
    } else if fill <= config.max_water_height_cm {
        TankStatus::Good
    } else {
        TankStatus::Warn
    };

    Ok(Derivation {
        fill_height_cm: fill,
        water_level_percent: percent,
        status,
    })
}

pub fn freshness(
    snapshot: Option<&RealtimeSnapshot>,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> Freshness {
    match snapshot {
        None => Freshness::NoData,
        Some(snapshot) => {
            let age = now
                .signed_duration_since(snapshot.updated_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if age > stale_after {
                Freshness::Stored
            } else {
                Freshness::Live
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_config() -> TankConfig {
        TankConfig {
            tank_height_cm: 10.0,
            ideal_water_height_cm: 2.0,
            min_water_height_cm: 1.0,
            max_water_height_cm: 3.0,
            critical_water_height_cm: None,
            is_demo_mode: true,
        }
    }

    fn farm_config() -> TankConfig {
        TankConfig {
            tank_height_cm: 200.0,
            ideal_water_height_cm: 150.0,
            min_water_height_cm: 100.0,
            max_water_height_cm: 180.0,
            critical_water_height_cm: Some(60.0),
            is_demo_mode: false,
        }
    }

    #[test]
    fn ideal_level_in_demo_mode() {
        let d = derive(8.0, Some(&demo_config()), DEFAULT_CRITICAL_FRACTION).unwrap();
        assert_eq!(d.fill_height_cm, 2.0);
        assert_eq!(d.status, TankStatus::Good);
        assert_eq!(d.water_level_percent, 100.0);
    }

    #[test]
    fn below_min_is_never_good() {
        let d = derive(9.5, Some(&demo_config()), DEFAULT_CRITICAL_FRACTION).unwrap();
        assert_eq!(d.fill_height_cm, 0.5);
        assert!(matches!(d.status, TankStatus::Low | TankStatus::Critical));
    }

    #[test]
    fn above_max_warns() {
        let d = derive(6.0, Some(&demo_config()), DEFAULT_CRITICAL_FRACTION).unwrap();
        assert_eq!(d.fill_height_cm, 4.0);
        assert_eq!(d.status, TankStatus::Warn);
        assert_eq!(d.water_level_percent, 100.0);
    }

    #[test]
    fn low_and_critical_split_at_explicit_threshold() {
        let cfg = farm_config();
        // fill 80: under min, above critical
        assert_eq!(derive(120.0, Some(&cfg), 0.5).unwrap().status, TankStatus::Low);
        // fill exactly at critical is still LOW
        assert_eq!(derive(140.0, Some(&cfg), 0.5).unwrap().status, TankStatus::Low);
        assert_eq!(derive(150.0, Some(&cfg), 0.5).unwrap().status, TankStatus::Critical);
    }

    #[test]
    fn critical_threshold_defaults_to_fraction_of_min() {
        let mut cfg = farm_config();
        cfg.critical_water_height_cm = None;
        assert_eq!(critical_height(&cfg, 0.5), 50.0);
        assert_eq!(derive(151.0, Some(&cfg), 0.5).unwrap().status, TankStatus::Critical);
        assert_eq!(derive(149.0, Some(&cfg), 0.5).unwrap().status, TankStatus::Low);
    }

    #[test]
    fn boundaries_of_good_band_are_inclusive() {
        let cfg = farm_config();
        assert_eq!(derive(100.0, Some(&cfg), 0.5).unwrap().status, TankStatus::Good);
        assert_eq!(derive(20.0, Some(&cfg), 0.5).unwrap().status, TankStatus::Good);
        assert_eq!(derive(19.0, Some(&cfg), 0.5).unwrap().status, TankStatus::Warn);
    }

    #[test]
    fn percent_uses_tank_height_outside_demo_mode() {
        let d = derive(50.0, Some(&farm_config()), 0.5).unwrap();
        assert_eq!(d.fill_height_cm, 150.0);
        assert_eq!(d.water_level_percent, 75.0);
    }

    #[test]
    fn percent_stays_in_range_and_fill_decreases_with_distance() {
        for cfg in [demo_config(), farm_config()] {
            let steps = 400;
            let mut last_fill = f64::INFINITY;
            for i in 0..=steps {
                let distance = cfg.tank_height_cm * i as f64 / steps as f64;
                let d = derive(distance, Some(&cfg), 0.5).unwrap();
                assert!((0.0..=100.0).contains(&d.water_level_percent));
                assert!(d.fill_height_cm <= last_fill);
                last_fill = d.fill_height_cm;
            }
        }
    }

    #[test]
    fn distance_beyond_tank_clamps_to_empty() {
        let d = derive(250.0, Some(&farm_config()), 0.5).unwrap();
        assert_eq!(d.fill_height_cm, 0.0);
        assert_eq!(d.water_level_percent, 0.0);
        assert_eq!(d.status, TankStatus::Critical);
    }

    #[test]
    fn missing_config_reports_no_data() {
        let d = derive(12.0, None, 0.5).unwrap();
        assert_eq!(d.status, TankStatus::NoData);
        assert_eq!(d.water_level_percent, 0.0);
    }

    #[test]
    fn rejects_bad_readings() {
        for distance in [-0.1, f64::NAN, f64::INFINITY] {
            let err = derive(distance, Some(&demo_config()), 0.5).unwrap_err();
            assert!(matches!(err, TankError::InvalidReading(_)));
        }
        // reading is checked before the config
        assert!(matches!(
            derive(-1.0, None, 0.5).unwrap_err(),
            TankError::InvalidReading(_)
        ));
    }

    #[test]
    fn rejects_bad_configs() {
        let mut zero_height = demo_config();
        zero_height.tank_height_cm = 0.0;

        let mut unordered = demo_config();
        unordered.max_water_height_cm = 1.5;

        let mut max_above_tank = demo_config();
        max_above_tank.max_water_height_cm = 10.0;

        let mut critical_above_min = demo_config();
        critical_above_min.critical_water_height_cm = Some(1.0);

        for cfg in [zero_height, unordered, max_above_tank, critical_above_min] {
            assert!(matches!(
                derive(1.0, Some(&cfg), 0.5).unwrap_err(),
                TankError::InvalidConfig(_)
            ));
        }
    }

    #[test]
    fn snapshot_carries_status_text() {
        let now = Utc::now();
        let snap = derive(6.0, Some(&demo_config()), 0.5)
            .unwrap()
            .into_snapshot("T1", 6.0, now);
        assert_eq!(snap.status_text, "Overflow warning");
        assert_eq!(snap.updated_at, now);
    }

    #[test]
    fn old_snapshots_are_stored_not_live() {
        let now = Utc::now();
        let snap = derive(8.0, Some(&demo_config()), 0.5)
            .unwrap()
            .into_snapshot("T1", 8.0, now - chrono::Duration::seconds(120));
        let window = Duration::from_secs(60);
        assert_eq!(freshness(Some(&snap), now, window), Freshness::Stored);
        assert_eq!(
            freshness(Some(&snap), snap.updated_at, window),
            Freshness::Live
        );
        assert_eq!(freshness(None, now, window), Freshness::NoData);
    }
}
