use std::sync::Arc;

use chrono::Utc;
use common::req::RealtimeSnapshot;
use log::{debug, warn};

use crate::db::{self, SharedDb, SnapshotRow};
use crate::error::TankError;
use crate::live::LiveHub;
use crate::status;

/// Turns device readings into snapshots: derive, store, cache, broadcast.
#[derive(Clone)]
pub struct Ingestor {
    db: SharedDb,
    hub: Arc<LiveHub>,
    critical_fraction: f64,
}

impl Ingestor {
    pub fn new(db: SharedDb, hub: Arc<LiveHub>, critical_fraction: f64) -> Self {
        Self {
            db,
            hub,
            critical_fraction,
        }
    }

    /// The tank's slot lock orders readings of one tank. The database lock is
    /// only held for the lookup and the upsert, so other tanks can ingest meanwhile.
    pub fn ingest(&self, tank_code: &str, distance_cm: f64) -> Result<RealtimeSnapshot, TankError> {
        let (snapshot, delivered) = self.hub.publish_with(tank_code, || {
            let mut db = db::lock(&self.db);

            let tank = db
                .tank(tank_code)?
                .ok_or_else(|| TankError::UnknownTank(tank_code.to_string()))?;

            let derived =
                status::derive(distance_cm, tank.config().as_ref(), self.critical_fraction)
                    .map_err(|e| {
                        warn!("Rejected reading {} for tank {}: {}", distance_cm, tank_code, e);
                        e
                    })?;
            let snapshot = derived.into_snapshot(tank_code, distance_cm, Utc::now());

            db.upsert_snapshot(&SnapshotRow::from(&snapshot))?;
            Ok(snapshot)
        })?;

        debug!(
            "tank {}: {:.1} cm -> {} ({:.0}%), sent to {} subscribers",
            tank_code,
            distance_cm,
            snapshot.status.as_str(),
            snapshot.water_level_percent,
            delivered
        );

        Ok(snapshot)
    }
}
