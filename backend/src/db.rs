use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use common::req::{RealtimeSnapshot, TankConfig, TankStatus};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{debug, info, warn};

use crate::error::TankError;
use crate::schema::*;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type SharedDb = Arc<Mutex<Db>>;

/// Locks the shared connection, recovering it if a previous holder panicked.
pub fn lock(db: &SharedDb) -> MutexGuard<'_, Db> {
    db.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = tanks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TankRow {
    pub tank_code: String,
    pub name: Option<String>,
    pub device_url: Option<String>,
    pub tank_height_cm: Option<f64>,
    pub ideal_water_height_cm: Option<f64>,
    pub min_water_height_cm: Option<f64>,
    pub max_water_height_cm: Option<f64>,
    pub critical_water_height_cm: Option<f64>,
    pub demo_mode: bool,
    pub created_at: i64, // ms since epoch
}

impl TankRow {
    pub fn new(
        tank_code: String,
        name: Option<String>,
        device_url: Option<String>,
        config: Option<&TankConfig>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tank_code,
            name,
            device_url,
            tank_height_cm: config.map(|c| c.tank_height_cm),
            ideal_water_height_cm: config.map(|c| c.ideal_water_height_cm),
            min_water_height_cm: config.map(|c| c.min_water_height_cm),
            max_water_height_cm: config.map(|c| c.max_water_height_cm),
            critical_water_height_cm: config.and_then(|c| c.critical_water_height_cm),
            demo_mode: config.map(|c| c.is_demo_mode).unwrap_or(false),
            created_at: created_at.timestamp_millis(),
        }
    }

    /// The tank's thresholds, if all of them have been set.
    pub fn config(&self) -> Option<TankConfig> {
        Some(TankConfig {
            tank_height_cm: self.tank_height_cm?,
            ideal_water_height_cm: self.ideal_water_height_cm?,
            min_water_height_cm: self.min_water_height_cm?,
            max_water_height_cm: self.max_water_height_cm?,
            critical_water_height_cm: self.critical_water_height_cm,
            is_demo_mode: self.demo_mode,
        })
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        from_millis(self.created_at)
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = tank_snapshots)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SnapshotRow {
    pub tank_code: String,
    pub distance_cm: f64,
    pub fill_height_cm: f64,
    pub water_level_percent: f64,
    pub status: String,
    pub status_text: String,
    pub updated_at: i64, // ms since epoch
}

impl From<&RealtimeSnapshot> for SnapshotRow {
    fn from(snapshot: &RealtimeSnapshot) -> Self {
        Self {
            tank_code: snapshot.tank_code.clone(),
            distance_cm: snapshot.distance_cm,
            fill_height_cm: snapshot.fill_height_cm,
            water_level_percent: snapshot.water_level_percent,
            status: snapshot.status.as_str().to_string(),
            status_text: snapshot.status_text.clone(),
            updated_at: snapshot.updated_at.timestamp_millis(),
        }
    }
}

impl SnapshotRow {
    pub fn into_snapshot(self) -> RealtimeSnapshot {
        let status = self.status.parse().unwrap_or_else(|e| {
            warn!("snapshot of {}: {}", self.tank_code, e);
            TankStatus::NoData
        });
        RealtimeSnapshot {
            tank_code: self.tank_code,
            distance_cm: self.distance_cm,
            fill_height_cm: self.fill_height_cm,
            water_level_percent: self.water_level_percent,
            status,
            status_text: self.status_text,
            updated_at: from_millis(self.updated_at),
        }
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub struct Db {
    conn: SqliteConnection,
}

impl Db {
    pub fn connect(database_url: &str) -> Result<Self> {
        let mut conn = SqliteConnection::establish(database_url)?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow!("cannot migrate {}: {}", database_url, e))?;
        info!(
            "Connected to {} ({} migrations applied)",
            database_url,
            applied.len()
        );

        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        Self::connect(":memory:")
    }

    pub fn insert_tank(&mut self, tank: &TankRow) -> Result<(), TankError> {
        debug!("Insert tank {}", tank.tank_code);

        diesel::insert_into(tanks::table)
            .values(tank)
            .execute(&mut self.conn)?;

        Ok(())
    }

    pub fn tank(&mut self, code: &str) -> Result<Option<TankRow>, TankError> {
        Ok(tanks::table
            .find(code)
            .select(TankRow::as_select())
            .first(&mut self.conn)
            .optional()?)
    }

    pub fn tanks(&mut self) -> Result<Vec<TankRow>, TankError> {
        Ok(tanks::table
            .order(tanks::tank_code.asc())
            .select(TankRow::as_select())
            .load(&mut self.conn)?)
    }

    pub fn update_tank_config(&mut self, code: &str, config: &TankConfig) -> Result<(), TankError> {
        let updated = diesel::update(tanks::table.find(code))
            .set((
                tanks::tank_height_cm.eq(Some(config.tank_height_cm)),
                tanks::ideal_water_height_cm.eq(Some(config.ideal_water_height_cm)),
                tanks::min_water_height_cm.eq(Some(config.min_water_height_cm)),
                tanks::max_water_height_cm.eq(Some(config.max_water_height_cm)),
                tanks::critical_water_height_cm.eq(config.critical_water_height_cm),
                tanks::demo_mode.eq(config.is_demo_mode),
            ))
            .execute(&mut self.conn)?;

        if updated == 0 {
            return Err(TankError::UnknownTank(code.to_string()));
        }
        Ok(())
    }

    /// Removes the tank and its snapshot. Returns false if the tank did not exist.
    pub fn delete_tank(&mut self, code: &str) -> Result<bool, TankError> {
        let deleted = self.conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::delete(tank_snapshots::table.find(code)).execute(conn)?;
            diesel::delete(tanks::table.find(code)).execute(conn)
        })?;

        Ok(deleted > 0)
    }

    pub fn upsert_snapshot(&mut self, snapshot: &SnapshotRow) -> Result<(), TankError> {
        diesel::replace_into(tank_snapshots::table)
            .values(snapshot)
            .execute(&mut self.conn)?;

        Ok(())
    }

    pub fn snapshot(&mut self, code: &str) -> Result<Option<RealtimeSnapshot>, TankError> {
        let row = tank_snapshots::table
            .find(code)
            .select(SnapshotRow::as_select())
            .first(&mut self.conn)
            .optional()?;

        Ok(row.map(SnapshotRow::into_snapshot))
    }

    pub fn snapshots(&mut self) -> Result<Vec<RealtimeSnapshot>, TankError> {
        let rows = tank_snapshots::table
            .select(SnapshotRow::as_select())
            .load(&mut self.conn)?;

        Ok(rows.into_iter().map(SnapshotRow::into_snapshot).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TankConfig {
        TankConfig {
            tank_height_cm: 120.0,
            ideal_water_height_cm: 90.0,
            min_water_height_cm: 60.0,
            max_water_height_cm: 110.0,
            critical_water_height_cm: None,
            is_demo_mode: false,
        }
    }

    fn snapshot(code: &str, distance_cm: f64) -> RealtimeSnapshot {
        RealtimeSnapshot {
            tank_code: code.to_string(),
            distance_cm,
            fill_height_cm: 120.0 - distance_cm,
            water_level_percent: (120.0 - distance_cm) / 1.2,
            status: TankStatus::Good,
            status_text: TankStatus::Good.text().to_string(),
            updated_at: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
        }
    }

    #[test]
    fn tank_round_trips_with_and_without_config() {
        let mut db = Db::in_memory().unwrap();
        let now = Utc::now();
        let tilapia = TankRow::new("A1".into(), Some("Tilapia".into()), None, Some(&config()), now);
        db.insert_tank(&tilapia).unwrap();
        db.insert_tank(&TankRow::new("B2".into(), None, None, None, now)).unwrap();

        let a1 = db.tank("A1").unwrap().unwrap();
        assert_eq!(a1.config(), Some(config()));
        assert_eq!(a1.name.as_deref(), Some("Tilapia"));
        assert_eq!(a1.created_at().timestamp_millis(), now.timestamp_millis());

        assert_eq!(db.tank("B2").unwrap().unwrap().config(), None);
        assert!(db.tank("C3").unwrap().is_none());
        assert_eq!(db.tanks().unwrap().len(), 2);
    }

    #[test]
    fn duplicate_tank_code_is_rejected() {
        let mut db = Db::in_memory().unwrap();
        let row = TankRow::new("A1".into(), None, None, None, Utc::now());
        db.insert_tank(&row).unwrap();
        assert!(matches!(
            db.insert_tank(&row).unwrap_err(),
            TankError::AlreadyExists(_)
        ));
    }

    #[test]
    fn config_update_requires_known_tank() {
        let mut db = Db::in_memory().unwrap();
        assert!(matches!(
            db.update_tank_config("nope", &config()).unwrap_err(),
            TankError::UnknownTank(_)
        ));

        db.insert_tank(&TankRow::new("A1".into(), None, None, None, Utc::now()))
            .unwrap();
        db.update_tank_config("A1", &config()).unwrap();
        assert_eq!(db.tank("A1").unwrap().unwrap().config(), Some(config()));
    }

    #[test]
    fn snapshot_is_replaced_in_place() {
        let mut db = Db::in_memory().unwrap();
        db.insert_tank(&TankRow::new("A1".into(), None, None, Some(&config()), Utc::now()))
            .unwrap();

        db.upsert_snapshot(&SnapshotRow::from(&snapshot("A1", 30.0))).unwrap();
        db.upsert_snapshot(&SnapshotRow::from(&snapshot("A1", 40.0))).unwrap();

        assert_eq!(db.snapshots().unwrap().len(), 1);
        assert_eq!(db.snapshot("A1").unwrap(), Some(snapshot("A1", 40.0)));
    }

    #[test]
    fn deleting_tank_drops_snapshot() {
        let mut db = Db::in_memory().unwrap();
        db.insert_tank(&TankRow::new("A1".into(), None, None, Some(&config()), Utc::now()))
            .unwrap();
        db.upsert_snapshot(&SnapshotRow::from(&snapshot("A1", 30.0))).unwrap();

        assert!(db.delete_tank("A1").unwrap());
        assert!(db.snapshot("A1").unwrap().is_none());
        assert!(!db.delete_tank("A1").unwrap());
    }
}
