use std::sync::{Arc, Mutex};

use anyhow::Result;
use log::info;

pub mod advisory;
pub mod api;
pub mod config;
pub mod db;
pub mod device;
pub mod error;
pub mod ingest;
pub mod live;
pub mod packet;
pub mod schema;
pub mod status;
pub mod stream;
pub mod udp;

use crate::config::Settings;
use crate::db::{Db, SharedDb};
use crate::device::DeviceLink;
use crate::ingest::Ingestor;
use crate::live::LiveHub;

/// Everything a request handler needs, shared by every worker.
#[derive(Clone)]
pub struct AppState {
    pub db: SharedDb,
    pub hub: Arc<LiveHub>,
    pub ingestor: Ingestor,
    pub devices: Arc<dyn DeviceLink>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Builds the state, registers the stored tanks with the hub and warms its
    /// cache with the stored snapshots.
    pub fn new(db: Db, devices: Arc<dyn DeviceLink>, settings: Settings) -> Result<Self> {
        let db = Arc::new(Mutex::new(db));
        let hub = LiveHub::new();

        let (tanks, stored) = {
            let mut db = db::lock(&db);
            (db.tanks()?, db.snapshots()?)
        };
        for tank in &tanks {
            hub.register(&tank.tank_code);
        }
        info!(
            "Restored {} tanks and {} snapshots",
            tanks.len(),
            stored.len()
        );
        for snapshot in stored {
            hub.put(snapshot);
        }

        let ingestor = Ingestor::new(db.clone(), hub.clone(), settings.critical_fraction);
        Ok(Self {
            db,
            hub,
            ingestor,
            devices,
            settings: Arc::new(settings),
        })
    }
}
