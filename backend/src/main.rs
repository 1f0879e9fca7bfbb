use std::sync::Arc;

use actix_web::rt::net::UdpSocket;
use anyhow::Result;
use env_logger::Env;
use log::info;

use tank_backend::{api, config::Settings, db::Db, device::HttpDeviceLink, udp, AppState};

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env()?;
    let db = Db::connect(&settings.database_url)?;
    let devices = Arc::new(HttpDeviceLink::new(settings.device_push_timeout)?);
    let state = AppState::new(db, devices, settings)?;

    let udp_task = match &state.settings.udp_bind {
        Some(addr) => {
            let sock = UdpSocket::bind(addr).await?;
            let ingestor = state.ingestor.clone();
            let key = state.settings.device_api_key.clone();
            Some(actix_web::rt::spawn(udp::listen(sock, ingestor, key)))
        }
        None => {
            info!("UDP listener disabled");
            None
        }
    };

    api::new_http_server(state).await?;

    if let Some(task) = udp_task {
        task.abort();
    }
    Ok(())
}
