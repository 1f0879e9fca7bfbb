use std::net::SocketAddr;

use anyhow::{anyhow, Result};
use common::req::RealtimeSnapshot;
use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::signal;

use crate::ingest::Ingestor;
use crate::packet::{Packet, Payload};

/// Handles one datagram from a sensor node.
pub fn handle_datagram(
    data: &[u8],
    ingestor: &Ingestor,
    device_key: Option<&str>,
) -> Result<RealtimeSnapshot> {
    let packet = Packet::decode(data)?;

    if let Some(key) = device_key {
        if packet.header.device_key != key {
            return Err(anyhow!(
                "wrong device key for tank {}",
                packet.header.tank_code
            ));
        }
    }

    match packet.payload {
        Payload::Reading(reading) => {
            let snapshot = ingestor.ingest(&packet.header.tank_code, reading.distance_cm as f64)?;
            Ok(snapshot)
        }
    }
}

pub async fn listen(
    sock: UdpSocket,
    ingestor: Ingestor,
    device_key: Option<String>,
) -> Result<()> {
    let mut buf = [0; 1024];
    info!("Listening for tank readings on udp {}", sock.local_addr()?);

    loop {
        tokio::select! {
            res = sock.recv_from(&mut buf) => {
                let (len, addr): (usize, SocketAddr) = match res {
                    Ok(x) => x,
                    Err(e) => {
                        warn!("udp receive failed: {}", e);
                        continue;
                    }
                };
                match handle_datagram(&buf[0..len], &ingestor, device_key.as_deref()) {
                    Ok(snapshot) => debug!(
                        "udp reading from {} for tank {}: {}",
                        addr,
                        snapshot.tank_code,
                        snapshot.status.as_str()
                    ),
                    Err(e) => warn!("dropped datagram from {}: {}", addr, e),
                }
            }
            Ok(()) = signal::ctrl_c() => { break; }
        }
    }

    info!("udp listener stopped");
    Ok(())
}
