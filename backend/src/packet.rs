const MAGIC: &str = "TNK1";

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("cannot decode packet: {0}")]
    Decode(#[from] postcard::Error),
    #[error("unexpected magic {0:?}")]
    BadMagic(String),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Header {
    magic: String,
    pub device_key: String,
    pub tank_code: String,
}

impl Header {
    pub fn new(tank_code: &str, device_key: &str) -> Self {
        Self {
            magic: MAGIC.to_string(),
            device_key: device_key.to_string(),
            tank_code: tank_code.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Packet {
    pub header: Header,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Payload {
    Reading(Reading),
}

#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Reading {
    pub distance_cm: f32,
    pub timestamp: u64, // ms since epoch, device clock
}

impl Packet {
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let packet: Packet = postcard::from_bytes(data)?;
        if packet.header.magic != MAGIC {
            return Err(PacketError::BadMagic(packet.header.magic));
        }
        Ok(packet)
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        Ok(postcard::to_allocvec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_what_the_node_sends() {
        let packet = Packet {
            header: Header::new("T1", "k"),
            payload: Payload::Reading(Reading {
                distance_cm: 8.5,
                timestamp: 1_700_000_000_000,
            }),
        };
        let bytes = packet.encode().unwrap();
        assert!(bytes.len() < 64);
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn rejects_foreign_packets() {
        let mut packet = Packet {
            header: Header::new("T1", "k"),
            payload: Payload::Reading(Reading::default()),
        };
        packet.header.magic = "M1S1".to_string();
        let bytes = packet.encode().unwrap();
        assert!(matches!(
            Packet::decode(&bytes).unwrap_err(),
            PacketError::BadMagic(_)
        ));

        assert!(matches!(
            Packet::decode(&[0xFF, 0x01]).unwrap_err(),
            PacketError::Decode(_)
        ));
    }
}
