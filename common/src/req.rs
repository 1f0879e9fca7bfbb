use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub enum TankStatus {
    #[serde(rename = "GOOD")]
    Good,
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "CRITICAL")]
    Critical,
    #[serde(rename = "NONE")]
    NoData,
}

impl TankStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TankStatus::Good => "GOOD",
            TankStatus::Warn => "WARN",
            TankStatus::Low => "LOW",
            TankStatus::Critical => "CRITICAL",
            TankStatus::NoData => "NONE",
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            TankStatus::Good => "Water level good",
            TankStatus::Warn => "Overflow warning",
            TankStatus::Low => "Water level low",
            TankStatus::Critical => "Water level critical",
            TankStatus::NoData => "No Data",
        }
    }
}

impl std::str::FromStr for TankStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GOOD" => Ok(TankStatus::Good),
            "WARN" => Ok(TankStatus::Warn),
            "LOW" => Ok(TankStatus::Low),
            "CRITICAL" => Ok(TankStatus::Critical),
            "NONE" => Ok(TankStatus::NoData),
            other => Err(format!("unknown tank status {other}")),
        }
    }
}

/// Status LED colour shown by the tank's sensor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LedColor {
    Green,
    Yellow,
    Magenta,
    Red,
    Off,
}

impl From<TankStatus> for LedColor {
    fn from(status: TankStatus) -> Self {
        match status {
            TankStatus::Good => LedColor::Green,
            TankStatus::Warn => LedColor::Yellow,
            TankStatus::Low => LedColor::Magenta,
            TankStatus::Critical => LedColor::Red,
            TankStatus::NoData => LedColor::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TankConfig {
    pub tank_height_cm: f64,
    pub ideal_water_height_cm: f64,
    pub min_water_height_cm: f64,
    pub max_water_height_cm: f64,
    // below this the status is CRITICAL instead of LOW
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_water_height_cm: Option<f64>,
    #[serde(default)]
    pub is_demo_mode: bool,
}

/// Config as exchanged with the sensor node firmware.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DeviceConfig {
    pub tank_height_cm: f64,
    pub ideal_water_cm: f64,
    pub min_water_cm: f64,
    pub max_water_cm: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_water_cm: Option<f64>,
    #[serde(default)]
    pub demo_mode: bool,
}

impl From<DeviceConfig> for TankConfig {
    fn from(cfg: DeviceConfig) -> Self {
        Self {
            tank_height_cm: cfg.tank_height_cm,
            ideal_water_height_cm: cfg.ideal_water_cm,
            min_water_height_cm: cfg.min_water_cm,
            max_water_height_cm: cfg.max_water_cm,
            critical_water_height_cm: cfg.critical_water_cm,
            is_demo_mode: cfg.demo_mode,
        }
    }
}

impl From<TankConfig> for DeviceConfig {
    fn from(cfg: TankConfig) -> Self {
        Self {
            tank_height_cm: cfg.tank_height_cm,
            ideal_water_cm: cfg.ideal_water_height_cm,
            min_water_cm: cfg.min_water_height_cm,
            max_water_cm: cfg.max_water_height_cm,
            critical_water_cm: cfg.critical_water_height_cm,
            demo_mode: cfg.is_demo_mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeSnapshot {
    pub tank_code: String,
    pub distance_cm: f64,
    pub fill_height_cm: f64,
    pub water_level_percent: f64, // 0..=100
    pub status: TankStatus,
    pub status_text: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Live,
    Stored, // last snapshot is older than the stale window
    NoData,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TankRecord {
    pub tank_code: String,
    pub name: Option<String>,
    pub device_url: Option<String>,
    pub config: Option<TankConfig>,
    pub created_at: DateTime<Utc>,
    pub snapshot: Option<RealtimeSnapshot>,
    pub freshness: Freshness,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTank {
    pub tank_code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device_url: Option<String>,
    #[serde(default)]
    pub config: Option<TankConfig>,
}

#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingRequest {
    pub distance_cm: f64,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct ReadingResponse {
    pub snapshot: RealtimeSnapshot,
    pub led: LedColor,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdateResponse {
    pub tank: TankRecord,
    pub device_synced: bool,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisoryRequest {
    pub message: String,
    #[serde(default)]
    pub tank_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AdvisoryReply {
    pub reply: String,
    pub rule: String,
}
