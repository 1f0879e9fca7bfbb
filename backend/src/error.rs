use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

#[derive(Debug, thiserror::Error)]
pub enum TankError {
    #[error("tank {0} is not registered")]
    UnknownTank(String),

    #[error("tank {0} has no configuration")]
    NotConfigured(String),

    #[error("invalid tank config: {0}")]
    InvalidConfig(String),

    #[error("invalid reading: {0}")]
    InvalidReading(String),

    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("missing or wrong device key")]
    Unauthorized,

    #[error("storage error: {0}")]
    Storage(String),
}

impl TankError {
    pub fn kind(&self) -> &'static str {
        match self {
            TankError::UnknownTank(_) => "UNKNOWN_TANK",
            TankError::NotConfigured(_) => "NOT_CONFIGURED",
            TankError::InvalidConfig(_) => "INVALID_CONFIG",
            TankError::InvalidReading(_) => "INVALID_READING",
            TankError::DeviceUnreachable(_) => "DEVICE_UNREACHABLE",
            TankError::AlreadyExists(_) => "ALREADY_EXISTS",
            TankError::Malformed(_) => "MALFORMED",
            TankError::Unauthorized => "UNAUTHORIZED",
            TankError::Storage(_) => "STORAGE",
        }
    }
}

impl From<DieselError> for TankError {
    fn from(error: DieselError) -> TankError {
        match error {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                TankError::AlreadyExists(info.message().to_string())
            }
            err => TankError::Storage(err.to_string()),
        }
    }
}

impl ResponseError for TankError {
    fn status_code(&self) -> StatusCode {
        match self {
            TankError::UnknownTank(_) | TankError::NotConfigured(_) => StatusCode::NOT_FOUND,
            TankError::InvalidConfig(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TankError::InvalidReading(_) | TankError::Malformed(_) => StatusCode::BAD_REQUEST,
            TankError::AlreadyExists(_) => StatusCode::CONFLICT,
            TankError::Unauthorized => StatusCode::UNAUTHORIZED,
            TankError::DeviceUnreachable(_) => StatusCode::BAD_GATEWAY,
            TankError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        }))
    }
}
