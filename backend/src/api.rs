use actix_cors::Cors;
use actix_web::{
    delete, error::JsonPayloadError, get,
    http::header::{self, HeaderName},
    middleware, post,
    web::{self, Data},
    App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use chrono::Utc;
use common::req::{
    AdvisoryRequest, ConfigUpdateResponse, DeviceConfig, LedColor, NewTank, ReadingRequest,
    ReadingResponse, TankConfig, TankRecord,
};
use log::{info, warn};

use crate::db::{self, Db, TankRow};
use crate::error::TankError;
use crate::{advisory, status, stream, AppState};

pub const DEVICE_KEY_HEADER: &str = "x-device-key";

const MAX_CODE_LEN: usize = 64;

fn check_tank_code(code: &str) -> Result<(), TankError> {
    if code.is_empty() || code.len() > MAX_CODE_LEN {
        return Err(TankError::Malformed(format!(
            "tank code must have 1 to {} characters",
            MAX_CODE_LEN
        )));
    }
    if code == "byCode" {
        return Err(TankError::Malformed("byCode is reserved".to_string()));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(TankError::Malformed(format!(
            "tank code {:?} may only contain letters, digits, '-' and '_'",
            code
        )));
    }
    Ok(())
}

fn check_device_key(req: &HttpRequest, state: &AppState) -> Result<(), TankError> {
    let expected = match &state.settings.device_api_key {
        Some(key) => key,
        None => return Ok(()),
    };
    let given = req
        .headers()
        .get(DEVICE_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if given == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(TankError::Unauthorized)
    }
}

// The hub holds every stored snapshot. Must not be called with the db locked.
fn tank_record(state: &AppState, tank: TankRow) -> TankRecord {
    let snapshot = state.hub.get(&tank.tank_code);
    let freshness = status::freshness(snapshot.as_ref(), Utc::now(), state.settings.stale_after);

    TankRecord {
        config: tank.config(),
        created_at: tank.created_at(),
        tank_code: tank.tank_code,
        name: tank.name,
        device_url: tank.device_url,
        snapshot,
        freshness,
    }
}

fn find_tank(db: &mut Db, code: &str) -> Result<TankRow, TankError> {
    db.tank(code)?
        .ok_or_else(|| TankError::UnknownTank(code.to_string()))
}

#[get("/")]
async fn hello() -> impl Responder {
    HttpResponse::Ok().body("tank backend")
}

#[get("/tanksNew")]
async fn list_tanks(state: Data<AppState>) -> Result<impl Responder, TankError> {
    let tanks = db::lock(&state.db).tanks()?;
    let records: Vec<_> = tanks
        .into_iter()
        .map(|tank| tank_record(&state, tank))
        .collect();

    Ok(web::Json(records))
}

#[post("/tanksNew")]
async fn create_tank(
    body: web::Json<NewTank>,
    state: Data<AppState>,
) -> Result<impl Responder, TankError> {
    let new = body.into_inner();
    check_tank_code(&new.tank_code)?;
    if let Some(config) = &new.config {
        status::validate_config(config)?;
    }

    let row = TankRow::new(
        new.tank_code.clone(),
        new.name,
        new.device_url,
        new.config.as_ref(),
        Utc::now(),
    );
    {
        // the hub learns about the tank before anyone can delete it again
        let mut db = db::lock(&state.db);
        db.insert_tank(&row).map_err(|e| match e {
            TankError::AlreadyExists(_) => {
                TankError::AlreadyExists(format!("tank {}", new.tank_code))
            }
            e => e,
        })?;
        state.hub.register(&row.tank_code);
    }
    info!("Registered tank {}", new.tank_code);

    Ok(HttpResponse::Created().json(tank_record(&state, row)))
}

#[get("/tanksNew/byCode/{tank_code}")]
async fn tank_by_code(
    path: web::Path<String>,
    state: Data<AppState>,
) -> Result<impl Responder, TankError> {
    let code = path.into_inner();
    let tank = find_tank(&mut db::lock(&state.db), &code)?;

    Ok(web::Json(tank_record(&state, tank)))
}

#[delete("/tanksNew/{tank_code}")]
async fn delete_tank(
    path: web::Path<String>,
    state: Data<AppState>,
) -> Result<impl Responder, TankError> {
    let code = path.into_inner();
    {
        let mut db = db::lock(&state.db);
        if !db.delete_tank(&code)? {
            return Err(TankError::UnknownTank(code));
        }
        // under the db lock so a tank recreated with this code keeps its new slot.
        // Dropping the slot ends the open streams of this tank.
        state.hub.remove(&code);
    }
    info!("Deleted tank {}", code);

    Ok(HttpResponse::NoContent().finish())
}

#[post("/tanksNew/{tank_code}/reading")]
async fn post_reading(
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Json<ReadingRequest>,
    state: Data<AppState>,
) -> Result<impl Responder, TankError> {
    let code = path.into_inner();
    check_device_key(&req, &state).map_err(|e| {
        warn!("Rejected reading for tank {}: {}", code, e);
        e
    })?;

    let snapshot = state.ingestor.ingest(&code, body.distance_cm)?;
    let led = LedColor::from(snapshot.status);

    Ok(web::Json(ReadingResponse { snapshot, led }))
}

#[post("/tanksNew/{tank_code}/config")]
async fn set_config(
    path: web::Path<String>,
    body: web::Json<DeviceConfig>,
    state: Data<AppState>,
) -> Result<impl Responder, TankError> {
    let code = path.into_inner();
    let config = TankConfig::from(body.into_inner());
    status::validate_config(&config)?;

    // the db guard must not live across the device push
    let row = {
        let mut db = db::lock(&state.db);
        db.update_tank_config(&code, &config)?;
        find_tank(&mut db, &code)?
    };
    let tank = tank_record(&state, row);
    info!("Updated config of tank {}", code);

    let device_synced = match &tank.device_url {
        Some(url) => match state.devices.push_config(url, &DeviceConfig::from(config)).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Config of tank {} saved but not delivered: {}", code, e);
                false
            }
        },
        None => false,
    };

    Ok(web::Json(ConfigUpdateResponse {
        tank,
        device_synced,
    }))
}

#[get("/tanksNew/{tank_code}/config")]
async fn get_config(
    path: web::Path<String>,
    state: Data<AppState>,
) -> Result<impl Responder, TankError> {
    let code = path.into_inner();
    let tank = find_tank(&mut db::lock(&state.db), &code)?;
    let config = tank
        .config()
        .ok_or_else(|| TankError::NotConfigured(code.clone()))?;

    Ok(web::Json(DeviceConfig::from(config)))
}

#[get("/tanksNew/{tank_code}/stream")]
async fn tank_stream(
    path: web::Path<String>,
    state: Data<AppState>,
) -> Result<HttpResponse, TankError> {
    let code = path.into_inner();
    // registered tanks only, so a stream never outlives its tank
    let (current, subscription) = state.hub.subscribe(&code)?;
    info!(
        "Stream opened for tank {} ({} subscribers)",
        code,
        state.hub.subscriber_count(&code)
    );

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream::body(current, subscription, state.settings.heartbeat)))
}

#[post("/advisory")]
async fn post_advisory(body: web::Json<AdvisoryRequest>, state: Data<AppState>) -> impl Responder {
    let snapshot = body.tank_code.as_deref().and_then(|code| state.hub.get(code));

    web::Json(advisory::advise(&body.message, snapshot.as_ref()))
}

/// Malformed JSON on the reading endpoint is an invalid reading, anywhere else a
/// malformed request.
fn json_error(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    let message = err.to_string();
    if req.path().ends_with("/reading") {
        warn!("Rejected reading body on {}: {}", req.path(), message);
        TankError::InvalidReading(message).into()
    } else {
        TankError::Malformed(message).into()
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
    .service(hello)
    .service(list_tanks)
    .service(create_tank)
    // before the /tanksNew/{tank_code}/... routes so "byCode" is not taken for a code
    .service(tank_by_code)
    .service(delete_tank)
    .service(post_reading)
    .service(set_config)
    .service(get_config)
    .service(tank_stream)
    .service(post_advisory);
}

pub async fn new_http_server(state: AppState) -> std::io::Result<()> {
    let bind = state.settings.http_bind.clone();
    let origin = state.settings.frontend_origin.clone();
    info!("Serving http on {}", bind);

    HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .configure(configure)
            .wrap(
                Cors::default()
                    .allowed_origin(&origin)
                    .allowed_methods(vec!["GET", "POST", "DELETE"])
                    .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT])
                    .allowed_header(header::CONTENT_TYPE)
                    .allowed_header(HeaderName::from_static(DEVICE_KEY_HEADER))
                    .supports_credentials()
                    .max_age(3600),
            )
            .wrap(middleware::Logger::default())
    })
    .bind(bind)?
    .run()
    .await
}
