use std::path::PathBuf;

use actix_files::NamedFile;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use futures_util::StreamExt;
use log::{error, info};
use serde_json::{json, Map, Value};

use crate::error::PredictError;
use crate::models::ApiResponse;
use crate::service::PredictionService;

/// Largest `/predict` body read before answering with an error envelope.
pub const MAX_BODY_BYTES: usize = 256 * 1024;

pub struct AppState {
    pub service: PredictionService,
    pub static_dir: PathBuf,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/predict", web::post().to(predict))
        .route("/api/health", web::get().to(health_check))
        .route("/api/model-info", web::get().to(model_info));
}

async fn index(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let path = state.static_dir.join("index.html");
    match NamedFile::open_async(&path).await {
        Ok(file) => file.into_response(&req),
        Err(e) => {
            error!("Cannot open {}: {}", path.display(), e);
            HttpResponse::InternalServerError().body("Interface unavailable")
        }
    }
}

/// Parse a flat JSON object or a urlencoded form into a field map.
fn parse_fields(content_type: &str, body: &[u8]) -> Result<Map<String, Value>, PredictError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(PredictError::malformed("request body is empty"));
    }

    if content_type == "application/x-www-form-urlencoded" {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|e| PredictError::malformed(format!("invalid form body: {}", e)))?;
        return Ok(pairs
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect());
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(PredictError::malformed("request body must be a JSON object")),
        Err(e) => Err(PredictError::malformed(format!("invalid JSON body: {}", e))),
    }
}

async fn read_body(mut payload: web::Payload) -> Result<web::BytesMut, PredictError> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk =
            chunk.map_err(|e| PredictError::malformed(format!("reading request body: {}", e)))?;
        if body.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(PredictError::malformed("request body too large"));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Always answers 200; failures are flagged inside the envelope.
async fn predict(state: web::Data<AppState>, req: HttpRequest, payload: web::Payload) -> HttpResponse {
    let fields = match read_body(payload)
        .await
        .and_then(|body| parse_fields(req.content_type(), &body))
    {
        Ok(fields) => fields,
        Err(e) => return HttpResponse::Ok().json(state.service.reject(e)),
    };

    let worker_state = state.clone();
    match web::block(move || worker_state.service.respond(&fields)).await {
        Ok(response) => {
            if response.success {
                info!("Prediction served ({})", state.service.schema().name);
            }
            HttpResponse::Ok().json(response)
        }
        Err(e) => {
            error!("Prediction worker failed: {}", e);
            HttpResponse::Ok().json(
                state
                    .service
                    .reject(PredictError::malformed("prediction worker failed")),
            )
        }
    }
}

async fn health_check(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "success": true,
        "status": "ok",
        "schema": state.service.schema().name,
        "model_loaded": state.service.model().is_some(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn model_info(state: web::Data<AppState>) -> impl Responder {
    let service = &state.service;
    match service.model() {
        Some(model) => HttpResponse::Ok().json(json!({
            "success": true,
            "schema": service.schema().name,
            "task": service.schema().task,
            "features": service.schema().feature_names(),
            "model": model.info(),
        })),
        None => HttpResponse::Ok().json(ApiResponse::<()>::error(
            &PredictError::ModelUnavailable.to_string(),
        )),
    }
}
