use actix_cors::Cors;
use actix_files::Files;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App, HttpResponse, HttpServer};
use log::{error, info, warn};

use tabular_predict::config::AppConfig;
use tabular_predict::models::{ApiResponse, Outcome};
use tabular_predict::routes::{self, AppState};
use tabular_predict::service::PredictionService;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .format_module_path(false)
        .init();

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
        }
    };

    info!("Starting {} prediction service", cfg.schema.name);

    // Loaded (or trained) once, before the server accepts requests.
    let service = PredictionService::bootstrap(&cfg);
    if service.model().is_none() {
        warn!("Serving without a model; /predict will report it as unavailable");
    }

    let state = web::Data::new(AppState {
        service,
        static_dir: cfg.static_dir.clone(),
    });

    let bind_address = cfg.bind_address();
    let static_dir = cfg.static_dir.clone();

    info!("Listening on http://{}", bind_address);
    info!("Workers: {}", cfg.workers);
    info!("   GET  /                - Interface");
    info!("   POST /predict         - Prediction");
    info!("   GET  /api/health      - Health check");
    info!("   GET  /api/model-info  - Model information");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![actix_web::http::header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(DefaultHeaders::new().add(("X-Content-Type-Options", "nosniff")))
            .wrap(cors)
            .app_data(state.clone())
            .configure(routes::configure)
            .service(Files::new("/static", static_dir.clone()).prefer_utf8(true))
            .default_service(web::route().to(|| async {
                HttpResponse::NotFound().json(ApiResponse::<Outcome>::error("Endpoint not found"))
            }))
    })
    .workers(cfg.workers)
    .bind(&bind_address)?
    .run()
    .await
}
