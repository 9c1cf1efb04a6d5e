#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for geotrack.
//!
//! Accepts location reports, stores them with derived motion metrics via a
//! [`TrackStore`], and serves the stored track back as JSON. The storage
//! backend is selected once at startup from [`StoreConfig::from_env`].

mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{App, HttpResponse, HttpServer, error, middleware, web};
use geotrack_server_models::ApiMessage;
use geotrack_store::{StoreConfig, TrackStore, open_store};

/// Environment variable overriding the static frontend directory.
pub const STATIC_DIR_VAR: &str = "GEOTRACK_STATIC_DIR";

/// Port used when `PORT` is unset or invalid.
pub const DEFAULT_PORT: u16 = 5000;

/// Shared application state.
pub struct AppState {
    /// Track record store.
    pub store: Arc<dyn TrackStore>,
}

/// Registers the API routes and the JSON/query extractor error handlers.
///
/// Extractor failures (malformed JSON, unknown `order` values) are reported
/// as `400` with the usual `{status, message}` body.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        log::warn!("Rejected request body: {err}");
        let response = HttpResponse::BadRequest().json(ApiMessage::error(err.to_string()));
        error::InternalError::from_response(err, response).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        log::warn!("Rejected query string: {err}");
        let response = HttpResponse::BadRequest().json(ApiMessage::error(err.to_string()));
        error::InternalError::from_response(err, response).into()
    }))
    .route("/health", web::get().to(handlers::health))
    .route("/submit", web::post().to(handlers::submit))
    .route("/data", web::get().to(handlers::list))
    .route("/data/{id}", web::get().to(handlers::get))
    .route("/delete/{id}", web::delete().to(handlers::delete_one))
    .route("/delete_all", web::delete().to(handlers::delete_all));
}

fn static_dir() -> PathBuf {
    std::env::var(STATIC_DIR_VAR).map_or_else(
        |_| PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/static")),
        PathBuf::from,
    )
}

/// Starts the geotrack API server.
///
/// Resolves the store configuration from the environment, opens the
/// configured backend and starts the Actix-Web HTTP server on `BIND_ADDR`
/// (default `127.0.0.1`) and `PORT` (default [`DEFAULT_PORT`]). This is a
/// regular async function; the caller provides the runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the configuration is invalid, the
/// store cannot be opened, or the HTTP server fails to bind.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let store_config = StoreConfig::from_env().map_err(std::io::Error::other)?;
    let store = open_store(&store_config).map_err(std::io::Error::other)?;

    let state = web::Data::new(AppState { store });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let static_dir = static_dir();

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
            // Serve the frontend
            .service(Files::new("/", &static_dir).index_file("index.html"))
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
