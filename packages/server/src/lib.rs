#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the sound map.
//!
//! Exposes the heatmap pipeline, place search, and recording markers as a
//! JSON API for the mobile map shell. All state lives in one
//! [`SoundMap`] shared across workers; heatmap requests name their map
//! session with a `session` query parameter.

mod handlers;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use soundmap_app::SoundMap;
use soundmap_config::AppConfig;

/// Shared application state.
pub struct AppState {
    /// Heatmap, search and recordings.
    pub soundmap: SoundMap,
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/heatmap", web::get().to(handlers::heatmap))
            .route("/heatmap/current", web::get().to(handlers::current_heatmap))
            .route("/search", web::get().to(handlers::search))
            .route("/region/initial", web::get().to(handlers::initial_region))
            .route("/survey", web::get().to(handlers::survey))
            .route("/legend", web::get().to(handlers::legend))
            .route("/recordings", web::get().to(handlers::recordings))
            .route("/recordings", web::post().to(handlers::add_recording))
            .route("/recordings/{id}", web::get().to(handlers::recording))
            .route("/cache", web::get().to(handlers::cache_stats)),
    );
}

/// Starts the sound map API server.
///
/// Builds the Overpass and Nominatim clients from `config` and serves the
/// API on the configured address. This is a regular async function; the
/// caller is responsible for providing the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP clients cannot be built,
/// or if the HTTP server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: AppConfig) -> std::io::Result<()> {
    let soundmap = SoundMap::from_config(&config).map_err(std::io::Error::other)?;
    let state = web::Data::new(AppState { soundmap });

    let bind_addr = config.server.bind_addr;
    let port = config.server.port;

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
