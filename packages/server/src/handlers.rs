//! HTTP handler functions for the sound map API.

use actix_web::{HttpResponse, web};
use soundmap_app::{AppError, DEFAULT_SESSION, SoundMap};
use soundmap_geocoder::GeocodeError;
use soundmap_heatmap::RefreshOutcome;
use soundmap_models::{BoundingRegion, GeoPoint};
use soundmap_server_models::{
    ApiCacheStats, ApiHealth, ApiHeatmapError, ApiSurvey, HeatmapQueryParams, InitialRegionParams,
    NewRecording, SearchQueryParams, SessionParams, SurveyQueryParams,
};
use uuid::Uuid;

use crate::AppState;

const DEFAULT_SURVEY_RADIUS_M: u32 = 1000;

fn session_or_default(session: Option<&str>) -> &str {
    session
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SESSION)
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/heatmap`
///
/// Treats the bounding box as a region change in the request's session
/// and returns the resulting layer. A request overtaken by a newer one in
/// the same session gets 409; a failed fetch gets 502 along with the layer
/// that stays on screen.
pub async fn heatmap(
    state: web::Data<AppState>,
    params: web::Query<HeatmapQueryParams>,
) -> HttpResponse {
    let region = match params.bbox.as_deref().map(BoundingRegion::parse_bbox) {
        Some(Ok(Some(region))) => region,
        Some(Err(e)) => return bad_request(&e.to_string()),
        Some(Ok(None)) | None => {
            return bad_request("bbox must be west,south,east,north");
        }
    };

    let session = session_or_default(params.session.as_deref());

    match state.soundmap.on_region_change(session, region).await {
        Ok(RefreshOutcome::Applied(layer)) => HttpResponse::Ok().json(layer),
        Ok(RefreshOutcome::Superseded) => HttpResponse::Conflict().json(serde_json::json!({
            "error": "Superseded by a newer region"
        })),
        Err(AppError::Fetch(e)) => HttpResponse::BadGateway().json(ApiHeatmapError {
            error: e.to_string(),
            phase: e.phase.to_string(),
            previous: state.soundmap.current_heatmap(session),
        }),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/heatmap/current`
pub async fn current_heatmap(
    state: web::Data<AppState>,
    params: web::Query<SessionParams>,
) -> HttpResponse {
    let session = session_or_default(params.session.as_deref());
    state.soundmap.current_heatmap(session).map_or_else(
        || {
            HttpResponse::NotFound().json(serde_json::json!({
                "error": "No heatmap has been loaded yet"
            }))
        },
        |layer| HttpResponse::Ok().json(layer),
    )
}

/// `GET /api/search`
///
/// Geocodes `q` and returns the region to move the map to.
pub async fn search(
    state: web::Data<AppState>,
    params: web::Query<SearchQueryParams>,
) -> HttpResponse {
    let Some(query) = params.q.as_deref() else {
        return bad_request("Missing query parameter q");
    };

    match state.soundmap.search(query).await {
        Ok(region) => HttpResponse::Ok().json(region),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/region/initial`
///
/// Region the map opens on: the device location when shared, otherwise
/// the default city view.
pub async fn initial_region(params: web::Query<InitialRegionParams>) -> HttpResponse {
    let location = match (params.lat, params.lon) {
        (Some(lat), Some(lon)) => match GeoPoint::new(lat, lon) {
            Ok(point) => Some(point),
            Err(e) => return bad_request(&e.to_string()),
        },
        _ => None,
    };

    HttpResponse::Ok().json(SoundMap::starting_region(location, params.permission))
}

/// `GET /api/survey`
///
/// Counts roads and buildings around a point and scores the result.
pub async fn survey(
    state: web::Data<AppState>,
    params: web::Query<SurveyQueryParams>,
) -> HttpResponse {
    let center = match GeoPoint::new(params.lat, params.lon) {
        Ok(point) => point,
        Err(e) => return bad_request(&e.to_string()),
    };
    let radius = params.radius.unwrap_or(DEFAULT_SURVEY_RADIUS_M);

    match state.soundmap.survey(center, radius).await {
        Ok(survey) => HttpResponse::Ok().json(ApiSurvey::from(survey)),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/legend`
pub async fn legend() -> HttpResponse {
    HttpResponse::Ok().json(SoundMap::legend())
}

/// `GET /api/recordings`
pub async fn recordings(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.soundmap.recordings())
}

/// `POST /api/recordings`
///
/// Pins a finished recording to the map.
pub async fn add_recording(
    state: web::Data<AppState>,
    body: web::Json<NewRecording>,
) -> HttpResponse {
    let location = match GeoPoint::new(body.latitude, body.longitude) {
        Ok(point) => point,
        Err(e) => return bad_request(&e.to_string()),
    };

    match state
        .soundmap
        .add_recording(location, body.session(), body.microphone)
    {
        Ok(marker) => HttpResponse::Created().json(marker),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/recordings/{id}`
pub async fn recording(state: web::Data<AppState>, path: web::Path<Uuid>) -> HttpResponse {
    let id = path.into_inner();
    state.soundmap.recording(id).map_or_else(
        || {
            HttpResponse::NotFound().json(serde_json::json!({
                "error": format!("Recording {id} not found")
            }))
        },
        |marker| HttpResponse::Ok().json(marker),
    )
}

/// `GET /api/cache`
pub async fn cache_stats(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiCacheStats::from(state.soundmap.cache_stats().await))
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({ "error": message }))
}

fn error_response(e: &AppError) -> HttpResponse {
    let body = serde_json::json!({ "error": e.to_string() });
    match e {
        AppError::Geocode(GeocodeError::NotFound { .. }) => HttpResponse::NotFound().json(body),
        AppError::Fetch(_) | AppError::Geocode(_) => {
            log::error!("Upstream request failed: {e}");
            HttpResponse::BadGateway().json(body)
        }
        AppError::PermissionDenied(_) => HttpResponse::Forbidden().json(body),
        AppError::InvalidInput { .. } => HttpResponse::BadRequest().json(body),
        AppError::Setup { .. } => {
            log::error!("{e}");
            HttpResponse::InternalServerError().json(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use async_trait::async_trait;
    use soundmap_config::AppConfig;
    use soundmap_geocoder::NominatimClient;
    use soundmap_heatmap::InfrastructureSource;
    use soundmap_models::{
        Building, HeatmapLayer, InfrastructureCount, LegendBand, MapRegion, RecordingMarker,
    };
    use soundmap_overpass::OverpassError;

    use super::*;

    /// One building in every region, counted slowly enough for requests
    /// to overlap.
    struct SlowSource;

    #[async_trait]
    impl InfrastructureSource for SlowSource {
        async fn buildings(
            &self,
            region: &BoundingRegion,
            _limit: u32,
        ) -> Result<Vec<Building>, OverpassError> {
            Ok(vec![Building {
                id: 1,
                anchor: region.south_west,
            }])
        }

        async fn road_counts(
            &self,
            anchors: &[GeoPoint],
            _radius_m: u32,
        ) -> Result<Vec<u64>, OverpassError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(vec![10; anchors.len()])
        }

        async fn survey(
            &self,
            _center: GeoPoint,
            _radius_m: u32,
        ) -> Result<InfrastructureCount, OverpassError> {
            Ok(InfrastructureCount::default())
        }
    }

    fn state() -> web::Data<AppState> {
        let soundmap = SoundMap::from_config(&AppConfig::defaults()).unwrap();
        web::Data::new(AppState { soundmap })
    }

    fn offline_state() -> web::Data<AppState> {
        let mut config = AppConfig::defaults();
        config.nominatim.base_url = "http://127.0.0.1:9/search".to_string();
        let geocoder = NominatimClient::new(&config.nominatim).unwrap();
        let soundmap = SoundMap::new(&config, Arc::new(SlowSource), geocoder);
        web::Data::new(AppState { soundmap })
    }

    macro_rules! app {
        () => {
            app!(state())
        };
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state)
                    .configure(crate::configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn health_reports_version() {
        let app = app!();
        let resp: ApiHealth = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/api/health").to_request(),
        )
        .await;
        assert!(resp.healthy);
        assert_eq!(resp.version, env!("CARGO_PKG_VERSION"));
    }

    #[actix_web::test]
    async fn legend_lists_four_bands() {
        let app = app!();
        let bands: Vec<LegendBand> = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/api/legend").to_request(),
        )
        .await;
        assert_eq!(bands.len(), 4);
        assert_eq!(bands[0].color, "red");
    }

    #[actix_web::test]
    async fn current_heatmap_is_404_before_first_refresh() {
        let app = app!();
        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/heatmap/current").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn malformed_bbox_is_rejected() {
        let app = app!();
        for uri in [
            "/api/heatmap",
            "/api/heatmap?bbox=1,2,3",
            "/api/heatmap?bbox=-122.4,47.7,-122.2,47.5",
            "/api/heatmap?bbox=-122.4,95,-122.2,96",
            "/api/heatmap?bbox=x,-122.4,47.5,-122.3,47.7",
        ] {
            let resp =
                test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[actix_web::test]
    async fn concurrent_sessions_both_get_their_heatmap() {
        let app = app!(offline_state());

        let phone = test::TestRequest::get()
            .uri("/api/heatmap?bbox=-122.4,47.5,-122.3,47.7&session=phone")
            .to_request();
        let tablet = test::TestRequest::get()
            .uri("/api/heatmap?bbox=-122.35,47.6,-122.3,47.65&session=tablet")
            .to_request();
        let (phone, tablet) = tokio::join!(
            test::call_service(&app, phone),
            test::call_service(&app, tablet),
        );
        assert_eq!(phone.status(), StatusCode::OK);
        assert_eq!(tablet.status(), StatusCode::OK);

        let current: HeatmapLayer = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/api/heatmap/current?session=phone")
                .to_request(),
        )
        .await;
        assert!((current.region.west() - -122.4).abs() < 1e-9);

        let other = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/heatmap/current").to_request(),
        )
        .await;
        assert_eq!(other.status(), StatusCode::NOT_FOUND);
    }

    #[::core::prelude::v1::test]
    fn app_errors_map_to_status_codes() {
        let setup = AppError::Setup {
            message: "Overpass client: builder error".to_string(),
        };
        assert_eq!(
            error_response(&setup).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let invalid = AppError::InvalidInput {
            message: "uri must not be empty".to_string(),
        };
        assert_eq!(error_response(&invalid).status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn search_requires_query() {
        let app = app!();
        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/search").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn initial_region_falls_back_to_default_when_denied() {
        let app = app!();
        let region: MapRegion = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/api/region/initial?lat=40.7&lon=-74.0&permission=denied")
                .to_request(),
        )
        .await;
        assert_eq!(region, MapRegion::default());

        let region: MapRegion = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/api/region/initial?lat=40.7&lon=-74.0")
                .to_request(),
        )
        .await;
        assert!((region.latitude - 40.7).abs() < f64::EPSILON);
    }

    #[actix_web::test]
    async fn recordings_round_trip_through_the_api() {
        let app = app!();

        let denied = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/recordings")
                .set_json(serde_json::json!({
                    "latitude": 47.6,
                    "longitude": -122.3,
                    "uri": "file:///rec.m4a",
                    "averageLoudness": 66.0,
                    "microphone": "denied",
                }))
                .to_request(),
        )
        .await;
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let created = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/recordings")
                .set_json(serde_json::json!({
                    "latitude": 47.6,
                    "longitude": -122.3,
                    "uri": "file:///rec.m4a",
                    "averageLoudness": 66.0,
                }))
                .to_request(),
        )
        .await;
        assert_eq!(created.status(), StatusCode::CREATED);
        let marker: RecordingMarker = test::read_body_json(created).await;

        let fetched: RecordingMarker = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri(&format!("/api/recordings/{}", marker.id))
                .to_request(),
        )
        .await;
        assert_eq!(fetched, marker);

        let all: Vec<RecordingMarker> = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/api/recordings").to_request(),
        )
        .await;
        assert_eq!(all.len(), 1);

        let missing = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/api/recordings/{}", Uuid::new_v4()))
                .to_request(),
        )
        .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
