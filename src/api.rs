//! REST API for the pallet planner.
//!
//! Provides HTTP endpoints for planning a load, streaming the planning steps
//! and applying manual moves. Uses Axum as the web framework and supports CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, OptimizerConfig};
use crate::error::{ErrorReport, PackingError};
use crate::input::{RawProductRow, RawUnitOverride};
use crate::metrics::{PackingMetrics, PalletSummary, ProductTally, TruckEstimate, summarize};
use crate::model::{
    ColumnBlock, OrientationPolicy, Pallet, PalletSpec, PlacedBlock, RiderPlacement, ShelfCursor,
    UnitItem,
};
use crate::optimizer::{
    OptimizationResult, PackingConfig, PackingMode, RejectedItem, optimize,
    optimize_with_progress,
};
use crate::overrides::{Destination, MoveRequest, NewPallet, move_block};
use crate::types::{Footprint, Vec3};

#[derive(Clone)]
struct ApiState {
    optimizer_config: OptimizerConfig,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>pallet-planner API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Request structure for the planning endpoints.
#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "pallet": {
            "max_width": 1100.0,
            "max_depth": 1100.0,
            "max_height": 1700.0,
            "max_weight": 1000.0
        },
        "rows": [
            { "name": "A", "width": 300, "depth": 300, "height": 200, "weight": 5.0, "quantity": 10 }
        ],
        "overrides": [
            { "name": "A", "ids": "1-2", "rotate": "force-depth" }
        ],
        "mode": "columns"
    })
)]
pub struct PackRequest {
    pub pallet: PalletSpec,
    pub rows: Vec<RawProductRow>,
    #[serde(default)]
    pub overrides: Vec<RawUnitOverride>,
    /// Overrides the configured flow for this request.
    #[serde(default)]
    #[schema(nullable = true)]
    pub mode: Option<PackingMode>,
}

impl PackRequest {
    fn packing_config(&self, base: PackingConfig) -> PackingConfig {
        match self.mode {
            Some(mode) => PackingConfig { mode, ..base },
            None => base,
        }
    }
}

/// Request structure for the move endpoint.
#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "pallets": [],
        "source_pallet": 1,
        "source_index": 0,
        "destination": "new"
    })
)]
pub struct MoveBody {
    /// The current load, as returned by `/pack` or a previous `/move`.
    pub pallets: Vec<Pallet>,
    pub source_pallet: usize,
    pub source_index: usize,
    pub destination: Destination,
    #[serde(default)]
    pub destination_base: Option<usize>,
}

impl MoveBody {
    fn into_parts(self) -> (Vec<Pallet>, MoveRequest) {
        let request = MoveRequest {
            source_pallet: self.source_pallet,
            source_index: self.source_index,
            destination: self.destination,
            destination_base: self.destination_base,
        };
        (self.pallets, request)
    }
}

/// The load after a successful move.
#[derive(Serialize, ToSchema)]
pub struct MoveResponse {
    pub pallets: Vec<Pallet>,
    pub metrics: PackingMetrics,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
    /// Machine-readable reason, present when a planner rule rejected the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
            code: None,
        }
    }

    fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn pallet_config_error(err: &PackingError) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(
            ErrorResponse::new("Invalid pallet configuration", err.to_string())
                .with_code(err.code()),
        ),
    )
        .into_response()
}

fn move_error(err: &PackingError) -> Response {
    let (status, error) = match err {
        PackingError::UnstableStack { .. }
        | PackingError::HeightExceeded { .. }
        | PackingError::NoFloorSpace { .. }
        | PackingError::WeightExceeded { .. } => (StatusCode::CONFLICT, "Move rejected"),
        _ => (StatusCode::UNPROCESSABLE_ENTITY, "Invalid move request"),
    };
    (
        status,
        Json(ErrorResponse::new(error, err.to_string()).with_code(err.code())),
    )
        .into_response()
}

fn parse_pack_request(
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> Result<PackRequest, Response> {
    let Json(payload) = payload.map_err(json_deserialize_error)?;
    payload
        .pallet
        .validate()
        .map_err(|err| pallet_config_error(&err))?;
    Ok(payload)
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_pack, handle_pack_stream, handle_move),
    components(
        schemas(
            PackRequest,
            MoveBody,
            MoveResponse,
            ErrorResponse,
            OptimizationResult,
            RejectedItem,
            ErrorReport,
            RawProductRow,
            RawUnitOverride,
            PackingMode,
            PalletSpec,
            Pallet,
            PlacedBlock,
            RiderPlacement,
            ColumnBlock,
            UnitItem,
            OrientationPolicy,
            ShelfCursor,
            Destination,
            NewPallet,
            PackingMetrics,
            PalletSummary,
            ProductTally,
            TruckEstimate,
            Footprint,
            Vec3
        )
    ),
    tags(
        (name = "planning", description = "Pallet planning"),
        (name = "overrides", description = "Manual corrections to a planned load")
    )
)]
struct ApiDoc;

/// Builds the router with all endpoints.
pub fn router(optimizer_config: OptimizerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let state = ApiState { optimizer_config };

    Router::new()
        .route("/pack", post(handle_pack))
        .route("/pack_stream", post(handle_pack_stream))
        .route("/move", post(handle_move))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server and blocks until it terminates.
pub async fn start_api_server(
    config: ApiConfig,
    optimizer_config: OptimizerConfig,
) -> std::io::Result<()> {
    let app = router(optimizer_config);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await.inspect_err(|err| {
        error!("Could not bind API server to {}: {}", addr, err);
    })?;

    info!(
        "Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() {
        info!("Local access: http://localhost:{}", config.port());
    }
    info!("Endpoints: POST /pack, POST /pack_stream, POST /move, GET /docs");

    axum::serve(listener, app).await.inspect_err(|err| {
        error!("API server terminated with an error: {err}");
    })
}

/// Handler for POST /pack endpoint.
///
/// Plans a load for the given rows and returns pallets, rejected cartons,
/// unreadable rows and load metrics.
#[utoipa::path(
    post,
    path = "/pack",
    request_body = PackRequest,
    responses(
        (status = 200, description = "Load planned", body = OptimizationResult),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or pallet configuration",
            body = ErrorResponse
        )
    ),
    tag = "planning"
)]
async fn handle_pack(
    State(state): State<ApiState>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> Response {
    let request = match parse_pack_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let config = request.packing_config(state.optimizer_config.packing_config());
    info!(
        rows = request.rows.len(),
        overrides = request.overrides.len(),
        mode = config.mode.as_str(),
        "new pack request"
    );

    match optimize(&request.rows, &request.overrides, &request.pallet, &config) {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => pallet_config_error(&err),
    }
}

/// Handler for POST /pack_stream endpoint (SSE).
///
/// Streams planning events as Server-Sent Events (text/event-stream) so a
/// client can draw the load while it is being built.
#[utoipa::path(
    post,
    path = "/pack_stream",
    request_body = PackRequest,
    responses(
        (
            status = 200,
            description = "Streams planning events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or pallet configuration",
            body = ErrorResponse
        )
    ),
    tag = "planning"
)]
async fn handle_pack_stream(
    State(state): State<ApiState>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> Response {
    let request = match parse_pack_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let config = request.packing_config(state.optimizer_config.packing_config());
    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        let outcome = optimize_with_progress(
            &request.rows,
            &request.overrides,
            &request.pallet,
            &config,
            |evt| {
                if let Ok(json) = serde_json::to_string(evt) {
                    // A closed receiver means the client left; the rest is discarded.
                    let _ = tx.blocking_send(json);
                }
            },
        );
        if let Err(err) = outcome {
            warn!(code = err.code(), "streamed planning failed: {err}");
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Handler for POST /move endpoint.
///
/// Moves one column within a planned load. A rejected move returns 409 and
/// the load is left as it was.
#[utoipa::path(
    post,
    path = "/move",
    request_body = MoveBody,
    responses(
        (status = 200, description = "Column moved", body = MoveResponse),
        (status = CONFLICT, description = "Move breaks a loading rule", body = ErrorResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or unknown pallet/column",
            body = ErrorResponse
        )
    ),
    tag = "overrides"
)]
async fn handle_move(
    State(state): State<ApiState>,
    payload: Result<Json<MoveBody>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(err) => return json_deserialize_error(err),
    };
    if let Some(err) = body.pallets.iter().find_map(|p| p.spec.validate().err()) {
        return pallet_config_error(&err);
    }

    let (mut pallets, request) = body.into_parts();
    let config = state.optimizer_config.packing_config();
    match move_block(&mut pallets, &request, &config) {
        Ok(()) => {
            let metrics = summarize(&pallets);
            (StatusCode::OK, Json(MoveResponse { pallets, metrics })).into_response()
        }
        Err(err) => {
            info!(code = err.code(), "move rejected: {err}");
            move_error(&err)
        }
    }
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    fn state() -> ApiState {
        ApiState {
            optimizer_config: OptimizerConfig::default(),
        }
    }

    fn pack_request(value: Value) -> PackRequest {
        serde_json::from_value(value).expect("Should parse valid JSON")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    fn sample_request() -> Value {
        json!({
            "pallet": {
                "max_width": 1100.0,
                "max_depth": 1100.0,
                "max_height": 1700.0,
                "max_weight": 1000.0
            },
            "rows": [
                { "name": "A", "width": 300, "depth": 300, "height": 200, "weight": 5, "quantity": 10 }
            ]
        })
    }

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        for path in ["/pack", "/pack_stream", "/move"] {
            assert!(
                paths.contains_key(path),
                "OpenAPI documentation is missing the {path} path"
            );
        }
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        let schemas = &components.schemas;
        for name in ["PackRequest", "OptimizationResult", "MoveBody", "ErrorResponse"] {
            assert!(
                schemas.contains_key(name),
                "Expected schema '{}' is missing from OpenAPI spec",
                name
            );
        }
    }

    #[test]
    fn pack_request_defaults_optional_fields() {
        let request = pack_request(sample_request());
        assert!(request.overrides.is_empty());
        assert_eq!(request.mode, None);
        assert_eq!(request.pallet.overhang_tolerance, 30.0);

        let base = PackingConfig::default();
        assert_eq!(request.packing_config(base), base);
    }

    #[test]
    fn request_level_mode_overrides_config() {
        let mut value = sample_request();
        value["mode"] = json!("units");
        let request = pack_request(value);
        let config = request.packing_config(PackingConfig::default());
        assert_eq!(config.mode, PackingMode::Units);
        assert_eq!(config.support_epsilon, PackingConfig::DEFAULT_SUPPORT_EPSILON);
    }

    #[tokio::test]
    async fn pack_returns_planned_load() {
        let request = pack_request(sample_request());
        let response = handle_pack(State(state()), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["is_complete"], json!(true));
        assert_eq!(body["pallets"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["metrics"]["total_units"], json!(10));
        assert_eq!(body["metrics"]["trucks"]["trucks_4t"], json!(1));
    }

    #[tokio::test]
    async fn packed_columns_report_rider_layout() {
        let mut value = sample_request();
        value["rows"] = json!([
            { "name": "A", "width": 500, "depth": 500, "height": 500, "weight": 10, "quantity": 3 },
            { "name": "B", "width": 520, "depth": 480, "height": 100, "weight": 5, "quantity": 1 }
        ]);
        let response = handle_pack(State(state()), Ok(Json(pack_request(value)))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let placed = &body["pallets"][0]["placed"][0];
        assert_eq!(placed["rotated"], json!(false));
        assert_eq!(
            placed["rider"]["position"],
            json!({ "x": 0.0, "y": 10.0, "z": 1500.0 })
        );
        assert_eq!(
            placed["rider"]["footprint"],
            json!({ "width": 520.0, "depth": 480.0 })
        );
        assert_eq!(placed["rider"]["rotated"], json!(false));
    }

    #[tokio::test]
    async fn pack_rejects_invalid_pallet() {
        let mut value = sample_request();
        value["pallet"]["max_height"] = json!(0.0);
        let response = handle_pack(State(state()), Ok(Json(pack_request(value)))).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["code"], json!("invalid_pallet"));
    }

    #[tokio::test]
    async fn unstable_move_returns_conflict() {
        let spec = PalletSpec::new(1100.0, 1100.0, 1700.0, 1000.0).unwrap();
        let unit = |name: &str, size: f64| UnitItem {
            name: name.to_string(),
            product_index: 0,
            sub_id: 1,
            dims: Vec3::new(size, size, 200.0),
            weight: 5.0,
            orientation: OrientationPolicy::Auto,
            priority: 1,
            color: String::new(),
        };
        let mut pallet = spec.instantiate(1);
        pallet.placed.push(PlacedBlock::new(
            ColumnBlock::stack(&unit("Small", 150.0), vec![1]),
            Vec3::zero(),
        ));
        pallet.placed.push(PlacedBlock::new(
            ColumnBlock::stack(&unit("Wide", 200.0), vec![1]),
            Vec3::new(150.0, 0.0, 0.0),
        ));

        let body: MoveBody = serde_json::from_value(json!({
            "pallets": [pallet],
            "source_pallet": 1,
            "source_index": 1,
            "destination": 1,
            "destination_base": 0
        }))
        .expect("Should parse valid JSON");
        let response = handle_move(State(state()), Ok(Json(body))).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["code"], json!("unstable_stack"));

        let body: MoveBody = serde_json::from_value(json!({
            "pallets": [pallet],
            "source_pallet": 1,
            "source_index": 1,
            "destination": "new"
        }))
        .expect("Should parse valid JSON");
        let response = handle_move(State(state()), Ok(Json(body))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["metrics"]["pallet_count"], json!(2));
    }
}
