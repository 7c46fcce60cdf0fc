//! OpenAPI document, served as JSON at `/openapi.json` and through the
//! Scalar UI at `/docs`.

use axum::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "grounded-search API",
        version = "0.1.0",
        description = "Web-grounded question answering backed by a hosted agent with Bing search.",
    ),
    tags(
        (name = "Search", description = "Grounded web search through the configured agent"),
        (name = "Health", description = "Server liveness and configuration state"),
    ),
    paths(
        crate::api::search::search,
        crate::api::health::health,
    ),
    components(schemas(
        crate::api::search::SearchResponse,
        crate::api::search::SearchAnswerBody,
        crate::api::search::RunFailedBody,
        crate::api::search::SearchErrorBody,
        crate::api::health::HealthResponse,
    ))
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
