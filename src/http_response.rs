use actix_web::{HttpResponse, http::header::ContentType, web::Json};
use anyhow::Result;
use log::error;
use serde::Serialize;
use serde_json::json;

/// Body of a routing miss
pub const NOT_FOUND: &str = "Not Found";

/// Trait for converting service results into HTTP responses
pub trait ServiceResultResponse {
    fn into_response(self) -> HttpResponse;
}

impl ServiceResultResponse for String {
    fn into_response(self) -> HttpResponse {
        HttpResponse::Ok()
            .content_type(ContentType::plaintext())
            .body(self)
    }
}

impl<T: Serialize> ServiceResultResponse for Json<T> {
    fn into_response(self) -> HttpResponse {
        HttpResponse::Ok().json(self.into_inner())
    }
}

/// JSON error body `{"error": message}` with the given status builder
pub fn error_response(mut builder: actix_web::HttpResponseBuilder, message: &str) -> HttpResponse {
    builder.json(json!({ "error": message }))
}

/// Handle Result and convert data to Response
///
/// Successful results are rendered via [`ServiceResultResponse`]; every
/// error becomes a 500 carrying the full context chain as JSON.
///
/// # Arguments
/// * `result` - The Result to handle
/// * `operation` - Context message describing the operation
pub fn handle_service_result<T>(result: Result<T>, operation: &str) -> HttpResponse
where
    T: ServiceResultResponse,
{
    match result {
        Ok(data) => data.into_response(),
        Err(e) => {
            error!("{operation} failed: {e:#}");
            error_response(HttpResponse::InternalServerError(), &format!("{e:#}"))
        }
    }
}
