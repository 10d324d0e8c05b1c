use crate::{
    http_response::{NOT_FOUND, error_response, handle_service_result},
    models::{BootReport, DeviceRecordView, FaceSampleSubmission, RegisterDevice, VerifyDevice},
    services::registry::RegistryService,
    store::DeviceStore,
};
use actix_cors::Cors;
use actix_web::{
    HttpRequest, HttpResponse, Responder,
    http::header,
    middleware::DefaultHeaders,
    web::{self, Json},
};
use anyhow::{Context, Result};
use log::debug;
use serde::de::DeserializeOwned;
use std::future::Future;

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type";

/// Browser preflight handling of the registry: any origin and any requested
/// header, GET/POST/OPTIONS
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .send_wildcard()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_any_header()
}

/// Fixed CORS headers added to every registry response that lacks them,
/// including requests without an `Origin` header.
///
/// Must wrap outside of [`cors`] so that preflight answers get them too.
pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .add((header::ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS))
        .add((header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS))
}

/// Parse `body` as JSON and hand it to `operation`
async fn with_payload<T, R, F, Fut>(body: &[u8], operation: F) -> Result<R>
where
    T: DeserializeOwned,
    F: FnOnce(T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let payload = serde_json::from_slice(body).context("failed to parse request body")?;
    operation(payload).await
}

#[derive(Clone)]
pub struct Api<Store>
where
    Store: DeviceStore,
{
    pub device_store: Store,
}

impl<Store> Api<Store>
where
    Store: DeviceStore + 'static,
{
    pub fn new(device_store: Store) -> Self {
        Api { device_store }
    }

    /// Register all device registry routes
    ///
    /// Routes are guarded by method so that a method mismatch falls through
    /// to [`Self::not_found`] like any unknown path.
    pub fn configure(cfg: &mut web::ServiceConfig) {
        cfg.service(
            web::resource("/{tail:.*}")
                .guard(actix_web::guard::Options())
                .to(Self::preflight),
        )
        .service(
            web::resource("/status")
                .guard(actix_web::guard::Get())
                .to(Self::status),
        )
        .service(
            web::resource("/bootCount")
                .guard(actix_web::guard::Get())
                .to(Self::boot_count),
        )
        .service(
            web::resource("/healthcheck")
                .guard(actix_web::guard::Get())
                .to(Self::healthcheck),
        )
        .service(
            web::resource("/version")
                .guard(actix_web::guard::Get())
                .to(Self::version),
        )
        .service(
            web::resource("/register")
                .guard(actix_web::guard::Post())
                .to(Self::register),
        )
        .service(
            web::resource("/data")
                .guard(actix_web::guard::Post())
                .to(Self::data),
        )
        .service(
            web::resource("/face-sample")
                .guard(actix_web::guard::Post())
                .to(Self::face_sample),
        )
        .service(
            web::resource("/verify")
                .guard(actix_web::guard::Post())
                .to(Self::verify),
        );
    }

    pub async fn status(api: web::Data<Self>) -> impl Responder {
        debug!("status() called");

        handle_service_result(
            RegistryService::status(&api.device_store).await.map(Json),
            "status",
        )
    }

    pub async fn boot_count(api: web::Data<Self>) -> impl Responder {
        debug!("boot_count() called");

        handle_service_result(
            RegistryService::boot_count(&api.device_store)
                .await
                .map(Json),
            "boot_count",
        )
    }

    pub async fn register(body: web::Bytes, api: web::Data<Self>) -> impl Responder {
        debug!("register() called");

        let result = with_payload(&body, |registration: RegisterDevice| {
            RegistryService::register(&api.device_store, registration)
        })
        .await;

        handle_service_result(
            result
                .map(|record| Json(DeviceRecordView::from(record)))
                .context("registration failed"),
            "register",
        )
    }

    pub async fn data(body: web::Bytes, api: web::Data<Self>) -> impl Responder {
        debug!("data() called");

        let result = with_payload(&body, |report: BootReport| {
            RegistryService::report_boot(&api.device_store, report)
        })
        .await;

        handle_service_result(
            result
                .map(|record| Json(DeviceRecordView::from(record)))
                .context("data update failed"),
            "data",
        )
    }

    pub async fn face_sample(body: web::Bytes, api: web::Data<Self>) -> impl Responder {
        debug!("face_sample() called");

        let result = with_payload(&body, |submission: FaceSampleSubmission| {
            RegistryService::submit_face_sample(&api.device_store, submission)
        })
        .await;

        handle_service_result(
            result.map(Json).context("face sample failed"),
            "face_sample",
        )
    }

    pub async fn verify(body: web::Bytes, api: web::Data<Self>) -> impl Responder {
        debug!("verify() called");

        let result = with_payload(&body, |request: VerifyDevice| {
            RegistryService::verify(&api.device_store, request)
        })
        .await;

        handle_service_result(result.map(Json).context("verification failed"), "verify")
    }

    pub async fn healthcheck(api: web::Data<Self>) -> impl Responder {
        debug!("healthcheck() called");
        HttpResponse::Ok().json(RegistryService::health(&api.device_store).await)
    }

    pub async fn version() -> impl Responder {
        debug!("version() called");

        handle_service_result(Ok(env!("CARGO_PKG_VERSION").to_string()), "version")
    }

    /// Answers OPTIONS on every path; CORS headers are added by
    /// [`cors_headers`]
    pub async fn preflight() -> impl Responder {
        HttpResponse::Ok().finish()
    }

    pub async fn not_found(req: HttpRequest) -> impl Responder {
        debug!("no route for {} {}", req.method(), req.path());
        error_response(HttpResponse::NotFound(), NOT_FOUND)
    }
}
